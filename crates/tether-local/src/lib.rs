//! # Tether Local
//!
//! Local persistence source. Records are stored as JSON documents in
//! SQLite under a stable key derived from record identity
//! (`{namespace}/{type}:{id}`), so multiple stores can share one file.
//! All database work happens on the blocking pool.

pub mod source;

pub use source::{record_key, LocalStoreConfig, SqliteSource};
