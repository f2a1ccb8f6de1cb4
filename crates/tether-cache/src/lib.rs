//! # Tether Cache
//!
//! In-memory relational record cache with pluggable operation processors.
//!
//! The cache applies [`Operation`](tether_core::Operation)s one at a time.
//! Around each operation, every registered [`OperationProcessor`] is given
//! three chances to emit compensating operations:
//!
//! - `before` — applied before the primary operation (detach bookkeeping)
//! - `after` — computed against the pre-operation state, applied after it
//!   (inverse maintenance, dependent removal, dangling-pointer cleanup)
//! - `finally` — invoked once the primary and its `after` operations have
//!   landed (post-commit housekeeping)
//!
//! Two processors ship by default:
//!
//! - [`InverseRelationshipProcessor`] keeps both sides of bidirectional
//!   relationships in agreement
//! - [`RelationshipIntegrityProcessor`] owns the reverse index of
//!   relationship pointers and cleans up after record removal

pub mod cache;
pub mod processor;

pub use cache::Cache;
pub use processor::{
    InverseRelationshipProcessor, OperationProcessor, PatchContext,
    RelationshipIntegrityProcessor, ReverseIndex,
};
