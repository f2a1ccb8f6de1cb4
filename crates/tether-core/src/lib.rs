//! # Tether Core
//!
//! Pure data primitives for the tether sync engine: records, operations,
//! transforms, schema metadata, and the key map.
//!
//! This crate contains no I/O, no queues, no networking. It is pure
//! computation over relational record data.
//!
//! ## Key Types
//!
//! - [`Record`] - A typed, identified bag of attributes and relationships
//! - [`RecordIdentity`] - The `(type, id)` pair identifying a record
//! - [`Operation`] - A single tagged mutation descriptor
//! - [`Transform`] - An ordered, id-tagged batch of operations
//! - [`Schema`] - Model and relationship metadata, validated at construction
//! - [`KeyMap`] - Bidirectional mapping between local ids and remote keys

pub mod error;
pub mod keymap;
pub mod operation;
pub mod query;
pub mod record;
pub mod schema;
pub mod transform;

pub use error::{Error, Result, SchemaError};
pub use keymap::KeyMap;
pub use operation::Operation;
pub use query::{QueryExpression, QueryResult};
pub use record::{records_from, Record, RecordIdentity, Records, RelationshipData};
pub use schema::{
    AttributeDef, Dependent, ModelDef, RelationshipDef, RelationshipKind, Schema, SchemaBuilder,
};
pub use transform::{Transform, TransformId};
