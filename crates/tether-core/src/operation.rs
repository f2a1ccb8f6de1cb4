//! Record-level operations.
//!
//! An operation is a single tagged mutation descriptor carrying the minimum
//! payload necessary. Operations are wire-stable: the serialized form (tagged
//! by `op`, camelCase fields) is shared by every source.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::record::{Record, RecordIdentity};

/// A single record-level mutation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum Operation {
    /// Add (or overwrite) a full record.
    AddRecord {
        /// The record to add.
        record: Record,
    },
    /// Replace a full record.
    ReplaceRecord {
        /// The replacement record.
        record: Record,
    },
    /// Remove a record.
    RemoveRecord {
        /// The identity of the record to remove.
        record: RecordIdentity,
    },
    /// Replace one remote key value.
    ReplaceKey {
        /// The record whose key changes.
        record: RecordIdentity,
        /// The key name.
        key: String,
        /// The new key value.
        value: String,
    },
    /// Replace one attribute value.
    ReplaceAttribute {
        /// The record whose attribute changes.
        record: RecordIdentity,
        /// The attribute name.
        attribute: String,
        /// The new value.
        value: Value,
    },
    /// Add one member to a has-many relationship.
    AddToHasMany {
        /// The record whose relationship changes.
        record: RecordIdentity,
        /// The relationship name.
        relationship: String,
        /// The identity to add.
        related_record: RecordIdentity,
    },
    /// Remove one member from a has-many relationship.
    RemoveFromHasMany {
        /// The record whose relationship changes.
        record: RecordIdentity,
        /// The relationship name.
        relationship: String,
        /// The identity to remove.
        related_record: RecordIdentity,
    },
    /// Replace the full membership of a has-many relationship.
    ReplaceHasMany {
        /// The record whose relationship changes.
        record: RecordIdentity,
        /// The relationship name.
        relationship: String,
        /// The new membership.
        related_records: Vec<RecordIdentity>,
    },
    /// Replace a has-one relationship.
    ReplaceHasOne {
        /// The record whose relationship changes.
        record: RecordIdentity,
        /// The relationship name.
        relationship: String,
        /// The new target, or `None` to clear.
        related_record: Option<RecordIdentity>,
    },
}

impl Operation {
    /// The identity of the record this operation targets.
    pub fn target(&self) -> RecordIdentity {
        match self {
            Operation::AddRecord { record } | Operation::ReplaceRecord { record } => {
                record.identity()
            }
            Operation::RemoveRecord { record }
            | Operation::ReplaceKey { record, .. }
            | Operation::ReplaceAttribute { record, .. }
            | Operation::AddToHasMany { record, .. }
            | Operation::RemoveFromHasMany { record, .. }
            | Operation::ReplaceHasMany { record, .. }
            | Operation::ReplaceHasOne { record, .. } => record.clone(),
        }
    }

    /// The wire tag of this operation (`addRecord`, `replaceHasOne`, ...).
    pub fn tag(&self) -> &'static str {
        match self {
            Operation::AddRecord { .. } => "addRecord",
            Operation::ReplaceRecord { .. } => "replaceRecord",
            Operation::RemoveRecord { .. } => "removeRecord",
            Operation::ReplaceKey { .. } => "replaceKey",
            Operation::ReplaceAttribute { .. } => "replaceAttribute",
            Operation::AddToHasMany { .. } => "addToHasMany",
            Operation::RemoveFromHasMany { .. } => "removeFromHasMany",
            Operation::ReplaceHasMany { .. } => "replaceHasMany",
            Operation::ReplaceHasOne { .. } => "replaceHasOne",
        }
    }
}
