//! Query expressions and results.
//!
//! The full query builder DSL lives outside the core; sources only need the
//! expression shapes below.

use serde::{Deserialize, Serialize};

use crate::record::{Record, RecordIdentity};

/// A query against a source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "find", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum QueryExpression {
    /// Find one record by identity.
    Record {
        /// The identity to find.
        record: RecordIdentity,
    },
    /// Find all records of a type.
    Records {
        /// The record type.
        #[serde(rename = "type")]
        kind: String,
    },
    /// Find the target of a has-one relationship.
    RelatedRecord {
        /// The owning record.
        record: RecordIdentity,
        /// The relationship name.
        relationship: String,
    },
    /// Find the members of a has-many relationship.
    RelatedRecords {
        /// The owning record.
        record: RecordIdentity,
        /// The relationship name.
        relationship: String,
    },
}

/// The result of evaluating a query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum QueryResult {
    /// Zero or one record.
    Record(Option<Record>),
    /// Any number of records.
    Records(Vec<Record>),
}

impl QueryResult {
    /// The single record, if this result holds one.
    pub fn record(&self) -> Option<&Record> {
        match self {
            QueryResult::Record(record) => record.as_ref(),
            QueryResult::Records(_) => None,
        }
    }

    /// The record list, if this result holds one.
    pub fn records(&self) -> Option<&[Record]> {
        match self {
            QueryResult::Records(records) => Some(records),
            QueryResult::Record(_) => None,
        }
    }
}
