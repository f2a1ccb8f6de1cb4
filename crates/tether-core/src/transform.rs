//! Transforms: ordered, id-tagged batches of operations.

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::operation::Operation;

/// A stable unique identifier for a transform.
///
/// Used for de-duplication across sources: applying the same transform id to
/// a source twice has the same visible effect as applying it once.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TransformId(pub Uuid);

impl TransformId {
    /// Generate a fresh random id.
    pub fn random() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for TransformId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// An ordered batch of operations with a stable id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transform {
    /// The transform's stable id.
    pub id: TransformId,
    /// The operations, applied in order.
    pub operations: Vec<Operation>,
}

impl Transform {
    /// Create a transform with a fresh id.
    pub fn new(operations: Vec<Operation>) -> Self {
        Self {
            id: TransformId::random(),
            operations,
        }
    }

    /// Create a transform holding a single operation.
    pub fn from_operation(operation: Operation) -> Self {
        Self::new(vec![operation])
    }

    /// Create a transform with an explicit id.
    pub fn with_id(id: TransformId, operations: Vec<Operation>) -> Self {
        Self { id, operations }
    }

    /// Number of operations in this transform.
    pub fn len(&self) -> usize {
        self.operations.len()
    }

    /// Whether the transform carries no operations.
    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }
}
