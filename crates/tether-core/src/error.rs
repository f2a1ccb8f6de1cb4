//! Error types shared across the tether workspace.
//!
//! Errors that cross the queue and listener boundaries must be `Clone`, so
//! payloads are strings, JSON values, or record identities — never foreign
//! handle types.

use thiserror::Error;

/// The shared error taxonomy for sources, caches, queues, and strategies.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum Error {
    /// Operation exceeds a configured policy (e.g. request caps).
    #[error("operation not allowed: {0}")]
    NotAllowed(String),

    /// A record lookup failed.
    #[error("record not found: {kind}:{id}")]
    RecordNotFound {
        /// The record type.
        kind: String,
        /// The record id.
        id: String,
    },

    /// A relationship is not defined for a model.
    #[error("relationship {relationship} not defined for {kind}")]
    RelationshipNotFound {
        /// The record type.
        kind: String,
        /// The relationship name.
        relationship: String,
    },

    /// A record has no remote key under the configured key name.
    #[error("no remote key for {kind}:{id}")]
    KeyNotFound {
        /// The record type.
        kind: String,
        /// The record id.
        id: String,
    },

    /// Upstream rejection; carries the parsed error document.
    #[error("server error ({status})")]
    Server {
        /// The HTTP status code.
        status: u16,
        /// The parsed response body, or `Null` if there was none.
        payload: serde_json::Value,
    },

    /// Invalid model or relationship metadata.
    #[error("schema error: {0}")]
    Schema(#[from] SchemaError),

    /// Exhaustion or cancellation of queued actions.
    #[error("queue error: {0}")]
    Queue(String),

    /// Network-level failure.
    #[error("transport error: {0}")]
    Transport(String),

    /// Local persistence failure.
    #[error("storage error: {0}")]
    Storage(String),

    /// Document encoding or decoding failure.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// No listener produced a value during a resolve emission.
    #[error("no listener resolved: {0}")]
    Unresolved(String),

    /// Invalid coordinator wiring: unknown nodes, duplicate names, or
    /// missing source capabilities.
    #[error("coordinator error: {0}")]
    Coordinator(String),
}

impl Error {
    /// Build a [`Error::RecordNotFound`] for the given identity parts.
    pub fn record_not_found(kind: impl Into<String>, id: impl Into<String>) -> Self {
        Error::RecordNotFound {
            kind: kind.into(),
            id: id.into(),
        }
    }

    /// Build a [`Error::RelationshipNotFound`].
    pub fn relationship_not_found(
        kind: impl Into<String>,
        relationship: impl Into<String>,
    ) -> Self {
        Error::RelationshipNotFound {
            kind: kind.into(),
            relationship: relationship.into(),
        }
    }

    /// Build a [`Error::Storage`] from any displayable error.
    pub fn storage(err: impl std::fmt::Display) -> Self {
        Error::Storage(err.to_string())
    }

    /// Build a [`Error::Transport`] from any displayable error.
    pub fn transport(err: impl std::fmt::Display) -> Self {
        Error::Transport(err.to_string())
    }

    /// Build a [`Error::Serialization`] from any displayable error.
    pub fn serialization(err: impl std::fmt::Display) -> Self {
        Error::Serialization(err.to_string())
    }
}

/// Validation errors raised while constructing a [`crate::Schema`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SchemaError {
    /// A record references a model that is not defined.
    #[error("model not defined: {0}")]
    ModelNotDefined(String),

    /// A relationship targets a model that is not defined.
    #[error("relationship {model}.{relationship} targets undefined model {target}")]
    UnknownRelatedModel {
        /// The declaring model.
        model: String,
        /// The relationship name.
        relationship: String,
        /// The missing target model.
        target: String,
    },

    /// A declared inverse does not exist on the target model.
    #[error("relationship {model}.{relationship} declares inverse {inverse} missing on {target}")]
    MissingInverse {
        /// The declaring model.
        model: String,
        /// The relationship name.
        relationship: String,
        /// The declared inverse name.
        inverse: String,
        /// The target model.
        target: String,
    },

    /// Two sides of a bidirectional relationship disagree.
    #[error("relationship {model}.{relationship} and inverse {target}.{inverse} are inconsistent")]
    InverseMismatch {
        /// The declaring model.
        model: String,
        /// The relationship name.
        relationship: String,
        /// The declared inverse name.
        inverse: String,
        /// The target model.
        target: String,
    },

    /// The cardinalities of a relationship and its declared inverse cannot
    /// be kept consistent.
    #[error("relationship {model}.{relationship} and inverse {target}.{inverse} have inconsistent cardinalities")]
    InverseCardinality {
        /// The declaring model.
        model: String,
        /// The relationship name.
        relationship: String,
        /// The declared inverse name.
        inverse: String,
        /// The target model.
        target: String,
    },
}

/// Result type used throughout the workspace.
pub type Result<T> = std::result::Result<T, Error>;
