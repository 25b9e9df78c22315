//! Error types for store operations.

use crate::model::NodeId;
use std::io;
use thiserror::Error;

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Which end of a relationship could not be found.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Endpoint {
    /// The relationship source.
    Source,
    /// The relationship target.
    Target,
}

/// Errors that can occur while talking to the live store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// A store image could not be encoded or decoded.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The requested node does not exist.
    #[error("node not found: {0}")]
    NodeNotFound(NodeId),

    /// A relationship references an endpoint that does not exist.
    #[error("relationship {rel_type} references missing {endpoint:?} {id}")]
    MissingEndpoint {
        /// Relationship type being created.
        rel_type: String,
        /// Which endpoint is missing.
        endpoint: Endpoint,
        /// The identifier that could not be resolved.
        id: NodeId,
    },

    /// A record was rejected by the store.
    #[error("invalid record: {0}")]
    InvalidRecord(String),

    /// The schema subsystem rejected an operation.
    #[error("schema error: {0}")]
    Schema(String),

    /// A script failed to run.
    #[error("script {name} failed: {message}")]
    Script {
        /// Script name.
        name: String,
        /// Failure description.
        message: String,
    },

    /// The transaction was rolled back.
    #[error("transaction aborted: {0}")]
    Aborted(String),
}

impl StoreError {
    /// Creates an invalid record error.
    pub fn invalid_record(message: impl Into<String>) -> Self {
        Self::InvalidRecord(message.into())
    }

    /// Creates a schema error.
    pub fn schema(message: impl Into<String>) -> Self {
        Self::Schema(message.into())
    }

    /// Returns the missing endpoint, if this error describes one.
    pub fn missing_endpoint(&self) -> Option<Endpoint> {
        match self {
            StoreError::MissingEndpoint { endpoint, .. } => Some(*endpoint),
            _ => None,
        }
    }
}
