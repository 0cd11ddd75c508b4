//! Cluster client error types.

use thiserror::Error;

/// Result type for cluster operations.
pub type ClusterResult<T> = Result<T, ClusterError>;

/// Errors that can occur while talking to the cluster.
#[derive(Debug, Error)]
pub enum ClusterError {
    /// The kubectl command failed.
    #[error("kubectl {command} failed: {message}")]
    CommandFailed { command: String, message: String },

    /// The object already exists. Idempotent creates treat this as success.
    #[error("{kind} {name} already exists")]
    AlreadyExists { kind: String, name: String },

    /// The object was not found.
    #[error("{kind} {name} not found")]
    NotFound { kind: String, name: String },

    /// Failed to parse kubectl output.
    #[error("failed to parse kubectl output: {0}")]
    ParseError(String),

    /// Invalid input provided.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Generic IO error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl ClusterError {
    /// Whether this error is the distinguishable "already exists" outcome
    /// of a create operation.
    pub fn is_already_exists(&self) -> bool {
        matches!(self, Self::AlreadyExists { .. })
    }

    /// Whether this error means the object does not exist.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}
