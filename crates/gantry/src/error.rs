//! Terminal session error types.

use thiserror::Error;

use crate::cluster::ClusterError;

/// Result type for session operations.
pub type SessionResult<T> = Result<T, SessionError>;

/// Errors that end a terminal session.
///
/// Cancellation is not represented here: a caller that disconnects is a
/// graceful abort, not a failure. Cleanup failures are logged by the reaper
/// and never surfaced.
#[derive(Debug, Error)]
pub enum SessionError {
    /// The caller is not permitted to open a terminal. Nothing was created.
    #[error("cluster terminal is only available to admin users")]
    Unauthorized,

    /// Privilege setup failed before any workload existed.
    #[error("failed to set up terminal privileges: {0}")]
    Bootstrap(#[source] ClusterError),

    /// Workload creation failed. A partial creation may have occurred, so
    /// cleanup is still attempted.
    #[error("failed to create terminal workload: {0}")]
    Provision(#[source] ClusterError),

    /// The workload did not become ready before the deadline.
    #[error("timeout waiting for workload {name} to become ready")]
    ReadyTimeout { name: String },

    /// The workload exited before it ever became ready.
    #[error("workload {name} stopped before becoming ready")]
    NeverReady { name: String },

    /// The interactive relay failed after the workload was ready.
    #[error("terminal stream failed: {0}")]
    Stream(String),
}
