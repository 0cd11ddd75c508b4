//! Setup-phase progress envelopes.

use serde::{Deserialize, Serialize};

/// A progress envelope sent while a terminal session is being prepared.
///
/// On the wire this is `{"type": "info"|"stdout"|"error", "data": "..."}`.
/// A preparation phase emits any number of `Stdout` heartbeats followed by
/// exactly one terminal envelope: `Info` on success or `Error` on failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "lowercase")]
pub enum SetupMessage {
    /// Human-readable status line.
    Info(String),
    /// Incremental progress output, rendered inline by the client.
    Stdout(String),
    /// Terminal failure; the session will not reach the interactive phase.
    Error(String),
}

impl SetupMessage {
    pub fn info(data: impl Into<String>) -> Self {
        Self::Info(data.into())
    }

    pub fn stdout(data: impl Into<String>) -> Self {
        Self::Stdout(data.into())
    }

    pub fn error(data: impl Into<String>) -> Self {
        Self::Error(data.into())
    }

    /// Whether this envelope ends a preparation phase.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Info(_) | Self::Error(_))
    }

    pub fn data(&self) -> &str {
        match self {
            Self::Info(data) | Self::Stdout(data) | Self::Error(data) => data,
        }
    }
}
