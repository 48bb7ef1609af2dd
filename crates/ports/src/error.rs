//! Errors returned by port implementations.
//!
//! Drivers map their backend failures into these variants so the
//! coordinator can tell a lost optimistic race from a broken backend.

use std::time::Duration;

/// Error type for all port operations.
#[derive(Debug, thiserror::Error)]
pub enum PortsError {
    /// Entity not found.
    #[error("{entity} not found: {id}")]
    NotFound {
        /// Kind of entity, e.g. "aec".
        entity: &'static str,
        /// Identifier that was looked up.
        id: String,
    },

    /// The stored version moved since the caller loaded it.
    #[error("{entity} {id}: expected version {expected_version}, found {actual_version}")]
    Conflict {
        /// Kind of entity.
        entity: &'static str,
        /// Identifier of the conflicting entity.
        id: String,
        /// Version the caller read.
        expected_version: u64,
        /// Version currently stored (0 if absent).
        actual_version: u64,
    },

    /// Backend connection failure.
    #[error("connection error: {0}")]
    Connection(String),

    /// Serialization or deserialization failure.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Operation exceeded its timeout.
    #[error("timeout: {operation} after {duration:?}")]
    Timeout {
        /// Name of the operation that timed out.
        operation: &'static str,
        /// How long was waited.
        duration: Duration,
    },

    /// Catch-all.
    #[error("internal error: {0}")]
    Internal(String),
}

impl PortsError {
    /// Shorthand for [`PortsError::Conflict`].
    pub fn conflict(entity: &'static str, id: impl ToString, expected: u64, actual: u64) -> Self {
        Self::Conflict {
            entity,
            id: id.to_string(),
            expected_version: expected,
            actual_version: actual,
        }
    }

    /// Returns `true` if this is an optimistic concurrency conflict.
    #[must_use]
    pub const fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict { .. })
    }

    /// Returns `true` for transient failures worth retrying.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::Connection(_) | Self::Timeout { .. })
    }
}

impl From<serde_json::Error> for PortsError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}
