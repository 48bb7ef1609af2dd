//! Logging bootstrap errors.

use thiserror::Error;

/// Why the logger could not be installed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LogError {
    /// The filter directive did not parse.
    #[error("invalid log filter {0}")]
    Filter(String),

    /// A global subscriber is already installed.
    #[error("logger already initialized: {0}")]
    AlreadyInitialized(String),
}

/// Result alias for this crate.
pub type LogResult<T> = Result<T, LogError>;
