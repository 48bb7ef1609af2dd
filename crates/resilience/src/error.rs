//! Error types for breaker calls and configuration.

use std::time::Duration;

use thiserror::Error;

/// A call was rejected because the dependency's circuit is open.
///
/// Recoverable: the caller may retry after `retry_after`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("circuit for '{dependency}' is open, retry after {retry_after:?}")]
pub struct CircuitOpen {
    /// The guarded dependency.
    pub dependency: String,
    /// Remaining cooldown. Zero while a half-open trial is in flight.
    pub retry_after: Duration,
}

/// Outcome of a call that went through a breaker.
///
/// Keeps breaker rejections apart from genuine upstream failures.
#[derive(Debug, Error)]
pub enum CallError<E> {
    /// The breaker rejected the call without running it.
    #[error(transparent)]
    CircuitOpen(#[from] CircuitOpen),
    /// The call ran and failed.
    #[error("upstream call failed: {0}")]
    Upstream(#[source] E),
}

impl<E> CallError<E> {
    /// Returns `true` if the breaker rejected the call.
    #[must_use]
    pub const fn is_circuit_open(&self) -> bool {
        matches!(self, Self::CircuitOpen(_))
    }

    /// The upstream error, if the call actually ran.
    pub fn into_upstream(self) -> Option<E> {
        match self {
            Self::Upstream(e) => Some(e),
            Self::CircuitOpen(_) => None,
        }
    }

    /// Map the upstream error, keeping rejections as they are.
    pub fn map_upstream<F, O>(self, f: O) -> CallError<F>
    where
        O: FnOnce(E) -> F,
    {
        match self {
            Self::Upstream(e) => CallError::Upstream(f(e)),
            Self::CircuitOpen(open) => CallError::CircuitOpen(open),
        }
    }
}

/// Invalid breaker configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    /// A threshold or duration was zero.
    #[error("{field} must be greater than zero")]
    Zero {
        /// Name of the offending field.
        field: &'static str,
    },
    /// A per-dependency override was invalid.
    #[error("breaker config for '{dependency}': {source}")]
    Dependency {
        /// The dependency the override belongs to.
        dependency: String,
        /// What was wrong with it.
        #[source]
        source: Box<ConfigError>,
    },
}
