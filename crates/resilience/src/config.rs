//! Breaker configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// How many trial calls a half-open circuit admits at once.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum HalfOpenPolicy {
    /// One trial at a time; concurrent callers are rejected until it ends.
    #[default]
    SingleTrial,
    /// Every caller arriving while half-open runs as a trial.
    Concurrent,
}

/// Thresholds for a single breaker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CircuitBreakerConfig {
    /// Consecutive failures that open a closed circuit.
    pub failure_threshold: u32,
    /// How long an open circuit rejects calls, in milliseconds.
    pub open_duration_ms: u64,
    /// Consecutive trial successes that close a half-open circuit.
    pub success_threshold: u32,
    /// Trial admission while half-open.
    pub half_open_policy: HalfOpenPolicy,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            open_duration_ms: 30_000,
            success_threshold: 2,
            half_open_policy: HalfOpenPolicy::SingleTrial,
        }
    }
}

impl CircuitBreakerConfig {
    /// Set the failure threshold.
    #[must_use]
    pub const fn with_failure_threshold(mut self, threshold: u32) -> Self {
        self.failure_threshold = threshold;
        self
    }

    /// Set the open duration.
    #[must_use]
    pub const fn with_open_duration(mut self, duration: Duration) -> Self {
        self.open_duration_ms = duration.as_millis() as u64;
        self
    }

    /// Set the success threshold.
    #[must_use]
    pub const fn with_success_threshold(mut self, threshold: u32) -> Self {
        self.success_threshold = threshold;
        self
    }

    /// Set the half-open policy.
    #[must_use]
    pub const fn with_half_open_policy(mut self, policy: HalfOpenPolicy) -> Self {
        self.half_open_policy = policy;
        self
    }

    /// Open duration as a [`Duration`].
    #[must_use]
    pub const fn open_duration(&self) -> Duration {
        Duration::from_millis(self.open_duration_ms)
    }

    /// Reject zero thresholds and zero durations.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.failure_threshold == 0 {
            return Err(ConfigError::Zero {
                field: "failure_threshold",
            });
        }
        if self.open_duration_ms == 0 {
            return Err(ConfigError::Zero {
                field: "open_duration_ms",
            });
        }
        if self.success_threshold == 0 {
            return Err(ConfigError::Zero {
                field: "success_threshold",
            });
        }
        Ok(())
    }
}
