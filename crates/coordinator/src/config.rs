//! Coordinator and worker configuration.

use std::collections::{BTreeMap, HashSet};
use std::time::Duration;

use aecflow_resilience::{BreakerRegistry, CircuitBreakerConfig};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// The generation steps every fresh run is seeded with.
pub const DEFAULT_STEPS: [&str; 6] = [
    "extract-intent",
    "analyze-repository",
    "review-findings",
    "draft-spec",
    "clarify-questions",
    "finalize-spec",
];

/// Invalid coordinator configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    /// The step list is empty.
    #[error("at least one generation step is required")]
    NoSteps,
    /// A step name is blank.
    #[error("step names must not be empty")]
    BlankStep,
    /// A step name appears twice.
    #[error("duplicate step name '{0}'")]
    DuplicateStep(String),
    /// A numeric field that must be positive is zero.
    #[error("{0} must be greater than zero")]
    Zero(&'static str),
    /// A breaker config is invalid.
    #[error(transparent)]
    Breaker(#[from] aecflow_resilience::ConfigError),
    /// The TOML could not be parsed.
    #[error("invalid configuration: {0}")]
    Parse(String),
}

/// Run worker settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerConfig {
    /// How long one dequeue waits for a command, in milliseconds.
    pub poll_interval_ms: u64,
    /// Times a step may be deferred by an open circuit before the run fails.
    pub max_unavailable_retries: u32,
    /// Upper bound on the wait before retrying a deferred step, in milliseconds.
    pub max_unavailable_backoff_ms: u64,
    /// Deliveries of one command before a retryable failure is given up on.
    pub max_deliveries: u32,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 250,
            max_unavailable_retries: 5,
            max_unavailable_backoff_ms: 30_000,
            max_deliveries: 5,
        }
    }
}

impl WorkerConfig {
    /// Dequeue wait.
    #[must_use]
    pub const fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// Wait before retrying a step rejected with `retry_after`.
    #[must_use]
    pub fn unavailable_backoff(&self, retry_after: Duration) -> Duration {
        retry_after
            .max(self.poll_interval())
            .min(Duration::from_millis(self.max_unavailable_backoff_ms))
    }
}

/// Everything the coordinator, its breakers and its worker need.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CoordinatorConfig {
    /// Ordered generation steps.
    pub steps: Vec<String>,
    /// Breaker settings for dependencies without an override.
    pub breaker: CircuitBreakerConfig,
    /// Per-dependency breaker overrides.
    pub dependencies: BTreeMap<String, CircuitBreakerConfig>,
    /// Capacity of the run command queue.
    pub queue_capacity: usize,
    /// Worker settings.
    pub worker: WorkerConfig,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            steps: DEFAULT_STEPS.iter().map(|s| (*s).to_owned()).collect(),
            breaker: CircuitBreakerConfig::default(),
            dependencies: BTreeMap::new(),
            queue_capacity: 1024,
            worker: WorkerConfig::default(),
        }
    }
}

impl CoordinatorConfig {
    /// Parse and validate a TOML document. Missing keys take defaults.
    pub fn from_toml_str(source: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(source).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Check step names, capacities and every breaker config.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.steps.is_empty() {
            return Err(ConfigError::NoSteps);
        }
        let mut seen = HashSet::new();
        for step in &self.steps {
            if step.trim().is_empty() {
                return Err(ConfigError::BlankStep);
            }
            if !seen.insert(step.as_str()) {
                return Err(ConfigError::DuplicateStep(step.clone()));
            }
        }
        if self.queue_capacity == 0 {
            return Err(ConfigError::Zero("queue_capacity"));
        }
        if self.worker.poll_interval_ms == 0 {
            return Err(ConfigError::Zero("worker.poll_interval_ms"));
        }
        if self.worker.max_deliveries == 0 {
            return Err(ConfigError::Zero("worker.max_deliveries"));
        }
        self.breaker.validate()?;
        for (dependency, config) in &self.dependencies {
            config
                .validate()
                .map_err(|e| aecflow_resilience::ConfigError::Dependency {
                    dependency: dependency.clone(),
                    source: Box::new(e),
                })?;
        }
        Ok(())
    }

    /// Build the breaker registry described by this config.
    pub fn breaker_registry(&self) -> Result<BreakerRegistry, ConfigError> {
        Ok(BreakerRegistry::with_overrides(
            self.breaker.clone(),
            self.dependencies.clone(),
        )?)
    }
}
