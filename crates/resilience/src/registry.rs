//! One breaker per upstream dependency.

use std::collections::HashMap;
use std::sync::Arc;

use dashmap::DashMap;

use crate::breaker::{CircuitBreaker, CircuitBreakerStats};
use crate::config::CircuitBreakerConfig;
use crate::error::ConfigError;

/// Lazily creates and caches breakers by dependency name.
///
/// Dependencies without an override share the default config, but each
/// still gets its own breaker and counters.
#[derive(Debug)]
pub struct BreakerRegistry {
    default: CircuitBreakerConfig,
    overrides: HashMap<String, CircuitBreakerConfig>,
    breakers: DashMap<String, Arc<CircuitBreaker>>,
}

impl BreakerRegistry {
    /// Create a registry using `default` for every dependency.
    pub fn new(default: CircuitBreakerConfig) -> Result<Self, ConfigError> {
        default.validate()?;
        Ok(Self {
            default,
            overrides: HashMap::new(),
            breakers: DashMap::new(),
        })
    }

    /// Create a registry with per-dependency overrides.
    pub fn with_overrides<I>(default: CircuitBreakerConfig, overrides: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = (String, CircuitBreakerConfig)>,
    {
        let mut registry = Self::new(default)?;
        for (dependency, config) in overrides {
            config.validate().map_err(|e| ConfigError::Dependency {
                dependency: dependency.clone(),
                source: Box::new(e),
            })?;
            registry.overrides.insert(dependency, config);
        }
        Ok(registry)
    }

    /// The breaker for `dependency`, created on first use.
    pub fn get(&self, dependency: &str) -> Arc<CircuitBreaker> {
        if let Some(existing) = self.breakers.get(dependency) {
            return Arc::clone(existing.value());
        }
        let config = self
            .overrides
            .get(dependency)
            .unwrap_or(&self.default)
            .clone();
        let entry = self
            .breakers
            .entry(dependency.to_owned())
            .or_insert_with(|| Arc::new(CircuitBreaker::from_validated(dependency.to_owned(), config)));
        Arc::clone(entry.value())
    }

    /// Stats for every breaker created so far, sorted by name.
    pub fn snapshot(&self) -> Vec<(String, CircuitBreakerStats)> {
        let mut stats: Vec<_> = self
            .breakers
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().stats()))
            .collect();
        stats.sort_by(|a, b| a.0.cmp(&b.0));
        stats
    }

    /// Close every circuit.
    pub fn reset_all(&self) {
        for entry in &self.breakers {
            entry.value().reset();
        }
    }
}
