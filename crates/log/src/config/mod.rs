//! Logger configuration.

mod presets;

use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Format {
    /// Multi-line, human oriented.
    Pretty,
    /// Single line per event.
    #[default]
    Compact,
    /// Newline-delimited JSON.
    Json,
}

impl FromStr for Format {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "pretty" => Ok(Self::Pretty),
            "compact" => Ok(Self::Compact),
            "json" => Ok(Self::Json),
            other => Err(format!("unknown log format '{other}'")),
        }
    }
}

/// What each line shows.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DisplayConfig {
    /// Timestamps.
    pub time: bool,
    /// Event target (module path).
    pub target: bool,
    /// File and line.
    pub source: bool,
    /// Thread ids.
    pub thread_ids: bool,
    /// ANSI colors; ignored for JSON.
    pub colors: bool,
    /// Lift event fields to the top level of JSON records.
    pub flatten: bool,
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            time: true,
            target: true,
            source: false,
            thread_ids: false,
            colors: true,
            flatten: false,
        }
    }
}

impl DisplayConfig {
    fn apply_env(&mut self, lookup: &impl Fn(&str) -> Option<String>) {
        let flag = |key: &str| lookup(key).map(|v| matches!(v.as_str(), "1" | "true" | "yes" | "on"));
        if let Some(colors) = flag("AECFLOW_LOG_COLORS") {
            self.colors = colors;
        }
        if let Some(source) = flag("AECFLOW_LOG_SOURCE") {
            self.source = source;
        }
        if let Some(time) = flag("AECFLOW_LOG_TIME") {
            self.time = time;
        }
    }
}

/// Process-wide fields attached to every event through a root span.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Fields {
    /// Service name.
    pub service: Option<String>,
    /// Deployment environment.
    pub env: Option<String>,
    /// Build version.
    pub version: Option<String>,
}

impl Fields {
    /// Whether no field is set.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.service.is_none() && self.env.is_none() && self.version.is_none()
    }

    fn from_lookup(lookup: &impl Fn(&str) -> Option<String>) -> Self {
        Self {
            service: lookup("AECFLOW_SERVICE"),
            env: lookup("AECFLOW_ENV"),
            version: lookup("AECFLOW_VERSION"),
        }
    }
}

/// Logger configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// `EnvFilter` directive, e.g. `info,aecflow_coordinator=debug`.
    pub level: String,
    /// Output format.
    pub format: Format,
    /// Line contents.
    pub display: DisplayConfig,
    /// Global fields.
    pub fields: Fields,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            level: "info".to_owned(),
            format: Format::default(),
            display: DisplayConfig::default(),
            fields: Fields::default(),
        }
    }
}

impl Config {
    /// Build from environment variables.
    ///
    /// `AECFLOW_LOG` wins over `RUST_LOG`; an unknown `AECFLOW_LOG_FORMAT`
    /// keeps the default format.
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub(crate) fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();
        if let Some(level) = lookup("AECFLOW_LOG").or_else(|| lookup("RUST_LOG")) {
            config.level = level;
        }
        if let Some(format) = lookup("AECFLOW_LOG_FORMAT").and_then(|f| f.parse().ok()) {
            config.format = format;
        }
        config.display.apply_env(&lookup);
        config.fields = Fields::from_lookup(&lookup);
        config
    }
}
