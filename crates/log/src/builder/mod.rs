//! Logger builder implementation

use tracing_subscriber::layer::{Layered, SubscriberExt};
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer, Registry, fmt};

use crate::config::{Config, Format};
use crate::error::{LogError, LogResult};

type Filtered = Layered<EnvFilter, Registry>;
type BoxedLayer = Box<dyn Layer<Filtered> + Send + Sync + 'static>;

/// Logger builder
#[derive(Debug)]
pub struct LoggerBuilder {
    config: Config,
}

/// Guard that keeps the logger alive
///
/// Holds the root span carrying the global fields; events are only
/// enriched with them while the guard lives.
#[derive(Debug)]
pub struct LoggerGuard {
    _root_span: Option<tracing::span::EnteredSpan>,
}

impl LoggerBuilder {
    /// Create builder from config
    #[must_use]
    pub fn from_config(config: Config) -> Self {
        Self { config }
    }

    /// Build and install the global subscriber.
    ///
    /// The filter is parsed first, so a bad directive never leaves a
    /// half-installed subscriber behind.
    pub fn build(self) -> LogResult<LoggerGuard> {
        let filter = EnvFilter::try_new(&self.config.level)
            .map_err(|e| LogError::Filter(format!("'{}': {e}", self.config.level)))?;

        Registry::default()
            .with(filter)
            .with(fmt_layer(&self.config))
            .try_init()
            .map_err(|e| LogError::AlreadyInitialized(e.to_string()))?;

        let fields = &self.config.fields;
        let root_span = (!fields.is_empty()).then(|| {
            tracing::info_span!(
                "app",
                service = fields.service.as_deref().unwrap_or(""),
                env = fields.env.as_deref().unwrap_or(""),
                version = fields.version.as_deref().unwrap_or("")
            )
            .entered()
        });

        Ok(LoggerGuard {
            _root_span: root_span,
        })
    }
}

fn fmt_layer(config: &Config) -> BoxedLayer {
    let display = &config.display;
    let base = fmt::layer()
        .with_writer(std::io::stderr)
        .with_ansi(display.colors && config.format != Format::Json)
        .with_target(display.target)
        .with_file(display.source)
        .with_line_number(display.source)
        .with_thread_ids(display.thread_ids);

    match (config.format, display.time) {
        (Format::Pretty, true) => base.pretty().boxed(),
        (Format::Pretty, false) => base.pretty().without_time().boxed(),
        (Format::Compact, true) => base.compact().boxed(),
        (Format::Compact, false) => base.compact().without_time().boxed(),
        (Format::Json, true) => base.json().flatten_event(display.flatten).boxed(),
        (Format::Json, false) => base
            .json()
            .flatten_event(display.flatten)
            .without_time()
            .boxed(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn bad_filter_is_rejected_before_install() {
        let config = Config {
            level: "aecflow=loudest".to_owned(),
            ..Config::test()
        };
        let err = LoggerBuilder::from_config(config).build().unwrap_err();
        assert!(matches!(err, LogError::Filter(ref msg) if msg.contains("loudest")));
    }

    #[test]
    fn every_format_builds_a_layer() {
        for format in [Format::Pretty, Format::Compact, Format::Json] {
            for time in [true, false] {
                let mut config = Config::test();
                config.format = format;
                config.display.time = time;
                let _layer = fmt_layer(&config);
            }
        }
    }

    // The only test that installs the global subscriber.
    #[test]
    fn second_install_is_an_error() {
        let first = LoggerBuilder::from_config(Config::test()).build();
        assert!(first.is_ok());
        let second = LoggerBuilder::from_config(Config::test()).build().unwrap_err();
        assert_eq!(
            std::mem::discriminant(&second),
            std::mem::discriminant(&LogError::AlreadyInitialized(String::new()))
        );
    }
}
