#![forbid(unsafe_code)]
#![warn(missing_docs)]

//! # aecflow-log
//!
//! Logging bootstrap on `tracing` + `tracing-subscriber`.
//!
//! Library crates only emit through `tracing` macros; binaries call one
//! of the init helpers once at startup and hold the returned guard.
//!
//! ```no_run
//! let _guard = aecflow_log::auto_init()?;
//! tracing::info!(aec_id = "…", "coordinator ready");
//! # Ok::<(), aecflow_log::LogError>(())
//! ```

mod builder;
pub mod config;
mod error;

pub use builder::{LoggerBuilder, LoggerGuard};
pub use config::{Config, DisplayConfig, Fields, Format};
pub use error::{LogError, LogResult};

/// Initialize from `AECFLOW_LOG` / `RUST_LOG` / `AECFLOW_LOG_FORMAT`.
pub fn auto_init() -> LogResult<LoggerGuard> {
    init_with(Config::from_env())
}

/// Initialize with an explicit config.
pub fn init_with(config: Config) -> LogResult<LoggerGuard> {
    LoggerBuilder::from_config(config).build()
}
