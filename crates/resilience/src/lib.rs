#![forbid(unsafe_code)]
#![warn(missing_docs)]

//! # aecflow resilience
//!
//! Circuit breakers for calls that reach third-party metadata providers
//! during generation.
//!
//! Each upstream dependency gets its own [`CircuitBreaker`] with three
//! states:
//!
//! ```text
//!            failures >= failure_threshold
//!   CLOSED ─────────────────────────────────▶ OPEN
//!     ▲                                        │ open_duration elapsed,
//!     │ successes >= success_threshold         │ next call is a trial
//!     │                                        ▼
//!     └────────────────────────────────── HALF_OPEN
//!                  trial failure reopens ──────┘
//! ```
//!
//! Breaker state is process-local and never persisted; a restart closes
//! every circuit. [`BreakerRegistry`] hands out one breaker per dependency
//! name.
//!
//! ```rust,no_run
//! use aecflow_resilience::{BreakerRegistry, CallError, CircuitBreakerConfig};
//!
//! # async fn demo() -> Result<(), Box<dyn std::error::Error>> {
//! let registry = BreakerRegistry::new(CircuitBreakerConfig::default())?;
//! let breaker = registry.get("repo-metadata");
//! match breaker.call(|| async { Ok::<_, std::io::Error>("tree") }).await {
//!     Ok(tree) => println!("{tree}"),
//!     Err(CallError::CircuitOpen(open)) => println!("retry in {:?}", open.retry_after),
//!     Err(CallError::Upstream(e)) => return Err(e.into()),
//! }
//! # Ok(())
//! # }
//! ```

pub mod breaker;
pub mod config;
pub mod error;
pub mod registry;

pub use breaker::{CircuitBreaker, CircuitBreakerStats, State};
pub use config::{CircuitBreakerConfig, HalfOpenPolicy};
pub use error::{CallError, CircuitOpen, ConfigError};
pub use registry::BreakerRegistry;
