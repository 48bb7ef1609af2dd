#![forbid(unsafe_code)]
#![warn(missing_docs)]

//! # aecflow coordinator
//!
//! Drives an AEC through its generation lifecycle:
//!
//! ```text
//! draft ──execute──▶ generating ──▶ suspended-findings ──proceed──▶ generating
//!                        │   ▲              │ edit ──▶ draft
//!                        │   │              └ cancel ─▶ failed
//!                        │   └── answers / skip ── suspended-questions
//!                        ├──▶ ready ──▶ done
//!                        └──▶ failed
//! ```
//!
//! - [`GenerationCoordinator`] holds the caller operations (execute,
//!   resume decisions) and the run-side reports (advance, suspend, fail,
//!   finalize). Every operation reloads the AEC, validates against the
//!   persisted state and saves with the version it read.
//! - [`QueueStepRunner`] hands runs off as [`RunCommand`]s on a task queue.
//! - [`RunWorker`] consumes those commands and executes steps through a
//!   [`StepExecutor`](aecflow_ports::StepExecutor).
//!
//! The run lock (`locked_by`) is the only concurrency control; the
//! repository's versioned save turns lost races into explicit errors.

pub mod config;
pub mod coordinator;
pub mod decision;
pub mod dispatch;
pub mod error;
pub mod worker;

pub use config::{ConfigError, CoordinatorConfig, WorkerConfig, DEFAULT_STEPS};
pub use coordinator::GenerationCoordinator;
pub use decision::{Ack, FindingsAction, RunHandle};
pub use dispatch::{QueueStepRunner, RunCommand, RunTask};
pub use error::{CoordinatorError, ErrorKind};
pub use worker::{RunOutcome, RunWorker};
