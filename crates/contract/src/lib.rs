#![forbid(unsafe_code)]
#![warn(missing_docs)]

//! # aecflow contract
//!
//! The Agent Execution Contract (AEC) aggregate and everything that guards
//! its lifecycle.
//!
//! This crate models the entity only; it does NOT drive generation. It
//! defines:
//!
//! - [`AecStatus`]: lifecycle state machine (7 states)
//! - [`Aec`]: the aggregate holding status, run lock, and progress
//! - [`GenerationState`] and [`GenerationStep`]: ordered step progress
//! - [`Answer`]: accumulated clarification answers
//! - State machine transitions validated by the [`transition`] module

pub mod aec;
pub mod answer;
pub mod error;
pub mod status;
pub mod step;
pub mod transition;

pub use aec::{Aec, SuspensionKind};
pub use answer::{Answer, QuestionAnswers};
pub use error::ContractError;
pub use status::AecStatus;
pub use step::{GenerationState, GenerationStep, StepStatus};
