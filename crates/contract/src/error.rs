//! Aggregate-level invariant violations.

use aecflow_core::RunId;
use thiserror::Error;

use crate::status::AecStatus;
use crate::step::StepStatus;

/// Errors raised when a mutation would break an AEC invariant.
///
/// These are never swallowed: the coordinator surfaces them to callers as
/// conflicts or invalid-state errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ContractError {
    /// A run already owns the contract.
    #[error("contract is already locked by run {holder}")]
    AlreadyLocked {
        /// The run holding the lock.
        holder: RunId,
    },

    /// The current status does not permit the requested operation.
    #[error("cannot {operation} while contract is {status}")]
    InvalidState {
        /// Name of the rejected operation.
        operation: &'static str,
        /// Status at the time of the call.
        status: AecStatus,
    },

    /// A write would move a completed step backwards.
    #[error("step '{step}' is already complete and cannot become {to}")]
    StepRegression {
        /// Name of the step.
        step: String,
        /// The status the write tried to give it.
        to: StepStatus,
    },

    /// The generation state has no step in progress to act on.
    #[error("no generation step is in progress")]
    NoStepInProgress,

    /// The run tried to finish with steps still outstanding.
    #[error("generation still has {remaining} unfinished steps")]
    IncompleteGeneration {
        /// Steps not yet complete.
        remaining: usize,
    },

    /// A suspended contract lost its run identity.
    #[error("contract has no run to resume")]
    MissingRun,
}
