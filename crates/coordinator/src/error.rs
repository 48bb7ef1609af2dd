//! Caller-facing error taxonomy.

use aecflow_contract::ContractError;
use aecflow_core::{AecId, RunId};
use aecflow_ports::PortsError;
use thiserror::Error;

/// Stable error category for transport layers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// No such AEC in the caller's workspace.
    NotFound,
    /// Another run holds the lock, or a concurrent write won.
    Conflict,
    /// The AEC's status does not permit the operation.
    InvalidState,
    /// The reporting run no longer owns the AEC.
    StaleRun,
    /// Backend or dispatch failure.
    Internal,
}

/// Errors returned by [`GenerationCoordinator`](crate::GenerationCoordinator).
#[derive(Debug, Error)]
pub enum CoordinatorError {
    /// Absent, or owned by another workspace. The two are deliberately
    /// indistinguishable.
    #[error("aec {0} not found")]
    NotFound(AecId),

    /// A run already holds the lock.
    #[error("aec is already being generated by run {holder}")]
    Conflict {
        /// The run holding the lock.
        holder: RunId,
    },

    /// The AEC's status does not permit the operation.
    #[error(transparent)]
    InvalidState(ContractError),

    /// Another writer saved the AEC between our load and save.
    #[error("aec {0} was modified concurrently, reload and retry")]
    VersionConflict(AecId),

    /// The run reporting progress no longer owns the lock.
    #[error("run {run_id} no longer owns aec {aec_id}")]
    StaleRun {
        /// The AEC.
        aec_id: AecId,
        /// The run that lost ownership.
        run_id: RunId,
    },

    /// The step runner refused the hand-off.
    #[error("failed to dispatch run {run_id}: {source}")]
    Dispatch {
        /// The run being handed off.
        run_id: RunId,
        /// Why the hand-off failed.
        #[source]
        source: PortsError,
    },

    /// The repository failed.
    #[error("repository error: {0}")]
    Repository(#[from] PortsError),
}

impl CoordinatorError {
    /// Category for transport mapping.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::NotFound(_) => ErrorKind::NotFound,
            Self::Conflict { .. } | Self::VersionConflict(_) => ErrorKind::Conflict,
            Self::InvalidState(_) => ErrorKind::InvalidState,
            Self::StaleRun { .. } => ErrorKind::StaleRun,
            Self::Dispatch { .. } | Self::Repository(_) => ErrorKind::Internal,
        }
    }

    /// Returns `true` if repeating the operation may succeed.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        match self {
            Self::VersionConflict(_) => true,
            Self::Repository(e) | Self::Dispatch { source: e, .. } => e.is_retryable(),
            _ => false,
        }
    }
}

impl From<ContractError> for CoordinatorError {
    fn from(err: ContractError) -> Self {
        match err {
            ContractError::AlreadyLocked { holder } => Self::Conflict { holder },
            other => Self::InvalidState(other),
        }
    }
}
