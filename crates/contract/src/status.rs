//! Lifecycle status of an AEC.

use serde::{Deserialize, Serialize};

/// The lifecycle status of an Agent Execution Contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AecStatus {
    /// Created, waiting for a run to start.
    Draft,
    /// A run owns the contract and is driving steps.
    Generating,
    /// Parked until the user reviews repository findings.
    SuspendedFindings,
    /// Parked until the user answers clarification questions.
    SuspendedQuestions,
    /// Generation finished; the contract can be consumed.
    Ready,
    /// The contract has been consumed.
    Done,
    /// The run failed or was cancelled.
    Failed,
}

impl AecStatus {
    /// Returns `true` if no run-driven transition can leave this status.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Ready | Self::Done | Self::Failed)
    }

    /// Returns `true` if the contract is parked waiting for a caller decision.
    #[must_use]
    pub fn is_suspended(&self) -> bool {
        matches!(self, Self::SuspendedFindings | Self::SuspendedQuestions)
    }

    /// Returns `true` for the only status in which a run lock may be held.
    #[must_use]
    pub fn is_generating(&self) -> bool {
        matches!(self, Self::Generating)
    }
}

impl std::fmt::Display for AecStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Draft => write!(f, "draft"),
            Self::Generating => write!(f, "generating"),
            Self::SuspendedFindings => write!(f, "suspended-findings"),
            Self::SuspendedQuestions => write!(f, "suspended-questions"),
            Self::Ready => write!(f, "ready"),
            Self::Done => write!(f, "done"),
            Self::Failed => write!(f, "failed"),
        }
    }
}
