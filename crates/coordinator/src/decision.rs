//! Caller inputs and acknowledgements.

use aecflow_contract::AecStatus;
use aecflow_core::{AecId, RunId};
use serde::{Deserialize, Serialize};

/// Decision on reviewed repository findings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FindingsAction {
    /// Accept the findings and continue generating.
    Proceed,
    /// Abandon the run and return to draft for editing.
    Edit,
    /// Stop; the AEC fails.
    Cancel,
}

impl std::fmt::Display for FindingsAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Proceed => write!(f, "proceed"),
            Self::Edit => write!(f, "edit"),
            Self::Cancel => write!(f, "cancel"),
        }
    }
}

/// Returned by a successful execute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunHandle {
    /// The AEC now generating.
    pub aec_id: AecId,
    /// The fresh run that holds the lock.
    pub run_id: RunId,
}

/// Returned by a successful resume decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ack {
    /// The AEC the decision applied to.
    pub aec_id: AecId,
    /// Its status after the decision.
    pub status: AecStatus,
}
