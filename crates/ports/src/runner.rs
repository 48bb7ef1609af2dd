//! Step runner port.

use aecflow_core::{AecId, RunId};
use async_trait::async_trait;

use crate::error::PortsError;

/// Fire-and-forget hand-off of runs to whatever drives the steps.
///
/// Both methods return once the request is accepted; they never wait for
/// steps to execute.
#[async_trait]
pub trait StepRunner: Send + Sync {
    /// Start driving a freshly locked run.
    async fn begin_run(&self, run_id: RunId, aec_id: AecId) -> Result<(), PortsError>;

    /// Continue a run from `checkpoint` with the caller's decision.
    async fn resume_run(
        &self,
        run_id: RunId,
        aec_id: AecId,
        checkpoint: &str,
        payload: serde_json::Value,
    ) -> Result<(), PortsError>;
}
