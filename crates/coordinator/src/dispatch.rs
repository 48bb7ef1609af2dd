//! Step runner hand-off as queued messages.

use std::sync::Arc;

use aecflow_core::{AecId, RunId};
use aecflow_ports::{PortsError, ResumeSignal, StepRunner, TaskQueue};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// What a worker should do for a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum RunCommand {
    /// Drive the run from its current step.
    Begin {
        /// The run.
        run_id: RunId,
        /// The AEC it generates.
        aec_id: AecId,
    },
    /// Continue a resumed run, passing the caller's decision to the first step.
    Resume {
        /// The run.
        run_id: RunId,
        /// The AEC it generates.
        aec_id: AecId,
        /// Checkpoint the run paused at.
        checkpoint: String,
        /// The decision payload.
        payload: serde_json::Value,
    },
}

impl RunCommand {
    /// The run this command addresses.
    #[must_use]
    pub const fn run_id(&self) -> RunId {
        match self {
            Self::Begin { run_id, .. } | Self::Resume { run_id, .. } => *run_id,
        }
    }

    /// The AEC this command addresses.
    #[must_use]
    pub const fn aec_id(&self) -> AecId {
        match self {
            Self::Begin { aec_id, .. } | Self::Resume { aec_id, .. } => *aec_id,
        }
    }

    /// The decision to hand the first step, if any.
    #[must_use]
    pub fn resume_signal(&self) -> Option<ResumeSignal> {
        match self {
            Self::Begin { .. } => None,
            Self::Resume {
                checkpoint, payload, ..
            } => Some(ResumeSignal {
                checkpoint: checkpoint.clone(),
                payload: payload.clone(),
            }),
        }
    }

    /// Rebuild the command that still carries an unconsumed `signal`.
    #[must_use]
    pub fn with_signal(run_id: RunId, aec_id: AecId, signal: Option<ResumeSignal>) -> Self {
        match signal {
            None => Self::Begin { run_id, aec_id },
            Some(ResumeSignal {
                checkpoint,
                payload,
            }) => Self::Resume {
                run_id,
                aec_id,
                checkpoint,
                payload,
            },
        }
    }
}

/// Queue envelope: the command plus how often it was deferred.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunTask {
    /// What to do.
    #[serde(flatten)]
    pub command: RunCommand,
    /// Deferrals caused by open circuits so far.
    #[serde(default)]
    pub attempt: u32,
}

impl RunTask {
    /// A first attempt at `command`.
    #[must_use]
    pub const fn new(command: RunCommand) -> Self {
        Self {
            command,
            attempt: 0,
        }
    }
}

/// [`StepRunner`] that enqueues [`RunTask`]s for a [`RunWorker`](crate::RunWorker).
#[derive(Clone)]
pub struct QueueStepRunner {
    queue: Arc<dyn TaskQueue>,
}

impl std::fmt::Debug for QueueStepRunner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueueStepRunner").finish_non_exhaustive()
    }
}

impl QueueStepRunner {
    /// Create a runner that writes to `queue`.
    pub fn new(queue: Arc<dyn TaskQueue>) -> Self {
        Self { queue }
    }

    /// Enqueue a task.
    pub async fn submit(&self, task: &RunTask) -> Result<String, PortsError> {
        let payload = serde_json::to_value(task)?;
        let task_id = self.queue.enqueue(payload).await?;
        debug!(
            task_id = %task_id,
            run_id = %task.command.run_id(),
            attempt = task.attempt,
            "run command enqueued"
        );
        Ok(task_id)
    }
}

#[async_trait]
impl StepRunner for QueueStepRunner {
    async fn begin_run(&self, run_id: RunId, aec_id: AecId) -> Result<(), PortsError> {
        self.submit(&RunTask::new(RunCommand::Begin { run_id, aec_id }))
            .await
            .map(drop)
    }

    async fn resume_run(
        &self,
        run_id: RunId,
        aec_id: AecId,
        checkpoint: &str,
        payload: serde_json::Value,
    ) -> Result<(), PortsError> {
        let command = RunCommand::Resume {
            run_id,
            aec_id,
            checkpoint: checkpoint.to_owned(),
            payload,
        };
        self.submit(&RunTask::new(command)).await.map(drop)
    }
}
