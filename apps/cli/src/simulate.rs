//! In-memory end-to-end run with a scripted step executor.

use std::convert::Infallible;
use std::sync::Arc;

use aecflow_contract::{Aec, AecStatus, Answer, QuestionAnswers, SuspensionKind};
use aecflow_coordinator::{
    CoordinatorConfig, FindingsAction, GenerationCoordinator, QueueStepRunner, RunOutcome,
    RunWorker,
};
use aecflow_core::{AecId, WorkspaceId};
use aecflow_ports::{AecRepo, StepContext, StepError, StepExecutor, StepOutcome, TaskQueue};
use aecflow_queue_memory::MemoryQueue;
use aecflow_repo_memory::MemoryAecRepo;
use anyhow::{Context, Result, bail};
use async_trait::async_trait;
use serde_json::json;
use tracing::info;

/// Caller decisions to replay.
#[derive(Debug, Clone, Default)]
pub struct Script {
    pub prompt: String,
    pub answers: Vec<(String, String)>,
    pub edit_once: bool,
    pub cancel: bool,
}

/// Completes every step, suspends at the two review steps.
struct ScriptedExecutor;

#[async_trait]
impl StepExecutor for ScriptedExecutor {
    async fn execute(&self, ctx: &StepContext) -> Result<StepOutcome, StepError> {
        match ctx.step.as_str() {
            "review-findings" => Ok(StepOutcome::Suspend(SuspensionKind::Findings)),
            "clarify-questions" => Ok(StepOutcome::Suspend(SuspensionKind::Questions)),
            "analyze-repository" => {
                let files = ctx
                    .guarded("repository-host", || async { Ok::<_, Infallible>(42) })
                    .await?;
                Ok(StepOutcome::complete(format!("{files} files indexed")))
            }
            step => Ok(match &ctx.resume {
                Some(signal) => StepOutcome::complete(format!("{step} after {}", signal.checkpoint)),
                None => StepOutcome::complete(format!("{step} done")),
            }),
        }
    }
}

struct Simulation {
    repo: Arc<MemoryAecRepo>,
    queue: Arc<MemoryQueue>,
    coordinator: Arc<GenerationCoordinator>,
    worker: RunWorker,
    workspace: WorkspaceId,
}

impl Simulation {
    fn new(config: &CoordinatorConfig) -> Result<Self> {
        let repo = Arc::new(MemoryAecRepo::new());
        let queue = Arc::new(MemoryQueue::new(config.queue_capacity));
        let runner = Arc::new(QueueStepRunner::new(queue.clone()));
        let coordinator = Arc::new(GenerationCoordinator::from_config(repo.clone(), runner, config));
        let breakers = Arc::new(config.breaker_registry()?);
        let worker = RunWorker::new(
            coordinator.clone(),
            queue.clone(),
            Arc::new(ScriptedExecutor),
            breakers,
            config.worker.clone(),
        );
        Ok(Self {
            repo,
            queue,
            coordinator,
            worker,
            workspace: WorkspaceId::v4(),
        })
    }

    /// Process queued commands until the run stops moving.
    ///
    /// Deferrals are bounded by `max_unavailable_retries`, so this ends.
    async fn settle(&self) -> Result<RunOutcome> {
        loop {
            match self.worker.run_once().await? {
                Some(RunOutcome::Deferred { .. }) => {}
                Some(outcome) => return Ok(outcome),
                None => {
                    if self.worker.pending_deferrals() == 0 && self.queue.is_empty().await? {
                        bail!("run did not settle");
                    }
                }
            }
        }
    }

    async fn show(&self, aec_id: AecId, event: &str) -> Result<Aec> {
        let aec = self.coordinator.get(aec_id, self.workspace).await?;
        let record = json!({ "event": event, "aec": &aec });
        println!("{}", serde_json::to_string_pretty(&record)?);
        Ok(aec)
    }

    async fn execute(&self, aec_id: AecId) -> Result<RunOutcome> {
        let handle = self.coordinator.execute(aec_id, self.workspace).await?;
        info!(run_id = %handle.run_id, "run started");
        self.settle().await
    }
}

/// Replay `script` against a fresh in-memory coordinator.
///
/// Returns the contract's final status.
pub async fn run(config: &CoordinatorConfig, script: Script) -> Result<AecStatus> {
    let sim = Simulation::new(config)?;
    let draft = Aec::new(sim.workspace, script.prompt);
    let aec_id = draft.id();
    sim.repo.save(&draft).await.context("failed to store draft")?;
    sim.show(aec_id, "created").await?;

    let mut outcome = sim.execute(aec_id).await?;
    let mut edited = false;
    loop {
        sim.show(aec_id, &outcome_label(&outcome)).await?;
        outcome = match outcome {
            RunOutcome::Suspended(SuspensionKind::Findings) => {
                let action = if script.cancel {
                    FindingsAction::Cancel
                } else if script.edit_once && !edited {
                    FindingsAction::Edit
                } else {
                    FindingsAction::Proceed
                };
                sim.coordinator
                    .resume_findings(aec_id, sim.workspace, action)
                    .await?;
                match action {
                    FindingsAction::Proceed => sim.settle().await?,
                    FindingsAction::Edit => {
                        edited = true;
                        sim.show(aec_id, "edited").await?;
                        sim.execute(aec_id).await?
                    }
                    FindingsAction::Cancel => break,
                }
            }
            RunOutcome::Suspended(SuspensionKind::Questions) => {
                if script.answers.is_empty() {
                    sim.coordinator.skip_questions(aec_id, sim.workspace).await?;
                } else {
                    let answers: QuestionAnswers = script
                        .answers
                        .iter()
                        .map(|(id, value)| (id.clone(), Answer::from(value.as_str())))
                        .collect();
                    sim.coordinator
                        .submit_answers(aec_id, sim.workspace, answers)
                        .await?;
                }
                sim.settle().await?
            }
            RunOutcome::Finished | RunOutcome::Failed(_) | RunOutcome::Dropped => break,
            RunOutcome::Deferred { .. } => sim.settle().await?,
        };
    }

    let aec = sim.show(aec_id, "final").await?;
    Ok(aec.status())
}

fn outcome_label(outcome: &RunOutcome) -> String {
    match outcome {
        RunOutcome::Finished => "finished".to_owned(),
        RunOutcome::Suspended(kind) => format!("suspended-{kind}"),
        RunOutcome::Failed(_) => "failed".to_owned(),
        RunOutcome::Deferred { attempt } => format!("deferred-{attempt}"),
        RunOutcome::Dropped => "dropped".to_owned(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn quick() -> CoordinatorConfig {
        let mut config = CoordinatorConfig::default();
        config.worker.poll_interval_ms = 10;
        config
    }

    #[tokio::test]
    async fn default_script_reaches_ready() {
        let status = run(&quick(), Script {
            prompt: "export invoices".into(),
            ..Script::default()
        })
        .await
        .unwrap();
        assert_eq!(status, AecStatus::Ready);
    }

    #[tokio::test]
    async fn edit_once_then_proceed_reaches_ready() {
        let script = Script {
            prompt: "export invoices".into(),
            answers: vec![("q1".into(), "csv".into())],
            edit_once: true,
            cancel: false,
        };
        assert_eq!(run(&quick(), script).await.unwrap(), AecStatus::Ready);
    }

    #[tokio::test]
    async fn cancel_fails_the_contract() {
        let script = Script {
            prompt: "export invoices".into(),
            cancel: true,
            ..Script::default()
        };
        assert_eq!(run(&quick(), script).await.unwrap(), AecStatus::Failed);
    }
}
