//! Execute, resume and run-side reporting for AEC generation.

use std::sync::Arc;

use aecflow_contract::{
    Aec, AecStatus, ContractError, GenerationState, QuestionAnswers, SuspensionKind,
};
use aecflow_core::{AecId, RunId, WorkspaceId};
use aecflow_ports::{AecRepo, PortsError, StepRunner};
use serde_json::json;
use tracing::{debug, error, info, instrument, warn};

use crate::config::CoordinatorConfig;
use crate::decision::{Ack, FindingsAction, RunHandle};
use crate::error::CoordinatorError;

/// Where a resumed run continues, once the decision is persisted.
struct Continuation {
    run_id: RunId,
    checkpoint: &'static str,
    payload: serde_json::Value,
}

/// The generation workflow coordinator.
///
/// Caller operations take the caller's workspace; an AEC from another
/// workspace is reported as [`CoordinatorError::NotFound`]. Run-side
/// operations take the reporting run's id and fail with
/// [`CoordinatorError::StaleRun`] once that run no longer holds the lock.
///
/// Nothing is cached between calls: every operation starts from the
/// persisted AEC, so execute and resume may land on different instances.
pub struct GenerationCoordinator {
    repo: Arc<dyn AecRepo>,
    runner: Arc<dyn StepRunner>,
    steps: Vec<String>,
}

impl std::fmt::Debug for GenerationCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GenerationCoordinator")
            .field("steps", &self.steps)
            .finish_non_exhaustive()
    }
}

impl GenerationCoordinator {
    /// Create a coordinator seeding every run with `steps`.
    pub fn new(repo: Arc<dyn AecRepo>, runner: Arc<dyn StepRunner>, steps: Vec<String>) -> Self {
        Self {
            repo,
            runner,
            steps,
        }
    }

    /// Create a coordinator from a validated config.
    pub fn from_config(
        repo: Arc<dyn AecRepo>,
        runner: Arc<dyn StepRunner>,
        config: &CoordinatorConfig,
    ) -> Self {
        Self::new(repo, runner, config.steps.clone())
    }

    /// The ordered step names.
    #[must_use]
    pub fn steps(&self) -> &[String] {
        &self.steps
    }

    // ── caller operations ──────────────────────────────────────────────────

    /// Load an AEC visible to `workspace_id`.
    pub async fn get(&self, aec_id: AecId, workspace_id: WorkspaceId) -> Result<Aec, CoordinatorError> {
        match self.repo.find_by_id(aec_id).await? {
            Some(aec) if aec.belongs_to(workspace_id) => Ok(aec),
            _ => Err(CoordinatorError::NotFound(aec_id)),
        }
    }

    /// Start a fresh run on a draft AEC.
    ///
    /// Returns once the lock is persisted and the run has been handed to
    /// the step runner; steps execute asynchronously.
    #[instrument(skip(self), fields(run_id = tracing::field::Empty))]
    pub async fn execute(&self, aec_id: AecId, workspace_id: WorkspaceId) -> Result<RunHandle, CoordinatorError> {
        let mut aec = self.get(aec_id, workspace_id).await?;
        if let Some(holder) = aec.locked_by() {
            return Err(CoordinatorError::Conflict { holder });
        }
        if aec.status() != AecStatus::Draft {
            return Err(invalid("execute", aec.status()));
        }

        let run_id = RunId::v4();
        tracing::Span::current().record("run_id", tracing::field::display(run_id));
        aec.start_generating(run_id)?;
        aec.update_generation_state(GenerationState::seeded(self.steps.iter().cloned()))?;

        match self.repo.save(&aec).await {
            Ok(version) => debug!(version, "run lock persisted"),
            Err(e) if e.is_conflict() => return Err(self.explain_lost_execute(aec_id).await),
            Err(e) => {
                // the write may still have landed
                self.release_lock(aec_id, run_id).await;
                return Err(e.into());
            }
        }

        if let Err(source) = self.runner.begin_run(run_id, aec_id).await {
            error!(error = %source, "step runner refused the run");
            self.release_lock(aec_id, run_id).await;
            return Err(CoordinatorError::Dispatch { run_id, source });
        }

        info!("generation started");
        Ok(RunHandle { aec_id, run_id })
    }

    /// Apply a findings-review decision to an AEC suspended for findings.
    #[instrument(skip(self))]
    pub async fn resume_findings(
        &self,
        aec_id: AecId,
        workspace_id: WorkspaceId,
        action: FindingsAction,
    ) -> Result<Ack, CoordinatorError> {
        let operation = match action {
            FindingsAction::Proceed => "proceed past findings",
            FindingsAction::Edit => "edit after findings",
            FindingsAction::Cancel => "cancel after findings",
        };
        self.resume(aec_id, workspace_id, SuspensionKind::Findings, operation, |aec| match action {
            FindingsAction::Proceed => {
                let run_id = aec.resume_generating()?;
                aec.advance_step(Some("findings accepted".to_owned()))?;
                Ok(Some(Continuation {
                    run_id,
                    checkpoint: SuspensionKind::Findings.checkpoint(),
                    payload: json!({ "action": "proceed" }),
                }))
            }
            FindingsAction::Edit => {
                aec.revert_to_draft()?;
                Ok(None)
            }
            FindingsAction::Cancel => {
                aec.mark_as_failed("user cancelled")?;
                Ok(None)
            }
        })
        .await
    }

    /// Merge answers into an AEC suspended for questions and continue.
    #[instrument(skip(self, answers), fields(answers = answers.len()))]
    pub async fn submit_answers(
        &self,
        aec_id: AecId,
        workspace_id: WorkspaceId,
        answers: QuestionAnswers,
    ) -> Result<Ack, CoordinatorError> {
        let payload = serde_json::to_value(&answers).map_err(PortsError::from)?;
        self.resume(aec_id, workspace_id, SuspensionKind::Questions, "submit answers", |aec| {
            aec.set_question_answers(answers)?;
            let run_id = aec.resume_generating()?;
            aec.advance_step(Some("questions answered".to_owned()))?;
            Ok(Some(Continuation {
                run_id,
                checkpoint: SuspensionKind::Questions.checkpoint(),
                payload: json!({ "answers": payload }),
            }))
        })
        .await
    }

    /// Continue an AEC suspended for questions without answering them.
    #[instrument(skip(self))]
    pub async fn skip_questions(&self, aec_id: AecId, workspace_id: WorkspaceId) -> Result<Ack, CoordinatorError> {
        self.resume(aec_id, workspace_id, SuspensionKind::Questions, "skip questions", |aec| {
            let run_id = aec.resume_generating()?;
            aec.advance_step(Some("questions skipped".to_owned()))?;
            Ok(Some(Continuation {
                run_id,
                checkpoint: SuspensionKind::Questions.checkpoint(),
                payload: json!({ "skipped": true }),
            }))
        })
        .await
    }

    /// Hand a ready AEC off as done.
    #[instrument(skip(self))]
    pub async fn mark_done(&self, aec_id: AecId, workspace_id: WorkspaceId) -> Result<Ack, CoordinatorError> {
        let mut aec = self.get(aec_id, workspace_id).await?;
        aec.mark_done()?;
        match self.repo.save(&aec).await {
            Ok(_) => Ok(Ack {
                aec_id,
                status: aec.status(),
            }),
            Err(e) if e.is_conflict() => {
                let current = self.get(aec_id, workspace_id).await?;
                if current.status() == AecStatus::Ready {
                    Err(CoordinatorError::VersionConflict(aec_id))
                } else {
                    Err(invalid("mark done", current.status()))
                }
            }
            Err(e) => Err(e.into()),
        }
    }

    // ── run-side operations ────────────────────────────────────────────────

    /// Complete the in-progress step and start the next one.
    ///
    /// Returns the new current step, or `None` when every step is complete.
    pub async fn advance_step(
        &self,
        aec_id: AecId,
        run_id: RunId,
        detail: Option<String>,
    ) -> Result<Option<String>, CoordinatorError> {
        let mut aec = self.load_owned(aec_id, run_id).await?;
        let next = aec.advance_step(detail)?;
        self.save_owned(&aec, run_id).await?;
        debug!(%aec_id, %run_id, next = ?next, "step advanced");
        Ok(next)
    }

    /// Park the run for human input.
    pub async fn suspend_run(&self, aec_id: AecId, run_id: RunId, kind: SuspensionKind) -> Result<(), CoordinatorError> {
        let mut aec = self.load_owned(aec_id, run_id).await?;
        aec.suspend(kind)?;
        self.save_owned(&aec, run_id).await?;
        info!(%aec_id, %run_id, %kind, "run suspended");
        Ok(())
    }

    /// Fail the run and the AEC.
    pub async fn fail_run(&self, aec_id: AecId, run_id: RunId, reason: &str) -> Result<(), CoordinatorError> {
        let mut aec = self.load_owned(aec_id, run_id).await?;
        aec.mark_as_failed(reason)?;
        self.save_owned(&aec, run_id).await?;
        warn!(%aec_id, %run_id, reason, "run failed");
        Ok(())
    }

    /// Finish the run; every step must be complete.
    pub async fn finalize_run(&self, aec_id: AecId, run_id: RunId) -> Result<(), CoordinatorError> {
        let mut aec = self.load_owned(aec_id, run_id).await?;
        let state = aec.generation_state();
        if !state.is_complete() {
            return Err(ContractError::IncompleteGeneration {
                remaining: state.remaining(),
            }
            .into());
        }
        aec.finalize()?;
        self.save_owned(&aec, run_id).await?;
        info!(%aec_id, %run_id, "generation finished, contract ready");
        Ok(())
    }

    /// Load an AEC without a workspace check. For run-side callers that
    /// only know the AEC id.
    pub async fn load(&self, aec_id: AecId) -> Result<Option<Aec>, CoordinatorError> {
        Ok(self.repo.find_by_id(aec_id).await?)
    }

    // ── internals ──────────────────────────────────────────────────────────

    /// Shared shape of every resume decision: validate the suspension kind
    /// against the persisted status, apply, save with the loaded version,
    /// then signal the runner.
    async fn resume<F>(
        &self,
        aec_id: AecId,
        workspace_id: WorkspaceId,
        kind: SuspensionKind,
        operation: &'static str,
        apply: F,
    ) -> Result<Ack, CoordinatorError>
    where
        F: FnOnce(&mut Aec) -> Result<Option<Continuation>, ContractError>,
    {
        let mut aec = self.get(aec_id, workspace_id).await?;
        if aec.status() != kind.status() {
            return Err(invalid(operation, aec.status()));
        }
        let continuation = apply(&mut aec)?;

        match self.repo.save(&aec).await {
            Ok(_) => {}
            Err(e) if e.is_conflict() => {
                // first writer wins; report what the winner left behind
                let current = self.get(aec_id, workspace_id).await?;
                return Err(if current.status() == kind.status() {
                    CoordinatorError::VersionConflict(aec_id)
                } else {
                    invalid(operation, current.status())
                });
            }
            Err(e) => return Err(e.into()),
        }
        info!(%aec_id, status = %aec.status(), operation, "resume decision applied");

        if let Some(Continuation {
            run_id,
            checkpoint,
            payload,
        }) = continuation
        {
            if let Err(source) = self.runner.resume_run(run_id, aec_id, checkpoint, payload).await {
                error!(%aec_id, %run_id, error = %source, "step runner refused the resumed run");
                self.release_lock(aec_id, run_id).await;
                return Err(CoordinatorError::Dispatch { run_id, source });
            }
        }

        Ok(Ack {
            aec_id,
            status: aec.status(),
        })
    }

    async fn explain_lost_execute(&self, aec_id: AecId) -> CoordinatorError {
        match self.repo.find_by_id(aec_id).await {
            Ok(None) => CoordinatorError::NotFound(aec_id),
            Ok(Some(current)) => match current.locked_by() {
                Some(holder) => CoordinatorError::Conflict { holder },
                None if current.status() != AecStatus::Draft => invalid("execute", current.status()),
                None => CoordinatorError::VersionConflict(aec_id),
            },
            Err(e) => e.into(),
        }
    }

    async fn load_owned(&self, aec_id: AecId, run_id: RunId) -> Result<Aec, CoordinatorError> {
        let aec = self
            .repo
            .find_by_id(aec_id)
            .await?
            .ok_or(CoordinatorError::NotFound(aec_id))?;
        if aec.owned_by_run(run_id) {
            Ok(aec)
        } else {
            Err(CoordinatorError::StaleRun { aec_id, run_id })
        }
    }

    async fn save_owned(&self, aec: &Aec, run_id: RunId) -> Result<(), CoordinatorError> {
        let aec_id = aec.id();
        match self.repo.save(aec).await {
            Ok(_) => Ok(()),
            Err(e) if e.is_conflict() => match self.load_owned(aec_id, run_id).await {
                Ok(_) => Err(CoordinatorError::VersionConflict(aec_id)),
                Err(e) => Err(e),
            },
            Err(e) => Err(e.into()),
        }
    }

    /// Best-effort `force_unlock` for a run whose start or resume failed
    /// after the lock was persisted. Only touches a lock `run_id` still
    /// holds. Failures are logged, never returned: the caller is already
    /// reporting the original error.
    async fn release_lock(&self, aec_id: AecId, run_id: RunId) {
        let mut aec = match self.repo.find_by_id(aec_id).await {
            Ok(Some(aec)) if aec.locked_by() == Some(run_id) => aec,
            Ok(_) => {
                debug!(%aec_id, %run_id, "lock not held by run, nothing to release");
                return;
            }
            Err(e) => {
                error!(%aec_id, %run_id, error = %e, "could not reload contract to release its lock");
                return;
            }
        };
        aec.force_unlock();
        match self.repo.save(&aec).await {
            Ok(_) => warn!(
                %aec_id,
                %run_id,
                status = %aec.status(),
                "run lock force-released; contract needs operator attention"
            ),
            Err(e) => error!(%aec_id, %run_id, error = %e, "failed to force-release run lock"),
        }
    }
}

fn invalid(operation: &'static str, status: AecStatus) -> CoordinatorError {
    CoordinatorError::InvalidState(ContractError::InvalidState { operation, status })
}
