//! The AEC aggregate.

use aecflow_core::{AecId, RunId, WorkspaceId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::answer::QuestionAnswers;
use crate::error::ContractError;
use crate::status::AecStatus;
use crate::step::GenerationState;
use crate::transition::can_transition;

/// Why a run paused for human input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SuspensionKind {
    /// Repository findings await review.
    Findings,
    /// Clarification questions await answers.
    Questions,
}

impl SuspensionKind {
    /// The status an AEC parks in for this suspension.
    #[must_use]
    pub const fn status(self) -> AecStatus {
        match self {
            Self::Findings => AecStatus::SuspendedFindings,
            Self::Questions => AecStatus::SuspendedQuestions,
        }
    }

    /// Checkpoint name handed to the step runner on resume.
    #[must_use]
    pub const fn checkpoint(self) -> &'static str {
        match self {
            Self::Findings => "findings",
            Self::Questions => "questions",
        }
    }
}

impl std::fmt::Display for SuspensionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.checkpoint())
    }
}

/// An Agent Execution Contract and its generation lifecycle.
///
/// Every mutating method validates the lifecycle invariants up front and
/// returns a [`ContractError`] without touching the aggregate when a check
/// fails. In particular `locked_by` is set exactly while the status is
/// [`AecStatus::Generating`]; the only exception is [`Aec::force_unlock`].
///
/// `run_id` outlives the lock: a suspended contract keeps the identity of
/// the run that paused it so a resume can re-acquire the lock for the same
/// run and address it on the step runner.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Aec {
    id: AecId,
    workspace_id: WorkspaceId,
    prompt: String,
    status: AecStatus,
    #[serde(default)]
    locked_by: Option<RunId>,
    #[serde(default)]
    run_id: Option<RunId>,
    #[serde(default)]
    generation_state: GenerationState,
    #[serde(default)]
    question_answers: QuestionAnswers,
    #[serde(default)]
    failure_reason: Option<String>,
    #[serde(default)]
    version: u64,
    created_at: DateTime<Utc>,
    last_transitioned_at: DateTime<Utc>,
}

impl Aec {
    /// Create a new draft contract with a fresh id.
    #[must_use]
    pub fn new(workspace_id: WorkspaceId, prompt: impl Into<String>) -> Self {
        Self::with_id(AecId::v4(), workspace_id, prompt)
    }

    /// Create a new draft contract with a known id.
    #[must_use]
    pub fn with_id(id: AecId, workspace_id: WorkspaceId, prompt: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id,
            workspace_id,
            prompt: prompt.into(),
            status: AecStatus::Draft,
            locked_by: None,
            run_id: None,
            generation_state: GenerationState::default(),
            question_answers: QuestionAnswers::new(),
            failure_reason: None,
            version: 0,
            created_at: now,
            last_transitioned_at: now,
        }
    }

    // ── accessors ──────────────────────────────────────────────────────────

    /// Contract id.
    #[must_use]
    pub fn id(&self) -> AecId {
        self.id
    }

    /// Owning workspace.
    #[must_use]
    pub fn workspace_id(&self) -> WorkspaceId {
        self.workspace_id
    }

    /// The user prompt the contract is generated from.
    #[must_use]
    pub fn prompt(&self) -> &str {
        &self.prompt
    }

    /// Current lifecycle status.
    #[must_use]
    pub fn status(&self) -> AecStatus {
        self.status
    }

    /// The run holding the lock, if any.
    #[must_use]
    pub fn locked_by(&self) -> Option<RunId> {
        self.locked_by
    }

    /// The current or most recent run.
    #[must_use]
    pub fn run_id(&self) -> Option<RunId> {
        self.run_id
    }

    /// Step progress of the current run.
    #[must_use]
    pub fn generation_state(&self) -> &GenerationState {
        &self.generation_state
    }

    /// Answers accumulated across question rounds.
    #[must_use]
    pub fn question_answers(&self) -> &QuestionAnswers {
        &self.question_answers
    }

    /// Reason recorded by [`Aec::mark_as_failed`].
    #[must_use]
    pub fn failure_reason(&self) -> Option<&str> {
        self.failure_reason.as_deref()
    }

    /// Optimistic concurrency version of the last persisted copy.
    #[must_use]
    pub fn version(&self) -> u64 {
        self.version
    }

    /// Set by repository drivers after a successful save.
    pub fn set_version(&mut self, version: u64) {
        self.version = version;
    }

    /// When the contract was created.
    #[must_use]
    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// When the status last changed.
    #[must_use]
    pub fn last_transitioned_at(&self) -> DateTime<Utc> {
        self.last_transitioned_at
    }

    /// Returns `true` if the contract belongs to `workspace_id`.
    #[must_use]
    pub fn belongs_to(&self, workspace_id: WorkspaceId) -> bool {
        self.workspace_id == workspace_id
    }

    /// Returns `true` if `run_id` currently holds the lock.
    #[must_use]
    pub fn owned_by_run(&self, run_id: RunId) -> bool {
        self.status == AecStatus::Generating && self.locked_by == Some(run_id)
    }

    // ── lifecycle ──────────────────────────────────────────────────────────

    /// Acquire the lock for `run_id` and start generating.
    ///
    /// The lock check runs before the status check so a caller racing an
    /// active run learns who holds it.
    pub fn start_generating(&mut self, run_id: RunId) -> Result<(), ContractError> {
        if let Some(holder) = self.locked_by {
            return Err(ContractError::AlreadyLocked { holder });
        }
        self.ensure_status(&[AecStatus::Draft], "start generating")?;
        self.transition(AecStatus::Generating, "start generating")?;
        self.locked_by = Some(run_id);
        self.run_id = Some(run_id);
        self.failure_reason = None;
        Ok(())
    }

    /// Replace the step list of the running generation.
    ///
    /// Rejects any write that would reopen a completed step.
    pub fn update_generation_state(&mut self, next: GenerationState) -> Result<(), ContractError> {
        self.ensure_status(&[AecStatus::Generating], "update generation state")?;
        self.generation_state.ensure_monotonic(&next)?;
        self.generation_state = next;
        Ok(())
    }

    /// Complete the in-progress step and start the next pending one.
    ///
    /// Returns the new current step, or `None` once every step is complete.
    pub fn advance_step(&mut self, detail: Option<String>) -> Result<Option<String>, ContractError> {
        self.ensure_status(&[AecStatus::Generating], "advance step")?;
        let next = self.generation_state.advance(detail)?;
        Ok(next.map(str::to_owned))
    }

    /// Park the run for human input and release the lock.
    pub fn suspend(&mut self, kind: SuspensionKind) -> Result<(), ContractError> {
        let operation = match kind {
            SuspensionKind::Findings => "suspend for findings",
            SuspensionKind::Questions => "suspend for questions",
        };
        self.ensure_status(&[AecStatus::Generating], operation)?;
        self.transition(kind.status(), operation)?;
        self.locked_by = None;
        Ok(())
    }

    /// Park the run until findings are reviewed.
    pub fn suspend_for_findings(&mut self) -> Result<(), ContractError> {
        self.suspend(SuspensionKind::Findings)
    }

    /// Park the run until questions are answered.
    pub fn suspend_for_questions(&mut self) -> Result<(), ContractError> {
        self.suspend(SuspensionKind::Questions)
    }

    /// The kind of suspension the contract is parked in, if any.
    #[must_use]
    pub fn suspension(&self) -> Option<SuspensionKind> {
        match self.status {
            AecStatus::SuspendedFindings => Some(SuspensionKind::Findings),
            AecStatus::SuspendedQuestions => Some(SuspensionKind::Questions),
            _ => None,
        }
    }

    /// Return to generating and re-acquire the lock for the suspended run.
    pub fn resume_generating(&mut self) -> Result<RunId, ContractError> {
        self.ensure_status(
            &[AecStatus::SuspendedFindings, AecStatus::SuspendedQuestions],
            "resume generating",
        )?;
        let run_id = self.run_id.ok_or(ContractError::MissingRun)?;
        self.transition(AecStatus::Generating, "resume generating")?;
        self.locked_by = Some(run_id);
        Ok(run_id)
    }

    /// Abandon the run after findings review and go back to draft.
    pub fn revert_to_draft(&mut self) -> Result<(), ContractError> {
        self.ensure_status(&[AecStatus::SuspendedFindings], "revert to draft")?;
        self.transition(AecStatus::Draft, "revert to draft")?;
        self.locked_by = None;
        self.run_id = None;
        self.generation_state.clear();
        Ok(())
    }

    /// Fail the contract, recording `reason` on it and on the in-progress step.
    pub fn mark_as_failed(&mut self, reason: impl Into<String>) -> Result<(), ContractError> {
        let reason = reason.into();
        self.transition(AecStatus::Failed, "mark as failed")?;
        if self.generation_state.current().is_some() {
            self.generation_state.fail_current(reason.clone())?;
        }
        self.locked_by = None;
        self.failure_reason = Some(reason);
        Ok(())
    }

    /// Drop the lock without changing status.
    ///
    /// Crash recovery only: a `generating` contract without a lock needs an
    /// operator. Returns the run that held the lock.
    pub fn force_unlock(&mut self) -> Option<RunId> {
        self.locked_by.take()
    }

    /// Merge clarification answers into the accumulated set.
    pub fn set_question_answers(&mut self, answers: QuestionAnswers) -> Result<(), ContractError> {
        self.ensure_status(
            &[AecStatus::SuspendedQuestions, AecStatus::Generating],
            "set question answers",
        )?;
        self.question_answers.extend(answers);
        Ok(())
    }

    /// Finish generation: the contract is ready and unlocked.
    pub fn finalize(&mut self) -> Result<(), ContractError> {
        self.ensure_status(&[AecStatus::Generating], "finalize")?;
        self.transition(AecStatus::Ready, "finalize")?;
        self.locked_by = None;
        Ok(())
    }

    /// Hand a ready contract off as done.
    pub fn mark_done(&mut self) -> Result<(), ContractError> {
        self.transition(AecStatus::Done, "mark done")
    }

    fn ensure_status(&self, allowed: &[AecStatus], operation: &'static str) -> Result<(), ContractError> {
        if allowed.contains(&self.status) {
            Ok(())
        } else {
            Err(ContractError::InvalidState {
                operation,
                status: self.status,
            })
        }
    }

    fn transition(&mut self, to: AecStatus, operation: &'static str) -> Result<(), ContractError> {
        if !can_transition(self.status, to) {
            return Err(ContractError::InvalidState {
                operation,
                status: self.status,
            });
        }
        self.status = to;
        self.last_transitioned_at = Utc::now();
        Ok(())
    }
}
