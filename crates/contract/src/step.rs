//! Ordered generation progress.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ContractError;

/// Status of a single generation step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StepStatus {
    /// Not reached yet.
    Pending,
    /// The step the run is currently working on.
    InProgress,
    /// Finished successfully.
    Complete,
    /// Finished with an error.
    Failed,
}

impl std::fmt::Display for StepStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::InProgress => write!(f, "in-progress"),
            Self::Complete => write!(f, "complete"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

/// A named step of the generation workflow.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenerationStep {
    /// Step name, unique within a run.
    pub name: String,
    /// Current status.
    pub status: StepStatus,
    /// Free-text detail (summary on completion, reason on failure).
    #[serde(default)]
    pub detail: Option<String>,
    /// When the step became in-progress.
    #[serde(default)]
    pub started_at: Option<DateTime<Utc>>,
    /// When the step completed or failed.
    #[serde(default)]
    pub finished_at: Option<DateTime<Utc>>,
}

impl GenerationStep {
    /// Create a pending step.
    #[must_use]
    pub fn pending(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            status: StepStatus::Pending,
            detail: None,
            started_at: None,
            finished_at: None,
        }
    }

    fn start(&mut self) {
        self.status = StepStatus::InProgress;
        self.started_at = Some(Utc::now());
    }

    fn finish(&mut self, status: StepStatus, detail: Option<String>) {
        self.status = status;
        self.finished_at = Some(Utc::now());
        if detail.is_some() {
            self.detail = detail;
        }
    }
}

/// The ordered list of steps for the current run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GenerationState {
    steps: Vec<GenerationStep>,
}

impl GenerationState {
    /// Seed a fresh run: the first step in progress, the rest pending.
    #[must_use]
    pub fn seeded<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut steps: Vec<GenerationStep> = names.into_iter().map(GenerationStep::pending).collect();
        if let Some(first) = steps.first_mut() {
            first.start();
        }
        Self { steps }
    }

    /// Build a state from explicit steps.
    #[must_use]
    pub fn from_steps(steps: Vec<GenerationStep>) -> Self {
        Self { steps }
    }

    /// All steps in order.
    #[must_use]
    pub fn steps(&self) -> &[GenerationStep] {
        &self.steps
    }

    /// Look a step up by name.
    #[must_use]
    pub fn step(&self, name: &str) -> Option<&GenerationStep> {
        self.steps.iter().find(|s| s.name == name)
    }

    /// Number of steps.
    #[must_use]
    pub fn len(&self) -> usize {
        self.steps.len()
    }

    /// Returns `true` if there are no steps.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// The step currently in progress, if any.
    #[must_use]
    pub fn current(&self) -> Option<&GenerationStep> {
        self.steps
            .iter()
            .find(|s| s.status == StepStatus::InProgress)
    }

    /// Returns `true` once every step is complete.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        !self.steps.is_empty() && self.steps.iter().all(|s| s.status == StepStatus::Complete)
    }

    /// Number of steps not yet complete.
    #[must_use]
    pub fn remaining(&self) -> usize {
        self.steps
            .iter()
            .filter(|s| s.status != StepStatus::Complete)
            .count()
    }

    /// Complete the in-progress step and start the next pending one.
    ///
    /// Returns the name of the new current step, or `None` when the
    /// completed step was the last one.
    pub fn advance(&mut self, detail: Option<String>) -> Result<Option<&str>, ContractError> {
        let idx = self
            .steps
            .iter()
            .position(|s| s.status == StepStatus::InProgress)
            .ok_or(ContractError::NoStepInProgress)?;
        self.steps[idx].finish(StepStatus::Complete, detail);

        let next = self.steps[idx + 1..]
            .iter()
            .position(|s| s.status == StepStatus::Pending)
            .map(|offset| idx + 1 + offset);

        Ok(next.map(|n| {
            self.steps[n].start();
            self.steps[n].name.as_str()
        }))
    }

    /// Mark the in-progress step failed with a reason.
    pub fn fail_current(&mut self, reason: impl Into<String>) -> Result<(), ContractError> {
        let step = self
            .steps
            .iter_mut()
            .find(|s| s.status == StepStatus::InProgress)
            .ok_or(ContractError::NoStepInProgress)?;
        step.finish(StepStatus::Failed, Some(reason.into()));
        Ok(())
    }

    /// Reject `next` if it would move any completed step backwards.
    pub fn ensure_monotonic(&self, next: &Self) -> Result<(), ContractError> {
        for done in self.steps.iter().filter(|s| s.status == StepStatus::Complete) {
            let to = next
                .step(&done.name)
                .map_or(StepStatus::Pending, |s| s.status);
            if to != StepStatus::Complete {
                return Err(ContractError::StepRegression {
                    step: done.name.clone(),
                    to,
                });
            }
        }
        Ok(())
    }

    pub(crate) fn clear(&mut self) {
        self.steps.clear();
    }
}
