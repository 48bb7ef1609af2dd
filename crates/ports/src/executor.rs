//! Step executor port: the content-generation logic for a single step.
//!
//! The coordinator never looks inside a step. It hands the executor a
//! [`StepContext`] and acts on the [`StepOutcome`] or [`StepError`].

use std::fmt::Display;
use std::future::Future;
use std::sync::Arc;

use aecflow_contract::{Aec, SuspensionKind};
use aecflow_resilience::{BreakerRegistry, CallError, CircuitOpen};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// The caller decision a resumed run continues with.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResumeSignal {
    /// Checkpoint the run paused at ("findings" or "questions").
    pub checkpoint: String,
    /// Decision payload, e.g. the submitted answers.
    pub payload: serde_json::Value,
}

/// Everything an executor sees while running one step.
#[derive(Debug, Clone)]
pub struct StepContext {
    /// Snapshot of the AEC taken right before the step.
    pub aec: Aec,
    /// Name of the step to execute.
    pub step: String,
    /// Set on the first step after a resume.
    pub resume: Option<ResumeSignal>,
    breakers: Arc<BreakerRegistry>,
}

impl StepContext {
    /// Build a context.
    #[must_use]
    pub fn new(aec: Aec, step: impl Into<String>, resume: Option<ResumeSignal>, breakers: Arc<BreakerRegistry>) -> Self {
        Self {
            aec,
            step: step.into(),
            resume,
            breakers,
        }
    }

    /// Breakers for third-party dependencies.
    #[must_use]
    pub fn breakers(&self) -> &BreakerRegistry {
        &self.breakers
    }

    /// Call a third-party dependency through its breaker.
    ///
    /// A rejection becomes [`StepError::Unavailable`] so the run is retried
    /// later; an upstream error fails the step.
    pub async fn guarded<T, E, F, Fut>(&self, dependency: &str, operation: F) -> Result<T, StepError>
    where
        E: Display,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let breaker = self.breakers.get(dependency);
        breaker.call(operation).await.map_err(|e| match e {
            CallError::CircuitOpen(open) => StepError::Unavailable(open),
            CallError::Upstream(e) => StepError::Failed(format!("{dependency}: {e}")),
        })
    }
}

/// What a step asks the coordinator to do next.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepOutcome {
    /// The step finished; move on.
    Complete {
        /// Summary recorded on the step.
        detail: Option<String>,
    },
    /// The step needs human input before the run can continue.
    Suspend(SuspensionKind),
}

impl StepOutcome {
    /// A completed step with a summary.
    pub fn complete(detail: impl Into<String>) -> Self {
        Self::Complete {
            detail: Some(detail.into()),
        }
    }
}

/// Why a step did not produce an outcome.
#[derive(Debug, Clone, thiserror::Error)]
pub enum StepError {
    /// The step failed; the run fails with this reason.
    #[error("step failed: {0}")]
    Failed(String),
    /// A guarded dependency is unavailable; retry the step later.
    #[error(transparent)]
    Unavailable(#[from] CircuitOpen),
}

/// Executes generation steps.
#[async_trait]
pub trait StepExecutor: Send + Sync {
    /// Run `ctx.step` for `ctx.aec`.
    async fn execute(&self, ctx: &StepContext) -> Result<StepOutcome, StepError>;
}
