//! Queue consumer that drives runs step by step.

use std::sync::Arc;

use aecflow_core::{AecId, RunId};
use aecflow_contract::SuspensionKind;
use aecflow_ports::{
    QueuedTask, ResumeSignal, StepContext, StepError, StepExecutor, StepOutcome, TaskQueue,
};
use aecflow_resilience::{BreakerRegistry, CircuitOpen};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info, warn};

use crate::config::WorkerConfig;
use crate::coordinator::GenerationCoordinator;
use crate::dispatch::{QueueStepRunner, RunCommand, RunTask};
use crate::error::CoordinatorError;

/// How far one command got.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    /// Every step completed; the AEC is ready.
    Finished,
    /// A step asked for human input.
    Suspended(SuspensionKind),
    /// The run failed, either in a step or because its command was given up on.
    Failed(String),
    /// An open circuit deferred the current step; the command will be
    /// re-enqueued after its backoff.
    Deferred {
        /// The attempt number of the re-enqueued command.
        attempt: u32,
    },
    /// The run no longer owns the AEC (cancelled, edited or superseded).
    Dropped,
}

/// Stops [`RunWorker::drive`] and says why.
enum Halt {
    Done(RunOutcome),
    Unavailable(CircuitOpen, Option<ResumeSignal>),
}

/// Dequeues [`RunTask`]s and executes their steps.
///
/// Before each step the worker reloads the AEC and stops if the run lost
/// the lock, which is how cancellation reaches a running run.
///
/// A step stalled on an open circuit is acked at once and re-enqueued from
/// a tracked background task after its backoff, so the loop keeps serving
/// other runs meanwhile. Once the worker stops, pending deferrals are
/// re-enqueued immediately instead of waiting out their backoff.
pub struct RunWorker {
    coordinator: Arc<GenerationCoordinator>,
    queue: Arc<dyn TaskQueue>,
    requeue: QueueStepRunner,
    executor: Arc<dyn StepExecutor>,
    breakers: Arc<BreakerRegistry>,
    config: WorkerConfig,
    deferrals: TaskTracker,
    stop: CancellationToken,
}

impl std::fmt::Debug for RunWorker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RunWorker")
            .field("config", &self.config)
            .field("pending_deferrals", &self.deferrals.len())
            .finish_non_exhaustive()
    }
}

impl RunWorker {
    /// Create a worker consuming `queue`.
    pub fn new(
        coordinator: Arc<GenerationCoordinator>,
        queue: Arc<dyn TaskQueue>,
        executor: Arc<dyn StepExecutor>,
        breakers: Arc<BreakerRegistry>,
        config: WorkerConfig,
    ) -> Self {
        Self {
            coordinator,
            requeue: QueueStepRunner::new(Arc::clone(&queue)),
            queue,
            executor,
            breakers,
            config,
            deferrals: TaskTracker::new(),
            stop: CancellationToken::new(),
        }
    }

    /// Process commands until `shutdown` fires, then [`stop`](Self::stop).
    ///
    /// `shutdown` is only checked between commands: a command that was
    /// dequeued is always processed and settled on the queue.
    pub async fn run(&self, shutdown: CancellationToken) {
        info!("run worker started");
        while !shutdown.is_cancelled() {
            if let Err(e) = self.run_once().await {
                error!(error = %e, "run worker could not reach the queue");
                tokio::select! {
                    () = shutdown.cancelled() => {}
                    () = tokio::time::sleep(self.config.poll_interval()) => {}
                }
            }
        }
        self.stop().await;
        info!("run worker stopped");
    }

    /// Re-enqueue every pending deferral now and wait until they are queued.
    ///
    /// Deferrals scheduled after this point skip their backoff.
    pub async fn stop(&self) {
        self.stop.cancel();
        self.deferrals.close();
        self.deferrals.wait().await;
        self.deferrals.reopen();
    }

    /// Deferred commands still waiting out their backoff.
    pub fn pending_deferrals(&self) -> usize {
        self.deferrals.len()
    }

    /// Process commands until the queue stays empty for one poll interval
    /// and no deferral is pending.
    ///
    /// Returns the outcome of every processed command in order.
    pub async fn drain(&self) -> Result<Vec<RunOutcome>, CoordinatorError> {
        let mut outcomes = Vec::new();
        loop {
            match self.run_once().await? {
                Some(outcome) => outcomes.push(outcome),
                None => {
                    if self.deferrals.is_empty() && self.queue.is_empty().await? {
                        break;
                    }
                }
            }
        }
        Ok(outcomes)
    }

    /// Wait one poll interval for a command and process it.
    ///
    /// `Ok(None)` means nothing arrived. Errors are queue failures only;
    /// failures while driving a run are logged and settled on the queue.
    pub async fn run_once(&self) -> Result<Option<RunOutcome>, CoordinatorError> {
        let Some(queued) = self.queue.dequeue(self.config.poll_interval()).await? else {
            return Ok(None);
        };
        let task: RunTask = match serde_json::from_value(queued.payload.clone()) {
            Ok(task) => task,
            Err(e) => {
                error!(task_id = %queued.id, error = %e, "dropping undecodable run command");
                self.queue.ack(&queued.id).await?;
                return Ok(Some(RunOutcome::Dropped));
            }
        };
        self.process(&queued, task).await.map(Some)
    }

    async fn process(&self, queued: &QueuedTask, task: RunTask) -> Result<RunOutcome, CoordinatorError> {
        let run_id = task.command.run_id();
        let aec_id = task.command.aec_id();

        let outcome = match self.drive(aec_id, run_id, task.command.resume_signal()).await {
            Ok(Halt::Done(outcome)) => outcome,
            Ok(Halt::Unavailable(open, signal)) => self.defer(&task, &open, signal).await,
            Err(CoordinatorError::StaleRun { .. }) => {
                info!(%aec_id, %run_id, "run lost its lock mid-step, dropping");
                RunOutcome::Dropped
            }
            Err(CoordinatorError::NotFound(_)) => {
                warn!(%aec_id, %run_id, "contract vanished mid-step, dropping");
                RunOutcome::Dropped
            }
            Err(e) if e.is_retryable() && queued.deliveries < self.config.max_deliveries => {
                warn!(%aec_id, %run_id, error = %e, deliveries = queued.deliveries, "retrying run command");
                self.queue.nack(&queued.id).await?;
                return Ok(RunOutcome::Deferred {
                    attempt: task.attempt,
                });
            }
            Err(e) => self.abandon(aec_id, run_id, &e).await,
        };
        self.queue.ack(&queued.id).await?;
        Ok(outcome)
    }

    /// Fail a run whose command is being given up on, so the AEC does not
    /// stay locked by a run nothing drives.
    async fn abandon(&self, aec_id: AecId, run_id: RunId, cause: &CoordinatorError) -> RunOutcome {
        warn!(%aec_id, %run_id, error = %cause, "giving up on run command");
        let reason = format!("run abandoned: {cause}");
        match self.coordinator.fail_run(aec_id, run_id, &reason).await {
            Ok(()) => RunOutcome::Failed(reason),
            Err(CoordinatorError::StaleRun { .. }) => RunOutcome::Dropped,
            Err(e) => {
                error!(%aec_id, %run_id, error = %e, cause = %cause, "could not fail abandoned run");
                RunOutcome::Dropped
            }
        }
    }

    /// Execute steps until the run suspends, fails, finishes or stalls on
    /// an open circuit.
    async fn drive(
        &self,
        aec_id: AecId,
        run_id: RunId,
        mut signal: Option<ResumeSignal>,
    ) -> Result<Halt, CoordinatorError> {
        loop {
            let Some(aec) = self.coordinator.load(aec_id).await? else {
                warn!(%aec_id, %run_id, "contract vanished, dropping run");
                return Ok(Halt::Done(RunOutcome::Dropped));
            };
            if !aec.owned_by_run(run_id) {
                info!(%aec_id, %run_id, status = %aec.status(), "run no longer owns contract, dropping");
                return Ok(Halt::Done(RunOutcome::Dropped));
            }

            let Some(step) = aec.generation_state().current().map(|s| s.name.clone()) else {
                if aec.generation_state().is_complete() {
                    self.coordinator.finalize_run(aec_id, run_id).await?;
                    return Ok(Halt::Done(RunOutcome::Finished));
                }
                let reason = "no step in progress";
                self.coordinator.fail_run(aec_id, run_id, reason).await?;
                return Ok(Halt::Done(RunOutcome::Failed(reason.to_owned())));
            };

            let ctx = StepContext::new(aec, step.as_str(), signal.take(), Arc::clone(&self.breakers));
            debug!(%aec_id, %run_id, step = %step, resumed = ctx.resume.is_some(), "executing step");
            match self.executor.execute(&ctx).await {
                Ok(StepOutcome::Complete { detail }) => {
                    if self.coordinator.advance_step(aec_id, run_id, detail).await?.is_none() {
                        self.coordinator.finalize_run(aec_id, run_id).await?;
                        return Ok(Halt::Done(RunOutcome::Finished));
                    }
                }
                Ok(StepOutcome::Suspend(kind)) => {
                    self.coordinator.suspend_run(aec_id, run_id, kind).await?;
                    return Ok(Halt::Done(RunOutcome::Suspended(kind)));
                }
                Err(StepError::Failed(reason)) => {
                    self.coordinator.fail_run(aec_id, run_id, &reason).await?;
                    return Ok(Halt::Done(RunOutcome::Failed(reason)));
                }
                Err(StepError::Unavailable(open)) => {
                    return Ok(Halt::Unavailable(open, ctx.resume));
                }
            }
        }
    }

    /// Schedule a re-enqueue of a step stalled on an open circuit, or fail
    /// the run once the retry allowance is spent.
    async fn defer(&self, task: &RunTask, open: &CircuitOpen, signal: Option<ResumeSignal>) -> RunOutcome {
        let run_id = task.command.run_id();
        let aec_id = task.command.aec_id();

        if task.attempt >= self.config.max_unavailable_retries {
            let reason = format!("dependency unavailable: {open}");
            return match self.coordinator.fail_run(aec_id, run_id, &reason).await {
                Ok(()) => RunOutcome::Failed(reason),
                Err(e) => {
                    error!(%aec_id, %run_id, error = %e, "could not fail stalled run");
                    RunOutcome::Dropped
                }
            };
        }

        let delay = self.config.unavailable_backoff(open.retry_after);
        let retry = RunTask {
            command: RunCommand::with_signal(run_id, aec_id, signal),
            attempt: task.attempt + 1,
        };
        warn!(
            %aec_id,
            %run_id,
            dependency = %open.dependency,
            delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
            attempt = retry.attempt,
            "step deferred by open circuit"
        );

        let attempt = retry.attempt;
        let requeue = self.requeue.clone();
        let coordinator = Arc::clone(&self.coordinator);
        let stop = self.stop.clone();
        self.deferrals.spawn(async move {
            tokio::select! {
                () = tokio::time::sleep(delay) => {}
                () = stop.cancelled() => debug!(%aec_id, %run_id, "worker stopping, re-enqueueing deferred run now"),
            }
            if let Err(e) = requeue.submit(&retry).await {
                error!(%aec_id, %run_id, error = %e, "could not re-enqueue deferred run");
                let reason = format!("deferred run lost: {e}");
                if let Err(e) = coordinator.fail_run(aec_id, run_id, &reason).await {
                    error!(%aec_id, %run_id, error = %e, "could not fail lost run");
                }
            }
        });
        RunOutcome::Deferred { attempt }
    }
}
