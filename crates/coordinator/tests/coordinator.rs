//! Caller operations against the in-memory repository.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use aecflow_contract::{Aec, AecStatus, Answer, QuestionAnswers, StepStatus, SuspensionKind};
use aecflow_coordinator::{
    CoordinatorError, ErrorKind, FindingsAction, GenerationCoordinator, RunHandle, DEFAULT_STEPS,
};
use aecflow_core::{AecId, RunId, WorkspaceId};
use aecflow_ports::{AecRepo, PortsError, StepRunner};
use aecflow_repo_memory::MemoryAecRepo;
use async_trait::async_trait;
use pretty_assertions::assert_eq;
use serde_json::json;

#[derive(Debug, Clone, PartialEq)]
enum Dispatched {
    Begin(RunId),
    Resume {
        run_id: RunId,
        checkpoint: String,
        payload: serde_json::Value,
    },
}

/// Records hand-offs instead of running anything.
#[derive(Default)]
struct RecordingRunner {
    calls: Mutex<Vec<Dispatched>>,
    refuse: AtomicBool,
}

impl RecordingRunner {
    fn calls(&self) -> Vec<Dispatched> {
        self.calls.lock().unwrap().clone()
    }

    fn refuse(&self, refuse: bool) {
        self.refuse.store(refuse, Ordering::SeqCst);
    }

    fn check(&self) -> Result<(), PortsError> {
        if self.refuse.load(Ordering::SeqCst) {
            Err(PortsError::Connection("runner offline".into()))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl StepRunner for RecordingRunner {
    async fn begin_run(&self, run_id: RunId, _aec_id: AecId) -> Result<(), PortsError> {
        self.check()?;
        self.calls.lock().unwrap().push(Dispatched::Begin(run_id));
        Ok(())
    }

    async fn resume_run(
        &self,
        run_id: RunId,
        _aec_id: AecId,
        checkpoint: &str,
        payload: serde_json::Value,
    ) -> Result<(), PortsError> {
        self.check()?;
        self.calls.lock().unwrap().push(Dispatched::Resume {
            run_id,
            checkpoint: checkpoint.to_owned(),
            payload,
        });
        Ok(())
    }
}

struct Harness {
    repo: Arc<MemoryAecRepo>,
    runner: Arc<RecordingRunner>,
    coordinator: Arc<GenerationCoordinator>,
    workspace: WorkspaceId,
}

impl Harness {
    fn new() -> Self {
        let repo = Arc::new(MemoryAecRepo::new());
        let runner = Arc::new(RecordingRunner::default());
        let steps = DEFAULT_STEPS.iter().map(|s| (*s).to_owned()).collect();
        let coordinator = Arc::new(GenerationCoordinator::new(repo.clone(), runner.clone(), steps));
        Self {
            repo,
            runner,
            coordinator,
            workspace: WorkspaceId::v4(),
        }
    }

    async fn draft(&self) -> AecId {
        let aec = Aec::new(self.workspace, "add rate limiting to the public API");
        self.repo.save(&aec).await.unwrap();
        aec.id()
    }

    async fn get(&self, aec_id: AecId) -> Aec {
        self.coordinator.get(aec_id, self.workspace).await.unwrap()
    }

    /// Execute, advance `steps` times as the run, then suspend.
    async fn suspended(&self, steps: usize, kind: SuspensionKind) -> (AecId, RunHandle) {
        let aec_id = self.draft().await;
        let handle = self.coordinator.execute(aec_id, self.workspace).await.unwrap();
        for _ in 0..steps {
            self.coordinator
                .advance_step(aec_id, handle.run_id, None)
                .await
                .unwrap();
        }
        self.coordinator
            .suspend_run(aec_id, handle.run_id, kind)
            .await
            .unwrap();
        (aec_id, handle)
    }

    async fn at_findings(&self) -> (AecId, RunHandle) {
        self.suspended(2, SuspensionKind::Findings).await
    }

    async fn at_questions(&self) -> (AecId, RunHandle) {
        self.suspended(4, SuspensionKind::Questions).await
    }
}

fn statuses(aec: &Aec) -> Vec<StepStatus> {
    aec.generation_state().steps().iter().map(|s| s.status).collect()
}

fn answers(pairs: &[(&str, &str)]) -> QuestionAnswers {
    pairs
        .iter()
        .map(|(q, a)| ((*q).to_owned(), Answer::from(*a)))
        .collect()
}

#[tokio::test]
async fn execute_locks_and_seeds_steps() {
    let h = Harness::new();
    let aec_id = h.draft().await;

    let handle = h.coordinator.execute(aec_id, h.workspace).await.unwrap();

    let aec = h.get(aec_id).await;
    assert_eq!(aec.status(), AecStatus::Generating);
    assert_eq!(aec.locked_by(), Some(handle.run_id));
    assert_eq!(aec.run_id(), Some(handle.run_id));
    assert_eq!(
        statuses(&aec),
        vec![
            StepStatus::InProgress,
            StepStatus::Pending,
            StepStatus::Pending,
            StepStatus::Pending,
            StepStatus::Pending,
            StepStatus::Pending,
        ]
    );
    assert_eq!(h.runner.calls(), vec![Dispatched::Begin(handle.run_id)]);
}

#[tokio::test]
async fn execute_on_locked_contract_reports_holder() {
    let h = Harness::new();
    let aec_id = h.draft().await;
    let first = h.coordinator.execute(aec_id, h.workspace).await.unwrap();

    let err = h.coordinator.execute(aec_id, h.workspace).await.unwrap_err();

    assert!(matches!(err, CoordinatorError::Conflict { holder } if holder == first.run_id));
    assert_eq!(h.get(aec_id).await.locked_by(), Some(first.run_id));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_executes_have_one_winner() {
    let h = Harness::new();
    let aec_id = h.draft().await;

    let attempts = (0..8).map(|_| {
        let coordinator = Arc::clone(&h.coordinator);
        let workspace = h.workspace;
        tokio::spawn(async move { coordinator.execute(aec_id, workspace).await })
    });
    let results: Vec<_> = futures::future::join_all(attempts)
        .await
        .into_iter()
        .map(|joined| joined.unwrap())
        .collect();

    let winners: Vec<RunHandle> = results.iter().filter_map(|r| r.as_ref().ok().copied()).collect();
    assert_eq!(winners.len(), 1);
    let winner = winners[0].run_id;
    for result in &results {
        if let Err(err) = result {
            assert!(
                matches!(err, CoordinatorError::Conflict { holder } if *holder == winner),
                "unexpected error: {err}"
            );
        }
    }
    assert_eq!(h.get(aec_id).await.locked_by(), Some(winner));
    assert_eq!(h.runner.calls(), vec![Dispatched::Begin(winner)]);
}

#[tokio::test]
async fn execute_requires_draft() {
    let h = Harness::new();
    let (aec_id, _) = h.at_findings().await;

    let err = h.coordinator.execute(aec_id, h.workspace).await.unwrap_err();

    assert_eq!(err.kind(), ErrorKind::InvalidState);
}

#[tokio::test]
async fn other_workspace_sees_not_found() {
    let h = Harness::new();
    let draft = h.draft().await;
    let (findings, _) = h.at_findings().await;
    let (questions, _) = h.at_questions().await;
    let dispatched = h.runner.calls().len();
    let stranger = WorkspaceId::v4();

    let err = h.coordinator.execute(draft, stranger).await.unwrap_err();
    assert!(matches!(err, CoordinatorError::NotFound(id) if id == draft));

    for action in [FindingsAction::Proceed, FindingsAction::Edit, FindingsAction::Cancel] {
        let err = h
            .coordinator
            .resume_findings(findings, stranger, action)
            .await
            .unwrap_err();
        assert!(matches!(err, CoordinatorError::NotFound(id) if id == findings));
    }

    let err = h
        .coordinator
        .submit_answers(questions, stranger, answers(&[("q1", "postgres")]))
        .await
        .unwrap_err();
    assert!(matches!(err, CoordinatorError::NotFound(id) if id == questions));

    let err = h.coordinator.skip_questions(questions, stranger).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);

    let missing = h.coordinator.get(AecId::v4(), h.workspace).await.unwrap_err();
    assert_eq!(missing.kind(), ErrorKind::NotFound);

    assert_eq!(h.get(draft).await.status(), AecStatus::Draft);
    assert_eq!(h.get(findings).await.status(), AecStatus::SuspendedFindings);
    let questions = h.get(questions).await;
    assert_eq!(questions.status(), AecStatus::SuspendedQuestions);
    assert!(questions.question_answers().is_empty());
    assert_eq!(h.runner.calls().len(), dispatched);
}

#[tokio::test]
async fn refused_dispatch_releases_the_lock() {
    let h = Harness::new();
    let aec_id = h.draft().await;
    h.runner.refuse(true);

    let err = h.coordinator.execute(aec_id, h.workspace).await.unwrap_err();

    assert!(matches!(err, CoordinatorError::Dispatch { .. }));
    let aec = h.get(aec_id).await;
    assert_eq!(aec.locked_by(), None);
    assert_eq!(aec.status(), AecStatus::Generating);
}

#[tokio::test]
async fn suspension_releases_the_lock_and_keeps_the_run() {
    let h = Harness::new();
    let (aec_id, handle) = h.at_findings().await;

    let aec = h.get(aec_id).await;
    assert_eq!(aec.status(), AecStatus::SuspendedFindings);
    assert_eq!(aec.locked_by(), None);
    assert_eq!(aec.run_id(), Some(handle.run_id));
}

#[tokio::test]
async fn proceed_resumes_the_same_run() {
    let h = Harness::new();
    let (aec_id, handle) = h.at_findings().await;

    let ack = h
        .coordinator
        .resume_findings(aec_id, h.workspace, FindingsAction::Proceed)
        .await
        .unwrap();

    assert_eq!(ack.status, AecStatus::Generating);
    let aec = h.get(aec_id).await;
    assert_eq!(aec.locked_by(), Some(handle.run_id));
    let review = aec.generation_state().step("review-findings").unwrap();
    assert_eq!(review.status, StepStatus::Complete);
    assert_eq!(review.detail.as_deref(), Some("findings accepted"));
    assert_eq!(aec.generation_state().current().unwrap().name, "draft-spec");
    assert_eq!(
        h.runner.calls().last().cloned(),
        Some(Dispatched::Resume {
            run_id: handle.run_id,
            checkpoint: "findings".into(),
            payload: json!({"action": "proceed"}),
        })
    );
}

#[tokio::test]
async fn edit_returns_to_a_clean_draft() {
    let h = Harness::new();
    let (aec_id, _) = h.at_findings().await;
    let dispatched = h.runner.calls().len();

    let ack = h
        .coordinator
        .resume_findings(aec_id, h.workspace, FindingsAction::Edit)
        .await
        .unwrap();

    assert_eq!(ack.status, AecStatus::Draft);
    let aec = h.get(aec_id).await;
    assert!(aec.generation_state().is_empty());
    assert_eq!(aec.locked_by(), None);
    assert_eq!(aec.run_id(), None);
    assert_eq!(h.runner.calls().len(), dispatched);

    let again = h.coordinator.execute(aec_id, h.workspace).await.unwrap();
    assert_eq!(h.get(aec_id).await.locked_by(), Some(again.run_id));
}

#[tokio::test]
async fn cancel_fails_the_contract() {
    let h = Harness::new();
    let (aec_id, _) = h.at_findings().await;

    let ack = h
        .coordinator
        .resume_findings(aec_id, h.workspace, FindingsAction::Cancel)
        .await
        .unwrap();

    assert_eq!(ack.status, AecStatus::Failed);
    let aec = h.get(aec_id).await;
    assert_eq!(aec.failure_reason(), Some("user cancelled"));
    assert_eq!(aec.locked_by(), None);
    let review = aec.generation_state().step("review-findings").unwrap();
    assert_eq!(review.status, StepStatus::Failed);
}

#[tokio::test]
async fn findings_decisions_need_findings_suspension() {
    let h = Harness::new();
    let (aec_id, _) = h.at_questions().await;

    for action in [FindingsAction::Proceed, FindingsAction::Edit, FindingsAction::Cancel] {
        let err = h
            .coordinator
            .resume_findings(aec_id, h.workspace, action)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidState, "{action}");
    }
    assert_eq!(h.get(aec_id).await.status(), AecStatus::SuspendedQuestions);
}

#[tokio::test]
async fn answers_need_questions_suspension() {
    let h = Harness::new();
    let (aec_id, _) = h.at_findings().await;

    let err = h
        .coordinator
        .submit_answers(aec_id, h.workspace, answers(&[("q1", "yes")]))
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::InvalidState);
}

#[tokio::test]
async fn answers_merge_across_rounds() {
    let h = Harness::new();
    let (aec_id, handle) = h.at_questions().await;

    h.coordinator
        .submit_answers(aec_id, h.workspace, answers(&[("q1", "yes")]))
        .await
        .unwrap();
    // the run asks a second round on the final step
    h.coordinator
        .suspend_run(aec_id, handle.run_id, SuspensionKind::Questions)
        .await
        .unwrap();
    let ack = h
        .coordinator
        .submit_answers(aec_id, h.workspace, answers(&[("q2", "no")]))
        .await
        .unwrap();

    assert_eq!(ack.status, AecStatus::Generating);
    let aec = h.get(aec_id).await;
    assert_eq!(aec.question_answers(), &answers(&[("q1", "yes"), ("q2", "no")]));
    assert_eq!(aec.locked_by(), Some(handle.run_id));
    assert_eq!(
        h.runner.calls().last().cloned(),
        Some(Dispatched::Resume {
            run_id: handle.run_id,
            checkpoint: "questions".into(),
            payload: json!({"answers": {"q2": "no"}}),
        })
    );
}

#[tokio::test]
async fn skip_questions_continues_without_answers() {
    let h = Harness::new();
    let (aec_id, handle) = h.at_questions().await;

    let ack = h.coordinator.skip_questions(aec_id, h.workspace).await.unwrap();

    assert_eq!(ack.status, AecStatus::Generating);
    let aec = h.get(aec_id).await;
    assert!(aec.question_answers().is_empty());
    assert_eq!(aec.locked_by(), Some(handle.run_id));
    assert_eq!(aec.generation_state().current().unwrap().name, "finalize-spec");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn racing_resumes_apply_once() {
    let h = Harness::new();
    let (aec_id, _) = h.at_questions().await;

    let submit = {
        let coordinator = Arc::clone(&h.coordinator);
        let workspace = h.workspace;
        tokio::spawn(async move {
            coordinator
                .submit_answers(aec_id, workspace, answers(&[("q1", "yes")]))
                .await
        })
    };
    let skip = {
        let coordinator = Arc::clone(&h.coordinator);
        let workspace = h.workspace;
        tokio::spawn(async move { coordinator.skip_questions(aec_id, workspace).await })
    };
    let results = [submit.await.unwrap(), skip.await.unwrap()];

    assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
    let loser = results.iter().find_map(|r| r.as_ref().err()).unwrap();
    assert_eq!(loser.kind(), ErrorKind::InvalidState);

    let aec = h.get(aec_id).await;
    assert_eq!(aec.status(), AecStatus::Generating);
    let resumes = h
        .runner
        .calls()
        .into_iter()
        .filter(|c| matches!(c, Dispatched::Resume { .. }))
        .count();
    assert_eq!(resumes, 1);
}

#[tokio::test]
async fn refused_resume_releases_the_lock() {
    let h = Harness::new();
    let (aec_id, handle) = h.at_findings().await;
    h.runner.refuse(true);

    let err = h
        .coordinator
        .resume_findings(aec_id, h.workspace, FindingsAction::Proceed)
        .await
        .unwrap_err();

    assert!(matches!(err, CoordinatorError::Dispatch { run_id, .. } if run_id == handle.run_id));
    let aec = h.get(aec_id).await;
    assert_eq!(aec.status(), AecStatus::Generating);
    assert_eq!(aec.locked_by(), None);
}

#[tokio::test]
async fn stale_run_cannot_report_progress() {
    let h = Harness::new();
    let (aec_id, handle) = h.at_findings().await;
    h.coordinator
        .resume_findings(aec_id, h.workspace, FindingsAction::Edit)
        .await
        .unwrap();

    let err = h
        .coordinator
        .advance_step(aec_id, handle.run_id, None)
        .await
        .unwrap_err();
    assert!(matches!(err, CoordinatorError::StaleRun { run_id, .. } if run_id == handle.run_id));

    let err = h
        .coordinator
        .fail_run(aec_id, RunId::v4(), "late failure")
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::StaleRun);
    assert_eq!(h.get(aec_id).await.status(), AecStatus::Draft);
}

#[tokio::test]
async fn finalize_needs_every_step_complete() {
    let h = Harness::new();
    let aec_id = h.draft().await;
    let handle = h.coordinator.execute(aec_id, h.workspace).await.unwrap();

    let err = h
        .coordinator
        .finalize_run(aec_id, handle.run_id)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidState);

    let mut next = Some(String::new());
    while next.is_some() {
        next = h
            .coordinator
            .advance_step(aec_id, handle.run_id, Some("ok".into()))
            .await
            .unwrap();
    }
    h.coordinator.finalize_run(aec_id, handle.run_id).await.unwrap();

    let aec = h.get(aec_id).await;
    assert_eq!(aec.status(), AecStatus::Ready);
    assert_eq!(aec.locked_by(), None);

    let ack = h.coordinator.mark_done(aec_id, h.workspace).await.unwrap();
    assert_eq!(ack.status, AecStatus::Done);
    let err = h.coordinator.mark_done(aec_id, h.workspace).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidState);
}
