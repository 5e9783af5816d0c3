use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use axum::response::Response;
use serde_json::Value;

use crate::workflows::hiring::aptitude::{
    Answer, AnswerOption, AptitudeTest, Question, QuestionKind, TestAttempt, TestSetup,
};
use crate::workflows::hiring::domain::{
    ActorId, CandidateId, JobId, RoundId, RoundKind, TestId,
};
use crate::workflows::hiring::ledger::ApplicationRecord;
use crate::workflows::hiring::pipeline::{Pipeline, RoundDraft};
use crate::workflows::hiring::progress::CandidateProgress;
use crate::workflows::hiring::repository::{
    ApplicationRepository, AptitudeRepository, JobRecord, JobRepository, NotificationDispatcher,
    NotificationError, NotificationKind, PipelineNotification, RepositoryError,
};
use crate::workflows::hiring::{InMemoryPipelineStore, PipelineConfig, PipelineService};

pub(super) type MemoryService =
    PipelineService<InMemoryPipelineStore, MemoryNotifier, InMemoryPipelineStore>;

pub(super) fn recruiter() -> ActorId {
    ActorId::new("recruiter-1")
}

pub(super) fn outsider() -> ActorId {
    ActorId::new("recruiter-2")
}

pub(super) fn candidate(name: &str) -> CandidateId {
    CandidateId::new(name)
}

pub(super) fn round(id: &str) -> RoundId {
    RoundId::new(id)
}

pub(super) fn build_service(
    config: PipelineConfig,
) -> (MemoryService, Arc<InMemoryPipelineStore>, Arc<MemoryNotifier>) {
    let store = Arc::new(InMemoryPipelineStore::default());
    let notifier = Arc::new(MemoryNotifier::default());
    let service = PipelineService::new(store.clone(), notifier.clone(), store.clone(), config);
    (service, store, notifier)
}

/// `[Aptitude(pass=60), Technical, HR]`.
pub(super) fn standard_rounds() -> Vec<RoundDraft> {
    vec![
        RoundDraft::aptitude("Aptitude", 60).with_id(round("apt")),
        RoundDraft::new("Technical", RoundKind::Technical).with_id(round("tech")),
        RoundDraft::new("HR", RoundKind::Hr).with_id(round("hr")),
    ]
}

fn multiple_choice(text: &str, points: u32) -> Question {
    Question {
        text: text.to_string(),
        kind: QuestionKind::MultipleChoice,
        options: vec![
            AnswerOption {
                text: "right".to_string(),
                is_correct: true,
            },
            AnswerOption {
                text: "wrong".to_string(),
                is_correct: false,
            },
        ],
        points,
    }
}

/// Four choice questions worth 50/25/15/10 points; option 0 is always correct.
pub(super) fn weighted_setup() -> TestSetup {
    TestSetup {
        questions: vec![
            multiple_choice("Q1", 50),
            multiple_choice("Q2", 25),
            multiple_choice("Q3", 15),
            multiple_choice("Q4", 10),
        ],
        passing_score_percent: 60,
        duration_minutes: 20,
    }
}

/// One choice question and one short answer, 50 points each.
pub(super) fn short_answer_setup() -> TestSetup {
    TestSetup {
        questions: vec![
            multiple_choice("Pick the right one", 50),
            Question {
                text: "Describe a hard bug you fixed".to_string(),
                kind: QuestionKind::ShortAnswer,
                options: Vec::new(),
                points: 50,
            },
        ],
        passing_score_percent: 60,
        duration_minutes: 20,
    }
}

/// Answers for the weighted setup, correct exactly on `correct`.
pub(super) fn answers_correct_on(correct: &[usize]) -> BTreeMap<usize, Answer> {
    (0..4)
        .map(|index| {
            let choice = if correct.contains(&index) { 0 } else { 1 };
            (index, Answer::Choice(choice))
        })
        .collect()
}

pub(super) struct Hiring {
    pub(super) job: JobId,
    pub(super) test: TestId,
}

/// Job with the standard rounds and the weighted aptitude test configured.
pub(super) fn seeded_job(service: &MemoryService, rounds: Vec<RoundDraft>) -> Hiring {
    seeded_job_with(service, rounds, weighted_setup())
}

pub(super) fn seeded_job_with(
    service: &MemoryService,
    rounds: Vec<RoundDraft>,
    setup: TestSetup,
) -> Hiring {
    let job = service
        .create_job(&recruiter(), "Backend Engineer")
        .expect("job created");
    let pipeline = service
        .define_pipeline(&recruiter(), &job.id, rounds)
        .expect("pipeline defined");
    let test = pipeline
        .first_aptitude()
        .and_then(|round| round.aptitude_test.clone())
        .expect("aptitude test provisioned");
    service
        .configure_test(&recruiter(), &test, setup)
        .expect("test configured");
    Hiring { job: job.id, test }
}

/// Apply, accept, and admit.
pub(super) fn admitted(
    service: &MemoryService,
    job: &JobId,
    who: &CandidateId,
) -> CandidateProgress {
    service.apply(job, who).expect("application submitted");
    service
        .screen_application(&recruiter(), job, who, true)
        .expect("application accepted");
    service
        .admit_candidate(&recruiter(), job, who)
        .expect("candidate admitted")
}

#[derive(Default)]
pub(super) struct MemoryNotifier {
    events: Mutex<Vec<PipelineNotification>>,
}

impl MemoryNotifier {
    pub(super) fn kinds(&self) -> Vec<NotificationKind> {
        self.events
            .lock()
            .expect("notifier mutex poisoned")
            .iter()
            .map(|event| event.kind)
            .collect()
    }

    pub(super) fn events(&self) -> Vec<PipelineNotification> {
        self.events.lock().expect("notifier mutex poisoned").clone()
    }
}

impl NotificationDispatcher for MemoryNotifier {
    fn dispatch(&self, notification: PipelineNotification) -> Result<(), NotificationError> {
        self.events
            .lock()
            .expect("notifier mutex poisoned")
            .push(notification);
        Ok(())
    }
}

pub(super) struct FailingNotifier;

impl NotificationDispatcher for FailingNotifier {
    fn dispatch(&self, _notification: PipelineNotification) -> Result<(), NotificationError> {
        Err(NotificationError::Transport("smtp relay offline".to_string()))
    }
}

type ReadHook = Box<dyn FnOnce() + Send>;

/// Delegates to an in-memory store but fails the next `failures` application writes.
/// A one-shot hook can run just before the next progress read to interleave other work.
pub(super) struct FlakyMirrorStore {
    pub(super) inner: Arc<InMemoryPipelineStore>,
    failures: AtomicUsize,
    before_progress_read: Mutex<Option<ReadHook>>,
}

impl FlakyMirrorStore {
    pub(super) fn new(inner: Arc<InMemoryPipelineStore>) -> Self {
        Self {
            inner,
            failures: AtomicUsize::new(0),
            before_progress_read: Mutex::new(None),
        }
    }

    pub(super) fn on_next_progress_read(&self, hook: impl FnOnce() + Send + 'static) {
        *self.before_progress_read.lock().expect("hook slot") = Some(Box::new(hook));
    }

    pub(super) fn fail_next(&self, failures: usize) {
        self.failures.store(failures, Ordering::SeqCst);
    }

    pub(super) fn remaining_failures(&self) -> usize {
        self.failures.load(Ordering::SeqCst)
    }
}

impl JobRepository for FlakyMirrorStore {
    fn insert_job(&self, job: JobRecord) -> Result<JobRecord, RepositoryError> {
        self.inner.insert_job(job)
    }

    fn fetch_job(&self, id: &JobId) -> Result<Option<JobRecord>, RepositoryError> {
        self.inner.fetch_job(id)
    }

    fn save_pipeline(&self, id: &JobId, pipeline: Pipeline) -> Result<(), RepositoryError> {
        self.inner.save_pipeline(id, pipeline)
    }

    fn delete_job(&self, id: &JobId) -> Result<(), RepositoryError> {
        self.inner.delete_job(id)
    }

    fn fetch_progress(
        &self,
        job: &JobId,
        candidate: &CandidateId,
    ) -> Result<Option<CandidateProgress>, RepositoryError> {
        let hook = self.before_progress_read.lock().expect("hook slot").take();
        if let Some(hook) = hook {
            hook();
        }
        self.inner.fetch_progress(job, candidate)
    }

    fn insert_progress(
        &self,
        job: &JobId,
        progress: CandidateProgress,
    ) -> Result<(), RepositoryError> {
        self.inner.insert_progress(job, progress)
    }

    fn save_progress(
        &self,
        job: &JobId,
        progress: CandidateProgress,
        expected_version: u64,
    ) -> Result<(), RepositoryError> {
        self.inner.save_progress(job, progress, expected_version)
    }

    fn remove_progress(
        &self,
        job: &JobId,
        candidate: &CandidateId,
    ) -> Result<(), RepositoryError> {
        self.inner.remove_progress(job, candidate)
    }
}

impl ApplicationRepository for FlakyMirrorStore {
    fn insert_application(
        &self,
        record: ApplicationRecord,
    ) -> Result<ApplicationRecord, RepositoryError> {
        self.inner.insert_application(record)
    }

    fn fetch_application(
        &self,
        job: &JobId,
        candidate: &CandidateId,
    ) -> Result<Option<ApplicationRecord>, RepositoryError> {
        self.inner.fetch_application(job, candidate)
    }

    fn save_application(&self, record: ApplicationRecord) -> Result<(), RepositoryError> {
        let failing = self
            .failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| left.checked_sub(1))
            .is_ok();
        if failing {
            return Err(RepositoryError::Unavailable(
                "application collection offline".to_string(),
            ));
        }
        self.inner.save_application(record)
    }

    fn delete_application(
        &self,
        job: &JobId,
        candidate: &CandidateId,
    ) -> Result<(), RepositoryError> {
        self.inner.delete_application(job, candidate)
    }

    fn applications_for_candidate(
        &self,
        candidate: &CandidateId,
    ) -> Result<Vec<ApplicationRecord>, RepositoryError> {
        self.inner.applications_for_candidate(candidate)
    }

    fn applications_for_job(&self, job: &JobId) -> Result<Vec<ApplicationRecord>, RepositoryError> {
        self.inner.applications_for_job(job)
    }
}

impl AptitudeRepository for FlakyMirrorStore {
    fn insert_test(&self, test: AptitudeTest) -> Result<AptitudeTest, RepositoryError> {
        self.inner.insert_test(test)
    }

    fn fetch_test(&self, id: &TestId) -> Result<Option<AptitudeTest>, RepositoryError> {
        self.inner.fetch_test(id)
    }

    fn test_for_round(
        &self,
        job: &JobId,
        round: &RoundId,
    ) -> Result<Option<AptitudeTest>, RepositoryError> {
        self.inner.test_for_round(job, round)
    }

    fn save_test(&self, test: AptitudeTest) -> Result<(), RepositoryError> {
        self.inner.save_test(test)
    }

    fn delete_test(&self, id: &TestId) -> Result<(), RepositoryError> {
        self.inner.delete_test(id)
    }

    fn tests_for_job(&self, job: &JobId) -> Result<Vec<AptitudeTest>, RepositoryError> {
        self.inner.tests_for_job(job)
    }

    fn upsert_attempt(&self, attempt: TestAttempt) -> Result<TestAttempt, RepositoryError> {
        self.inner.upsert_attempt(attempt)
    }

    fn fetch_attempt(
        &self,
        test: &TestId,
        candidate: &CandidateId,
    ) -> Result<Option<TestAttempt>, RepositoryError> {
        self.inner.fetch_attempt(test, candidate)
    }

    fn delete_attempt(
        &self,
        test: &TestId,
        candidate: &CandidateId,
    ) -> Result<(), RepositoryError> {
        self.inner.delete_attempt(test, candidate)
    }
}

pub(super) async fn read_json_body(response: Response) -> Value {
    let body = axum::body::to_bytes(response.into_body(), 64 * 1024)
        .await
        .expect("read body");
    serde_json::from_slice(&body).expect("json payload")
}
