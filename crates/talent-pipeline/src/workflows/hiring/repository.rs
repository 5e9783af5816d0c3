use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::aptitude::{AptitudeTest, TestAttempt};
use super::domain::{ActorId, CandidateId, JobId, RoundId, TestId};
use super::ledger::ApplicationRecord;
use super::pipeline::Pipeline;
use super::progress::CandidateProgress;

/// Job document: pipeline definition plus the embedded per-candidate progress entries.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobRecord {
    pub id: JobId,
    pub owner: ActorId,
    pub title: String,
    pub pipeline: Pipeline,
    pub candidate_progress: BTreeMap<CandidateId, CandidateProgress>,
    pub created_at: DateTime<Utc>,
}

impl JobRecord {
    pub fn new(id: JobId, owner: ActorId, title: String, now: DateTime<Utc>) -> Self {
        Self {
            id,
            owner,
            title,
            pipeline: Pipeline::default(),
            candidate_progress: BTreeMap::new(),
            created_at: now,
        }
    }
}

/// Job storage. Progress entries are addressed individually so writers for different
/// candidates of the same job never overwrite each other.
pub trait JobRepository: Send + Sync {
    fn insert_job(&self, job: JobRecord) -> Result<JobRecord, RepositoryError>;
    fn fetch_job(&self, id: &JobId) -> Result<Option<JobRecord>, RepositoryError>;
    fn save_pipeline(&self, id: &JobId, pipeline: Pipeline) -> Result<(), RepositoryError>;
    fn delete_job(&self, id: &JobId) -> Result<(), RepositoryError>;

    fn fetch_progress(
        &self,
        job: &JobId,
        candidate: &CandidateId,
    ) -> Result<Option<CandidateProgress>, RepositoryError>;
    fn insert_progress(
        &self,
        job: &JobId,
        progress: CandidateProgress,
    ) -> Result<(), RepositoryError>;
    /// Compare-and-swap on [`CandidateProgress::version`].
    fn save_progress(
        &self,
        job: &JobId,
        progress: CandidateProgress,
        expected_version: u64,
    ) -> Result<(), RepositoryError>;
    fn remove_progress(&self, job: &JobId, candidate: &CandidateId)
        -> Result<(), RepositoryError>;
}

/// Candidate-facing application storage, keyed by (job, candidate).
pub trait ApplicationRepository: Send + Sync {
    fn insert_application(
        &self,
        record: ApplicationRecord,
    ) -> Result<ApplicationRecord, RepositoryError>;
    fn fetch_application(
        &self,
        job: &JobId,
        candidate: &CandidateId,
    ) -> Result<Option<ApplicationRecord>, RepositoryError>;
    fn save_application(&self, record: ApplicationRecord) -> Result<(), RepositoryError>;
    fn delete_application(&self, job: &JobId, candidate: &CandidateId)
        -> Result<(), RepositoryError>;
    fn applications_for_candidate(
        &self,
        candidate: &CandidateId,
    ) -> Result<Vec<ApplicationRecord>, RepositoryError>;
    fn applications_for_job(&self, job: &JobId) -> Result<Vec<ApplicationRecord>, RepositoryError>;
}

/// Aptitude tests and their attempts.
pub trait AptitudeRepository: Send + Sync {
    /// Fails with `Conflict` when the (job, round) pair already has a test.
    fn insert_test(&self, test: AptitudeTest) -> Result<AptitudeTest, RepositoryError>;
    fn fetch_test(&self, id: &TestId) -> Result<Option<AptitudeTest>, RepositoryError>;
    fn test_for_round(
        &self,
        job: &JobId,
        round: &RoundId,
    ) -> Result<Option<AptitudeTest>, RepositoryError>;
    fn save_test(&self, test: AptitudeTest) -> Result<(), RepositoryError>;
    /// Removes the test together with its attempts.
    fn delete_test(&self, id: &TestId) -> Result<(), RepositoryError>;
    fn tests_for_job(&self, job: &JobId) -> Result<Vec<AptitudeTest>, RepositoryError>;

    /// Insert or overwrite the single attempt of (test, candidate).
    fn upsert_attempt(&self, attempt: TestAttempt) -> Result<TestAttempt, RepositoryError>;
    fn fetch_attempt(
        &self,
        test: &TestId,
        candidate: &CandidateId,
    ) -> Result<Option<TestAttempt>, RepositoryError>;
    fn delete_attempt(&self, test: &TestId, candidate: &CandidateId)
        -> Result<(), RepositoryError>;
}

/// Everything the pipeline service persists.
pub trait PipelineStore: JobRepository + ApplicationRepository + AptitudeRepository {}

impl<T> PipelineStore for T where T: JobRepository + ApplicationRepository + AptitudeRepository {}

/// Error enumeration for repository failures.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RepositoryError {
    #[error("record already exists")]
    Conflict,
    #[error("record not found")]
    NotFound,
    #[error("version conflict (expected {expected}, found {found})")]
    VersionConflict { expected: u64, found: u64 },
    #[error("repository unavailable: {0}")]
    Unavailable(String),
}

/// External identity collaborator answering "does this actor own this job".
pub trait OwnershipCheck: Send + Sync {
    fn owns_job(&self, actor: &ActorId, job: &JobId) -> Result<bool, RepositoryError>;
}

/// Outbound hook for candidate/recruiter notifications (e-mail adapters and the like).
pub trait NotificationDispatcher: Send + Sync {
    fn dispatch(&self, notification: PipelineNotification) -> Result<(), NotificationError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    Admitted,
    RoundAdvanced,
    RoundUpdated,
    AwaitingDecision,
    Hired,
    Rejected,
}

impl NotificationKind {
    pub const fn template(self) -> &'static str {
        match self {
            Self::Admitted => "pipeline_admitted",
            Self::RoundAdvanced => "pipeline_round_advanced",
            Self::RoundUpdated => "pipeline_round_updated",
            Self::AwaitingDecision => "pipeline_awaiting_decision",
            Self::Hired => "pipeline_hired",
            Self::Rejected => "pipeline_rejected",
        }
    }
}

/// Payload published after a transition has been committed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineNotification {
    pub kind: NotificationKind,
    pub job_id: JobId,
    pub candidate_id: CandidateId,
    pub details: BTreeMap<String, String>,
}

#[derive(Debug, thiserror::Error)]
pub enum NotificationError {
    #[error("notification transport unavailable: {0}")]
    Transport(String),
}
