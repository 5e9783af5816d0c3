//! Recruitment pipelines: per-job round definitions, aptitude testing, the per-candidate progress
//! state machine, and the candidate-facing application mirror kept in step with it.
//!
//! `CandidateProgress` stored on the job is authoritative. `ApplicationRecord` is a projection
//! rebuilt from it after every committed transition and repaired on read when it falls behind.

pub mod aptitude;
pub mod config;
pub mod domain;
pub mod ledger;
mod locks;
pub mod memory;
pub mod pipeline;
pub mod progress;
pub mod repository;
pub mod router;
pub mod service;
pub mod views;

#[cfg(test)]
mod tests;

pub use aptitude::{
    Answer, AnswerOption, AptitudeTest, AttemptResult, CandidateTestView, Question, QuestionKind,
    ScoringPolicy, TestAttempt, TestSetup, TestSetupError,
};
pub use config::PipelineConfig;
pub use domain::{
    ActorId, ApplicationId, ApplicationStatus, AttemptId, CandidateId, FinalDecision, JobId,
    OverallStatus, RoundId, RoundKind, RoundState, TestId,
};
pub use ledger::{ApplicationRecord, ApplicationStatusView};
pub use memory::InMemoryPipelineStore;
pub use pipeline::{Pipeline, PipelineError, PipelineRound, RoundDraft};
pub use progress::{CandidateProgress, RoundOutcome, RoundStatusEntry, Transition, TransitionError};
pub use repository::{
    ApplicationRepository, AptitudeRepository, JobRecord, JobRepository, NotificationDispatcher,
    NotificationError, NotificationKind, OwnershipCheck, PipelineNotification, PipelineStore,
    RepositoryError,
};
pub use router::pipeline_router;
pub use service::{ErrorClass, PipelineService, PipelineServiceError};
pub use views::{CandidateProgressView, PipelineView, ReconcileReport};
