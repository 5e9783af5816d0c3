use chrono::{DateTime, Utc};
use serde::Serialize;

use super::domain::{CandidateId, JobId, OverallStatus, RoundId, RoundKind, RoundState};
use super::ledger::ApplicationStatusView;
use super::pipeline::{Pipeline, PipelineRound};
use super::progress::CandidateProgress;

#[derive(Debug, Clone, Serialize)]
pub struct RoundSummary {
    pub round_id: RoundId,
    pub name: String,
    pub kind: RoundKind,
    pub order: u32,
}

impl From<&PipelineRound> for RoundSummary {
    fn from(round: &PipelineRound) -> Self {
        Self {
            round_id: round.id.clone(),
            name: round.name.clone(),
            kind: round.kind,
            order: round.order,
        }
    }
}

/// One pipeline round with the candidate's outcome; `status` is `None` for rounds not reached.
#[derive(Debug, Clone, Serialize)]
pub struct RoundProgressView {
    #[serde(flatten)]
    pub round: RoundSummary,
    pub status: Option<RoundState>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub score: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub feedback: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

/// Read model returned by `get_progress`.
#[derive(Debug, Clone, Serialize)]
pub struct CandidateProgressView {
    pub job_id: JobId,
    pub candidate_id: CandidateId,
    pub overall_status: OverallStatus,
    pub current_round: Option<RoundSummary>,
    pub rounds: Vec<RoundProgressView>,
    pub version: u64,
    pub last_updated: DateTime<Utc>,
    pub application: Option<ApplicationStatusView>,
    pub mirror_in_sync: bool,
}

impl CandidateProgressView {
    pub fn build(
        job_id: &JobId,
        pipeline: &Pipeline,
        progress: &CandidateProgress,
        application: Option<ApplicationStatusView>,
        mirror_in_sync: bool,
    ) -> Self {
        let rounds = pipeline
            .ordered()
            .into_iter()
            .map(|round| {
                let entry = progress.entry(&round.id);
                RoundProgressView {
                    round: RoundSummary::from(round),
                    status: entry.map(|entry| entry.status),
                    score: entry.and_then(|entry| entry.score),
                    feedback: entry.and_then(|entry| entry.feedback.clone()),
                    completed_at: entry.and_then(|entry| entry.completed_at),
                }
            })
            .collect();

        Self {
            job_id: job_id.clone(),
            candidate_id: progress.applicant.clone(),
            overall_status: progress.overall_status,
            current_round: progress
                .current_round_id
                .as_ref()
                .and_then(|round_id| pipeline.round(round_id))
                .map(RoundSummary::from),
            rounds,
            version: progress.version,
            last_updated: progress.last_updated,
            application,
            mirror_in_sync,
        }
    }
}

/// Recruiter pipeline view: rounds plus every candidate's position.
#[derive(Debug, Clone, Serialize)]
pub struct PipelineView {
    pub job_id: JobId,
    pub title: String,
    pub rounds: Vec<PipelineRound>,
    pub candidates: Vec<CandidateProgress>,
}

/// Outcome of a mirror reconciliation pass over one job.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReconcileReport {
    pub checked: usize,
    pub repaired: usize,
    pub failed: usize,
}
