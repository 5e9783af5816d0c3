//! Candidate-facing projection of [`CandidateProgress`].
//!
//! The application record is never edited by business logic directly. It is rebuilt from the
//! authoritative progress entry through [`ApplicationRecord::project`], which is idempotent per
//! progress version so a retried synchronization only refreshes timestamps.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::domain::{
    ApplicationId, ApplicationProgress, ApplicationStatus, CandidateId, JobId, OverallStatus,
    RoundId,
};
use super::pipeline::Pipeline;
use super::progress::{CandidateProgress, RoundStatusEntry};

pub const HIRED_STAGE: &str = "Hired";
pub const REJECTED_STAGE: &str = "Rejected";
pub const AWAITING_DECISION_STAGE: &str = "Awaiting Final Decision";
pub const APPLIED_STAGE: &str = "Applied";
const UNKNOWN_ROUND_STAGE: &str = "In Progress";

/// Application-side status pair for an authoritative overall status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MirrorStatus {
    pub status: ApplicationStatus,
    pub overall_status: ApplicationProgress,
}

/// Translate the canonical status into the application taxonomy. `hired` has no counterpart in
/// `ApplicationStatus`, so it maps to `accepted` plus `ApplicationProgress::Hired`.
pub const fn mirror_status(overall: OverallStatus) -> MirrorStatus {
    match overall {
        OverallStatus::Applied => MirrorStatus {
            status: ApplicationStatus::Accepted,
            overall_status: ApplicationProgress::Applied,
        },
        OverallStatus::InProcess | OverallStatus::AwaitingFinalDecision => MirrorStatus {
            status: ApplicationStatus::Accepted,
            overall_status: ApplicationProgress::InProgress,
        },
        OverallStatus::Hired => MirrorStatus {
            status: ApplicationStatus::Accepted,
            overall_status: ApplicationProgress::Hired,
        },
        OverallStatus::Rejected => MirrorStatus {
            status: ApplicationStatus::Rejected,
            overall_status: ApplicationProgress::Rejected,
        },
    }
}

/// Human label shown to the candidate for the current position in the pipeline.
pub fn stage_label(progress: &CandidateProgress, pipeline: &Pipeline) -> String {
    match progress.overall_status {
        OverallStatus::Hired => HIRED_STAGE.to_string(),
        OverallStatus::Rejected => REJECTED_STAGE.to_string(),
        OverallStatus::AwaitingFinalDecision => AWAITING_DECISION_STAGE.to_string(),
        OverallStatus::Applied | OverallStatus::InProcess => progress
            .current_round_id
            .as_ref()
            .and_then(|round_id| pipeline.round(round_id))
            .map(|round| round.name.clone())
            .unwrap_or_else(|| UNKNOWN_ROUND_STAGE.to_string()),
    }
}

/// One application per (job, candidate); the candidate's "my applications" record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApplicationRecord {
    pub id: ApplicationId,
    pub job_id: JobId,
    pub candidate_id: CandidateId,
    pub status: ApplicationStatus,
    pub overall_status: ApplicationProgress,
    pub current_round: Option<RoundId>,
    pub current_stage: String,
    pub rounds_status: BTreeMap<RoundId, RoundStatusEntry>,
    /// Progress version this projection was last rebuilt from; 0 before admission.
    pub synced_version: u64,
    pub applied_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ApplicationRecord {
    pub fn submitted(
        id: ApplicationId,
        job_id: JobId,
        candidate_id: CandidateId,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            job_id,
            candidate_id,
            status: ApplicationStatus::Pending,
            overall_status: ApplicationProgress::Applied,
            current_round: None,
            current_stage: APPLIED_STAGE.to_string(),
            rounds_status: BTreeMap::new(),
            synced_version: 0,
            applied_at: now,
            updated_at: now,
        }
    }

    /// Whether the candidate has been bound to a pipeline.
    pub fn is_admitted(&self) -> bool {
        self.synced_version > 0
    }

    pub fn is_stale(&self, progress: &CandidateProgress) -> bool {
        self.synced_version != progress.version
    }

    /// Rebuild every mirrored field from `progress`. Round entries are upserted by round id and
    /// entries the progress no longer carries are dropped. Returns whether anything changed.
    pub fn project(
        &mut self,
        progress: &CandidateProgress,
        pipeline: &Pipeline,
        now: DateTime<Utc>,
    ) -> bool {
        let mirror = mirror_status(progress.overall_status);
        let stage = stage_label(progress, pipeline);
        let mut changed = self.status != mirror.status
            || self.overall_status != mirror.overall_status
            || self.current_round != progress.current_round_id
            || self.current_stage != stage;

        self.status = mirror.status;
        self.overall_status = mirror.overall_status;
        self.current_round = progress.current_round_id.clone();
        self.current_stage = stage;

        for (round_id, entry) in &progress.rounds_status {
            match self.rounds_status.get_mut(round_id) {
                Some(existing) if existing == entry => {}
                Some(existing) => {
                    *existing = entry.clone();
                    changed = true;
                }
                None => {
                    self.rounds_status.insert(round_id.clone(), entry.clone());
                    changed = true;
                }
            }
        }
        let mirrored = self.rounds_status.len();
        self.rounds_status
            .retain(|round_id, _| progress.rounds_status.contains_key(round_id));
        changed |= self.rounds_status.len() != mirrored;

        self.synced_version = progress.version;
        self.updated_at = now;
        changed
    }

    pub fn status_view(&self) -> ApplicationStatusView {
        ApplicationStatusView {
            application_id: self.id.clone(),
            job_id: self.job_id.clone(),
            status: self.status.label(),
            overall_status: self.overall_status.label(),
            current_round: self.current_round.clone(),
            current_stage: self.current_stage.clone(),
            rounds_status: self.rounds_status.values().cloned().collect(),
            updated_at: self.updated_at,
        }
    }
}

/// Serialized shape of an application returned to candidates.
#[derive(Debug, Clone, Serialize)]
pub struct ApplicationStatusView {
    pub application_id: ApplicationId,
    pub job_id: JobId,
    pub status: &'static str,
    pub overall_status: &'static str,
    pub current_round: Option<RoundId>,
    pub current_stage: String,
    pub rounds_status: Vec<RoundStatusEntry>,
    pub updated_at: DateTime<Utc>,
}
