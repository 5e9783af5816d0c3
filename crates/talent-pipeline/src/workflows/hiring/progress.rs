use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::domain::{CandidateId, FinalDecision, OverallStatus, RoundId, RoundState};
use super::pipeline::Pipeline;

/// Outcome of one round as stored for one candidate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoundStatusEntry {
    pub round_id: RoundId,
    pub status: RoundState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub score: Option<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub feedback: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

impl RoundStatusEntry {
    pub fn pending(round_id: RoundId) -> Self {
        Self {
            round_id,
            status: RoundState::Pending,
            score: None,
            feedback: None,
            completed_at: None,
        }
    }

    fn set_status(&mut self, status: RoundState, now: DateTime<Utc>) {
        self.status = status;
        self.completed_at = status.is_completed().then_some(now);
    }
}

/// Recruiter or scorer supplied result for a round.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoundOutcome {
    pub status: RoundState,
    #[serde(default)]
    pub feedback: Option<String>,
    #[serde(default)]
    pub score: Option<f64>,
}

impl RoundOutcome {
    pub fn passed() -> Self {
        Self::with_status(RoundState::Passed)
    }

    pub fn failed() -> Self {
        Self::with_status(RoundState::Failed)
    }

    pub fn with_status(status: RoundState) -> Self {
        Self {
            status,
            feedback: None,
            score: None,
        }
    }

    pub fn scored(mut self, score: f64) -> Self {
        self.score = Some(score);
        self
    }

    pub fn noting(mut self, feedback: impl Into<String>) -> Self {
        self.feedback = Some(feedback.into());
        self
    }
}

/// Rules that vary by deployment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TransitionRules {
    /// Park candidates who pass the final round in `awaiting_final_decision` instead of hiring.
    pub final_decision_gate: bool,
}

/// What a mutation did to the state machine; drives notifications.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "transition", rename_all = "snake_case")]
pub enum Transition {
    Admitted { round: RoundId },
    Advanced { from: RoundId, to: RoundId },
    Hired { last_round: Option<RoundId> },
    Rejected { round: Option<RoundId> },
    AwaitingDecision,
    RoundUpdated { round: RoundId, status: RoundState },
    Finalized { decision: FinalDecision, closed_rounds: Vec<RoundId> },
    Unchanged,
}

impl Transition {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Transition::Hired { .. } | Transition::Rejected { .. } | Transition::Finalized { .. }
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransitionError {
    #[error("pipeline has no aptitude round to admit candidates into")]
    NoAptitudeRound,
    #[error("round {0} is not part of this pipeline")]
    RoundNotFound(RoundId),
    #[error("round {round} is not the candidate's active round")]
    RoundNotActive { round: RoundId },
    #[error("candidate pipeline is already closed as {0:?}")]
    PipelineClosed(OverallStatus),
    #[error("score must be a finite number")]
    InvalidScore,
    #[error("candidate was already finalized as {existing:?}")]
    DecisionConflict { existing: OverallStatus },
    #[error("only in-process candidates can be held for a final decision")]
    NotHoldable,
    #[error("candidate is awaiting a final decision; finalize instead")]
    AwaitingFinalDecision,
}

/// Authoritative state machine instance for one candidate within one job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidateProgress {
    pub applicant: CandidateId,
    pub current_round_id: Option<RoundId>,
    pub rounds_status: BTreeMap<RoundId, RoundStatusEntry>,
    pub overall_status: OverallStatus,
    pub last_updated: DateTime<Utc>,
    /// Bumped on every authoritative write; used for compare-and-swap and mirror staleness.
    pub version: u64,
}

impl CandidateProgress {
    /// Enter the pipeline at its first aptitude round.
    pub fn admit(
        applicant: CandidateId,
        pipeline: &Pipeline,
        now: DateTime<Utc>,
    ) -> Result<(Self, Transition), TransitionError> {
        let entry = pipeline
            .first_aptitude()
            .ok_or(TransitionError::NoAptitudeRound)?;

        let mut rounds_status = BTreeMap::new();
        rounds_status.insert(entry.id.clone(), RoundStatusEntry::pending(entry.id.clone()));

        let progress = Self {
            applicant,
            current_round_id: Some(entry.id.clone()),
            rounds_status,
            overall_status: OverallStatus::Applied,
            last_updated: now,
            version: 1,
        };
        Ok((
            progress,
            Transition::Admitted {
                round: entry.id.clone(),
            },
        ))
    }

    pub fn entry(&self, round_id: &RoundId) -> Option<&RoundStatusEntry> {
        self.rounds_status.get(round_id)
    }

    pub fn is_closed(&self) -> bool {
        self.overall_status.is_closed()
    }

    /// Apply a round outcome. `passed`/`failed` move the candidate and are only accepted for the
    /// active round; other statuses only annotate the round.
    pub fn record(
        &mut self,
        pipeline: &Pipeline,
        round_id: &RoundId,
        outcome: RoundOutcome,
        rules: TransitionRules,
        now: DateTime<Utc>,
    ) -> Result<Transition, TransitionError> {
        if self.is_closed() {
            return Err(TransitionError::PipelineClosed(self.overall_status));
        }
        if !pipeline.contains(round_id) {
            return Err(TransitionError::RoundNotFound(round_id.clone()));
        }
        let score = outcome.score.map(clamp_score).transpose()?;
        if outcome.status.is_completed()
            && self.overall_status == OverallStatus::AwaitingFinalDecision
        {
            return Err(TransitionError::AwaitingFinalDecision);
        }
        let is_active = self.current_round_id.as_ref() == Some(round_id);
        if outcome.status.is_completed() && !is_active {
            return Err(TransitionError::RoundNotActive {
                round: round_id.clone(),
            });
        }

        let entry = self
            .rounds_status
            .entry(round_id.clone())
            .or_insert_with(|| RoundStatusEntry::pending(round_id.clone()));
        entry.set_status(outcome.status, now);
        if outcome.feedback.is_some() {
            entry.feedback = outcome.feedback;
        }
        if score.is_some() {
            entry.score = score;
        }

        let transition = match outcome.status {
            RoundState::Passed => self.advance_past(pipeline, round_id, rules),
            RoundState::Failed => {
                self.overall_status = OverallStatus::Rejected;
                self.current_round_id = None;
                Transition::Rejected {
                    round: Some(round_id.clone()),
                }
            }
            status => Transition::RoundUpdated {
                round: round_id.clone(),
                status,
            },
        };

        self.touch(now);
        Ok(transition)
    }

    fn advance_past(
        &mut self,
        pipeline: &Pipeline,
        round_id: &RoundId,
        rules: TransitionRules,
    ) -> Transition {
        match pipeline.next_after(round_id) {
            Some(next) => {
                self.current_round_id = Some(next.id.clone());
                self.overall_status = OverallStatus::InProcess;
                self.rounds_status
                    .entry(next.id.clone())
                    .or_insert_with(|| RoundStatusEntry::pending(next.id.clone()));
                Transition::Advanced {
                    from: round_id.clone(),
                    to: next.id.clone(),
                }
            }
            None if rules.final_decision_gate => {
                self.current_round_id = None;
                self.overall_status = OverallStatus::AwaitingFinalDecision;
                Transition::AwaitingDecision
            }
            None => {
                self.current_round_id = None;
                self.overall_status = OverallStatus::Hired;
                Transition::Hired {
                    last_round: Some(round_id.clone()),
                }
            }
        }
    }

    /// Recruiter override closing the pipeline. Repeating the same decision is a no-op.
    pub fn finalize(
        &mut self,
        decision: FinalDecision,
        now: DateTime<Utc>,
    ) -> Result<Transition, TransitionError> {
        let target = decision.overall_status();
        if self.is_closed() {
            return if self.overall_status == target {
                Ok(Transition::Unchanged)
            } else {
                Err(TransitionError::DecisionConflict {
                    existing: self.overall_status,
                })
            };
        }

        let forced = decision.forced_round_state();
        let note = match decision {
            FinalDecision::Hired => "Automatically marked as passed by final hiring decision",
            FinalDecision::Rejected => "Automatically marked as failed by final rejection",
        };

        let mut closed_rounds = Vec::new();
        for entry in self.rounds_status.values_mut() {
            if entry.status.is_completed() {
                continue;
            }
            entry.set_status(forced, now);
            entry.feedback = Some(note.to_string());
            closed_rounds.push(entry.round_id.clone());
        }

        self.overall_status = target;
        self.current_round_id = None;
        self.touch(now);

        Ok(Transition::Finalized {
            decision,
            closed_rounds,
        })
    }

    /// Park an in-process candidate until the recruiter finalizes.
    pub fn hold_for_decision(&mut self, now: DateTime<Utc>) -> Result<Transition, TransitionError> {
        match self.overall_status {
            OverallStatus::AwaitingFinalDecision => Ok(Transition::Unchanged),
            OverallStatus::Applied | OverallStatus::InProcess => {
                self.overall_status = OverallStatus::AwaitingFinalDecision;
                self.touch(now);
                Ok(Transition::AwaitingDecision)
            }
            OverallStatus::Hired | OverallStatus::Rejected => Err(TransitionError::NotHoldable),
        }
    }

    fn touch(&mut self, now: DateTime<Utc>) {
        self.last_updated = now;
        self.version += 1;
    }
}

/// Clamp any externally supplied score into `0..=100`.
pub fn clamp_score(raw: f64) -> Result<u8, TransitionError> {
    if !raw.is_finite() {
        return Err(TransitionError::InvalidScore);
    }
    Ok(raw.round().clamp(0.0, 100.0) as u8)
}
