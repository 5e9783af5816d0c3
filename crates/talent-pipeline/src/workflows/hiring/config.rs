use std::time::Duration;

use super::aptitude::ScoringPolicy;
use super::progress::TransitionRules;

pub const DEFAULT_MIRROR_RETRY_ATTEMPTS: u8 = 3;
pub const DEFAULT_MIRROR_RETRY_BACKOFF: Duration = Duration::from_millis(10);

/// Behavioral dials for the pipeline service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PipelineConfig {
    /// Attempts made to write the application mirror before reporting it out of sync.
    pub mirror_retry_attempts: u8,
    /// Pause before the n-th retry is n times this long.
    pub mirror_retry_backoff: Duration,
    pub scoring_policy: ScoringPolicy,
    pub final_decision_gate: bool,
}

impl PipelineConfig {
    pub fn transition_rules(&self) -> TransitionRules {
        TransitionRules {
            final_decision_gate: self.final_decision_gate,
        }
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            mirror_retry_attempts: DEFAULT_MIRROR_RETRY_ATTEMPTS,
            mirror_retry_backoff: DEFAULT_MIRROR_RETRY_BACKOFF,
            scoring_policy: ScoringPolicy::AutoCredit,
            final_decision_gate: false,
        }
    }
}
