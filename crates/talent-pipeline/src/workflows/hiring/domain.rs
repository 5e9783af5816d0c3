use std::fmt;

use serde::{Deserialize, Serialize};

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub String);

        impl $name {
            pub fn new(value: impl Into<String>) -> Self {
                Self(value.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }
    };
}

string_id!(
    /// Identifier of a job opening owning a pipeline.
    JobId
);
string_id!(
    /// Identifier of a single interview round inside a job pipeline.
    RoundId
);
string_id!(
    /// Identifier of an applicant.
    CandidateId
);
string_id!(
    /// Identifier of an aptitude test bound to one aptitude round.
    TestId
);
string_id!(AttemptId);
string_id!(ApplicationId);
string_id!(
    /// Authenticated user performing an operation (recruiter or candidate).
    ActorId
);

impl From<&CandidateId> for ActorId {
    fn from(value: &CandidateId) -> Self {
        Self(value.0.clone())
    }
}

/// Kind of interview round configured by the recruiter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoundKind {
    Aptitude,
    Technical,
    Hr,
    Assignment,
    Other,
}

impl RoundKind {
    pub const fn label(self) -> &'static str {
        match self {
            Self::Aptitude => "Aptitude",
            Self::Technical => "Technical",
            Self::Hr => "HR",
            Self::Assignment => "Assignment",
            Self::Other => "Other",
        }
    }
}

/// Status of one round for one candidate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoundState {
    Pending,
    InProgress,
    Passed,
    Failed,
    AwaitingReview,
}

impl RoundState {
    pub const fn label(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::InProgress => "in_progress",
            Self::Passed => "passed",
            Self::Failed => "failed",
            Self::AwaitingReview => "awaiting_review",
        }
    }

    /// Passed and failed rounds carry a completion timestamp; every other state does not.
    pub const fn is_completed(self) -> bool {
        matches!(self, Self::Passed | Self::Failed)
    }
}

/// Authoritative overall status of a candidate inside a job pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverallStatus {
    Applied,
    InProcess,
    Hired,
    Rejected,
    AwaitingFinalDecision,
}

impl OverallStatus {
    pub const fn label(self) -> &'static str {
        match self {
            Self::Applied => "applied",
            Self::InProcess => "in_process",
            Self::Hired => "hired",
            Self::Rejected => "rejected",
            Self::AwaitingFinalDecision => "awaiting_final_decision",
        }
    }

    pub const fn is_closed(self) -> bool {
        matches!(self, Self::Hired | Self::Rejected)
    }
}

/// Terminal recruiter decision applied by finalization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FinalDecision {
    Hired,
    Rejected,
}

impl FinalDecision {
    pub const fn overall_status(self) -> OverallStatus {
        match self {
            Self::Hired => OverallStatus::Hired,
            Self::Rejected => OverallStatus::Rejected,
        }
    }

    pub const fn forced_round_state(self) -> RoundState {
        match self {
            Self::Hired => RoundState::Passed,
            Self::Rejected => RoundState::Failed,
        }
    }
}

/// Candidate-facing acceptance status stored on the application record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApplicationStatus {
    Pending,
    Accepted,
    Rejected,
}

impl ApplicationStatus {
    pub const fn label(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Accepted => "accepted",
            Self::Rejected => "rejected",
        }
    }
}

/// Candidate-facing pipeline status stored on the application record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApplicationProgress {
    Applied,
    InProgress,
    Hired,
    Rejected,
}

impl ApplicationProgress {
    pub const fn label(self) -> &'static str {
        match self {
            Self::Applied => "applied",
            Self::InProgress => "in_progress",
            Self::Hired => "hired",
            Self::Rejected => "rejected",
        }
    }
}
