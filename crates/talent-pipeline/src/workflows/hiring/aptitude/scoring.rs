use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::{Answer, AptitudeTest, Question, QuestionKind};

/// How short-answer questions are credited.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScoringPolicy {
    /// Any non-empty short answer earns full points.
    #[default]
    AutoCredit,
    /// Non-empty short answers wait for a reviewer to award points.
    ManualReview,
}

impl ScoringPolicy {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "auto" | "auto_credit" => Some(Self::AutoCredit),
            "manual" | "manual_review" => Some(Self::ManualReview),
            _ => None,
        }
    }
}

/// Result of grading one answer sheet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScoreCard {
    pub raw_score: u32,
    pub total_points: u32,
    pub percentage: u8,
    pub passed: bool,
    /// Question indexes whose short answers still need a reviewer.
    pub pending_review: Vec<usize>,
}

impl ScoreCard {
    pub fn is_final(&self) -> bool {
        self.pending_review.is_empty()
    }
}

/// Grade `answers` against the test's question bank.
///
/// `awards` holds reviewer-assigned points for short-answer questions and always wins over the
/// automatic rule for those questions.
pub fn score(
    test: &AptitudeTest,
    answers: &BTreeMap<usize, Answer>,
    awards: &BTreeMap<usize, u32>,
    policy: ScoringPolicy,
) -> ScoreCard {
    let mut raw_score: u32 = 0;
    let mut total_points: u32 = 0;
    let mut pending_review = Vec::new();

    for (index, question) in test.questions.iter().enumerate() {
        total_points = total_points.saturating_add(question.points);

        let earned = match question.kind {
            QuestionKind::MultipleChoice | QuestionKind::TrueFalse => {
                if answers
                    .get(&index)
                    .map(|answer| option_is_correct(question, answer))
                    .unwrap_or(false)
                {
                    question.points
                } else {
                    0
                }
            }
            QuestionKind::ShortAnswer => {
                if let Some(awarded) = awards.get(&index) {
                    (*awarded).min(question.points)
                } else {
                    let answered = answers
                        .get(&index)
                        .map(Answer::is_non_empty)
                        .unwrap_or(false);
                    match (answered, policy) {
                        (false, _) => 0,
                        (true, ScoringPolicy::AutoCredit) => question.points,
                        (true, ScoringPolicy::ManualReview) => {
                            pending_review.push(index);
                            0
                        }
                    }
                }
            }
        };
        raw_score = raw_score.saturating_add(earned);
    }

    let percentage = percentage_of(raw_score, total_points);
    ScoreCard {
        raw_score,
        total_points,
        percentage,
        passed: percentage >= test.passing_score_percent,
        pending_review,
    }
}

/// `round(100 * raw / total)` clamped to `0..=100`; a weightless test divides by one.
pub fn percentage_of(raw_score: u32, total_points: u32) -> u8 {
    let denominator = if total_points == 0 { 1 } else { total_points };
    let ratio = 100.0 * f64::from(raw_score) / f64::from(denominator);
    ratio.round().clamp(0.0, 100.0) as u8
}

fn option_is_correct(question: &Question, answer: &Answer) -> bool {
    let selected = match answer {
        Answer::Choice(index) => Some(*index),
        // Accept "true"/"false" style answers by matching option text.
        Answer::Text(text) if question.kind == QuestionKind::TrueFalse => question
            .options
            .iter()
            .position(|option| option.text.trim().eq_ignore_ascii_case(text.trim())),
        Answer::Text(_) => None,
    };

    selected
        .and_then(|index| question.options.get(index))
        .map(|option| option.is_correct)
        .unwrap_or(false)
}
