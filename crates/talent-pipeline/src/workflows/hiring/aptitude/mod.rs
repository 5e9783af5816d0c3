mod scoring;

pub use scoring::{percentage_of, score, ScoreCard, ScoringPolicy};

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::domain::{AttemptId, CandidateId, JobId, RoundId, TestId};

const DEFAULT_DURATION_MINUTES: u32 = 30;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuestionKind {
    MultipleChoice,
    TrueFalse,
    ShortAnswer,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnswerOption {
    pub text: String,
    #[serde(default)]
    pub is_correct: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Question {
    pub text: String,
    pub kind: QuestionKind,
    #[serde(default)]
    pub options: Vec<AnswerOption>,
    pub points: u32,
}

/// Question bank bound to exactly one aptitude round of a job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AptitudeTest {
    pub id: TestId,
    pub job_id: JobId,
    pub round_id: RoundId,
    pub questions: Vec<Question>,
    pub passing_score_percent: u8,
    pub duration_minutes: u32,
}

impl AptitudeTest {
    /// Empty test provisioned alongside a new aptitude round.
    pub fn provision(id: TestId, job_id: JobId, round_id: RoundId, passing_score: u8) -> Self {
        Self {
            id,
            job_id,
            round_id,
            questions: Vec::new(),
            passing_score_percent: passing_score,
            duration_minutes: DEFAULT_DURATION_MINUTES,
        }
    }

    pub fn total_points(&self) -> u32 {
        self.questions
            .iter()
            .fold(0u32, |total, question| total.saturating_add(question.points))
    }

    /// Replace the question bank after validating it.
    pub fn configure(&mut self, setup: TestSetup) -> Result<(), TestSetupError> {
        setup.validate()?;
        self.questions = setup.questions;
        self.passing_score_percent = setup.passing_score_percent as u8;
        self.duration_minutes = setup.duration_minutes;
        Ok(())
    }

    /// Copy of the test without correctness flags, safe to hand to candidates.
    pub fn candidate_view(&self) -> CandidateTestView {
        CandidateTestView {
            id: self.id.clone(),
            job_id: self.job_id.clone(),
            round_id: self.round_id.clone(),
            duration_minutes: self.duration_minutes,
            passing_score_percent: self.passing_score_percent,
            questions: self
                .questions
                .iter()
                .map(|question| CandidateQuestionView {
                    text: question.text.clone(),
                    kind: question.kind,
                    options: question
                        .options
                        .iter()
                        .map(|option| option.text.clone())
                        .collect(),
                    points: question.points,
                })
                .collect(),
        }
    }
}

/// Recruiter payload replacing a test's question bank.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestSetup {
    pub questions: Vec<Question>,
    pub passing_score_percent: i64,
    pub duration_minutes: u32,
}

impl TestSetup {
    fn validate(&self) -> Result<(), TestSetupError> {
        if !(0..=100).contains(&self.passing_score_percent) {
            return Err(TestSetupError::PassingScoreOutOfRange(
                self.passing_score_percent,
            ));
        }
        if self.duration_minutes == 0 {
            return Err(TestSetupError::ZeroDuration);
        }

        for (index, question) in self.questions.iter().enumerate() {
            if question.text.trim().is_empty() {
                return Err(TestSetupError::EmptyQuestion { index });
            }
            match question.kind {
                QuestionKind::TrueFalse if question.options.len() != 2 => {
                    return Err(TestSetupError::TrueFalseOptions { index });
                }
                QuestionKind::MultipleChoice | QuestionKind::TrueFalse
                    if !question.options.iter().any(|option| option.is_correct) =>
                {
                    return Err(TestSetupError::NoCorrectOption { index });
                }
                _ => {}
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TestSetupError {
    #[error("passing score {0} must be within 0..=100")]
    PassingScoreOutOfRange(i64),
    #[error("test duration must be at least one minute")]
    ZeroDuration,
    #[error("question {index} has no text")]
    EmptyQuestion { index: usize },
    #[error("true/false question {index} must have exactly two options")]
    TrueFalseOptions { index: usize },
    #[error("question {index} has no option flagged correct")]
    NoCorrectOption { index: usize },
}

#[derive(Debug, Clone, Serialize)]
pub struct CandidateTestView {
    pub id: TestId,
    pub job_id: JobId,
    pub round_id: RoundId,
    pub duration_minutes: u32,
    pub passing_score_percent: u8,
    pub questions: Vec<CandidateQuestionView>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CandidateQuestionView {
    pub text: String,
    pub kind: QuestionKind,
    pub options: Vec<String>,
    pub points: u32,
}

/// Submitted answer: an option index or free text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Answer {
    Choice(usize),
    Text(String),
}

impl Answer {
    pub fn is_non_empty(&self) -> bool {
        match self {
            Answer::Choice(_) => true,
            Answer::Text(text) => !text.trim().is_empty(),
        }
    }
}

/// The single stored submission of a candidate for a test.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestAttempt {
    pub id: AttemptId,
    pub test_id: TestId,
    pub candidate_id: CandidateId,
    pub answers: BTreeMap<usize, Answer>,
    pub raw_score: u32,
    pub percentage_score: u8,
    pub passed: bool,
    pub completed: bool,
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub pending_review: Vec<usize>,
    #[serde(default)]
    pub manual_awards: BTreeMap<usize, u32>,
}

impl TestAttempt {
    pub fn graded(
        id: AttemptId,
        test_id: TestId,
        candidate_id: CandidateId,
        answers: BTreeMap<usize, Answer>,
        manual_awards: BTreeMap<usize, u32>,
        card: &ScoreCard,
        now: DateTime<Utc>,
    ) -> Self {
        let completed = card.is_final();
        Self {
            id,
            test_id,
            candidate_id,
            answers,
            raw_score: card.raw_score,
            percentage_score: card.percentage,
            passed: card.passed,
            completed,
            completed_at: completed.then_some(now),
            pending_review: card.pending_review.clone(),
            manual_awards,
        }
    }

    pub fn result(&self) -> AttemptResult {
        AttemptResult {
            attempt_id: self.id.clone(),
            raw_score: self.raw_score,
            percentage: self.percentage_score,
            passed: self.passed,
            completed: self.completed,
            pending_review: self.pending_review.clone(),
        }
    }
}

/// Verdict returned to the submitter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AttemptResult {
    pub attempt_id: AttemptId,
    pub raw_score: u32,
    pub percentage: u8,
    pub passed: bool,
    pub completed: bool,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub pending_review: Vec<usize>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn choice(text: &str, correct: bool) -> AnswerOption {
        AnswerOption {
            text: text.to_string(),
            is_correct: correct,
        }
    }

    fn test_with(questions: Vec<Question>, passing: u8) -> AptitudeTest {
        AptitudeTest {
            questions,
            ..AptitudeTest::provision(
                TestId::new("test-1"),
                JobId::new("job-1"),
                RoundId::new("round-1"),
                passing,
            )
        }
    }

    fn bank() -> Vec<Question> {
        vec![
            Question {
                text: "2 + 2".to_string(),
                kind: QuestionKind::MultipleChoice,
                options: vec![choice("3", false), choice("4", true), choice("5", false)],
                points: 2,
            },
            Question {
                text: "Rust has a garbage collector".to_string(),
                kind: QuestionKind::TrueFalse,
                options: vec![choice("True", false), choice("False", true)],
                points: 1,
            },
            Question {
                text: "Explain ownership".to_string(),
                kind: QuestionKind::ShortAnswer,
                options: Vec::new(),
                points: 1,
            },
        ]
    }

    fn answers(entries: Vec<(usize, Answer)>) -> BTreeMap<usize, Answer> {
        entries.into_iter().collect()
    }

    #[test]
    fn scores_choices_and_auto_credits_short_answers() {
        let test = test_with(bank(), 60);
        let card = score(
            &test,
            &answers(vec![
                (0, Answer::Choice(1)),
                (1, Answer::Text("false".to_string())),
                (2, Answer::Text("moves and borrows".to_string())),
            ]),
            &BTreeMap::new(),
            ScoringPolicy::AutoCredit,
        );

        assert_eq!(card.raw_score, 4);
        assert_eq!(card.total_points, 4);
        assert_eq!(card.percentage, 100);
        assert!(card.passed);
        assert!(card.is_final());
    }

    #[test]
    fn percentage_rounds_and_compares_against_passing_score() {
        let test = test_with(bank(), 60);
        // 2 of 4 points.
        let card = score(
            &test,
            &answers(vec![(0, Answer::Choice(1)), (2, Answer::Text("   ".to_string()))]),
            &BTreeMap::new(),
            ScoringPolicy::AutoCredit,
        );
        assert_eq!(card.percentage, 50);
        assert!(!card.passed);

        assert_eq!(percentage_of(2, 3), 67);
        assert_eq!(percentage_of(1, 3), 33);
        assert_eq!(percentage_of(1, 8), 13);
    }

    #[test]
    fn weightless_test_scores_zero_without_dividing_by_zero() {
        let test = test_with(Vec::new(), 0);
        let card = score(&test, &BTreeMap::new(), &BTreeMap::new(), ScoringPolicy::AutoCredit);
        assert_eq!(card.percentage, 0);
        assert!(card.passed, "0 >= 0 passes");
    }

    #[test]
    fn out_of_range_choice_earns_nothing() {
        let test = test_with(bank(), 10);
        let card = score(
            &test,
            &answers(vec![(0, Answer::Choice(9)), (1, Answer::Choice(0))]),
            &BTreeMap::new(),
            ScoringPolicy::AutoCredit,
        );
        assert_eq!(card.raw_score, 0);
    }

    #[test]
    fn manual_review_defers_short_answers_until_awarded() {
        let test = test_with(bank(), 75);
        let sheet = answers(vec![
            (0, Answer::Choice(1)),
            (1, Answer::Choice(1)),
            (2, Answer::Text("borrow checker".to_string())),
        ]);

        let pending = score(&test, &sheet, &BTreeMap::new(), ScoringPolicy::ManualReview);
        assert_eq!(pending.pending_review, vec![2]);
        assert!(!pending.is_final());
        assert_eq!(pending.raw_score, 3);

        let mut awards = BTreeMap::new();
        awards.insert(2, 10);
        let reviewed = score(&test, &sheet, &awards, ScoringPolicy::ManualReview);
        assert!(reviewed.is_final());
        assert_eq!(reviewed.raw_score, 4, "award is capped at the question's points");
        assert!(reviewed.passed);
    }

    #[test]
    fn configure_validates_question_bank() {
        let mut test = test_with(Vec::new(), 50);
        let mut broken = bank();
        broken[0].options.iter_mut().for_each(|option| option.is_correct = false);

        let result = test.configure(TestSetup {
            questions: broken,
            passing_score_percent: 50,
            duration_minutes: 20,
        });
        assert_eq!(result, Err(TestSetupError::NoCorrectOption { index: 0 }));

        let result = test.configure(TestSetup {
            questions: bank(),
            passing_score_percent: 120,
            duration_minutes: 20,
        });
        assert_eq!(result, Err(TestSetupError::PassingScoreOutOfRange(120)));

        test.configure(TestSetup {
            questions: bank(),
            passing_score_percent: 70,
            duration_minutes: 45,
        })
        .expect("valid setup");
        assert_eq!(test.total_points(), 4);
        assert_eq!(test.passing_score_percent, 70);
    }

    #[test]
    fn candidate_view_hides_correct_answers() {
        let test = test_with(bank(), 60);
        let view = serde_json::to_value(test.candidate_view()).expect("serializes");
        assert!(!view.to_string().contains("is_correct"));
        assert_eq!(view["questions"][0]["options"][1], "4");
    }

    #[test]
    fn answers_deserialize_from_indexes_and_text() {
        let parsed: BTreeMap<usize, Answer> =
            serde_json::from_str(r#"{"0": 1, "2": "an answer"}"#).expect("parses");
        assert_eq!(parsed.get(&0), Some(&Answer::Choice(1)));
        assert_eq!(parsed.get(&2), Some(&Answer::Text("an answer".to_string())));
    }
}
