use std::collections::{BTreeMap, BTreeSet, HashMap};

use serde::{Deserialize, Serialize};

use super::domain::{RoundId, RoundKind, TestId};

/// One configured interview round of a job pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineRound {
    pub id: RoundId,
    pub name: String,
    pub kind: RoundKind,
    pub order: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aptitude_test: Option<TestId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub passing_score: Option<u8>,
}

/// Recruiter supplied round definition prior to validation and normalization.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct RoundDraft {
    #[serde(default)]
    pub id: Option<RoundId>,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub kind: Option<RoundKind>,
    #[serde(default)]
    pub order: Option<i64>,
    #[serde(default)]
    pub passing_score: Option<i64>,
}

impl RoundDraft {
    pub fn new(name: impl Into<String>, kind: RoundKind) -> Self {
        Self {
            name: name.into(),
            kind: Some(kind),
            ..Self::default()
        }
    }

    pub fn aptitude(name: impl Into<String>, passing_score: i64) -> Self {
        Self {
            passing_score: Some(passing_score),
            ..Self::new(name, RoundKind::Aptitude)
        }
    }

    pub fn with_id(mut self, id: RoundId) -> Self {
        self.id = Some(id);
        self
    }

    pub fn at(mut self, order: i64) -> Self {
        self.order = Some(order);
        self
    }
}

/// Validation failures raised while editing a pipeline.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PipelineError {
    #[error("round at position {position} is missing a name")]
    MissingName { position: usize },
    #[error("round at position {position} is missing a kind")]
    MissingKind { position: usize },
    #[error("round at position {position} has no id assigned")]
    MissingId { position: usize },
    #[error("aptitude round '{name}' requires a passing score")]
    MissingPassingScore { name: String },
    #[error("round '{name}' is not an aptitude round and cannot carry a passing score")]
    UnexpectedPassingScore { name: String },
    #[error("passing score {value} for round '{name}' must be within 0..=100")]
    PassingScoreOutOfRange { name: String, value: i64 },
    #[error("order {order} is claimed by more than one round")]
    OrderCollision { order: i64 },
    #[error("round orders are not contiguous from 0 (found {found:?})")]
    NonContiguousOrder { found: Vec<u32> },
    #[error("round {0} appears more than once")]
    DuplicateRound(RoundId),
    #[error("round {0} not found in pipeline")]
    RoundNotFound(RoundId),
    #[error("reorder must list exactly the existing rounds with the same kinds")]
    StructureChanged,
}

/// Ordered set of interview rounds. Rounds are keyed by id and every mutation funnels through
/// [`Pipeline::normalized`] so orders stay exactly `0..n`.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(into = "Vec<PipelineRound>", try_from = "Vec<PipelineRound>")]
pub struct Pipeline {
    rounds: BTreeMap<RoundId, PipelineRound>,
}

impl Pipeline {
    /// Build a pipeline from drafts. Every draft must already carry an id.
    pub fn define(drafts: Vec<RoundDraft>) -> Result<Self, PipelineError> {
        let mut seen_orders = BTreeSet::new();
        let mut seen_ids = BTreeSet::new();
        let mut staged = Vec::with_capacity(drafts.len());

        for (position, draft) in drafts.into_iter().enumerate() {
            let name = draft.name.trim().to_string();
            if name.is_empty() {
                return Err(PipelineError::MissingName { position });
            }
            let kind = draft.kind.ok_or(PipelineError::MissingKind { position })?;
            let id = draft.id.ok_or(PipelineError::MissingId { position })?;
            if !seen_ids.insert(id.clone()) {
                return Err(PipelineError::DuplicateRound(id));
            }
            if let Some(order) = draft.order {
                if !seen_orders.insert(order) {
                    return Err(PipelineError::OrderCollision { order });
                }
            }

            let passing_score = validate_passing_score(&name, kind, draft.passing_score)?;

            staged.push((
                draft.order.unwrap_or(i64::MAX),
                PipelineRound {
                    id,
                    name,
                    kind,
                    order: 0,
                    aptitude_test: None,
                    passing_score,
                },
            ));
        }

        // Stable: rounds without an explicit order keep their submission position at the end.
        staged.sort_by_key(|(order, _)| *order);
        Self::normalized(staged.into_iter().map(|(_, round)| round))
    }

    /// Reassign `order` to `0..n` following the iteration order, then verify the invariant.
    fn normalized(rounds: impl IntoIterator<Item = PipelineRound>) -> Result<Self, PipelineError> {
        let mut keyed = BTreeMap::new();
        for (index, mut round) in rounds.into_iter().enumerate() {
            round.order = index as u32;
            if let Some(previous) = keyed.insert(round.id.clone(), round) {
                return Err(PipelineError::DuplicateRound(previous.id));
            }
        }

        let pipeline = Self { rounds: keyed };
        pipeline.check_contiguous()?;
        Ok(pipeline)
    }

    fn check_contiguous(&self) -> Result<(), PipelineError> {
        let mut orders: Vec<u32> = self.rounds.values().map(|round| round.order).collect();
        orders.sort_unstable();
        let contiguous = orders
            .iter()
            .enumerate()
            .all(|(index, order)| *order as usize == index);
        if contiguous {
            Ok(())
        } else {
            Err(PipelineError::NonContiguousOrder { found: orders })
        }
    }

    /// Move rounds into the listed positions. The listing must be a permutation of the existing
    /// rounds; adding, dropping, or swapping kinds is a structural edit and is refused.
    pub fn reorder(&self, ordered_ids: &[RoundId]) -> Result<Self, PipelineError> {
        if ordered_ids.len() != self.rounds.len() {
            return Err(PipelineError::StructureChanged);
        }

        let mut listed = Vec::with_capacity(ordered_ids.len());
        let mut seen = BTreeSet::new();
        for id in ordered_ids {
            if !seen.insert(id) {
                return Err(PipelineError::StructureChanged);
            }
            let round = self
                .rounds
                .get(id)
                .ok_or(PipelineError::StructureChanged)?;
            listed.push(round.clone());
        }

        if kind_counts(listed.iter()) != kind_counts(self.rounds.values()) {
            return Err(PipelineError::StructureChanged);
        }

        Self::normalized(listed)
    }

    /// Remove a round and close the gap it leaves in the ordering.
    pub fn without(&self, round_id: &RoundId) -> Result<(Self, PipelineRound), PipelineError> {
        let removed = self
            .rounds
            .get(round_id)
            .cloned()
            .ok_or_else(|| PipelineError::RoundNotFound(round_id.clone()))?;
        let remaining = self
            .ordered()
            .into_iter()
            .filter(|round| &round.id != round_id)
            .cloned()
            .collect::<Vec<_>>();
        Ok((Self::normalized(remaining)?, removed))
    }

    /// Carry test bindings over from a previous revision of the pipeline.
    pub(crate) fn inherit_tests(&mut self, previous: &Pipeline) {
        for round in self.rounds.values_mut() {
            if round.kind != RoundKind::Aptitude {
                continue;
            }
            if let Some(prior) = previous.rounds.get(&round.id) {
                if prior.kind == RoundKind::Aptitude {
                    round.aptitude_test = prior.aptitude_test.clone();
                }
            }
        }
    }

    pub(crate) fn bind_test(&mut self, round_id: &RoundId, test_id: TestId) -> bool {
        match self.rounds.get_mut(round_id) {
            Some(round) => {
                round.aptitude_test = Some(test_id);
                true
            }
            None => false,
        }
    }

    pub(crate) fn set_passing_score(&mut self, round_id: &RoundId, score: u8) {
        if let Some(round) = self.rounds.get_mut(round_id) {
            if round.kind == RoundKind::Aptitude {
                round.passing_score = Some(score);
            }
        }
    }

    pub fn round(&self, round_id: &RoundId) -> Option<&PipelineRound> {
        self.rounds.get(round_id)
    }

    pub fn contains(&self, round_id: &RoundId) -> bool {
        self.rounds.contains_key(round_id)
    }

    pub fn len(&self) -> usize {
        self.rounds.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rounds.is_empty()
    }

    /// Rounds sorted by `order`.
    pub fn ordered(&self) -> Vec<&PipelineRound> {
        let mut rounds: Vec<&PipelineRound> = self.rounds.values().collect();
        rounds.sort_by_key(|round| round.order);
        rounds
    }

    pub fn ordered_ids(&self) -> Vec<RoundId> {
        self.ordered()
            .into_iter()
            .map(|round| round.id.clone())
            .collect()
    }

    pub fn at_order(&self, order: u32) -> Option<&PipelineRound> {
        self.rounds.values().find(|round| round.order == order)
    }

    /// Round immediately following `round_id`, or `None` when it is the last one.
    pub fn next_after(&self, round_id: &RoundId) -> Option<&PipelineRound> {
        let current = self.rounds.get(round_id)?;
        self.at_order(current.order + 1)
    }

    /// Entry gate for admission: the earliest aptitude round.
    pub fn first_aptitude(&self) -> Option<&PipelineRound> {
        self.ordered()
            .into_iter()
            .find(|round| round.kind == RoundKind::Aptitude)
    }

    pub fn aptitude_rounds(&self) -> impl Iterator<Item = &PipelineRound> {
        self.rounds
            .values()
            .filter(|round| round.kind == RoundKind::Aptitude)
    }
}

fn validate_passing_score(
    name: &str,
    kind: RoundKind,
    score: Option<i64>,
) -> Result<Option<u8>, PipelineError> {
    match (kind, score) {
        (RoundKind::Aptitude, None) => Err(PipelineError::MissingPassingScore {
            name: name.to_string(),
        }),
        (RoundKind::Aptitude, Some(value)) if !(0..=100).contains(&value) => {
            Err(PipelineError::PassingScoreOutOfRange {
                name: name.to_string(),
                value,
            })
        }
        (RoundKind::Aptitude, Some(value)) => Ok(Some(value as u8)),
        (_, Some(_)) => Err(PipelineError::UnexpectedPassingScore {
            name: name.to_string(),
        }),
        (_, None) => Ok(None),
    }
}

fn kind_counts<'a>(rounds: impl Iterator<Item = &'a PipelineRound>) -> HashMap<RoundKind, usize> {
    let mut counts = HashMap::new();
    for round in rounds {
        *counts.entry(round.kind).or_insert(0) += 1;
    }
    counts
}

impl From<Pipeline> for Vec<PipelineRound> {
    fn from(pipeline: Pipeline) -> Self {
        let mut rounds: Vec<PipelineRound> = pipeline.rounds.into_values().collect();
        rounds.sort_by_key(|round| round.order);
        rounds
    }
}

impl TryFrom<Vec<PipelineRound>> for Pipeline {
    type Error = PipelineError;

    fn try_from(mut rounds: Vec<PipelineRound>) -> Result<Self, Self::Error> {
        rounds.sort_by_key(|round| round.order);
        let mut keyed = BTreeMap::new();
        for round in rounds {
            if keyed.contains_key(&round.id) {
                return Err(PipelineError::DuplicateRound(round.id));
            }
            keyed.insert(round.id.clone(), round);
        }
        let pipeline = Self { rounds: keyed };
        pipeline.check_contiguous()?;
        Ok(pipeline)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(value: &str) -> RoundId {
        RoundId::new(value)
    }

    fn standard() -> Pipeline {
        Pipeline::define(vec![
            RoundDraft::aptitude("Aptitude", 60).with_id(id("r-apt")),
            RoundDraft::new("Technical", RoundKind::Technical).with_id(id("r-tech")),
            RoundDraft::new("HR", RoundKind::Hr).with_id(id("r-hr")),
        ])
        .expect("pipeline defines")
    }

    fn orders(pipeline: &Pipeline) -> Vec<u32> {
        pipeline.ordered().iter().map(|round| round.order).collect()
    }

    #[test]
    fn define_normalizes_sparse_orders_with_stable_sort() {
        let pipeline = Pipeline::define(vec![
            RoundDraft::new("HR", RoundKind::Hr).with_id(id("hr")).at(30),
            RoundDraft::aptitude("Aptitude", 50).with_id(id("apt")).at(-4),
            RoundDraft::new("Assignment", RoundKind::Assignment).with_id(id("task")),
            RoundDraft::new("Technical", RoundKind::Technical)
                .with_id(id("tech"))
                .at(7),
        ])
        .expect("pipeline defines");

        assert_eq!(
            pipeline.ordered_ids(),
            vec![id("apt"), id("tech"), id("hr"), id("task")]
        );
        assert_eq!(orders(&pipeline), vec![0, 1, 2, 3]);
    }

    #[test]
    fn define_rejects_colliding_orders() {
        let result = Pipeline::define(vec![
            RoundDraft::aptitude("Aptitude", 50).with_id(id("a")).at(1),
            RoundDraft::new("Technical", RoundKind::Technical)
                .with_id(id("b"))
                .at(1),
        ]);
        assert_eq!(result, Err(PipelineError::OrderCollision { order: 1 }));
    }

    #[test]
    fn define_rejects_missing_name_and_kind() {
        let missing_name = Pipeline::define(vec![RoundDraft::new("  ", RoundKind::Hr).with_id(id("a"))]);
        assert_eq!(missing_name, Err(PipelineError::MissingName { position: 0 }));

        let missing_kind = Pipeline::define(vec![
            RoundDraft::aptitude("Aptitude", 40).with_id(id("a")),
            RoundDraft {
                id: Some(id("b")),
                name: "Panel".to_string(),
                ..RoundDraft::default()
            },
        ]);
        assert_eq!(missing_kind, Err(PipelineError::MissingKind { position: 1 }));
    }

    #[test]
    fn define_enforces_passing_score_only_on_aptitude_rounds() {
        let missing = Pipeline::define(vec![RoundDraft::new("Quiz", RoundKind::Aptitude).with_id(id("a"))]);
        assert!(matches!(
            missing,
            Err(PipelineError::MissingPassingScore { .. })
        ));

        let out_of_range = Pipeline::define(vec![RoundDraft::aptitude("Quiz", 101).with_id(id("a"))]);
        assert!(matches!(
            out_of_range,
            Err(PipelineError::PassingScoreOutOfRange { value: 101, .. })
        ));

        let mut technical = RoundDraft::new("Technical", RoundKind::Technical).with_id(id("t"));
        technical.passing_score = Some(50);
        assert!(matches!(
            Pipeline::define(vec![technical]),
            Err(PipelineError::UnexpectedPassingScore { .. })
        ));
    }

    #[test]
    fn reorder_accepts_permutations_only() {
        let pipeline = standard();
        let reordered = pipeline
            .reorder(&[id("r-apt"), id("r-hr"), id("r-tech")])
            .expect("permutation is accepted");
        assert_eq!(
            reordered.ordered_ids(),
            vec![id("r-apt"), id("r-hr"), id("r-tech")]
        );
        assert_eq!(orders(&reordered), vec![0, 1, 2]);

        assert_eq!(
            pipeline.reorder(&[id("r-apt"), id("r-hr")]),
            Err(PipelineError::StructureChanged)
        );
        assert_eq!(
            pipeline.reorder(&[id("r-apt"), id("r-hr"), id("r-hr")]),
            Err(PipelineError::StructureChanged)
        );
        assert_eq!(
            pipeline.reorder(&[id("r-apt"), id("r-hr"), id("r-new")]),
            Err(PipelineError::StructureChanged)
        );
    }

    #[test]
    fn without_closes_the_gap() {
        let (pipeline, removed) = standard().without(&id("r-tech")).expect("round removed");
        assert_eq!(removed.name, "Technical");
        assert_eq!(pipeline.ordered_ids(), vec![id("r-apt"), id("r-hr")]);
        assert_eq!(orders(&pipeline), vec![0, 1]);
        assert_eq!(
            pipeline.without(&id("r-tech")).map(|_| ()),
            Err(PipelineError::RoundNotFound(id("r-tech")))
        );
    }

    #[test]
    fn next_after_follows_order() {
        let pipeline = standard();
        assert_eq!(
            pipeline.next_after(&id("r-apt")).map(|round| round.id.clone()),
            Some(id("r-tech"))
        );
        assert!(pipeline.next_after(&id("r-hr")).is_none());
        assert_eq!(
            pipeline.first_aptitude().map(|round| round.id.clone()),
            Some(id("r-apt"))
        );
    }

    #[test]
    fn deserialization_rejects_gapped_orders() {
        let pipeline = standard();
        let mut value = serde_json::to_value(&pipeline).expect("serializes");
        assert_eq!(value[1]["name"], "Technical");

        value[2]["order"] = serde_json::json!(5);
        let parsed: Result<Pipeline, _> = serde_json::from_value(value);
        assert!(parsed.is_err());
    }
}
