use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;

use chrono::Utc;
use tracing::{debug, info, warn};

use super::aptitude::{
    score, Answer, AptitudeTest, AttemptResult, CandidateTestView, QuestionKind, TestAttempt,
    TestSetup, TestSetupError,
};
use super::config::PipelineConfig;
use super::domain::{
    ActorId, ApplicationId, ApplicationStatus, AttemptId, CandidateId, FinalDecision, JobId,
    OverallStatus, RoundId, RoundKind, RoundState, TestId,
};
use super::ledger::{ApplicationRecord, ApplicationStatusView};
use super::locks::KeyedLocks;
use super::pipeline::{Pipeline, PipelineError, RoundDraft};
use super::progress::{CandidateProgress, RoundOutcome, Transition, TransitionError};
use super::repository::{
    JobRecord, NotificationDispatcher, NotificationKind, OwnershipCheck, PipelineNotification,
    PipelineStore, RepositoryError,
};
use super::views::{CandidateProgressView, PipelineView, ReconcileReport};

/// Service composing pipeline definition, aptitude scoring, the progress state machine, and the
/// application mirror.
pub struct PipelineService<S, N, O> {
    store: Arc<S>,
    notifier: Arc<N>,
    ownership: Arc<O>,
    config: PipelineConfig,
    /// Pipeline edits hold a job's gate exclusively; candidate transitions share it.
    job_gates: KeyedLocks<JobId>,
    locks: KeyedLocks<(JobId, CandidateId)>,
}

static ID_SEQUENCE: AtomicU64 = AtomicU64::new(1);

fn next_id(prefix: &str) -> String {
    let id = ID_SEQUENCE.fetch_add(1, Ordering::Relaxed);
    format!("{prefix}-{id:06}")
}

impl<S, N, O> PipelineService<S, N, O>
where
    S: PipelineStore + 'static,
    N: NotificationDispatcher + 'static,
    O: OwnershipCheck + 'static,
{
    pub fn new(store: Arc<S>, notifier: Arc<N>, ownership: Arc<O>, config: PipelineConfig) -> Self {
        Self {
            store,
            notifier,
            ownership,
            config,
            job_gates: KeyedLocks::default(),
            locks: KeyedLocks::default(),
        }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Register a job opening owned by `actor`.
    pub fn create_job(
        &self,
        actor: &ActorId,
        title: &str,
    ) -> Result<JobRecord, PipelineServiceError> {
        let title = title.trim();
        if title.is_empty() {
            return Err(PipelineServiceError::MissingTitle);
        }
        let job = JobRecord::new(
            JobId(next_id("job")),
            actor.clone(),
            title.to_string(),
            Utc::now(),
        );
        let stored = self.store.insert_job(job)?;
        info!(job = %stored.id, owner = %actor, "job created");
        Ok(stored)
    }

    /// Delete a job together with its tests, attempts, applications, and embedded progress.
    pub fn delete_job(&self, actor: &ActorId, job_id: &JobId) -> Result<(), PipelineServiceError> {
        let gate = self.job_gates.slot(job_id);
        let _exclusive = gate.lock();
        self.authorize(actor, job_id)?;

        for test in self.store.tests_for_job(job_id)? {
            self.store.delete_test(&test.id)?;
        }
        for application in self.store.applications_for_job(job_id)? {
            self.store
                .delete_application(&application.job_id, &application.candidate_id)?;
        }
        self.store.delete_job(job_id)?;
        info!(job = %job_id, "job deleted");
        Ok(())
    }

    /// Replace the round list of a job.
    pub fn define_pipeline(
        &self,
        actor: &ActorId,
        job_id: &JobId,
        mut drafts: Vec<RoundDraft>,
    ) -> Result<Pipeline, PipelineServiceError> {
        let gate = self.job_gates.slot(job_id);
        let _exclusive = gate.lock();
        let job = self.authorize(actor, job_id)?;

        for draft in &mut drafts {
            draft.id.get_or_insert_with(|| RoundId(next_id("round")));
        }
        let mut pipeline = Pipeline::define(drafts).map_err(PipelineServiceError::InvalidRounds)?;
        ensure_active_rounds_kept(&job, &pipeline)?;
        pipeline.inherit_tests(&job.pipeline);

        self.sync_tests(job_id, &mut pipeline)?;
        self.store.save_pipeline(job_id, pipeline.clone())?;
        info!(job = %job_id, rounds = pipeline.len(), "pipeline defined");
        Ok(pipeline)
    }

    /// Provision a test for every aptitude round and drop tests whose round disappeared.
    fn sync_tests(
        &self,
        job_id: &JobId,
        pipeline: &mut Pipeline,
    ) -> Result<(), PipelineServiceError> {
        for test in self.store.tests_for_job(job_id)? {
            let still_aptitude = pipeline
                .round(&test.round_id)
                .map(|round| round.kind == RoundKind::Aptitude)
                .unwrap_or(false);
            if !still_aptitude {
                self.store.delete_test(&test.id)?;
                debug!(job = %job_id, test = %test.id, "aptitude test removed with its round");
            }
        }

        let aptitude_rounds: Vec<(RoundId, u8)> = pipeline
            .aptitude_rounds()
            .map(|round| (round.id.clone(), round.passing_score.unwrap_or_default()))
            .collect();

        for (round_id, passing_score) in aptitude_rounds {
            let test = match self.store.test_for_round(job_id, &round_id)? {
                Some(mut existing) => {
                    if existing.passing_score_percent != passing_score {
                        existing.passing_score_percent = passing_score;
                        self.store.save_test(existing.clone())?;
                    }
                    existing
                }
                None => {
                    let provisioned = self.store.insert_test(AptitudeTest::provision(
                        TestId(next_id("test")),
                        job_id.clone(),
                        round_id.clone(),
                        passing_score,
                    ))?;
                    debug!(job = %job_id, round = %round_id, test = %provisioned.id, "aptitude test provisioned");
                    provisioned
                }
            };
            pipeline.bind_test(&round_id, test.id);
        }
        Ok(())
    }

    /// Change round positions without changing the set of rounds.
    pub fn reorder_rounds(
        &self,
        actor: &ActorId,
        job_id: &JobId,
        ordered_ids: &[RoundId],
    ) -> Result<Pipeline, PipelineServiceError> {
        let gate = self.job_gates.slot(job_id);
        let _exclusive = gate.lock();
        let job = self.authorize(actor, job_id)?;
        let pipeline = job
            .pipeline
            .reorder(ordered_ids)
            .map_err(|err| match err {
                PipelineError::StructureChanged => PipelineServiceError::StructureChanged,
                other => PipelineServiceError::InvalidRounds(other),
            })?;
        self.store.save_pipeline(job_id, pipeline.clone())?;
        info!(job = %job_id, "pipeline reordered");
        Ok(pipeline)
    }

    /// Remove one round; remaining rounds are renumbered.
    pub fn delete_round(
        &self,
        actor: &ActorId,
        job_id: &JobId,
        round_id: &RoundId,
    ) -> Result<Pipeline, PipelineServiceError> {
        let gate = self.job_gates.slot(job_id);
        let _exclusive = gate.lock();
        let job = self.authorize(actor, job_id)?;
        let (pipeline, removed) = job.pipeline.without(round_id).map_err(|err| match err {
            PipelineError::RoundNotFound(id) => PipelineServiceError::RoundNotFound(id),
            other => PipelineServiceError::InvalidRounds(other),
        })?;
        ensure_active_rounds_kept(&job, &pipeline)?;

        if let Some(test_id) = removed.aptitude_test {
            match self.store.delete_test(&test_id) {
                Ok(()) | Err(RepositoryError::NotFound) => {}
                Err(err) => return Err(err.into()),
            }
        }
        self.store.save_pipeline(job_id, pipeline.clone())?;
        info!(job = %job_id, round = %round_id, "round deleted");
        Ok(pipeline)
    }

    /// Replace the question bank of an aptitude test.
    pub fn configure_test(
        &self,
        actor: &ActorId,
        test_id: &TestId,
        setup: TestSetup,
    ) -> Result<AptitudeTest, PipelineServiceError> {
        let gate = self.job_gates.slot(&self.load_test(test_id)?.job_id);
        let _exclusive = gate.lock();
        let mut test = self.load_test(test_id)?;
        let mut job = self.authorize(actor, &test.job_id)?;

        test.configure(setup)?;
        self.store.save_test(test.clone())?;

        job.pipeline
            .set_passing_score(&test.round_id, test.passing_score_percent);
        self.store.save_pipeline(&job.id, job.pipeline)?;
        info!(test = %test.id, questions = test.questions.len(), "aptitude test configured");
        Ok(test)
    }

    /// Test as shown to candidates, without answer keys.
    pub fn candidate_test(&self, test_id: &TestId) -> Result<CandidateTestView, PipelineServiceError> {
        Ok(self.load_test(test_id)?.candidate_view())
    }

    /// Candidate applies to a job.
    pub fn apply(
        &self,
        job_id: &JobId,
        candidate: &CandidateId,
    ) -> Result<ApplicationRecord, PipelineServiceError> {
        self.load_job(job_id)?;
        let record = ApplicationRecord::submitted(
            ApplicationId(next_id("app")),
            job_id.clone(),
            candidate.clone(),
            Utc::now(),
        );
        match self.store.insert_application(record) {
            Ok(stored) => {
                info!(job = %job_id, candidate = %candidate, "application submitted");
                Ok(stored)
            }
            Err(RepositoryError::Conflict) => Err(PipelineServiceError::ApplicationExists),
            Err(err) => Err(err.into()),
        }
    }

    /// Recruiter accepts or rejects an application before admission.
    pub fn screen_application(
        &self,
        actor: &ActorId,
        job_id: &JobId,
        candidate: &CandidateId,
        accept: bool,
    ) -> Result<ApplicationRecord, PipelineServiceError> {
        self.authorize(actor, job_id)?;
        let slot = self.locks.slot(&(job_id.clone(), candidate.clone()));
        let _guard = slot.lock();

        let mut record = self.load_application(job_id, candidate)?;
        if record.is_admitted() {
            return Err(PipelineServiceError::AlreadyAdmitted);
        }
        record.status = if accept {
            ApplicationStatus::Accepted
        } else {
            ApplicationStatus::Rejected
        };
        record.updated_at = Utc::now();
        self.store.save_application(record.clone())?;
        info!(job = %job_id, candidate = %candidate, status = record.status.label(), "application screened");
        Ok(record)
    }

    /// Candidate withdraws; the application and its embedded progress are destroyed together.
    pub fn withdraw(
        &self,
        actor: &ActorId,
        job_id: &JobId,
        candidate: &CandidateId,
    ) -> Result<(), PipelineServiceError> {
        if actor.as_str() != candidate.as_str() {
            return Err(PipelineServiceError::Forbidden {
                actor: actor.clone(),
                job: job_id.clone(),
            });
        }
        let slot = self.locks.slot(&(job_id.clone(), candidate.clone()));
        let _guard = slot.lock();

        self.load_application(job_id, candidate)?;
        self.store.remove_progress(job_id, candidate)?;
        for test in self.store.tests_for_job(job_id)? {
            self.store.delete_attempt(&test.id, candidate)?;
        }
        self.store.delete_application(job_id, candidate)?;
        info!(job = %job_id, candidate = %candidate, "application withdrawn");
        Ok(())
    }

    /// Bind an accepted applicant to the first aptitude round.
    pub fn admit_candidate(
        &self,
        actor: &ActorId,
        job_id: &JobId,
        candidate: &CandidateId,
    ) -> Result<CandidateProgress, PipelineServiceError> {
        let gate = self.job_gates.slot(job_id);
        let _shared = gate.share();
        let job = self.authorize(actor, job_id)?;
        let slot = self.locks.slot(&(job_id.clone(), candidate.clone()));
        let _guard = slot.lock();

        let application = self.load_application(job_id, candidate)?;
        if let Some(existing) = self.store.fetch_progress(job_id, candidate)? {
            if application.is_stale(&existing) {
                self.sync_mirror(&job, &existing)?;
            }
            return Ok(existing);
        }
        if application.status != ApplicationStatus::Accepted {
            return Err(PipelineServiceError::NotAccepted(application.status));
        }

        let (progress, transition) =
            CandidateProgress::admit(candidate.clone(), &job.pipeline, Utc::now())?;
        self.store.insert_progress(job_id, progress.clone())?;
        info!(job = %job_id, candidate = %candidate, version = progress.version, "candidate admitted");

        let mirrored = self.sync_mirror(&job, &progress);
        self.notify(job_id, &progress, &transition);
        mirrored?;
        Ok(progress)
    }

    /// Grade an aptitude submission and apply the verdict to the candidate's progress. Only the
    /// candidate may submit their own answers.
    pub fn submit_aptitude_attempt(
        &self,
        actor: &ActorId,
        test_id: &TestId,
        candidate: &CandidateId,
        answers: BTreeMap<usize, Answer>,
    ) -> Result<AttemptResult, PipelineServiceError> {
        let job_id = self.load_test(test_id)?.job_id;
        if actor.as_str() != candidate.as_str() {
            warn!(test = %test_id, actor = %actor, candidate = %candidate, "rejected attempt submitted for another candidate");
            return Err(PipelineServiceError::Forbidden {
                actor: actor.clone(),
                job: job_id,
            });
        }
        let gate = self.job_gates.slot(&job_id);
        let _shared = gate.share();

        let test = self.load_test(test_id)?;
        if let Some(index) = answers
            .keys()
            .copied()
            .find(|index| *index >= test.questions.len())
        {
            return Err(PipelineServiceError::InvalidAnswers { index });
        }

        let job = self.load_job(&job_id)?;
        let slot = self.locks.slot(&(job.id.clone(), candidate.clone()));
        let _guard = slot.lock();

        let progress = self.load_progress(&job.id, candidate)?;
        ensure_round_open(&progress, &test.round_id)?;

        let card = score(&test, &answers, &BTreeMap::new(), self.config.scoring_policy);
        let attempt_id = self
            .store
            .fetch_attempt(test_id, candidate)?
            .map(|existing| existing.id)
            .unwrap_or_else(|| AttemptId(next_id("attempt")));
        let attempt = self.store.upsert_attempt(TestAttempt::graded(
            attempt_id,
            test_id.clone(),
            candidate.clone(),
            answers,
            BTreeMap::new(),
            &card,
            Utc::now(),
        ))?;
        info!(
            test = %test_id,
            candidate = %candidate,
            percentage = attempt.percentage_score,
            passed = attempt.passed,
            completed = attempt.completed,
            "aptitude attempt graded"
        );

        self.apply_attempt(&job, progress, &test, &attempt)?;
        Ok(attempt.result())
    }

    /// Award points to short answers and, once nothing is left to review, apply the verdict.
    pub fn review_short_answers(
        &self,
        actor: &ActorId,
        test_id: &TestId,
        candidate: &CandidateId,
        awards: BTreeMap<usize, u32>,
    ) -> Result<AttemptResult, PipelineServiceError> {
        let gate = self.job_gates.slot(&self.load_test(test_id)?.job_id);
        let _shared = gate.share();
        let test = self.load_test(test_id)?;
        let job = self.authorize(actor, &test.job_id)?;
        for index in awards.keys() {
            match test.questions.get(*index) {
                Some(question) if question.kind == QuestionKind::ShortAnswer => {}
                _ => return Err(PipelineServiceError::InvalidReview { index: *index }),
            }
        }

        let slot = self.locks.slot(&(job.id.clone(), candidate.clone()));
        let _guard = slot.lock();

        let progress = self.load_progress(&job.id, candidate)?;
        ensure_round_open(&progress, &test.round_id)?;
        let existing = self
            .store
            .fetch_attempt(test_id, candidate)?
            .ok_or_else(|| PipelineServiceError::AttemptNotFound {
                test: test_id.clone(),
                candidate: candidate.clone(),
            })?;

        let mut merged = existing.manual_awards.clone();
        merged.extend(awards);
        let card = score(&test, &existing.answers, &merged, self.config.scoring_policy);
        let attempt = self.store.upsert_attempt(TestAttempt::graded(
            existing.id,
            test_id.clone(),
            candidate.clone(),
            existing.answers,
            merged,
            &card,
            Utc::now(),
        ))?;
        info!(
            test = %test_id,
            candidate = %candidate,
            reviewer = %actor,
            percentage = attempt.percentage_score,
            completed = attempt.completed,
            "short answers reviewed"
        );

        self.apply_attempt(&job, progress, &test, &attempt)?;
        Ok(attempt.result())
    }

    fn apply_attempt(
        &self,
        job: &JobRecord,
        mut progress: CandidateProgress,
        test: &AptitudeTest,
        attempt: &TestAttempt,
    ) -> Result<CandidateProgress, PipelineServiceError> {
        let outcome = if !attempt.completed {
            if progress.entry(&test.round_id).map(|entry| entry.status)
                == Some(RoundState::AwaitingReview)
            {
                return Ok(progress);
            }
            RoundOutcome::with_status(RoundState::AwaitingReview)
                .scored(f64::from(attempt.percentage_score))
                .noting(format!(
                    "{} short answer(s) awaiting review",
                    attempt.pending_review.len()
                ))
        } else {
            let verdict = if attempt.passed {
                RoundOutcome::passed()
            } else {
                RoundOutcome::failed()
            };
            verdict
                .scored(f64::from(attempt.percentage_score))
                .noting(format!(
                    "Aptitude test scored {}% (passing score {}%)",
                    attempt.percentage_score, test.passing_score_percent
                ))
        };

        let expected = progress.version;
        let transition = progress.record(
            &job.pipeline,
            &test.round_id,
            outcome,
            self.config.transition_rules(),
            Utc::now(),
        )?;
        self.commit(job, progress, expected, transition)
    }

    /// Apply a recruiter-entered round outcome.
    pub fn record_round_outcome(
        &self,
        actor: &ActorId,
        job_id: &JobId,
        candidate: &CandidateId,
        round_id: &RoundId,
        outcome: RoundOutcome,
    ) -> Result<CandidateProgress, PipelineServiceError> {
        let gate = self.job_gates.slot(job_id);
        let _shared = gate.share();
        let job = self.authorize(actor, job_id)?;
        let slot = self.locks.slot(&(job_id.clone(), candidate.clone()));
        let _guard = slot.lock();

        let mut progress = self.load_progress(job_id, candidate)?;
        let expected = progress.version;
        let transition = progress.record(
            &job.pipeline,
            round_id,
            outcome,
            self.config.transition_rules(),
            Utc::now(),
        )?;
        self.commit(&job, progress, expected, transition)
    }

    /// Park a candidate in `awaiting_final_decision`.
    pub fn hold_for_decision(
        &self,
        actor: &ActorId,
        job_id: &JobId,
        candidate: &CandidateId,
    ) -> Result<CandidateProgress, PipelineServiceError> {
        let gate = self.job_gates.slot(job_id);
        let _shared = gate.share();
        let job = self.authorize(actor, job_id)?;
        let slot = self.locks.slot(&(job_id.clone(), candidate.clone()));
        let _guard = slot.lock();

        let mut progress = self.load_progress(job_id, candidate)?;
        let expected = progress.version;
        let transition = progress.hold_for_decision(Utc::now())?;
        self.commit(&job, progress, expected, transition)
    }

    /// Close the pipeline with a hire or reject decision, force-completing open rounds.
    pub fn finalize(
        &self,
        actor: &ActorId,
        job_id: &JobId,
        candidate: &CandidateId,
        decision: FinalDecision,
    ) -> Result<CandidateProgress, PipelineServiceError> {
        let gate = self.job_gates.slot(job_id);
        let _shared = gate.share();
        let job = self.authorize(actor, job_id)?;
        let slot = self.locks.slot(&(job_id.clone(), candidate.clone()));
        let _guard = slot.lock();

        let mut progress = self.load_progress(job_id, candidate)?;
        let expected = progress.version;
        let transition = progress.finalize(decision, Utc::now())?;
        self.commit(&job, progress, expected, transition)
    }

    /// Authoritative progress plus its application mirror, readable by the candidate and the job
    /// owner. A stale mirror is repaired on the way.
    pub fn get_progress(
        &self,
        actor: &ActorId,
        job_id: &JobId,
        candidate: &CandidateId,
    ) -> Result<CandidateProgressView, PipelineServiceError> {
        let job = self.load_job(job_id)?;
        if actor.as_str() != candidate.as_str() && !self.ownership.owns_job(actor, job_id)? {
            warn!(job = %job_id, actor = %actor, candidate = %candidate, "rejected progress read");
            return Err(PipelineServiceError::Forbidden {
                actor: actor.clone(),
                job: job_id.clone(),
            });
        }
        let progress = self.load_progress(job_id, candidate)?;
        let application = self.store.fetch_application(job_id, candidate)?;

        let (application, in_sync) = match application {
            Some(record) if record.is_stale(&progress) => match self.repair(&job, candidate) {
                Ok(repaired) => (repaired.or(Some(record)), true),
                Err(err) => {
                    warn!(job = %job_id, candidate = %candidate, error = %err, "application mirror repair failed");
                    (Some(record), false)
                }
            },
            Some(record) => (Some(record), true),
            None => (None, false),
        };

        Ok(CandidateProgressView::build(
            job_id,
            &job.pipeline,
            &progress,
            application.map(|record| record.status_view()),
            in_sync,
        ))
    }

    /// Recruiter pipeline view of every admitted candidate.
    pub fn pipeline_view(
        &self,
        actor: &ActorId,
        job_id: &JobId,
    ) -> Result<PipelineView, PipelineServiceError> {
        let job = self.authorize(actor, job_id)?;
        Ok(PipelineView {
            job_id: job.id,
            title: job.title,
            rounds: job.pipeline.into(),
            candidates: job.candidate_progress.into_values().collect(),
        })
    }

    /// The candidate's "my applications" list, repairing stale mirrors opportunistically. Any
    /// other actor only sees the applications to jobs they own.
    pub fn candidate_applications(
        &self,
        actor: &ActorId,
        candidate: &CandidateId,
    ) -> Result<Vec<ApplicationStatusView>, PipelineServiceError> {
        let is_candidate = actor.as_str() == candidate.as_str();
        let mut views = Vec::new();
        for record in self.store.applications_for_candidate(candidate)? {
            if !is_candidate && !self.ownership.owns_job(actor, &record.job_id)? {
                continue;
            }
            let view = match self.store.fetch_job(&record.job_id)? {
                Some(job) => match job.candidate_progress.get(candidate) {
                    Some(progress) if record.is_stale(progress) => {
                        match self.repair(&job, candidate) {
                            Ok(Some(repaired)) => repaired.status_view(),
                            Ok(None) => record.status_view(),
                            Err(err) => {
                                warn!(job = %job.id, candidate = %candidate, error = %err, "application mirror repair failed");
                                record.status_view()
                            }
                        }
                    }
                    _ => record.status_view(),
                },
                None => record.status_view(),
            };
            views.push(view);
        }
        Ok(views)
    }

    /// Rebuild every stale application mirror of a job from its progress entries.
    pub fn reconcile(
        &self,
        actor: &ActorId,
        job_id: &JobId,
    ) -> Result<ReconcileReport, PipelineServiceError> {
        let job = self.authorize(actor, job_id)?;
        let mut report = ReconcileReport::default();

        for (candidate, progress) in &job.candidate_progress {
            report.checked += 1;
            let stale = self
                .store
                .fetch_application(job_id, candidate)?
                .map(|record| record.is_stale(progress))
                .unwrap_or(false);
            if !stale {
                continue;
            }
            match self.repair(&job, candidate) {
                Ok(_) => report.repaired += 1,
                Err(err) => {
                    warn!(job = %job_id, candidate = %candidate, error = %err, "reconcile could not repair mirror");
                    report.failed += 1;
                }
            }
        }

        info!(job = %job_id, checked = report.checked, repaired = report.repaired, failed = report.failed, "mirror reconciliation finished");
        Ok(report)
    }

    /// Re-read progress under the candidate lock and rebuild the mirror from it.
    fn repair(
        &self,
        job: &JobRecord,
        candidate: &CandidateId,
    ) -> Result<Option<ApplicationRecord>, PipelineServiceError> {
        let slot = self.locks.slot(&(job.id.clone(), candidate.clone()));
        let _guard = slot.lock();

        let Some(progress) = self.store.fetch_progress(&job.id, candidate)? else {
            return Ok(None);
        };
        let Some(mut record) = self.store.fetch_application(&job.id, candidate)? else {
            return Ok(None);
        };
        if record.is_stale(&progress) {
            record.project(&progress, &job.pipeline, Utc::now());
            self.store.save_application(record.clone())?;
            info!(job = %job.id, candidate = %candidate, version = progress.version, "application mirror repaired");
        }
        Ok(Some(record))
    }

    /// Persist an authoritative transition, mirror it, then publish it.
    fn commit(
        &self,
        job: &JobRecord,
        progress: CandidateProgress,
        expected_version: u64,
        transition: Transition,
    ) -> Result<CandidateProgress, PipelineServiceError> {
        if transition == Transition::Unchanged {
            if let Some(record) = self
                .store
                .fetch_application(&job.id, &progress.applicant)?
            {
                if record.is_stale(&progress) {
                    self.sync_mirror(job, &progress)?;
                }
            }
            return Ok(progress);
        }

        self.store
            .save_progress(&job.id, progress.clone(), expected_version)
            .map_err(|err| match err {
                RepositoryError::VersionConflict { .. } => PipelineServiceError::VersionConflict {
                    job: job.id.clone(),
                    candidate: progress.applicant.clone(),
                },
                other => other.into(),
            })?;
        info!(
            job = %job.id,
            candidate = %progress.applicant,
            version = progress.version,
            overall_status = progress.overall_status.label(),
            ?transition,
            "candidate progress committed"
        );

        let mirrored = self.sync_mirror(job, &progress);
        self.notify(&job.id, &progress, &transition);
        mirrored?;
        Ok(progress)
    }

    /// Upsert the application projection, retrying the write before giving up.
    fn sync_mirror(
        &self,
        job: &JobRecord,
        progress: &CandidateProgress,
    ) -> Result<(), PipelineServiceError> {
        let attempts = self.config.mirror_retry_attempts.max(1);
        let mut attempt = 1;
        loop {
            match self.write_mirror(job, progress) {
                Ok(()) => return Ok(()),
                Err(source) if attempt >= attempts => {
                    warn!(job = %job.id, candidate = %progress.applicant, attempts, error = %source, "application mirror left stale");
                    return Err(PipelineServiceError::MirrorOutOfSync {
                        job: job.id.clone(),
                        candidate: progress.applicant.clone(),
                        source,
                    });
                }
                Err(source) => {
                    debug!(job = %job.id, candidate = %progress.applicant, attempt, error = %source, "retrying application mirror write");
                    thread::sleep(self.config.mirror_retry_backoff * u32::from(attempt));
                    attempt += 1;
                }
            }
        }
    }

    fn write_mirror(
        &self,
        job: &JobRecord,
        progress: &CandidateProgress,
    ) -> Result<(), RepositoryError> {
        let mut record = self
            .store
            .fetch_application(&job.id, &progress.applicant)?
            .ok_or(RepositoryError::NotFound)?;
        if record.synced_version > progress.version {
            return Ok(());
        }
        record.project(progress, &job.pipeline, Utc::now());
        self.store.save_application(record)
    }

    /// Fire-and-forget; a failed dispatch is logged and never fails the transition.
    fn notify(&self, job_id: &JobId, progress: &CandidateProgress, transition: &Transition) {
        let Some(kind) = notification_kind(transition) else {
            return;
        };

        let mut details = BTreeMap::new();
        details.insert(
            "overall_status".to_string(),
            progress.overall_status.label().to_string(),
        );
        if let Some(round) = &progress.current_round_id {
            details.insert("current_round".to_string(), round.to_string());
        }
        match transition {
            Transition::Advanced { from, .. } => {
                details.insert("passed_round".to_string(), from.to_string());
            }
            Transition::Rejected { round: Some(round) } => {
                details.insert("failed_round".to_string(), round.to_string());
            }
            Transition::RoundUpdated { round, status } => {
                details.insert("round".to_string(), round.to_string());
                details.insert("round_status".to_string(), status.label().to_string());
            }
            Transition::Finalized { closed_rounds, .. } if !closed_rounds.is_empty() => {
                details.insert("force_closed_rounds".to_string(), closed_rounds.len().to_string());
            }
            _ => {}
        }

        let notification = PipelineNotification {
            kind,
            job_id: job_id.clone(),
            candidate_id: progress.applicant.clone(),
            details,
        };
        if let Err(err) = self.notifier.dispatch(notification) {
            warn!(job = %job_id, candidate = %progress.applicant, template = kind.template(), error = %err, "notification dispatch failed");
        }
    }

    fn authorize(&self, actor: &ActorId, job_id: &JobId) -> Result<JobRecord, PipelineServiceError> {
        let job = self.load_job(job_id)?;
        if !self.ownership.owns_job(actor, job_id)? {
            warn!(job = %job_id, actor = %actor, "rejected mutation from non-owner");
            return Err(PipelineServiceError::Forbidden {
                actor: actor.clone(),
                job: job_id.clone(),
            });
        }
        Ok(job)
    }

    fn load_job(&self, job_id: &JobId) -> Result<JobRecord, PipelineServiceError> {
        self.store
            .fetch_job(job_id)?
            .ok_or_else(|| PipelineServiceError::JobNotFound(job_id.clone()))
    }

    fn load_test(&self, test_id: &TestId) -> Result<AptitudeTest, PipelineServiceError> {
        self.store
            .fetch_test(test_id)?
            .ok_or_else(|| PipelineServiceError::TestNotFound(test_id.clone()))
    }

    fn load_progress(
        &self,
        job_id: &JobId,
        candidate: &CandidateId,
    ) -> Result<CandidateProgress, PipelineServiceError> {
        self.store
            .fetch_progress(job_id, candidate)?
            .ok_or_else(|| PipelineServiceError::NotInPipeline {
                job: job_id.clone(),
                candidate: candidate.clone(),
            })
    }

    fn load_application(
        &self,
        job_id: &JobId,
        candidate: &CandidateId,
    ) -> Result<ApplicationRecord, PipelineServiceError> {
        self.store
            .fetch_application(job_id, candidate)?
            .ok_or_else(|| PipelineServiceError::ApplicationNotFound {
                job: job_id.clone(),
                candidate: candidate.clone(),
            })
    }
}

fn notification_kind(transition: &Transition) -> Option<NotificationKind> {
    match transition {
        Transition::Admitted { .. } => Some(NotificationKind::Admitted),
        Transition::Advanced { .. } => Some(NotificationKind::RoundAdvanced),
        Transition::RoundUpdated { .. } => Some(NotificationKind::RoundUpdated),
        Transition::AwaitingDecision => Some(NotificationKind::AwaitingDecision),
        Transition::Hired { .. } => Some(NotificationKind::Hired),
        Transition::Rejected { .. } => Some(NotificationKind::Rejected),
        Transition::Finalized { decision, .. } => Some(match decision {
            FinalDecision::Hired => NotificationKind::Hired,
            FinalDecision::Rejected => NotificationKind::Rejected,
        }),
        Transition::Unchanged => None,
    }
}

/// Candidates still moving through the pipeline must keep their active round.
fn ensure_active_rounds_kept(
    job: &JobRecord,
    pipeline: &Pipeline,
) -> Result<(), PipelineServiceError> {
    for progress in job.candidate_progress.values() {
        if let Some(round_id) = &progress.current_round_id {
            if !progress.is_closed() && !pipeline.contains(round_id) {
                return Err(PipelineServiceError::RoundInUse(round_id.clone()));
            }
        }
    }
    Ok(())
}

/// An aptitude submission or review is only accepted while its round is the undecided active round.
fn ensure_round_open(
    progress: &CandidateProgress,
    round_id: &RoundId,
) -> Result<(), PipelineServiceError> {
    let decided = progress
        .entry(round_id)
        .map(|entry| entry.status.is_completed())
        .unwrap_or(false);
    if progress.is_closed() || decided {
        return Err(PipelineServiceError::AlreadyCompleted);
    }
    if progress.overall_status == OverallStatus::AwaitingFinalDecision {
        return Err(PipelineServiceError::InvalidStatus(
            TransitionError::AwaitingFinalDecision,
        ));
    }
    if progress.current_round_id.as_ref() != Some(round_id) {
        return Err(PipelineServiceError::InvalidStatus(
            TransitionError::RoundNotActive {
                round: round_id.clone(),
            },
        ));
    }
    Ok(())
}

/// Broad error classes used by adapters to pick a response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    Validation,
    NotFound,
    Forbidden,
    Conflict,
    Retryable,
    Unavailable,
}

/// Error raised by the pipeline service.
#[derive(Debug, thiserror::Error)]
pub enum PipelineServiceError {
    #[error("job title must not be empty")]
    MissingTitle,
    #[error("invalid rounds: {0}")]
    InvalidRounds(#[source] PipelineError),
    #[error("reorder would change the pipeline structure")]
    StructureChanged,
    #[error("invalid aptitude test: {0}")]
    InvalidTest(#[from] TestSetupError),
    #[error("answer references unknown question {index}")]
    InvalidAnswers { index: usize },
    #[error("question {index} is not a short-answer question")]
    InvalidReview { index: usize },
    #[error("invalid status: {0}")]
    InvalidStatus(#[source] TransitionError),
    #[error("score must be a finite number")]
    InvalidScore,
    #[error("job {0} not found")]
    JobNotFound(JobId),
    #[error("round {0} not found")]
    RoundNotFound(RoundId),
    #[error("aptitude test {0} not found")]
    TestNotFound(TestId),
    #[error("no attempt by {candidate} for test {test}")]
    AttemptNotFound { test: TestId, candidate: CandidateId },
    #[error("no application from {candidate} for job {job}")]
    ApplicationNotFound { job: JobId, candidate: CandidateId },
    #[error("candidate {candidate} is not in the pipeline of job {job}")]
    NotInPipeline { job: JobId, candidate: CandidateId },
    #[error("actor {actor} is not allowed to modify job {job}")]
    Forbidden { actor: ActorId, job: JobId },
    #[error("pipeline has no aptitude round to admit candidates into")]
    NoAptitudeRound,
    #[error("application must be accepted before admission (currently {})", .0.label())]
    NotAccepted(ApplicationStatus),
    #[error("application already exists")]
    ApplicationExists,
    #[error("application was already admitted into the pipeline")]
    AlreadyAdmitted,
    #[error("aptitude round already completed for this candidate")]
    AlreadyCompleted,
    #[error("round {0} is the active round of a candidate")]
    RoundInUse(RoundId),
    #[error("candidate was already finalized as {}", .0.label())]
    DecisionConflict(OverallStatus),
    #[error("concurrent update on candidate {candidate} in job {job}; retry")]
    VersionConflict { job: JobId, candidate: CandidateId },
    #[error("progress saved but application mirror for {candidate} in job {job} is stale: {source}")]
    MirrorOutOfSync {
        job: JobId,
        candidate: CandidateId,
        #[source]
        source: RepositoryError,
    },
    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

impl PipelineServiceError {
    pub fn class(&self) -> ErrorClass {
        match self {
            Self::MissingTitle
            | Self::InvalidRounds(_)
            | Self::InvalidTest(_)
            | Self::InvalidAnswers { .. }
            | Self::InvalidReview { .. }
            | Self::InvalidStatus(_)
            | Self::InvalidScore
            | Self::NoAptitudeRound
            | Self::NotAccepted(_) => ErrorClass::Validation,
            Self::JobNotFound(_)
            | Self::RoundNotFound(_)
            | Self::TestNotFound(_)
            | Self::AttemptNotFound { .. }
            | Self::ApplicationNotFound { .. }
            | Self::NotInPipeline { .. } => ErrorClass::NotFound,
            Self::Forbidden { .. } => ErrorClass::Forbidden,
            Self::StructureChanged
            | Self::ApplicationExists
            | Self::AlreadyAdmitted
            | Self::AlreadyCompleted
            | Self::RoundInUse(_)
            | Self::DecisionConflict(_) => ErrorClass::Conflict,
            Self::VersionConflict { .. } | Self::MirrorOutOfSync { .. } => ErrorClass::Retryable,
            Self::Repository(RepositoryError::NotFound) => ErrorClass::NotFound,
            Self::Repository(RepositoryError::Conflict) => ErrorClass::Conflict,
            Self::Repository(RepositoryError::VersionConflict { .. }) => ErrorClass::Retryable,
            Self::Repository(RepositoryError::Unavailable(_)) => ErrorClass::Unavailable,
        }
    }

    pub fn is_retryable(&self) -> bool {
        self.class() == ErrorClass::Retryable
    }
}

impl From<TransitionError> for PipelineServiceError {
    fn from(value: TransitionError) -> Self {
        match value {
            TransitionError::NoAptitudeRound => Self::NoAptitudeRound,
            TransitionError::RoundNotFound(round) => Self::RoundNotFound(round),
            TransitionError::InvalidScore => Self::InvalidScore,
            TransitionError::DecisionConflict { existing } => Self::DecisionConflict(existing),
            other @ (TransitionError::RoundNotActive { .. }
            | TransitionError::PipelineClosed(_)
            | TransitionError::NotHoldable
            | TransitionError::AwaitingFinalDecision) => Self::InvalidStatus(other),
        }
    }
}
