use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use super::aptitude::{AptitudeTest, TestAttempt};
use super::domain::{ActorId, CandidateId, JobId, RoundId, TestId};
use super::ledger::ApplicationRecord;
use super::pipeline::Pipeline;
use super::progress::CandidateProgress;
use super::repository::{
    AptitudeRepository, ApplicationRepository, JobRepository, JobRecord, OwnershipCheck,
    RepositoryError,
};

/// Process-local store backing the API service and tests.
#[derive(Debug, Default)]
pub struct InMemoryPipelineStore {
    state: Mutex<StoreState>,
}

#[derive(Debug, Default)]
struct StoreState {
    jobs: HashMap<JobId, JobRecord>,
    applications: HashMap<(JobId, CandidateId), ApplicationRecord>,
    tests: HashMap<TestId, AptitudeTest>,
    attempts: HashMap<(TestId, CandidateId), TestAttempt>,
}

impl InMemoryPipelineStore {
    fn state(&self) -> Result<MutexGuard<'_, StoreState>, RepositoryError> {
        self.state
            .lock()
            .map_err(|_| RepositoryError::Unavailable("store mutex poisoned".to_string()))
    }

    pub fn attempt_count(&self) -> usize {
        self.state().map(|state| state.attempts.len()).unwrap_or(0)
    }
}

impl JobRepository for InMemoryPipelineStore {
    fn insert_job(&self, job: JobRecord) -> Result<JobRecord, RepositoryError> {
        let mut state = self.state()?;
        if state.jobs.contains_key(&job.id) {
            return Err(RepositoryError::Conflict);
        }
        state.jobs.insert(job.id.clone(), job.clone());
        Ok(job)
    }

    fn fetch_job(&self, id: &JobId) -> Result<Option<JobRecord>, RepositoryError> {
        Ok(self.state()?.jobs.get(id).cloned())
    }

    fn save_pipeline(&self, id: &JobId, pipeline: Pipeline) -> Result<(), RepositoryError> {
        let mut state = self.state()?;
        let job = state.jobs.get_mut(id).ok_or(RepositoryError::NotFound)?;
        job.pipeline = pipeline;
        Ok(())
    }

    fn delete_job(&self, id: &JobId) -> Result<(), RepositoryError> {
        self.state()?
            .jobs
            .remove(id)
            .map(|_| ())
            .ok_or(RepositoryError::NotFound)
    }

    fn fetch_progress(
        &self,
        job: &JobId,
        candidate: &CandidateId,
    ) -> Result<Option<CandidateProgress>, RepositoryError> {
        let state = self.state()?;
        let job = state.jobs.get(job).ok_or(RepositoryError::NotFound)?;
        Ok(job.candidate_progress.get(candidate).cloned())
    }

    fn insert_progress(
        &self,
        job: &JobId,
        progress: CandidateProgress,
    ) -> Result<(), RepositoryError> {
        let mut state = self.state()?;
        let job = state.jobs.get_mut(job).ok_or(RepositoryError::NotFound)?;
        if job.candidate_progress.contains_key(&progress.applicant) {
            return Err(RepositoryError::Conflict);
        }
        job.candidate_progress
            .insert(progress.applicant.clone(), progress);
        Ok(())
    }

    fn save_progress(
        &self,
        job: &JobId,
        progress: CandidateProgress,
        expected_version: u64,
    ) -> Result<(), RepositoryError> {
        let mut state = self.state()?;
        let job = state.jobs.get_mut(job).ok_or(RepositoryError::NotFound)?;
        let stored = job
            .candidate_progress
            .get_mut(&progress.applicant)
            .ok_or(RepositoryError::NotFound)?;
        if stored.version != expected_version {
            return Err(RepositoryError::VersionConflict {
                expected: expected_version,
                found: stored.version,
            });
        }
        *stored = progress;
        Ok(())
    }

    fn remove_progress(
        &self,
        job: &JobId,
        candidate: &CandidateId,
    ) -> Result<(), RepositoryError> {
        let mut state = self.state()?;
        if let Some(job) = state.jobs.get_mut(job) {
            job.candidate_progress.remove(candidate);
        }
        Ok(())
    }
}

impl ApplicationRepository for InMemoryPipelineStore {
    fn insert_application(
        &self,
        record: ApplicationRecord,
    ) -> Result<ApplicationRecord, RepositoryError> {
        let mut state = self.state()?;
        let key = (record.job_id.clone(), record.candidate_id.clone());
        if state.applications.contains_key(&key) {
            return Err(RepositoryError::Conflict);
        }
        state.applications.insert(key, record.clone());
        Ok(record)
    }

    fn fetch_application(
        &self,
        job: &JobId,
        candidate: &CandidateId,
    ) -> Result<Option<ApplicationRecord>, RepositoryError> {
        let state = self.state()?;
        Ok(state
            .applications
            .get(&(job.clone(), candidate.clone()))
            .cloned())
    }

    fn save_application(&self, record: ApplicationRecord) -> Result<(), RepositoryError> {
        let mut state = self.state()?;
        let key = (record.job_id.clone(), record.candidate_id.clone());
        match state.applications.get_mut(&key) {
            Some(stored) => {
                *stored = record;
                Ok(())
            }
            None => Err(RepositoryError::NotFound),
        }
    }

    fn delete_application(
        &self,
        job: &JobId,
        candidate: &CandidateId,
    ) -> Result<(), RepositoryError> {
        self.state()?
            .applications
            .remove(&(job.clone(), candidate.clone()))
            .map(|_| ())
            .ok_or(RepositoryError::NotFound)
    }

    fn applications_for_candidate(
        &self,
        candidate: &CandidateId,
    ) -> Result<Vec<ApplicationRecord>, RepositoryError> {
        let state = self.state()?;
        let mut records: Vec<ApplicationRecord> = state
            .applications
            .values()
            .filter(|record| &record.candidate_id == candidate)
            .cloned()
            .collect();
        records.sort_by(|a, b| a.applied_at.cmp(&b.applied_at).then(a.id.cmp(&b.id)));
        Ok(records)
    }

    fn applications_for_job(&self, job: &JobId) -> Result<Vec<ApplicationRecord>, RepositoryError> {
        let state = self.state()?;
        let mut records: Vec<ApplicationRecord> = state
            .applications
            .values()
            .filter(|record| &record.job_id == job)
            .cloned()
            .collect();
        records.sort_by(|a, b| a.candidate_id.cmp(&b.candidate_id));
        Ok(records)
    }
}

impl AptitudeRepository for InMemoryPipelineStore {
    fn insert_test(&self, test: AptitudeTest) -> Result<AptitudeTest, RepositoryError> {
        let mut state = self.state()?;
        let duplicate = state.tests.contains_key(&test.id)
            || state
                .tests
                .values()
                .any(|existing| existing.job_id == test.job_id && existing.round_id == test.round_id);
        if duplicate {
            return Err(RepositoryError::Conflict);
        }
        state.tests.insert(test.id.clone(), test.clone());
        Ok(test)
    }

    fn fetch_test(&self, id: &TestId) -> Result<Option<AptitudeTest>, RepositoryError> {
        Ok(self.state()?.tests.get(id).cloned())
    }

    fn test_for_round(
        &self,
        job: &JobId,
        round: &RoundId,
    ) -> Result<Option<AptitudeTest>, RepositoryError> {
        Ok(self
            .state()?
            .tests
            .values()
            .find(|test| &test.job_id == job && &test.round_id == round)
            .cloned())
    }

    fn save_test(&self, test: AptitudeTest) -> Result<(), RepositoryError> {
        let mut state = self.state()?;
        match state.tests.get_mut(&test.id) {
            Some(stored) => {
                *stored = test;
                Ok(())
            }
            None => Err(RepositoryError::NotFound),
        }
    }

    fn delete_test(&self, id: &TestId) -> Result<(), RepositoryError> {
        let mut state = self.state()?;
        state.tests.remove(id).ok_or(RepositoryError::NotFound)?;
        state.attempts.retain(|(test, _), _| test != id);
        Ok(())
    }

    fn tests_for_job(&self, job: &JobId) -> Result<Vec<AptitudeTest>, RepositoryError> {
        Ok(self
            .state()?
            .tests
            .values()
            .filter(|test| &test.job_id == job)
            .cloned()
            .collect())
    }

    fn upsert_attempt(&self, attempt: TestAttempt) -> Result<TestAttempt, RepositoryError> {
        let mut state = self.state()?;
        let key = (attempt.test_id.clone(), attempt.candidate_id.clone());
        let stored = match state.attempts.get(&key) {
            // The first attempt's id survives overwrites.
            Some(existing) => TestAttempt {
                id: existing.id.clone(),
                ..attempt
            },
            None => attempt,
        };
        state.attempts.insert(key, stored.clone());
        Ok(stored)
    }

    fn fetch_attempt(
        &self,
        test: &TestId,
        candidate: &CandidateId,
    ) -> Result<Option<TestAttempt>, RepositoryError> {
        Ok(self
            .state()?
            .attempts
            .get(&(test.clone(), candidate.clone()))
            .cloned())
    }

    fn delete_attempt(
        &self,
        test: &TestId,
        candidate: &CandidateId,
    ) -> Result<(), RepositoryError> {
        self.state()?
            .attempts
            .remove(&(test.clone(), candidate.clone()));
        Ok(())
    }
}

impl OwnershipCheck for InMemoryPipelineStore {
    fn owns_job(&self, actor: &ActorId, job: &JobId) -> Result<bool, RepositoryError> {
        Ok(self
            .state()?
            .jobs
            .get(job)
            .map(|record| &record.owner == actor)
            .unwrap_or(false))
    }
}
