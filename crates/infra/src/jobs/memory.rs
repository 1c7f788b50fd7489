//! In-memory job store for tests and local development.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use chrono::{DateTime, Utc};

use super::store::{JobStore, JobStoreError};
use super::types::{Job, JobId, JobStatus, WorkerId, truncate_error};

/// In-memory job queue; claim atomicity comes from the write lock.
#[derive(Debug, Default)]
pub struct InMemoryJobStore {
    jobs: RwLock<HashMap<JobId, Job>>,
}

impl InMemoryJobStore {
    pub fn new() -> Self {
        Self {
            jobs: RwLock::new(HashMap::new()),
        }
    }

    pub fn arc() -> Arc<Self> {
        Arc::new(Self::new())
    }

    /// Insert a job exactly as an external producer would.
    pub fn insert(&self, job: Job) {
        self.jobs.write().unwrap().insert(job.id, job);
    }

    pub fn get(&self, job_id: JobId) -> Option<Job> {
        self.jobs.read().unwrap().get(&job_id).cloned()
    }

    /// Jobs currently in `status`, oldest first.
    pub fn with_status(&self, status: JobStatus) -> Vec<Job> {
        let mut jobs: Vec<Job> = self
            .jobs
            .read()
            .unwrap()
            .values()
            .filter(|job| job.status == status)
            .cloned()
            .collect();
        jobs.sort_by_key(|job| (job.created_at, job.id));
        jobs
    }

    fn transition(
        &self,
        job_id: JobId,
        operation: &'static str,
        apply: impl FnOnce(&mut Job),
    ) -> Result<(), JobStoreError> {
        let mut jobs = self.jobs.write().unwrap();
        let job = jobs.get_mut(&job_id).ok_or(JobStoreError::NotFound(job_id))?;
        if job.status != JobStatus::Running {
            return Err(JobStoreError::InvalidState {
                job_id,
                actual: job.status.as_str(),
                operation,
            });
        }
        apply(job);
        Ok(())
    }
}

#[async_trait::async_trait]
impl JobStore for InMemoryJobStore {
    async fn claim_batch(
        &self,
        worker_id: &WorkerId,
        limit: u32,
    ) -> Result<Vec<Job>, JobStoreError> {
        let mut jobs = self.jobs.write().unwrap();
        let now = Utc::now();

        let mut pending: Vec<(DateTime<Utc>, JobId)> = jobs
            .values()
            .filter(|job| job.status == JobStatus::Pending)
            .map(|job| (job.created_at, job.id))
            .collect();
        pending.sort();
        pending.truncate(limit as usize);

        let mut claimed = Vec::with_capacity(pending.len());
        for (_, id) in pending {
            if let Some(job) = jobs.get_mut(&id) {
                job.status = JobStatus::Running;
                job.claimed_at = Some(now);
                job.worker_id = Some(worker_id.as_str().to_string());
                job.attempt_count += 1;
                claimed.push(job.clone());
            }
        }
        Ok(claimed)
    }

    async fn mark_succeeded(&self, job_id: JobId) -> Result<(), JobStoreError> {
        self.transition(job_id, "mark_succeeded", |job| {
            job.status = JobStatus::Succeeded;
            job.completed_at = Some(Utc::now());
            job.worker_id = None;
        })
    }

    async fn mark_failed(&self, job_id: JobId, message: &str) -> Result<(), JobStoreError> {
        let message = truncate_error(message).to_string();
        self.transition(job_id, "mark_failed", move |job| {
            job.status = JobStatus::Failed;
            job.completed_at = Some(Utc::now());
            job.error_message = Some(message);
        })
    }

    async fn requeue(&self, job_id: JobId) -> Result<(), JobStoreError> {
        self.transition(job_id, "requeue", |job| {
            job.status = JobStatus::Pending;
            job.worker_id = None;
            job.claimed_at = None;
        })
    }

    async fn reclaim_stale(&self, before: DateTime<Utc>) -> Result<u64, JobStoreError> {
        let mut jobs = self.jobs.write().unwrap();
        let mut reclaimed = 0;
        for job in jobs.values_mut() {
            let stale =
                job.status == JobStatus::Running && job.claimed_at.is_some_and(|at| at < before);
            if stale {
                job.status = JobStatus::Pending;
                job.worker_id = None;
                job.claimed_at = None;
                reclaimed += 1;
            }
        }
        Ok(reclaimed)
    }
}
