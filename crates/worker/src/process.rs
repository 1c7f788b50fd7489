//! Batch draining of the cluster job queue.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{error, info, instrument, warn};

use fieldscope_infra::cache::ClusterCache;
use fieldscope_infra::clusters::ClusterStore;
use fieldscope_infra::jobs::{Job, JobStore, JobStoreError, WorkerId};

use crate::calculate::CalculateClusters;

/// Per-batch accounting, logged after every tick.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchSummary {
    pub claimed: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub requeued: usize,
}

/// Batch-level failure. Per-job calculation failures never surface here;
/// they are recorded on the job and counted in the summary.
#[derive(Debug, thiserror::Error)]
pub enum ProcessError {
    #[error(transparent)]
    Jobs(#[from] JobStoreError),
}

/// Claims a batch of pending jobs and drives each through the calculator.
pub struct ProcessJobs<J, S, C> {
    jobs: Arc<J>,
    calculate: CalculateClusters<S, C>,
    worker_id: WorkerId,
}

impl<J, S, C> ProcessJobs<J, S, C>
where
    J: JobStore,
    S: ClusterStore,
    C: ClusterCache,
{
    pub fn new(jobs: Arc<J>, calculate: CalculateClusters<S, C>, worker_id: WorkerId) -> Self {
        Self {
            jobs,
            calculate,
            worker_id,
        }
    }

    pub fn worker_id(&self) -> &WorkerId {
        &self.worker_id
    }

    /// Claim up to `batch_size` pending jobs and process them in claim order.
    ///
    /// A calculation failure marks its job `FAILED` and moves on. A job-store
    /// failure aborts the batch; whatever was left `RUNNING` is picked up by
    /// the stale-claim reclaimer. When `shutdown` fires between jobs, the
    /// unprocessed remainder is requeued instead of executed.
    #[instrument(skip(self, shutdown), fields(worker_id = %self.worker_id), err)]
    pub async fn execute(
        &self,
        batch_size: u32,
        shutdown: &CancellationToken,
    ) -> Result<BatchSummary, ProcessError> {
        let claimed = self.jobs.claim_batch(&self.worker_id, batch_size).await?;
        if claimed.is_empty() {
            return Ok(BatchSummary::default());
        }

        let mut summary = BatchSummary {
            claimed: claimed.len(),
            ..BatchSummary::default()
        };

        let mut queue = claimed.into_iter();
        while let Some(job) = queue.next() {
            if shutdown.is_cancelled() {
                self.requeue_remaining(job, &mut queue, &mut summary).await;
                break;
            }
            self.process_one(job, &mut summary).await?;
        }

        info!(
            claimed = summary.claimed,
            succeeded = summary.succeeded,
            failed = summary.failed,
            requeued = summary.requeued,
            "batch complete"
        );
        Ok(summary)
    }

    async fn process_one(&self, job: Job, summary: &mut BatchSummary) -> Result<(), ProcessError> {
        match self.calculate.execute(job.tenant_id).await {
            Ok(outcome) => {
                self.jobs.mark_succeeded(job.id).await?;
                summary.succeeded += 1;
                info!(job_id = %job.id, tenant_id = %job.tenant_id, ?outcome, "job succeeded");
            }
            Err(e) => {
                self.jobs.mark_failed(job.id, &e.to_string()).await?;
                summary.failed += 1;
                warn!(job_id = %job.id, tenant_id = %job.tenant_id, error = %e, "job failed");
            }
        }
        Ok(())
    }

    /// Return every still-unprocessed claim to the queue.
    async fn requeue_remaining(
        &self,
        first: Job,
        rest: &mut std::vec::IntoIter<Job>,
        summary: &mut BatchSummary,
    ) {
        info!("shutdown requested; requeueing the rest of the batch");
        for job in std::iter::once(first).chain(rest) {
            match self.jobs.requeue(job.id).await {
                Ok(()) => {
                    summary.requeued += 1;
                }
                // Keep sweeping; anything left RUNNING is reclaimed later.
                Err(e) => {
                    error!(job_id = %job.id, error = %e, "requeue failed");
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use chrono::Utc;
    use fieldscope_clusters::{FieldSite, SiteId};
    use fieldscope_core::TenantId;
    use fieldscope_infra::cache::InMemoryClusterCache;
    use fieldscope_infra::clusters::InMemoryClusterStore;
    use fieldscope_infra::jobs::{InMemoryJobStore, JobStatus};

    struct Fixture {
        jobs: Arc<InMemoryJobStore>,
        store: Arc<InMemoryClusterStore>,
        process: ProcessJobs<InMemoryJobStore, InMemoryClusterStore, InMemoryClusterCache>,
    }

    fn fixture() -> Fixture {
        let jobs = InMemoryJobStore::arc();
        let store = InMemoryClusterStore::arc();
        let cache = InMemoryClusterCache::arc();
        let calculate =
            CalculateClusters::new(store.clone(), cache, Duration::from_secs(300));
        let process = ProcessJobs::new(
            jobs.clone(),
            calculate,
            WorkerId::from_string("test-worker-1"),
        );
        Fixture {
            jobs,
            store,
            process,
        }
    }

    fn tenant_with_site(store: &InMemoryClusterStore) -> TenantId {
        let tenant = TenantId::new();
        store.insert_site(FieldSite {
            id: SiteId::new(),
            tenant_id: tenant,
            name: "station".to_string(),
            region: "north".to_string(),
            organization: "acme".to_string(),
            updated_at: Utc::now(),
        });
        tenant
    }

    #[tokio::test]
    async fn empty_queue_is_a_quiet_no_op() {
        let fx = fixture();

        let summary = fx
            .process
            .execute(10, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(summary, BatchSummary::default());
    }

    #[tokio::test]
    async fn successful_jobs_are_counted_and_marked() {
        let fx = fixture();
        let job = Job::new(tenant_with_site(&fx.store));
        let job_id = job.id;
        fx.jobs.insert(job);

        let summary = fx
            .process
            .execute(10, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(summary.claimed, 1);
        assert_eq!(summary.succeeded, 1);
        assert_eq!(summary.failed, 0);
        assert_eq!(fx.jobs.get(job_id).unwrap().status, JobStatus::Succeeded);
    }

    #[tokio::test]
    async fn a_failing_job_does_not_stop_the_batch() {
        let fx = fixture();
        let bad = Job::new(TenantId::new());
        let bad_id = bad.id;
        fx.jobs.insert(bad);

        let good = Job {
            created_at: Utc::now() + chrono::Duration::seconds(1),
            ..Job::new(tenant_with_site(&fx.store))
        };
        let good_id = good.id;
        fx.jobs.insert(good);

        let summary = fx
            .process
            .execute(10, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(summary.succeeded, 1);
        assert_eq!(summary.failed, 1);

        let bad = fx.jobs.get(bad_id).unwrap();
        assert_eq!(bad.status, JobStatus::Failed);
        assert!(bad.error_message.unwrap().contains("no input records"));
        assert_eq!(fx.jobs.get(good_id).unwrap().status, JobStatus::Succeeded);
    }

    #[tokio::test]
    async fn a_cancelled_token_requeues_the_whole_claim() {
        let fx = fixture();
        for _ in 0..3 {
            fx.jobs.insert(Job::new(tenant_with_site(&fx.store)));
        }
        let shutdown = CancellationToken::new();
        shutdown.cancel();

        let summary = fx.process.execute(10, &shutdown).await.unwrap();

        assert_eq!(summary.claimed, 3);
        assert_eq!(summary.requeued, 3);
        assert_eq!(summary.succeeded, 0);
        assert_eq!(fx.jobs.with_status(JobStatus::Pending).len(), 3);
    }
}
