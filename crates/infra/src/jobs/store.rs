//! Job storage abstraction.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::types::{Job, JobId, WorkerId};

/// Durable queue + status machine over the job table.
///
/// Implementations must make [`claim_batch`](JobStore::claim_batch)
/// linearizable: two concurrent callers never receive the same job.
#[async_trait]
pub trait JobStore: Send + Sync {
    /// Atomically claim up to `limit` pending jobs for `worker_id`.
    ///
    /// Claimed jobs come back `RUNNING` with the claim timestamp, the worker
    /// identity, and an incremented attempt count, ordered oldest first
    /// (ties broken by id).
    async fn claim_batch(
        &self,
        worker_id: &WorkerId,
        limit: u32,
    ) -> Result<Vec<Job>, JobStoreError>;

    /// `RUNNING -> SUCCEEDED`; stamps completion, clears the worker identity.
    async fn mark_succeeded(&self, job_id: JobId) -> Result<(), JobStoreError>;

    /// `RUNNING -> FAILED`; stamps completion, stores the truncated message.
    ///
    /// The worker identity is kept on the row for post-mortems.
    async fn mark_failed(&self, job_id: JobId, message: &str) -> Result<(), JobStoreError>;

    /// `RUNNING -> PENDING`; clears the claim, preserves the attempt count.
    ///
    /// Issued only by the claiming worker during graceful shutdown.
    async fn requeue(&self, job_id: JobId) -> Result<(), JobStoreError>;

    /// Flip every `RUNNING` job claimed before `before` back to `PENDING`.
    ///
    /// Janitor entry point for recovering jobs abandoned by crashed workers;
    /// returns how many rows were reclaimed.
    async fn reclaim_stale(&self, before: DateTime<Utc>) -> Result<u64, JobStoreError>;
}

/// Job store error.
#[derive(Debug, Clone, thiserror::Error)]
pub enum JobStoreError {
    #[error("job not found: {0}")]
    NotFound(JobId),
    #[error("job {job_id} is {actual}, not RUNNING, in {operation}")]
    InvalidState {
        job_id: JobId,
        actual: &'static str,
        operation: &'static str,
    },
    #[error("integrity violation in {operation}: {message}")]
    Integrity {
        operation: &'static str,
        message: String,
    },
    #[error("storage error in {operation}: {message}")]
    Storage {
        operation: &'static str,
        message: String,
    },
}
