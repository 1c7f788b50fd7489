//! Postgres-backed job store.
//!
//! Claiming uses a conditional `UPDATE ... RETURNING` over a skip-locked
//! subselect, so concurrent workers partition the pending set instead of
//! contending on it. Terminal transitions are conditional updates that touch
//! a row only while it is `RUNNING`; an update that matches nothing is
//! classified with a follow-up status read.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgPool, Row};
use tracing::instrument;

use fieldscope_core::TenantId;

use super::store::{JobStore, JobStoreError};
use super::types::{Job, JobId, JobStatus, WorkerId, truncate_error};

/// Postgres-backed job queue.
#[derive(Debug, Clone)]
pub struct PostgresJobStore {
    pool: Arc<PgPool>,
}

impl PostgresJobStore {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool: Arc::new(pool),
        }
    }

    /// Classify a conditional update that touched no rows.
    async fn classify_skipped(&self, job_id: JobId, operation: &'static str) -> JobStoreError {
        let row = sqlx::query("SELECT status FROM cluster_jobs WHERE id = $1")
            .bind(job_id.as_uuid())
            .fetch_optional(&*self.pool)
            .await;

        match row {
            Ok(None) => JobStoreError::NotFound(job_id),
            Ok(Some(row)) => match row.try_get::<String, _>("status") {
                Ok(status) => match JobStatus::parse(&status) {
                    Some(status) => JobStoreError::InvalidState {
                        job_id,
                        actual: status.as_str(),
                        operation,
                    },
                    None => JobStoreError::Integrity {
                        operation,
                        message: format!("job {job_id} has unknown status {status:?}"),
                    },
                },
                Err(e) => map_sqlx_error(operation, e),
            },
            Err(e) => map_sqlx_error(operation, e),
        }
    }
}

#[async_trait::async_trait]
impl JobStore for PostgresJobStore {
    #[instrument(skip(self), fields(worker_id = %worker_id), err)]
    async fn claim_batch(
        &self,
        worker_id: &WorkerId,
        limit: u32,
    ) -> Result<Vec<Job>, JobStoreError> {
        let rows = sqlx::query(
            r#"
            UPDATE cluster_jobs
            SET status = 'RUNNING',
                claimed_at = NOW(),
                worker_id = $1,
                attempt_count = attempt_count + 1
            WHERE id IN (
                SELECT id
                FROM cluster_jobs
                WHERE status = 'PENDING'
                ORDER BY created_at ASC, id ASC
                LIMIT $2
                FOR UPDATE SKIP LOCKED
            )
            RETURNING
                id,
                tenant_id,
                status,
                created_at,
                claimed_at,
                completed_at,
                attempt_count,
                worker_id,
                error_message
            "#,
        )
        .bind(worker_id.as_str())
        .bind(i64::from(limit))
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("claim_batch", e))?;

        let mut jobs = Vec::with_capacity(rows.len());
        for row in rows {
            let job_row = JobRow::from_row(&row).map_err(|e| map_sqlx_error("claim_batch", e))?;
            jobs.push(job_row.into_job("claim_batch")?);
        }

        // RETURNING order is unspecified; restore claim order.
        jobs.sort_by_key(|job| (job.created_at, job.id));
        Ok(jobs)
    }

    #[instrument(skip(self), fields(job_id = %job_id), err)]
    async fn mark_succeeded(&self, job_id: JobId) -> Result<(), JobStoreError> {
        let result = sqlx::query(
            r#"
            UPDATE cluster_jobs
            SET status = 'SUCCEEDED',
                completed_at = NOW(),
                worker_id = NULL
            WHERE id = $1 AND status = 'RUNNING'
            "#,
        )
        .bind(job_id.as_uuid())
        .execute(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("mark_succeeded", e))?;

        if result.rows_affected() == 0 {
            return Err(self.classify_skipped(job_id, "mark_succeeded").await);
        }
        Ok(())
    }

    #[instrument(skip(self, message), fields(job_id = %job_id), err)]
    async fn mark_failed(&self, job_id: JobId, message: &str) -> Result<(), JobStoreError> {
        let result = sqlx::query(
            r#"
            UPDATE cluster_jobs
            SET status = 'FAILED',
                completed_at = NOW(),
                error_message = $2
            WHERE id = $1 AND status = 'RUNNING'
            "#,
        )
        .bind(job_id.as_uuid())
        .bind(truncate_error(message))
        .execute(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("mark_failed", e))?;

        if result.rows_affected() == 0 {
            return Err(self.classify_skipped(job_id, "mark_failed").await);
        }
        Ok(())
    }

    #[instrument(skip(self), fields(job_id = %job_id), err)]
    async fn requeue(&self, job_id: JobId) -> Result<(), JobStoreError> {
        let result = sqlx::query(
            r#"
            UPDATE cluster_jobs
            SET status = 'PENDING',
                worker_id = NULL,
                claimed_at = NULL
            WHERE id = $1 AND status = 'RUNNING'
            "#,
        )
        .bind(job_id.as_uuid())
        .execute(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("requeue", e))?;

        if result.rows_affected() == 0 {
            return Err(self.classify_skipped(job_id, "requeue").await);
        }
        Ok(())
    }

    #[instrument(skip(self), fields(before = %before), err)]
    async fn reclaim_stale(&self, before: DateTime<Utc>) -> Result<u64, JobStoreError> {
        let result = sqlx::query(
            r#"
            UPDATE cluster_jobs
            SET status = 'PENDING',
                worker_id = NULL,
                claimed_at = NULL
            WHERE status = 'RUNNING' AND claimed_at < $1
            "#,
        )
        .bind(before)
        .execute(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("reclaim_stale", e))?;

        Ok(result.rows_affected())
    }
}

/// Map SQLx errors to JobStoreError.
fn map_sqlx_error(operation: &'static str, err: sqlx::Error) -> JobStoreError {
    match err {
        sqlx::Error::Database(db_err) => {
            let message = match db_err.code() {
                Some(code) => format!("{} (SQLSTATE {})", db_err.message(), code),
                None => db_err.message().to_string(),
            };
            // Class 23 is an integrity-constraint violation; anything here
            // is a schema-level bug, not a transient fault.
            if db_err.code().is_some_and(|code| code.starts_with("23")) {
                JobStoreError::Integrity { operation, message }
            } else {
                JobStoreError::Storage { operation, message }
            }
        }
        sqlx::Error::PoolClosed => JobStoreError::Storage {
            operation,
            message: "connection pool closed".to_string(),
        },
        other => JobStoreError::Storage {
            operation,
            message: other.to_string(),
        },
    }
}

// SQLx row types

#[derive(Debug)]
struct JobRow {
    id: uuid::Uuid,
    tenant_id: uuid::Uuid,
    status: String,
    created_at: DateTime<Utc>,
    claimed_at: Option<DateTime<Utc>>,
    completed_at: Option<DateTime<Utc>>,
    attempt_count: i32,
    worker_id: Option<String>,
    error_message: Option<String>,
}

impl<'r> sqlx::FromRow<'r, sqlx::postgres::PgRow> for JobRow {
    fn from_row(row: &'r sqlx::postgres::PgRow) -> Result<Self, sqlx::Error> {
        Ok(JobRow {
            id: row.try_get("id")?,
            tenant_id: row.try_get("tenant_id")?,
            status: row.try_get("status")?,
            created_at: row.try_get("created_at")?,
            claimed_at: row.try_get("claimed_at")?,
            completed_at: row.try_get("completed_at")?,
            attempt_count: row.try_get("attempt_count")?,
            worker_id: row.try_get("worker_id")?,
            error_message: row.try_get("error_message")?,
        })
    }
}

impl JobRow {
    fn into_job(self, operation: &'static str) -> Result<Job, JobStoreError> {
        let status = JobStatus::parse(&self.status).ok_or_else(|| JobStoreError::Integrity {
            operation,
            message: format!("job {} has unknown status {:?}", self.id, self.status),
        })?;

        Ok(Job {
            id: JobId::from_uuid(self.id),
            tenant_id: TenantId::from_uuid(self.tenant_id),
            status,
            created_at: self.created_at,
            claimed_at: self.claimed_at,
            completed_at: self.completed_at,
            attempt_count: self.attempt_count.max(0) as u32,
            worker_id: self.worker_id,
            error_message: self.error_message,
        })
    }
}
