//! Core job types.

use chrono::{DateTime, Utc};
use uuid::Uuid;

use fieldscope_core::TenantId;

/// Stored error messages are capped at this many bytes.
pub const MAX_ERROR_MESSAGE_BYTES: usize = 2048;

/// Unique job identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct JobId(pub Uuid);

impl JobId {
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for JobId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Job execution status.
///
/// Transitions are monotonic apart from the two recovery paths back to
/// `Pending` (shutdown requeue and stale reclaim).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobStatus {
    /// Queued, waiting to be claimed
    Pending,
    /// Claimed by a worker
    Running,
    /// Completed successfully (terminal)
    Succeeded,
    /// Completed with an error (terminal)
    Failed,
}

impl JobStatus {
    /// Column value for this status.
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "PENDING",
            JobStatus::Running => "RUNNING",
            JobStatus::Succeeded => "SUCCEEDED",
            JobStatus::Failed => "FAILED",
        }
    }

    /// Parse a column value; `None` for anything outside the enum.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "PENDING" => Some(JobStatus::Pending),
            "RUNNING" => Some(JobStatus::Running),
            "SUCCEEDED" => Some(JobStatus::Succeeded),
            "FAILED" => Some(JobStatus::Failed),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Succeeded | JobStatus::Failed)
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One cluster-computation job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Job {
    pub id: JobId,
    /// Tenant whose clusters this job recomputes
    pub tenant_id: TenantId,
    pub status: JobStatus,
    pub created_at: DateTime<Utc>,
    /// Set while a worker owns the claim
    pub claimed_at: Option<DateTime<Utc>>,
    /// Set when the job reaches a terminal status
    pub completed_at: Option<DateTime<Utc>>,
    /// Number of times the job has entered `Running`
    pub attempt_count: u32,
    /// Identity of the claiming worker, while claimed
    pub worker_id: Option<String>,
    /// Last failure, truncated to [`MAX_ERROR_MESSAGE_BYTES`]
    pub error_message: Option<String>,
}

impl Job {
    /// A fresh `PENDING` job, as an external producer would insert it.
    pub fn new(tenant_id: TenantId) -> Self {
        Self {
            id: JobId::new(),
            tenant_id,
            status: JobStatus::Pending,
            created_at: Utc::now(),
            claimed_at: None,
            completed_at: None,
            attempt_count: 0,
            worker_id: None,
            error_message: None,
        }
    }
}

/// Stable per-process claim owner identity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerId(String);

impl WorkerId {
    /// Derive an identity from host, pid, and a random suffix.
    pub fn generate() -> Self {
        let host = std::env::var("HOSTNAME").unwrap_or_else(|_| "worker".to_string());
        let uuid = Uuid::now_v7().simple().to_string();
        // The tail of a v7 uuid is the random part.
        let suffix = &uuid[uuid.len() - 8..];
        Self(format!("{host}-{}-{suffix}", std::process::id()))
    }

    pub fn from_string(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for WorkerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Cap an error message at [`MAX_ERROR_MESSAGE_BYTES`] without splitting a
/// character.
pub fn truncate_error(message: &str) -> &str {
    if message.len() <= MAX_ERROR_MESSAGE_BYTES {
        return message;
    }
    let mut end = MAX_ERROR_MESSAGE_BYTES;
    while !message.is_char_boundary(end) {
        end -= 1;
    }
    &message[..end]
}
