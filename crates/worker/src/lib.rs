//! Cluster job worker.
//!
//! Drains the `cluster_jobs` queue and keeps per-tenant cluster artifacts
//! fresh: each job triggers a compute-or-reuse calculation whose result is
//! persisted in Postgres and published through the Redis cache.
//!
//! ## Components
//!
//! - `calculate`: the per-tenant compute-or-reuse calculation
//! - `process`: batch claiming and per-job status transitions
//! - `runtime`: daemon / run-once modes, tickers, signal handling

pub mod calculate;
pub mod process;
pub mod runtime;

pub use calculate::{CalculateClusters, CalculateError, CalculateOutcome};
pub use process::{BatchSummary, ProcessError, ProcessJobs};
pub use runtime::{RuntimeError, WorkerRuntime};
