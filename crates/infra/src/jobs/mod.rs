//! Durable job queue over Postgres with an explicit status machine.
//!
//! ## Design
//!
//! - Jobs are tenant-scoped rows created by external producers; the engine
//!   owns every mutation after insert
//! - Claiming a batch is atomic across concurrent workers (row locks with
//!   skip-locked), so no two workers ever run the same job
//! - Status moves `PENDING -> RUNNING -> {SUCCEEDED, FAILED}`; the only
//!   paths back to `PENDING` are the shutdown requeue and the stale-claim
//!   janitor
//! - `FAILED` jobs are never retried by the engine
//!
//! ## Components
//!
//! - `Job`: one row of the queue, with claim and completion metadata
//! - `JobStore`: persistence abstraction (Postgres or in-memory)
//! - `WorkerId`: stable per-process claim owner identity

pub mod memory;
pub mod postgres;
pub mod store;
pub mod types;

pub use memory::InMemoryJobStore;
pub use postgres::PostgresJobStore;
pub use store::{JobStore, JobStoreError};
pub use types::{Job, JobId, JobStatus, WorkerId};
