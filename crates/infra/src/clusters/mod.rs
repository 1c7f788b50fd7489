//! Cluster artifact persistence.
//!
//! The artifact table is the authoritative value for a tenant's clusters;
//! the cache (see [`crate::cache`]) only mirrors it. The store also owns the
//! input fingerprint: a digest of the tenant's site records that decides
//! whether a stored artifact can be reused.

pub mod memory;
pub mod postgres;
pub mod store;

pub use memory::InMemoryClusterStore;
pub use postgres::PostgresClusterStore;
pub use store::{ClusterStore, ClusterStoreError};
