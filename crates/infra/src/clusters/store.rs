//! Cluster artifact storage abstraction.

use async_trait::async_trait;

use fieldscope_clusters::{ClusterArtifact, FieldSite, Fingerprint};
use fieldscope_core::TenantId;

/// Read/write access to cluster artifacts and their input records.
#[async_trait]
pub trait ClusterStore: Send + Sync {
    /// Point lookup of the stored artifact for a tenant.
    async fn get(&self, tenant_id: TenantId)
    -> Result<Option<ClusterArtifact>, ClusterStoreError>;

    /// Overwrite the tenant's artifact atomically.
    async fn upsert(&self, artifact: &ClusterArtifact) -> Result<(), ClusterStoreError>;

    /// Digest of the tenant's current input set.
    ///
    /// Same logical state, same digest; compared against an artifact's
    /// stored fingerprint to decide reuse.
    async fn compute_fingerprint(
        &self,
        tenant_id: TenantId,
    ) -> Result<Fingerprint, ClusterStoreError>;

    /// Load the tenant's input records, ordered by site id.
    async fn load_sites(&self, tenant_id: TenantId) -> Result<Vec<FieldSite>, ClusterStoreError>;
}

/// Cluster store error.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ClusterStoreError {
    #[error("invalid artifact for tenant {tenant_id}: {message}")]
    InvalidData {
        tenant_id: TenantId,
        message: String,
    },
    #[error("storage error in {operation}: {message}")]
    Storage {
        operation: &'static str,
        message: String,
    },
}
