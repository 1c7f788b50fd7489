//! In-memory cluster store for tests and local development.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, RwLock};

use fieldscope_clusters::{ClusterArtifact, FieldSite, Fingerprint};
use fieldscope_core::TenantId;

use super::store::{ClusterStore, ClusterStoreError};

/// In-memory artifact and site storage, with optional fault injection.
#[derive(Debug, Default)]
pub struct InMemoryClusterStore {
    artifacts: RwLock<HashMap<TenantId, ClusterArtifact>>,
    sites: RwLock<HashMap<TenantId, Vec<FieldSite>>>,
    failing: RwLock<HashSet<TenantId>>,
}

impl InMemoryClusterStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn arc() -> Arc<Self> {
        Arc::new(Self::new())
    }

    /// Stage an input record for its tenant.
    pub fn insert_site(&self, site: FieldSite) {
        self.sites
            .write()
            .unwrap()
            .entry(site.tenant_id)
            .or_default()
            .push(site);
    }

    /// Stored artifact, if any.
    pub fn artifact(&self, tenant_id: TenantId) -> Option<ClusterArtifact> {
        self.artifacts.read().unwrap().get(&tenant_id).cloned()
    }

    /// Make every store call for `tenant_id` fail from now on.
    pub fn fail_tenant(&self, tenant_id: TenantId) {
        self.failing.write().unwrap().insert(tenant_id);
    }

    fn check(&self, tenant_id: TenantId, operation: &'static str) -> Result<(), ClusterStoreError> {
        if self.failing.read().unwrap().contains(&tenant_id) {
            return Err(ClusterStoreError::Storage {
                operation,
                message: format!("injected failure for tenant {tenant_id}"),
            });
        }
        Ok(())
    }
}

#[async_trait::async_trait]
impl ClusterStore for InMemoryClusterStore {
    async fn get(
        &self,
        tenant_id: TenantId,
    ) -> Result<Option<ClusterArtifact>, ClusterStoreError> {
        self.check(tenant_id, "get_artifact")?;
        Ok(self.artifacts.read().unwrap().get(&tenant_id).cloned())
    }

    async fn upsert(&self, artifact: &ClusterArtifact) -> Result<(), ClusterStoreError> {
        self.check(artifact.tenant_id, "upsert_artifact")?;
        self.artifacts
            .write()
            .unwrap()
            .insert(artifact.tenant_id, artifact.clone());
        Ok(())
    }

    async fn compute_fingerprint(
        &self,
        tenant_id: TenantId,
    ) -> Result<Fingerprint, ClusterStoreError> {
        self.check(tenant_id, "compute_fingerprint")?;
        let sites = self.sites.read().unwrap();
        let inputs = sites
            .get(&tenant_id)
            .map(|sites| sites.iter().map(FieldSite::fingerprint_input).collect())
            .unwrap_or_else(Vec::new);
        Ok(Fingerprint::digest(inputs))
    }

    async fn load_sites(&self, tenant_id: TenantId) -> Result<Vec<FieldSite>, ClusterStoreError> {
        self.check(tenant_id, "load_sites")?;
        let mut sites = self
            .sites
            .read()
            .unwrap()
            .get(&tenant_id)
            .cloned()
            .unwrap_or_default();
        sites.sort_by_key(|site| site.id);
        Ok(sites)
    }
}
