//! Compute-or-reuse cluster calculation for a single tenant.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tracing::{info, instrument, warn};

use fieldscope_clusters::ClusterArtifact;
use fieldscope_core::TenantId;
use fieldscope_infra::cache::ClusterCache;
use fieldscope_infra::clusters::{ClusterStore, ClusterStoreError};

/// What a calculation ended up doing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CalculateOutcome {
    /// The stored artifact still matched the inputs; only the cache was
    /// refreshed.
    Reused,
    /// Inputs changed; a fresh artifact was stored and published.
    Recomputed,
}

/// Calculation failure. The caller records it against the job.
#[derive(Debug, thiserror::Error)]
pub enum CalculateError {
    #[error("tenant {0} has no input records to cluster")]
    EmptyInputs(TenantId),
    #[error(transparent)]
    Store(#[from] ClusterStoreError),
}

/// Reconciles the artifact table and the cache for one tenant.
///
/// The stored artifact is reused whenever its source fingerprint still
/// matches the tenant's current inputs, so repeated jobs for an unchanged
/// tenant cost one fingerprint query each. The operation is idempotent and
/// safe to run concurrently for the same tenant: the artifact upsert is
/// atomic and the cache converges on whichever write landed last.
pub struct CalculateClusters<S, C> {
    store: Arc<S>,
    cache: Arc<C>,
    cache_ttl: Duration,
}

impl<S, C> CalculateClusters<S, C>
where
    S: ClusterStore,
    C: ClusterCache,
{
    pub fn new(store: Arc<S>, cache: Arc<C>, cache_ttl: Duration) -> Self {
        Self {
            store,
            cache,
            cache_ttl,
        }
    }

    #[instrument(skip(self), fields(tenant_id = %tenant_id), err)]
    pub async fn execute(&self, tenant_id: TenantId) -> Result<CalculateOutcome, CalculateError> {
        let fingerprint = self.store.compute_fingerprint(tenant_id).await?;

        if let Some(artifact) = self.store.get(tenant_id).await? {
            if artifact.source_fingerprint == fingerprint {
                // The artifact is current; only the cache entry may have
                // expired in the meantime.
                self.cache
                    .put(tenant_id, &artifact.clusters, self.cache_ttl)
                    .await;
                info!(clusters = artifact.clusters.len(), "reused stored clusters");
                return Ok(CalculateOutcome::Reused);
            }
        }

        let sites = self.store.load_sites(tenant_id).await?;
        if sites.is_empty() {
            warn!("no input records; nothing to cluster");
            return Err(CalculateError::EmptyInputs(tenant_id));
        }

        let artifact = ClusterArtifact::build(tenant_id, &sites, fingerprint, Utc::now());
        self.store.upsert(&artifact).await?;

        // Invalidate before publishing so no reader can observe the previous
        // payload after the new artifact is durable.
        self.cache.invalidate(tenant_id).await;
        self.cache
            .put(tenant_id, &artifact.clusters, self.cache_ttl)
            .await;

        info!(
            clusters = artifact.clusters.len(),
            sites = sites.len(),
            "recomputed clusters"
        );
        Ok(CalculateOutcome::Recomputed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use fieldscope_clusters::{FieldSite, SiteId};
    use fieldscope_infra::cache::InMemoryClusterCache;
    use fieldscope_infra::clusters::InMemoryClusterStore;

    const TTL: Duration = Duration::from_secs(300);

    fn site(tenant_id: TenantId, region: &str, organization: &str) -> FieldSite {
        FieldSite {
            id: SiteId::new(),
            tenant_id,
            name: format!("{region} station"),
            region: region.to_string(),
            organization: organization.to_string(),
            updated_at: Utc::now(),
        }
    }

    fn calculator(
        store: &Arc<InMemoryClusterStore>,
        cache: &Arc<InMemoryClusterCache>,
    ) -> CalculateClusters<InMemoryClusterStore, InMemoryClusterCache> {
        CalculateClusters::new(store.clone(), cache.clone(), TTL)
    }

    #[tokio::test]
    async fn first_run_recomputes_and_publishes() {
        let store = InMemoryClusterStore::arc();
        let cache = InMemoryClusterCache::arc();
        let tenant = TenantId::new();
        store.insert_site(site(tenant, "north", "acme"));
        store.insert_site(site(tenant, "south", "acme"));

        let outcome = calculator(&store, &cache).execute(tenant).await.unwrap();

        assert_eq!(outcome, CalculateOutcome::Recomputed);
        let artifact = store.artifact(tenant).unwrap();
        assert_eq!(artifact.clusters.len(), 2);
        assert_eq!(cache.get(tenant).await.as_deref(), Some(&artifact.clusters[..]));
    }

    #[tokio::test]
    async fn unchanged_inputs_reuse_the_stored_artifact() {
        let store = InMemoryClusterStore::arc();
        let cache = InMemoryClusterCache::arc();
        let tenant = TenantId::new();
        store.insert_site(site(tenant, "north", "acme"));
        let calc = calculator(&store, &cache);

        calc.execute(tenant).await.unwrap();
        let first = store.artifact(tenant).unwrap();

        let outcome = calc.execute(tenant).await.unwrap();

        assert_eq!(outcome, CalculateOutcome::Reused);
        assert_eq!(store.artifact(tenant).unwrap(), first);
    }

    #[tokio::test]
    async fn reuse_refreshes_an_evicted_cache_entry() {
        let store = InMemoryClusterStore::arc();
        let cache = InMemoryClusterCache::arc();
        let tenant = TenantId::new();
        store.insert_site(site(tenant, "north", "acme"));
        let calc = calculator(&store, &cache);
        calc.execute(tenant).await.unwrap();

        cache.invalidate(tenant).await;
        assert!(cache.get(tenant).await.is_none());

        let outcome = calc.execute(tenant).await.unwrap();

        assert_eq!(outcome, CalculateOutcome::Reused);
        assert!(cache.get(tenant).await.is_some());
    }

    #[tokio::test]
    async fn touched_inputs_force_a_recompute() {
        let store = InMemoryClusterStore::arc();
        let cache = InMemoryClusterCache::arc();
        let tenant = TenantId::new();
        store.insert_site(site(tenant, "north", "acme"));
        let calc = calculator(&store, &cache);
        calc.execute(tenant).await.unwrap();

        store.insert_site(site(tenant, "south", "zenith"));

        let outcome = calc.execute(tenant).await.unwrap();

        assert_eq!(outcome, CalculateOutcome::Recomputed);
        let artifact = store.artifact(tenant).unwrap();
        assert_eq!(artifact.clusters.len(), 2);
        assert_eq!(
            artifact.source_fingerprint,
            store.compute_fingerprint(tenant).await.unwrap()
        );
        assert_eq!(cache.get(tenant).await.as_deref(), Some(&artifact.clusters[..]));
    }

    #[tokio::test]
    async fn empty_inputs_are_a_calculation_failure() {
        let store = InMemoryClusterStore::arc();
        let cache = InMemoryClusterCache::arc();
        let tenant = TenantId::new();

        let result = calculator(&store, &cache).execute(tenant).await;

        assert!(matches!(result, Err(CalculateError::EmptyInputs(t)) if t == tenant));
        assert!(store.artifact(tenant).is_none());
        assert!(cache.get(tenant).await.is_none());
    }

    #[tokio::test]
    async fn store_failures_propagate() {
        let store = InMemoryClusterStore::arc();
        let cache = InMemoryClusterCache::arc();
        let tenant = TenantId::new();
        store.insert_site(site(tenant, "north", "acme"));
        store.fail_tenant(tenant);

        let result = calculator(&store, &cache).execute(tenant).await;

        assert!(matches!(result, Err(CalculateError::Store(_))));
    }
}
