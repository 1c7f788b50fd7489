//! In-memory cluster cache for tests and local development.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};

use fieldscope_clusters::SiteCluster;
use fieldscope_core::TenantId;

use super::ClusterCache;

/// In-memory cache with per-entry expiry.
#[derive(Debug, Default)]
pub struct InMemoryClusterCache {
    entries: RwLock<HashMap<TenantId, Entry>>,
}

#[derive(Debug)]
struct Entry {
    clusters: Vec<SiteCluster>,
    expires_at: Instant,
}

impl InMemoryClusterCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn arc() -> Arc<Self> {
        Arc::new(Self::new())
    }

    /// Whether a live entry exists for the tenant.
    pub fn contains(&self, tenant_id: TenantId) -> bool {
        self.entries
            .read()
            .unwrap()
            .get(&tenant_id)
            .is_some_and(|entry| entry.expires_at > Instant::now())
    }
}

#[async_trait::async_trait]
impl ClusterCache for InMemoryClusterCache {
    async fn get(&self, tenant_id: TenantId) -> Option<Vec<SiteCluster>> {
        let entries = self.entries.read().unwrap();
        let entry = entries.get(&tenant_id)?;
        if entry.expires_at <= Instant::now() {
            return None;
        }
        Some(entry.clusters.clone())
    }

    async fn put(&self, tenant_id: TenantId, clusters: &[SiteCluster], ttl: Duration) {
        self.entries.write().unwrap().insert(
            tenant_id,
            Entry {
                clusters: clusters.to_vec(),
                expires_at: Instant::now() + ttl,
            },
        );
    }

    async fn invalidate(&self, tenant_id: TenantId) {
        self.entries.write().unwrap().remove(&tenant_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cluster(key: &str) -> SiteCluster {
        SiteCluster {
            key: key.to_string(),
            region: "north".to_string(),
            organization: "acme".to_string(),
            site_ids: Vec::new(),
        }
    }

    #[tokio::test]
    async fn put_then_get_round_trips() {
        let cache = InMemoryClusterCache::new();
        let tenant = TenantId::new();
        let clusters = vec![cluster("north/acme")];

        cache.put(tenant, &clusters, Duration::from_secs(60)).await;

        assert_eq!(cache.get(tenant).await, Some(clusters));
        assert!(cache.contains(tenant));
    }

    #[tokio::test]
    async fn expired_entries_read_as_misses() {
        let cache = InMemoryClusterCache::new();
        let tenant = TenantId::new();

        cache
            .put(tenant, &[cluster("north/acme")], Duration::ZERO)
            .await;

        assert_eq!(cache.get(tenant).await, None);
    }

    #[tokio::test]
    async fn invalidate_removes_the_entry() {
        let cache = InMemoryClusterCache::new();
        let tenant = TenantId::new();
        let other = TenantId::new();

        cache
            .put(tenant, &[cluster("north/acme")], Duration::from_secs(60))
            .await;
        cache
            .put(other, &[cluster("south/acme")], Duration::from_secs(60))
            .await;

        cache.invalidate(tenant).await;

        assert_eq!(cache.get(tenant).await, None);
        assert!(cache.get(other).await.is_some());
    }
}
