//! Cluster artifact cache.
//!
//! The cache is advisory: the artifact table stays the source of truth,
//! reads that fail count as misses, and writes and deletes are best-effort.
//! Nothing in this module ever fails a job.

use std::time::Duration;

use async_trait::async_trait;

use fieldscope_clusters::SiteCluster;
use fieldscope_core::TenantId;

pub mod memory;
pub mod redis;

pub use self::redis::{CacheError, RedisClusterCache};
pub use memory::InMemoryClusterCache;

/// Fast read path for cluster payloads.
#[async_trait]
pub trait ClusterCache: Send + Sync {
    /// Cached payload, or `None` on a miss.
    ///
    /// Transport errors are logged and reported as a miss.
    async fn get(&self, tenant_id: TenantId) -> Option<Vec<SiteCluster>>;

    /// Best-effort write with a TTL; errors are logged and swallowed.
    async fn put(&self, tenant_id: TenantId, clusters: &[SiteCluster], ttl: Duration);

    /// Best-effort delete; errors are logged and swallowed.
    async fn invalidate(&self, tenant_id: TenantId);
}

/// Cache key for a tenant's cluster payload.
pub fn cache_key(tenant_id: TenantId) -> String {
    format!("cluster:{tenant_id}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn key_is_derived_from_the_tenant_uuid() {
        let tenant = TenantId::from_uuid(Uuid::nil());
        assert_eq!(
            cache_key(tenant),
            "cluster:00000000-0000-0000-0000-000000000000"
        );
    }
}
