//! Redis-backed cluster cache.

use std::time::Duration;

use redis::aio::ConnectionManager;
use tracing::warn;

use fieldscope_clusters::SiteCluster;
use fieldscope_core::TenantId;

use crate::config::CacheConfig;

use super::{ClusterCache, cache_key};

/// Redis-backed cache client.
///
/// Holds a multiplexed connection that reconnects with backoff; per-command
/// deadlines come from the configured read/write timeouts.
#[derive(Clone)]
pub struct RedisClusterCache {
    conn: ConnectionManager,
    read_timeout: Duration,
    write_timeout: Duration,
}

/// Cache connection error; only surfaces at startup.
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    #[error("cache connection error: {0}")]
    Connect(String),
}

impl RedisClusterCache {
    /// Connect to Redis and hand back a ready cache client.
    pub async fn connect(config: &CacheConfig) -> Result<Self, CacheError> {
        let client =
            redis::Client::open(config.url()).map_err(|e| CacheError::Connect(e.to_string()))?;

        let manager = tokio::time::timeout(
            config.connect_timeout,
            ConnectionManager::new_with_backoff(client, 2, 100, config.max_retries as usize),
        )
        .await
        .map_err(|_| {
            CacheError::Connect(format!(
                "timed out after {:?} connecting to {}:{}",
                config.connect_timeout, config.host, config.port
            ))
        })?
        .map_err(|e| CacheError::Connect(e.to_string()))?;

        Ok(Self {
            conn: manager,
            read_timeout: config.read_timeout,
            write_timeout: config.write_timeout,
        })
    }
}

#[async_trait::async_trait]
impl ClusterCache for RedisClusterCache {
    async fn get(&self, tenant_id: TenantId) -> Option<Vec<SiteCluster>> {
        let mut conn = self.conn.clone();
        let key = cache_key(tenant_id);

        let fetched = tokio::time::timeout(
            self.read_timeout,
            redis::cmd("GET")
                .arg(&key)
                .query_async::<_, Option<String>>(&mut conn),
        )
        .await;

        let payload = match fetched {
            Ok(Ok(payload)) => payload?,
            Ok(Err(e)) => {
                warn!(tenant_id = %tenant_id, error = %e, "cache read failed; treating as miss");
                return None;
            }
            Err(_) => {
                warn!(tenant_id = %tenant_id, "cache read timed out; treating as miss");
                return None;
            }
        };

        match serde_json::from_str(&payload) {
            Ok(clusters) => Some(clusters),
            Err(e) => {
                warn!(
                    tenant_id = %tenant_id,
                    error = %e,
                    "undecodable cache payload; treating as miss"
                );
                None
            }
        }
    }

    async fn put(&self, tenant_id: TenantId, clusters: &[SiteCluster], ttl: Duration) {
        let payload = match serde_json::to_string(clusters) {
            Ok(payload) => payload,
            Err(e) => {
                warn!(tenant_id = %tenant_id, error = %e, "failed to serialize cache payload");
                return;
            }
        };

        let mut conn = self.conn.clone();
        let key = cache_key(tenant_id);
        // EX 0 is rejected by the server.
        let ttl_secs = ttl.as_secs().max(1);

        let written = tokio::time::timeout(
            self.write_timeout,
            redis::cmd("SET")
                .arg(&key)
                .arg(&payload)
                .arg("EX")
                .arg(ttl_secs)
                .query_async::<_, ()>(&mut conn),
        )
        .await;

        match written {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!(tenant_id = %tenant_id, error = %e, "cache write failed"),
            Err(_) => warn!(tenant_id = %tenant_id, "cache write timed out"),
        }
    }

    async fn invalidate(&self, tenant_id: TenantId) {
        let mut conn = self.conn.clone();
        let key = cache_key(tenant_id);

        let deleted = tokio::time::timeout(
            self.write_timeout,
            redis::cmd("DEL").arg(&key).query_async::<_, ()>(&mut conn),
        )
        .await;

        match deleted {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!(tenant_id = %tenant_id, error = %e, "cache invalidate failed"),
            Err(_) => warn!(tenant_id = %tenant_id, "cache invalidate timed out"),
        }
    }
}
