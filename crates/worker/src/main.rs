use std::sync::Arc;

use anyhow::Context;

use fieldscope_infra::cache::RedisClusterCache;
use fieldscope_infra::clusters::PostgresClusterStore;
use fieldscope_infra::config::WorkerConfig;
use fieldscope_infra::db;
use fieldscope_infra::jobs::{PostgresJobStore, WorkerId};
use fieldscope_observability::LogConfig;
use fieldscope_worker::{CalculateClusters, ProcessJobs, WorkerRuntime};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = WorkerConfig::from_env().context("loading configuration")?;

    fieldscope_observability::init(&LogConfig {
        environment: config.environment.clone(),
        level: config.log_level.clone(),
    });

    let worker_id = WorkerId::generate();
    tracing::info!(
        worker_id = %worker_id,
        run_once = config.run_once,
        environment = %config.environment,
        "fieldscope worker starting"
    );

    let pool = db::connect(&config.database).await.with_context(|| {
        format!(
            "connecting to postgres at {}:{}",
            config.database.host, config.database.port
        )
    })?;

    let cache = RedisClusterCache::connect(&config.cache).await.with_context(|| {
        format!(
            "connecting to redis at {}:{}",
            config.cache.host, config.cache.port
        )
    })?;

    let jobs = Arc::new(PostgresJobStore::new(pool.clone()));
    let store = Arc::new(PostgresClusterStore::new(pool.clone()));
    let cache = Arc::new(cache);

    let calculate = CalculateClusters::new(store, cache, config.cache.ttl);
    let process = ProcessJobs::new(jobs.clone(), calculate, worker_id);
    let runtime = WorkerRuntime::new(jobs, process, config);

    let result = runtime.run().await;

    // Stores and the cache manager go first; the pool is drained last.
    drop(runtime);
    pool.close().await;
    result?;

    tracing::info!("fieldscope worker stopped");
    Ok(())
}
