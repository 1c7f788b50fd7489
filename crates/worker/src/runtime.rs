//! Worker runtime: mode selection, tickers, and signal-driven shutdown.

use std::sync::Arc;

use chrono::Utc;
use tokio::signal::unix::{SignalKind, signal};
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use fieldscope_infra::cache::ClusterCache;
use fieldscope_infra::clusters::ClusterStore;
use fieldscope_infra::config::WorkerConfig;
use fieldscope_infra::jobs::JobStore;

use crate::process::{ProcessError, ProcessJobs};

/// Runtime failure; everything here ends the process.
#[derive(Debug, thiserror::Error)]
pub enum RuntimeError {
    #[error("failed to install signal handler: {0}")]
    Signals(#[from] std::io::Error),
    #[error(transparent)]
    Process(#[from] ProcessError),
}

/// Top-level worker loop: either a polling daemon or a single batch.
///
/// The daemon runs two tickers, one claiming batches every `poll_interval`
/// and one sweeping abandoned `RUNNING` claims back to `PENDING` every
/// `reclaim_interval`. Both fire once immediately at startup, so a freshly
/// deployed worker drains backlog (and recovers a crashed predecessor's
/// claims) without waiting a full period.
pub struct WorkerRuntime<J, S, C> {
    jobs: Arc<J>,
    process: ProcessJobs<J, S, C>,
    config: WorkerConfig,
}

impl<J, S, C> WorkerRuntime<J, S, C>
where
    J: JobStore,
    S: ClusterStore,
    C: ClusterCache,
{
    pub fn new(jobs: Arc<J>, process: ProcessJobs<J, S, C>, config: WorkerConfig) -> Self {
        Self {
            jobs,
            process,
            config,
        }
    }

    /// Run in the configured mode until done or interrupted.
    pub async fn run(&self) -> Result<(), RuntimeError> {
        let shutdown = CancellationToken::new();
        spawn_signal_listener(shutdown.clone())?;
        self.run_with_shutdown(&shutdown).await
    }

    /// Run in the configured mode, stopping when `shutdown` fires.
    pub async fn run_with_shutdown(&self, shutdown: &CancellationToken) -> Result<(), RuntimeError> {
        if self.config.run_once {
            self.run_once(shutdown).await
        } else {
            self.run_daemon(shutdown).await;
            Ok(())
        }
    }

    async fn run_once(&self, shutdown: &CancellationToken) -> Result<(), RuntimeError> {
        info!(batch_size = self.config.batch_size, "processing a single batch");
        self.process.execute(self.config.batch_size, shutdown).await?;
        Ok(())
    }

    async fn run_daemon(&self, shutdown: &CancellationToken) {
        info!(
            poll_interval_secs = self.config.poll_interval.as_secs(),
            reclaim_interval_secs = self.config.reclaim_interval.as_secs(),
            batch_size = self.config.batch_size,
            "daemon started"
        );

        let mut poll = tokio::time::interval(self.config.poll_interval);
        let mut reclaim = tokio::time::interval(self.config.reclaim_interval);
        // A slow batch must not be followed by a burst of catch-up ticks.
        poll.set_missed_tick_behavior(MissedTickBehavior::Delay);
        reclaim.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            // Cancellation outranks a simultaneously ready tick.
            tokio::select! {
                biased;

                _ = shutdown.cancelled() => {
                    info!("shutdown requested; daemon stopping");
                    break;
                }
                _ = poll.tick() => {
                    // Batch errors are transient as far as the daemon is
                    // concerned; the next tick retries from scratch.
                    if let Err(e) = self.process.execute(self.config.batch_size, shutdown).await {
                        error!(error = %e, "batch aborted; retrying next tick");
                    }
                }
                _ = reclaim.tick() => {
                    self.reclaim_stale().await;
                }
            }
        }
    }

    /// Flip abandoned `RUNNING` claims back to `PENDING`.
    async fn reclaim_stale(&self) {
        let Ok(age) = chrono::Duration::from_std(self.config.reclaim_after) else {
            error!("reclaim threshold out of range; skipping sweep");
            return;
        };
        let cutoff = Utc::now() - age;

        match self.jobs.reclaim_stale(cutoff).await {
            Ok(0) => {}
            Ok(count) => warn!(count, cutoff = %cutoff, "reclaimed abandoned jobs"),
            Err(e) => error!(error = %e, "stale-claim sweep failed"),
        }
    }
}

/// Cancel `shutdown` on the first SIGINT or SIGTERM.
fn spawn_signal_listener(shutdown: CancellationToken) -> Result<(), RuntimeError> {
    let mut interrupt = signal(SignalKind::interrupt())?;
    let mut terminate = signal(SignalKind::terminate())?;

    tokio::spawn(async move {
        tokio::select! {
            _ = interrupt.recv() => info!("received SIGINT"),
            _ = terminate.recv() => info!("received SIGTERM"),
        }
        shutdown.cancel();
    });

    Ok(())
}
