//! The reaper: returns work claimed by dead scanners to the queue.
//!
//! Liveness is the only signal. A slow scanner that keeps heartbeating
//! keeps its batches; a crashed or partitioned one loses them after
//! `heartbeat_timeout`. Sessions and clients themselves are never
//! deleted here, only batch state moves.

use crate::metrics::Metrics;
use locmap_core::config::ReaperConfig;
use locmap_store::ScanStore;
use std::sync::Arc;
use std::time::Duration;
use time::OffsetDateTime;
use tokio_util::sync::CancellationToken;

/// Periodic reclaim task.
pub struct Reaper {
    store: Arc<dyn ScanStore>,
    config: ReaperConfig,
    heartbeat_timeout: Duration,
    metrics: Arc<Metrics>,
}

impl Reaper {
    pub fn new(
        store: Arc<dyn ScanStore>,
        config: ReaperConfig,
        heartbeat_timeout: Duration,
        metrics: Arc<Metrics>,
    ) -> Self {
        Self {
            store,
            config,
            heartbeat_timeout,
            metrics,
        }
    }

    /// Run until cancelled. Ticks immediately on startup, then on the
    /// configured interval.
    pub async fn run(self, cancel: CancellationToken) {
        tracing::info!(
            interval_secs = self.config.interval_secs,
            batch_timeout_secs = self.config.batch_timeout_secs,
            heartbeat_timeout_secs = self.heartbeat_timeout.as_secs(),
            "Reaper started"
        );

        let mut ticker = tokio::time::interval(self.config.interval());
        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    tracing::info!("Reaper stopped");
                    return;
                }
                _ = ticker.tick() => self.run_once().await,
            }
        }
    }

    /// One reaper tick: dead-session reclaim first, then the wall-time
    /// fallback for pre-session legacy rows.
    pub async fn run_once(&self) {
        self.metrics.reaper_runs.inc();
        let now = OffsetDateTime::now_utc();

        match self
            .store
            .reclaim_dead_sessions(now - self.heartbeat_timeout)
            .await
        {
            Ok(0) => {}
            Ok(released) => {
                self.metrics.reaper_batches_released.inc_by(released as u64);
                tracing::info!(released, "Reaper: reclaimed batches from dead sessions");
            }
            Err(e) => {
                tracing::warn!(error = %e, "Reaper: dead-session reclaim failed");
            }
        }

        match self
            .store
            .reclaim_stale_unsessioned(now - self.config.batch_timeout())
            .await
        {
            Ok(0) => {}
            Ok(released) => {
                self.metrics.reaper_batches_released.inc_by(released as u64);
                tracing::info!(released, "Reaper: reclaimed stale sessionless batches");
            }
            Err(e) => {
                tracing::warn!(error = %e, "Reaper: wall-time reclaim failed");
            }
        }
    }
}
