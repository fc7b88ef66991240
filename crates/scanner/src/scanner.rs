//! Scanner orchestration: workers, heartbeat, graceful shutdown.

use crate::client::CoordinatorClient;
use crate::dns::ResolverPool;
use crate::metrics::ScannerMetrics;
use crate::worker::Worker;
use anyhow::{Context, Result};
use locmap_core::config::ScannerConfig;
use std::sync::Arc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

/// A scanner process: one session, N workers, one heartbeat task.
pub struct Scanner {
    config: Arc<ScannerConfig>,
    client: Arc<CoordinatorClient>,
    metrics: Arc<ScannerMetrics>,
    /// Graceful-shutdown signal, distinct from hard cancellation:
    /// workers drain their current batch before exiting.
    shutdown: CancellationToken,
}

impl Scanner {
    pub fn new(config: ScannerConfig, metrics: Arc<ScannerMetrics>) -> Result<Self> {
        let client = CoordinatorClient::new(&config.coordinator_url, &config.token)
            .context("build coordinator client")?;
        Ok(Self {
            config: Arc::new(config),
            client: Arc::new(client),
            metrics,
            shutdown: CancellationToken::new(),
        })
    }

    /// The session id this process registered under.
    pub fn session_id(&self) -> &str {
        self.client.session_id()
    }

    /// Signal workers to stop claiming new batches. Idempotent.
    pub fn initiate_shutdown(&self) {
        self.shutdown.cancel();
    }

    /// Run workers and heartbeat until all workers exit (graceful
    /// shutdown) or `cancel` fires (hard stop).
    pub async fn run(&self, cancel: CancellationToken) -> Result<()> {
        tracing::info!(
            workers = self.config.workers,
            session_id = %self.session_id(),
            coordinator = %self.config.coordinator_url,
            "Scanner starting"
        );

        let pool = Arc::new(
            ResolverPool::new(&self.config.dns, self.config.workers)
                .context("build resolver pool")?,
        );

        // Heartbeat keeps running through a graceful drain; it stops
        // only on hard cancellation so in-flight batches stay owned.
        let heartbeat_cancel = cancel.child_token();
        let heartbeat = tokio::spawn(run_heartbeat(
            self.client.clone(),
            self.config.clone(),
            self.metrics.clone(),
            heartbeat_cancel.clone(),
        ));

        let mut workers = JoinSet::new();
        for id in 1..=self.config.workers {
            let worker = Worker::new(
                id,
                self.config.clone(),
                self.client.clone(),
                pool.clone(),
                self.metrics.clone(),
                self.shutdown.clone(),
            );
            workers.spawn(worker.run(cancel.clone()));
        }

        while workers.join_next().await.is_some() {}
        heartbeat_cancel.cancel();
        heartbeat.await.ok();

        tracing::info!("Scanner stopped");
        Ok(())
    }
}

/// Periodic keepalive. Logs once on the 0 -> 1 error transition and
/// once on recovery, like the worker circuit breaker.
async fn run_heartbeat(
    client: Arc<CoordinatorClient>,
    config: Arc<ScannerConfig>,
    metrics: Arc<ScannerMetrics>,
    cancel: CancellationToken,
) {
    tracing::info!(
        interval_secs = config.heartbeat_interval_secs,
        "Heartbeat started"
    );

    let mut ticker = tokio::time::interval(config.heartbeat_interval());
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    // The first tick fires immediately; announce the session right away.
    let mut consecutive_errors: u32 = 0;

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                tracing::info!("Heartbeat stopped");
                return;
            }
            _ = ticker.tick() => {}
        }

        match client.heartbeat().await {
            Ok(()) => {
                if consecutive_errors > 0 {
                    tracing::info!(errors = consecutive_errors, "Heartbeat recovered");
                }
                consecutive_errors = 0;
                tracing::debug!("Heartbeat sent");
            }
            Err(e) => {
                metrics.heartbeat_failures.inc();
                consecutive_errors += 1;
                if consecutive_errors == 1 {
                    tracing::warn!(error = %e, "Heartbeat failed");
                }
            }
        }
    }
}
