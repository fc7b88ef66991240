//! Prometheus metrics for the coordinator.
//!
//! Counters and gauges live in a [`Metrics`] value that is constructed
//! once at startup, registered against an explicit [`Registry`], and
//! passed to the components that record into it. The `/metrics`
//! endpoint encodes that registry; enable it only on networks where
//! your Prometheus scraper lives.

use crate::state::AppState;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use locmap_store::ScanStore;
use prometheus::{Encoder, Histogram, HistogramOpts, IntCounter, IntGauge, Registry, TextEncoder};
use std::sync::Arc;
use std::time::Duration;
use time::OffsetDateTime;
use tokio_util::sync::CancellationToken;

/// All coordinator metrics.
pub struct Metrics {
    // Counters
    pub reaper_runs: IntCounter,
    pub reaper_batches_released: IntCounter,
    pub batches_completed: IntCounter,
    pub domains_checked: IntCounter,
    pub loc_discoveries: IntCounter,
    pub batch_processing_seconds: Histogram,

    // Gauges refreshed from the store snapshot
    pub files_total: IntGauge,
    pub files_pending: IntGauge,
    pub files_processing: IntGauge,
    pub files_complete: IntGauge,
    pub batches_pending: IntGauge,
    pub batches_in_flight: IntGauge,
    pub loc_records_total: IntGauge,
    pub root_domains_with_loc: IntGauge,
    pub scanners_total: IntGauge,
    pub scanners_active: IntGauge,
}

impl Metrics {
    /// Build the metric set. Construction is infallible by design; the
    /// names are compile-time constants, so `expect` here only guards
    /// against programmer typos.
    pub fn new() -> Self {
        Self {
            reaper_runs: IntCounter::new(
                "locmap_reaper_runs_total",
                "Total number of reaper ticks",
            )
            .expect("metric creation failed"),
            reaper_batches_released: IntCounter::new(
                "locmap_reaper_batches_released_total",
                "Total number of batches returned to pending by the reaper",
            )
            .expect("metric creation failed"),
            batches_completed: IntCounter::new(
                "locmap_batches_completed_total",
                "Total number of batches completed by scanners",
            )
            .expect("metric creation failed"),
            domains_checked: IntCounter::new(
                "locmap_domains_checked_total",
                "Total number of FQDNs looked up by scanners",
            )
            .expect("metric creation failed"),
            loc_discoveries: IntCounter::new(
                "locmap_loc_discoveries_total",
                "Total number of LOC records accepted",
            )
            .expect("metric creation failed"),
            batch_processing_seconds: Histogram::with_opts(
                HistogramOpts::new(
                    "locmap_batch_processing_duration_seconds",
                    "Claim-to-submit duration per batch",
                )
                .buckets(vec![1.0, 5.0, 15.0, 60.0, 300.0, 900.0, 3600.0]),
            )
            .expect("metric creation failed"),
            files_total: IntGauge::new("locmap_domain_files_total", "Corpus files known")
                .expect("metric creation failed"),
            files_pending: IntGauge::new("locmap_domain_files_pending", "Corpus files pending")
                .expect("metric creation failed"),
            files_processing: IntGauge::new(
                "locmap_domain_files_processing",
                "Corpus files being fed or drained",
            )
            .expect("metric creation failed"),
            files_complete: IntGauge::new("locmap_domain_files_complete", "Corpus files complete")
                .expect("metric creation failed"),
            batches_pending: IntGauge::new("locmap_batches_pending", "Batches waiting for a claim")
                .expect("metric creation failed"),
            batches_in_flight: IntGauge::new("locmap_batches_in_flight", "Batches claimed")
                .expect("metric creation failed"),
            loc_records_total: IntGauge::new("locmap_loc_records_total", "LOC records stored")
                .expect("metric creation failed"),
            root_domains_with_loc: IntGauge::new(
                "locmap_root_domains_with_loc",
                "Distinct root domains with at least one LOC record",
            )
            .expect("metric creation failed"),
            scanners_total: IntGauge::new("locmap_scanners_total", "Registered scanner clients")
                .expect("metric creation failed"),
            scanners_active: IntGauge::new(
                "locmap_scanners_active",
                "Scanner sessions with a recent heartbeat",
            )
            .expect("metric creation failed"),
        }
    }

    /// Register every metric with `registry`.
    pub fn register(&self, registry: &Registry) -> prometheus::Result<()> {
        registry.register(Box::new(self.reaper_runs.clone()))?;
        registry.register(Box::new(self.reaper_batches_released.clone()))?;
        registry.register(Box::new(self.batches_completed.clone()))?;
        registry.register(Box::new(self.domains_checked.clone()))?;
        registry.register(Box::new(self.loc_discoveries.clone()))?;
        registry.register(Box::new(self.batch_processing_seconds.clone()))?;
        registry.register(Box::new(self.files_total.clone()))?;
        registry.register(Box::new(self.files_pending.clone()))?;
        registry.register(Box::new(self.files_processing.clone()))?;
        registry.register(Box::new(self.files_complete.clone()))?;
        registry.register(Box::new(self.batches_pending.clone()))?;
        registry.register(Box::new(self.batches_in_flight.clone()))?;
        registry.register(Box::new(self.loc_records_total.clone()))?;
        registry.register(Box::new(self.root_domains_with_loc.clone()))?;
        registry.register(Box::new(self.scanners_total.clone()))?;
        registry.register(Box::new(self.scanners_active.clone()))?;
        Ok(())
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Handler for GET /metrics.
pub async fn metrics_handler(State(state): State<AppState>) -> impl IntoResponse {
    let encoder = TextEncoder::new();
    let families = state.registry.gather();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&families, &mut buffer) {
        tracing::error!(error = %e, "Failed to encode metrics");
        return (StatusCode::INTERNAL_SERVER_ERROR, Vec::new());
    }
    (StatusCode::OK, buffer)
}

/// Periodically refreshes the gauges from a store snapshot.
pub struct Updater {
    store: Arc<dyn ScanStore>,
    metrics: Arc<Metrics>,
    interval: Duration,
    heartbeat_timeout: Duration,
}

impl Updater {
    pub fn new(
        store: Arc<dyn ScanStore>,
        metrics: Arc<Metrics>,
        interval: Duration,
        heartbeat_timeout: Duration,
    ) -> Self {
        Self {
            store,
            metrics,
            interval,
            heartbeat_timeout,
        }
    }

    /// Run until cancelled. Updates once immediately, then on each tick.
    pub async fn run(self, cancel: CancellationToken) {
        tracing::info!(interval_secs = self.interval.as_secs(), "Metrics updater started");

        let mut ticker = tokio::time::interval(self.interval);
        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    tracing::info!("Metrics updater stopped");
                    return;
                }
                _ = ticker.tick() => self.update().await,
            }
        }
    }

    async fn update(&self) {
        let cutoff = OffsetDateTime::now_utc() - self.heartbeat_timeout;
        let snapshot = match self.store.stats_snapshot(cutoff).await {
            Ok(s) => s,
            Err(e) => {
                tracing::warn!(error = %e, "Metrics updater: snapshot failed");
                return;
            }
        };

        self.metrics.files_total.set(snapshot.files_total);
        self.metrics.files_pending.set(snapshot.files_pending);
        self.metrics.files_processing.set(snapshot.files_processing);
        self.metrics.files_complete.set(snapshot.files_complete);
        self.metrics.batches_pending.set(snapshot.batches_pending);
        self.metrics.batches_in_flight.set(snapshot.batches_in_flight);
        self.metrics.loc_records_total.set(snapshot.loc_records_total);
        self.metrics
            .root_domains_with_loc
            .set(snapshot.root_domains_with_loc);
        self.metrics.scanners_total.set(snapshot.scanners_total);
        self.metrics.scanners_active.set(snapshot.scanners_active);
    }
}
