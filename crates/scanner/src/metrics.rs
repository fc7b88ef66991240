//! Scanner-side Prometheus metrics.
//!
//! Same arrangement as the coordinator: a metrics value on an explicit
//! registry, passed to whoever records into it, served from a small
//! dedicated listener.

use anyhow::{Context, Result};
use axum::Router;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::get;
use prometheus::{Encoder, IntCounter, Registry, TextEncoder};
use std::sync::Arc;

/// All scanner metrics.
pub struct ScannerMetrics {
    pub batches_claimed: IntCounter,
    pub domains_checked: IntCounter,
    pub loc_records_found: IntCounter,
    pub lookup_errors: IntCounter,
    pub parse_failures: IntCounter,
    pub submit_failures: IntCounter,
    pub heartbeat_failures: IntCounter,
}

impl ScannerMetrics {
    pub fn new() -> Self {
        Self {
            batches_claimed: IntCounter::new(
                "locmap_scanner_batches_claimed_total",
                "Batches claimed from the coordinator",
            )
            .expect("metric creation failed"),
            domains_checked: IntCounter::new(
                "locmap_scanner_domains_checked_total",
                "FQDNs looked up",
            )
            .expect("metric creation failed"),
            loc_records_found: IntCounter::new(
                "locmap_scanner_loc_records_found_total",
                "LOC records found and parsed",
            )
            .expect("metric creation failed"),
            lookup_errors: IntCounter::new(
                "locmap_scanner_lookup_errors_total",
                "DNS lookups that errored (timeouts included)",
            )
            .expect("metric creation failed"),
            parse_failures: IntCounter::new(
                "locmap_scanner_parse_failures_total",
                "LOC records that failed even lenient parsing",
            )
            .expect("metric creation failed"),
            submit_failures: IntCounter::new(
                "locmap_scanner_submit_failures_total",
                "Batches lost after exhausting submit retries",
            )
            .expect("metric creation failed"),
            heartbeat_failures: IntCounter::new(
                "locmap_scanner_heartbeat_failures_total",
                "Heartbeat requests that failed",
            )
            .expect("metric creation failed"),
        }
    }

    /// Register every metric with `registry`.
    pub fn register(&self, registry: &Registry) -> prometheus::Result<()> {
        registry.register(Box::new(self.batches_claimed.clone()))?;
        registry.register(Box::new(self.domains_checked.clone()))?;
        registry.register(Box::new(self.loc_records_found.clone()))?;
        registry.register(Box::new(self.lookup_errors.clone()))?;
        registry.register(Box::new(self.parse_failures.clone()))?;
        registry.register(Box::new(self.submit_failures.clone()))?;
        registry.register(Box::new(self.heartbeat_failures.clone()))?;
        Ok(())
    }
}

impl Default for ScannerMetrics {
    fn default() -> Self {
        Self::new()
    }
}

async fn metrics_handler(State(registry): State<Arc<Registry>>) -> impl IntoResponse {
    let encoder = TextEncoder::new();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&registry.gather(), &mut buffer) {
        tracing::error!(error = %e, "Failed to encode metrics");
        return (StatusCode::INTERNAL_SERVER_ERROR, Vec::new());
    }
    (StatusCode::OK, buffer)
}

/// Serve `/metrics` for this scanner until the process exits.
pub async fn serve_metrics(addr: &str, registry: Arc<Registry>) -> Result<()> {
    let app = Router::new()
        .route("/metrics", get(metrics_handler))
        .with_state(registry);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind metrics listener to {addr}"))?;
    tracing::info!("Metrics listening on {addr}");
    axum::serve(listener, app).await.context("metrics server")
}
