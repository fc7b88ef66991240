//! Application state shared across handlers.

use crate::metrics::Metrics;
use locmap_core::config::AppConfig;
use locmap_core::rootdomain::{self, RootDomainFn};
use locmap_store::ScanStore;
use prometheus::Registry;
use std::sync::Arc;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    /// Application configuration.
    pub config: Arc<AppConfig>,
    /// The durable store; single source of truth for queue state.
    pub store: Arc<dyn ScanStore>,
    /// Coordinator metrics.
    pub metrics: Arc<Metrics>,
    /// Registry backing the /metrics endpoint.
    pub registry: Arc<Registry>,
    /// Root-domain extractor applied at result submission.
    pub root_domain_fn: RootDomainFn,
}

impl AppState {
    /// Create application state with the default PSL-backed root-domain
    /// extractor. The metrics are registered here; registering twice on
    /// the same registry is a startup bug and panics.
    pub fn new(config: AppConfig, store: Arc<dyn ScanStore>) -> Self {
        let registry = Registry::new();
        let metrics = Metrics::new();
        metrics
            .register(&registry)
            .expect("metrics registration failed");

        Self {
            config: Arc::new(config),
            store,
            metrics: Arc::new(metrics),
            registry: Arc::new(registry),
            root_domain_fn: rootdomain::root_domain,
        }
    }
}
