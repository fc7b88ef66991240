//! Route configuration.

use crate::auth::{admin_auth_middleware, scanner_auth_middleware};
use crate::handlers;
use crate::metrics::metrics_handler;
use crate::state::AppState;
use axum::Router;
use axum::middleware;
use axum::routing::{delete, get, post};
use tower_http::trace::TraceLayer;

/// Create the application router.
pub fn create_router(state: AppState) -> Router {
    let scanner_routes = Router::new()
        .route("/api/scanner/jobs", post(handlers::get_jobs))
        .route("/api/scanner/heartbeat", post(handlers::heartbeat))
        .route("/api/scanner/results", post(handlers::submit_results))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            scanner_auth_middleware,
        ));

    let admin_routes = Router::new()
        .route(
            "/api/admin/clients",
            post(handlers::register_client).get(handlers::list_clients),
        )
        .route("/api/admin/clients/{id}", delete(handlers::delete_client))
        .route("/api/admin/discover-files", post(handlers::discover_files))
        .route("/api/admin/reset-scan", post(handlers::reset_scan))
        .route("/api/admin/manual-scan", post(handlers::manual_scan))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            admin_auth_middleware,
        ));

    let public_routes = Router::new()
        .route("/api/public/records", get(handlers::list_records))
        .route("/api/public/records.geojson", get(handlers::records_geojson))
        .route("/api/public/stats", get(handlers::get_stats))
        // Health check (intentionally unauthenticated for probes)
        .route("/health", get(handlers::health_check));

    let mut router = Router::new()
        .merge(scanner_routes)
        .merge(admin_routes)
        .merge(public_routes);

    // SECURITY: when enabled, network-restrict /metrics to your
    // Prometheus scrapers; it is unauthenticated by design.
    if state.config.server.metrics_enabled {
        router = router.merge(Router::new().route("/metrics", get(metrics_handler)));
    }

    router.layer(TraceLayer::new_for_http()).with_state(state)
}
