//! Client and worker behavior against a stub coordinator.

use axum::Router;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::routing::post;
use axum::Json;
use locmap_core::config::ScannerConfig;
use locmap_scanner::CoordinatorClient;
use locmap_scanner::dns::ResolverPool;
use locmap_scanner::metrics::ScannerMetrics;
use locmap_scanner::worker::Worker;
use serde_json::{Value, json};
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::Mutex;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

const STUB_TOKEN: &str = "stub-token";

/// What the stub hands out and what it has seen.
#[derive(Clone, Default)]
struct StubState {
    /// Next batch to serve, if any.
    batch: Arc<Mutex<Option<(i64, Vec<String>)>>>,
    submissions: Arc<Mutex<Vec<Value>>>,
    heartbeats: Arc<Mutex<u32>>,
}

fn authorized(headers: &HeaderMap) -> bool {
    headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v == format!("Bearer {STUB_TOKEN}"))
}

async fn stub_jobs(
    State(state): State<StubState>,
    headers: HeaderMap,
    Json(_body): Json<Value>,
) -> (StatusCode, Json<Value>) {
    if !authorized(&headers) {
        return (
            StatusCode::UNAUTHORIZED,
            Json(json!({"code": "unauthorized", "message": "unknown token"})),
        );
    }
    match state.batch.lock().unwrap().take() {
        Some((id, domains)) => (
            StatusCode::OK,
            Json(json!({"batch_id": id, "domains": domains})),
        ),
        None => (StatusCode::OK, Json(json!({"domains": []}))),
    }
}

async fn stub_heartbeat(
    State(state): State<StubState>,
    headers: HeaderMap,
    Json(_body): Json<Value>,
) -> (StatusCode, Json<Value>) {
    if !authorized(&headers) {
        return (
            StatusCode::UNAUTHORIZED,
            Json(json!({"code": "unauthorized", "message": "unknown token"})),
        );
    }
    *state.heartbeats.lock().unwrap() += 1;
    (StatusCode::OK, Json(json!({"ok": true})))
}

async fn stub_results(
    State(state): State<StubState>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> (StatusCode, Json<Value>) {
    if !authorized(&headers) {
        return (
            StatusCode::UNAUTHORIZED,
            Json(json!({"code": "unauthorized", "message": "unknown token"})),
        );
    }
    let accepted = body["loc_records"].as_array().map_or(0, Vec::len);
    state.submissions.lock().unwrap().push(body);
    (StatusCode::OK, Json(json!({"accepted": accepted})))
}

async fn spawn_stub() -> (StubState, String) {
    let state = StubState::default();
    let app = Router::new()
        .route("/api/scanner/jobs", post(stub_jobs))
        .route("/api/scanner/heartbeat", post(stub_heartbeat))
        .route("/api/scanner/results", post(stub_results))
        .with_state(state.clone());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr: SocketAddr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.ok();
    });

    (state, format!("http://{addr}"))
}

fn scanner_config(url: &str) -> ScannerConfig {
    serde_json::from_value(json!({
        "coordinator_url": url,
        "token": STUB_TOKEN,
        "workers": 1,
        "empty_queue_delay_secs": 60,
        "dns": {"nameservers": ["127.0.0.1"], "timeout_secs": 1}
    }))
    .unwrap()
}

#[tokio::test]
async fn session_id_is_minted_per_client() {
    let a = CoordinatorClient::new("http://localhost:1", "t").unwrap();
    let b = CoordinatorClient::new("http://localhost:1", "t").unwrap();
    assert_ne!(a.session_id(), b.session_id());
    assert_eq!(a.session_id().len(), 36);
}

#[tokio::test]
async fn get_batch_distinguishes_work_from_empty() {
    let (state, url) = spawn_stub().await;
    let client = CoordinatorClient::new(&url, STUB_TOKEN).unwrap();

    assert!(client.get_batch().await.unwrap().is_none());

    *state.batch.lock().unwrap() = Some((7, vec!["a.example".into(), "b.example".into()]));
    let batch = client.get_batch().await.unwrap().unwrap();
    assert_eq!(batch.id, 7);
    assert_eq!(batch.domains, vec!["a.example", "b.example"]);
}

#[tokio::test]
async fn bad_token_surfaces_as_an_error() {
    let (_state, url) = spawn_stub().await;
    let client = CoordinatorClient::new(&url, "wrong-token").unwrap();

    let err = client.get_batch().await.unwrap_err();
    assert!(err.to_string().contains("401"), "{err}");
    assert!(client.heartbeat().await.is_err());
}

#[tokio::test]
async fn heartbeat_and_submit_round_trip() {
    let (state, url) = spawn_stub().await;
    let client = CoordinatorClient::new(&url, STUB_TOKEN).unwrap();

    client.heartbeat().await.unwrap();
    assert_eq!(*state.heartbeats.lock().unwrap(), 1);

    let record = locmap_core::parse_loc(
        "x.example.com",
        "52 22 23.000 N 4 53 32.000 E -2.00m 1m 10000m 10m",
    )
    .unwrap();
    let accepted = client.submit_batch(42, 10, vec![record]).await.unwrap();
    assert_eq!(accepted, 1);

    let submissions = state.submissions.lock().unwrap();
    assert_eq!(submissions.len(), 1);
    assert_eq!(submissions[0]["batch_id"], 42);
    assert_eq!(submissions[0]["domains_checked"], 10);
    assert_eq!(submissions[0]["loc_records"][0]["fqdn"], "x.example.com");
}

#[tokio::test]
async fn worker_leaves_the_empty_queue_wait_on_shutdown() {
    let (_state, url) = spawn_stub().await;
    let config = Arc::new(scanner_config(&url));
    let client = Arc::new(CoordinatorClient::new(&url, STUB_TOKEN).unwrap());
    let pool = Arc::new(ResolverPool::new(&config.dns, 1).unwrap());
    let metrics = Arc::new(ScannerMetrics::new());

    let shutdown = CancellationToken::new();
    let cancel = CancellationToken::new();
    let worker = Worker::new(1, config, client, pool, metrics, shutdown.clone());
    let handle = tokio::spawn(worker.run(cancel));

    // Let the worker hit the empty queue and settle into its
    // (long, jittered) wait.
    tokio::time::sleep(Duration::from_millis(300)).await;
    shutdown.cancel();

    // The configured delay is 60s; a prompt exit proves the wait is
    // interruptible by the graceful-shutdown signal.
    tokio::time::timeout(Duration::from_secs(5), handle)
        .await
        .expect("worker did not exit after shutdown")
        .unwrap();
}
