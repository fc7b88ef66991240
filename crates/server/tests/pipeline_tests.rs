//! End-to-end pipeline scenarios: feeder over a stub upstream, crash
//! reclaim, rediscovery, backpressure/resume, and upstream outage.

mod common;

use axum::extract::{Path as AxumPath, State};
use axum::http::StatusCode;
use axum::routing::get;
use axum::{Json, Router};
use common::TestServer;
use common::fixtures::{loc_record_json, xz_compress};
use locmap_core::config::{FeederConfig, UpstreamConfig};
use locmap_server::feeder::Feeder;
use locmap_server::reaper::Reaper;
use locmap_store::ScanStore;
use serde_json::json;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use time::OffsetDateTime;
use tokio_util::sync::CancellationToken;

/// In-process upstream corpus stub.
#[derive(Clone)]
struct StubUpstream {
    files: Arc<HashMap<String, Vec<u8>>>,
    fail_downloads: Arc<AtomicBool>,
}

async fn stub_tree(State(stub): State<StubUpstream>) -> Json<serde_json::Value> {
    let tree: Vec<_> = stub
        .files
        .iter()
        .map(|(path, data)| json!({"path": path, "type": "blob", "size": data.len()}))
        .collect();
    Json(json!({"tree": tree, "truncated": false}))
}

async fn stub_download(
    State(stub): State<StubUpstream>,
    AxumPath(path): AxumPath<String>,
) -> (StatusCode, Vec<u8>) {
    if stub.fail_downloads.load(Ordering::SeqCst) {
        return (StatusCode::INTERNAL_SERVER_ERROR, b"corpus outage".to_vec());
    }
    match stub.files.get(&path) {
        Some(data) => (StatusCode::OK, data.clone()),
        None => (StatusCode::NOT_FOUND, Vec::new()),
    }
}

/// Serve `files` (path -> xz bytes); returns the stub handle and the
/// upstream config pointing at it.
async fn spawn_upstream(files: HashMap<String, Vec<u8>>) -> (StubUpstream, UpstreamConfig) {
    let stub = StubUpstream {
        files: Arc::new(files),
        fail_downloads: Arc::new(AtomicBool::new(false)),
    };

    let app = Router::new()
        .route("/tree", get(stub_tree))
        .route("/files/{*path}", get(stub_download))
        .with_state(stub.clone());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr: SocketAddr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.ok();
    });

    let config = UpstreamConfig {
        catalog_url: format!("http://{addr}/tree"),
        download_base_url: format!("http://{addr}/files/"),
        token: None,
    };
    (stub, config)
}

fn feeder_config(upstream: UpstreamConfig, batch_size: usize, max_pending: i64) -> FeederConfig {
    FeederConfig {
        batch_size,
        max_pending_batches: max_pending,
        poll_interval_secs: 1,
        upstream,
    }
}

/// Ten FQDNs, one per line, with a comment and a blank line thrown in.
fn ten_line_corpus() -> Vec<u8> {
    let mut body = String::from("# corpus fixture\n\n");
    for i in 1..=10 {
        body.push_str(&format!("host{i}.example.com\n"));
    }
    body.into_bytes()
}

async fn wait_for<F, Fut>(what: &str, mut check: F)
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    let deadline = tokio::time::Instant::now() + Duration::from_secs(15);
    loop {
        if check().await {
            return;
        }
        if tokio::time::Instant::now() > deadline {
            panic!("timed out waiting for {what}");
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
}

#[tokio::test]
async fn happy_path_file_feeds_scans_and_completes() {
    let server = TestServer::new().await;
    let (_, token) = server.register_scanner("happy").await;

    let corpus = xz_compress(&ten_line_corpus()).await;
    let (_stub, upstream) =
        spawn_upstream(HashMap::from([("data/a/a00.txt.xz".to_string(), corpus)])).await;

    let store = server.store();
    store
        .upsert_file("data/a/a00.txt.xz", "https://unused.example/a00", 1)
        .await
        .unwrap();

    let cancel = CancellationToken::new();
    let feeder = Feeder::new(
        store.clone(),
        feeder_config(upstream, 4, 20),
        server.state.metrics.clone(),
    )
    .unwrap();
    tokio::spawn(feeder.run(cancel.clone()));

    // 10 domains at batch_size 4 -> batches of 4, 4, 2.
    let store2 = store.clone();
    wait_for("three pending batches", move || {
        let store = store2.clone();
        async move { store.pending_batch_count().await.unwrap() == 3 }
    })
    .await;

    let mut sizes = Vec::new();
    let mut all_domains = Vec::new();
    for _ in 0..3 {
        let (_, claim) = server
            .scanner_post("/api/scanner/jobs", &token, json!({"session_id": "happy-sess"}))
            .await;
        let domains = claim["domains"].as_array().unwrap();
        sizes.push(domains.len());
        all_domains.extend(domains.iter().map(|d| d.as_str().unwrap().to_string()));

        let (status, _) = server
            .scanner_post(
                "/api/scanner/results",
                &token,
                json!({
                    "batch_id": claim["batch_id"],
                    "domains_checked": domains.len(),
                    "loc_records": []
                }),
            )
            .await;
        assert_eq!(status, StatusCode::OK);
    }
    assert_eq!(sizes, vec![4, 4, 2]);
    assert_eq!(all_domains.len(), 10);

    let store3 = store.clone();
    wait_for("file complete", move || {
        let store = store3.clone();
        async move {
            store
                .get_file(1)
                .await
                .unwrap()
                .is_some_and(|f| f.status == "complete")
        }
    })
    .await;

    let file = store.get_file(1).await.unwrap().unwrap();
    assert!(file.feeding_complete);
    assert_eq!(file.batches_created, 3);
    assert_eq!(file.batches_completed, 3);
    assert_eq!(file.processed_lines, 12); // 10 domains + comment + blank

    cancel.cancel();
}

#[tokio::test]
async fn backpressure_blocks_the_feeder_until_a_batch_drains() {
    let server = TestServer::new().await;
    let (_, token) = server.register_scanner("drainer").await;

    let corpus = xz_compress(&ten_line_corpus()).await;
    let (_stub, upstream) =
        spawn_upstream(HashMap::from([("data/a/a00.txt.xz".to_string(), corpus)])).await;

    let store = server.store();
    store
        .upsert_file("data/a/a00.txt.xz", "https://unused.example/a00", 1)
        .await
        .unwrap();

    // max_pending_batches = 2 and no scanners: the feeder must stall
    // after the second insert without advancing the cursor further.
    let cancel = CancellationToken::new();
    let feeder = Feeder::new(
        store.clone(),
        feeder_config(upstream, 4, 2),
        server.state.metrics.clone(),
    )
    .unwrap();
    tokio::spawn(feeder.run(cancel.clone()));

    let store2 = store.clone();
    wait_for("two pending batches", move || {
        let store = store2.clone();
        async move { store.pending_batch_count().await.unwrap() == 2 }
    })
    .await;

    // Give the feeder a couple of poll cycles to (incorrectly) overfill.
    tokio::time::sleep(Duration::from_millis(2500)).await;
    assert_eq!(store.pending_batch_count().await.unwrap(), 2);
    let stalled = store.get_file(1).await.unwrap().unwrap();
    assert_eq!(stalled.batches_created, 2);
    assert_eq!(stalled.processed_lines, 10); // comment + blank + 8 domains

    // Drain one batch; the feeder resumes and flushes the tail.
    let (_, claim) = server
        .scanner_post("/api/scanner/jobs", &token, json!({"session_id": "drain-sess"}))
        .await;
    server
        .scanner_post(
            "/api/scanner/results",
            &token,
            json!({"batch_id": claim["batch_id"], "domains_checked": 4, "loc_records": []}),
        )
        .await;

    let store3 = store.clone();
    wait_for("third batch after drain", move || {
        let store = store3.clone();
        async move {
            store
                .get_file(1)
                .await
                .unwrap()
                .is_some_and(|f| f.batches_created == 3 && f.feeding_complete)
        }
    })
    .await;

    // No line was fed twice: the remaining batches cover the
    // outstanding domains with no duplicates.
    let mut seen = Vec::new();
    loop {
        let (_, claim) = server
            .scanner_post("/api/scanner/jobs", &token, json!({"session_id": "drain-sess"}))
            .await;
        let Some(batch_id) = claim["batch_id"].as_i64() else {
            break;
        };
        for d in claim["domains"].as_array().unwrap() {
            seen.push(d.as_str().unwrap().to_string());
        }
        server
            .scanner_post(
                "/api/scanner/results",
                &token,
                json!({"batch_id": batch_id, "domains_checked": 0, "loc_records": []}),
            )
            .await;
    }
    let mut deduped = seen.clone();
    deduped.sort();
    deduped.dedup();
    assert_eq!(seen.len(), deduped.len(), "a line was fed twice: {seen:?}");

    cancel.cancel();
}

#[tokio::test]
async fn upstream_outage_leaves_the_file_resumable() {
    let server = TestServer::new().await;

    let corpus = xz_compress(&ten_line_corpus()).await;
    let (stub, upstream) =
        spawn_upstream(HashMap::from([("data/a/a00.txt.xz".to_string(), corpus)])).await;
    stub.fail_downloads.store(true, Ordering::SeqCst);

    let store = server.store();
    store
        .upsert_file("data/a/a00.txt.xz", "https://unused.example/a00", 1)
        .await
        .unwrap();

    let cancel = CancellationToken::new();
    let feeder = Feeder::new(
        store.clone(),
        feeder_config(upstream, 4, 20),
        server.state.metrics.clone(),
    )
    .unwrap();
    tokio::spawn(feeder.run(cancel.clone()));

    // A few retry cycles: nothing committed, file stays processing.
    tokio::time::sleep(Duration::from_millis(2500)).await;
    assert_eq!(store.pending_batch_count().await.unwrap(), 0);
    let file = store.get_file(1).await.unwrap().unwrap();
    assert_eq!(file.status, "processing");
    assert_eq!(file.processed_lines, 0);
    assert!(!file.feeding_complete);

    // Upstream recovers; the same file is retried on the poll cadence.
    stub.fail_downloads.store(false, Ordering::SeqCst);
    let store2 = store.clone();
    wait_for("feeding completes after recovery", move || {
        let store = store2.clone();
        async move {
            store
                .get_file(1)
                .await
                .unwrap()
                .is_some_and(|f| f.feeding_complete)
        }
    })
    .await;

    cancel.cancel();
}

#[tokio::test]
async fn crashed_scanner_batch_is_reassigned_and_the_file_closes() {
    let server = TestServer::new().await;
    let store = server.store();
    let (crashed_id, crashed_token) = server.register_scanner("crasher").await;
    let (_, survivor_token) = server.register_scanner("survivor").await;

    // One single-batch file, fully fed.
    store
        .upsert_file("data/z/z00.txt.xz", "https://unused.example/z00", 1)
        .await
        .unwrap();
    let file = store
        .next_file_to_feed(OffsetDateTime::now_utc())
        .await
        .unwrap()
        .unwrap();
    store
        .create_batch_and_advance(file.id, 1, 1, "halted.example.com")
        .await
        .unwrap();
    store.mark_feeding_complete(file.id).await.unwrap();

    // Scanner A claims, heartbeats once, then halts.
    let (_, claim) = server
        .scanner_post(
            "/api/scanner/jobs",
            &crashed_token,
            json!({"session_id": "crash-sess"}),
        )
        .await;
    let batch_id = claim["batch_id"].as_i64().unwrap();

    // Its heartbeat ages past the timeout.
    store
        .upsert_session(
            "crash-sess",
            crashed_id,
            OffsetDateTime::now_utc() - time::Duration::minutes(30),
        )
        .await
        .unwrap();

    Reaper::new(
        store.clone(),
        locmap_core::config::ReaperConfig::default(),
        server.state.config.server.heartbeat_timeout(),
        server.state.metrics.clone(),
    )
    .run_once()
    .await;

    let row = store.get_batch(batch_id).await.unwrap().unwrap();
    assert_eq!(row.status, "pending");
    assert!(row.session_id.is_none());

    // The survivor picks up the same batch and finishes the file.
    let (_, reclaim) = server
        .scanner_post(
            "/api/scanner/jobs",
            &survivor_token,
            json!({"session_id": "survivor-sess"}),
        )
        .await;
    assert_eq!(reclaim["batch_id"].as_i64().unwrap(), batch_id);

    let (status, _) = server
        .scanner_post(
            "/api/scanner/results",
            &survivor_token,
            json!({"batch_id": batch_id, "domains_checked": 1, "loc_records": []}),
        )
        .await;
    assert_eq!(status, StatusCode::OK);

    let file = store.get_file(file.id).await.unwrap().unwrap();
    assert_eq!(file.status, "complete");
    assert_eq!(file.batches_completed, 1);
}

#[tokio::test]
async fn rediscovered_fqdn_keeps_one_row_with_updated_last_seen() {
    let server = TestServer::new().await;
    let (_, token) = server.register_scanner("rediscoverer").await;
    let store = server.store();

    for sess in ["first-sess", "second-sess"] {
        store.create_manual_batch("x.example.com").await.unwrap();
        let (_, claim) = server
            .scanner_post("/api/scanner/jobs", &token, json!({"session_id": sess}))
            .await;
        server
            .scanner_post(
                "/api/scanner/results",
                &token,
                json!({
                    "batch_id": claim["batch_id"],
                    "domains_checked": 1,
                    "loc_records": [loc_record_json("x.example.com", 52.37306, 4.89222)]
                }),
            )
            .await;
        tokio::time::sleep(Duration::from_millis(20)).await;
    }

    let page = store.list_records(10, 0, None).await.unwrap();
    assert_eq!(page.total, 1);
    let record = &page.records[0];
    assert_eq!(record.fqdn, "x.example.com");
    assert!(record.first_seen_at < record.last_seen_at);
}
