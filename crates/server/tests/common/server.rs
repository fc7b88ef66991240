//! Server test harness: a real router over a SQLite-backed store.

use super::fixtures::sha256_hex;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use locmap_core::config::AppConfig;
use locmap_server::{AppState, create_router};
use locmap_store::models::ScannerClientRow;
use locmap_store::{ScanStore, SqliteStore};
use serde_json::Value;
use std::sync::Arc;
use tempfile::TempDir;
use time::OffsetDateTime;
use tower::ServiceExt;
use uuid::Uuid;

/// Note: #[allow(dead_code)] because each test file compiles common/ separately.
#[allow(dead_code)]
pub struct TestServer {
    pub router: axum::Router,
    pub state: AppState,
    _temp_dir: TempDir,
}

#[allow(dead_code)]
impl TestServer {
    /// Create a test server with default test configuration.
    pub async fn new() -> Self {
        Self::with_config(|_| {}).await
    }

    /// Create a test server, letting the caller tweak the config first.
    pub async fn with_config(adjust: impl FnOnce(&mut AppConfig)) -> Self {
        let temp_dir = tempfile::tempdir().expect("tempdir");
        let db_path = temp_dir.path().join("locmap.db");

        let mut config = AppConfig::for_testing(db_path.clone());
        adjust(&mut config);

        let store: Arc<dyn ScanStore> =
            Arc::new(SqliteStore::new(&db_path).await.expect("open store"));

        let state = AppState::new(config, store);
        let router = create_router(state.clone());

        Self {
            router,
            state,
            _temp_dir: temp_dir,
        }
    }

    /// Get access to the underlying store.
    pub fn store(&self) -> Arc<dyn ScanStore> {
        self.state.store.clone()
    }

    /// Register a scanner client directly in the store; returns
    /// `(client_id, plaintext_token)`.
    pub async fn register_scanner(&self, name: &str) -> (Uuid, String) {
        let id = Uuid::new_v4();
        let token = format!("test-token-{id}");
        let client = ScannerClientRow {
            id,
            name: name.to_string(),
            token_hash: sha256_hex(token.as_bytes()),
            created_at: OffsetDateTime::now_utc(),
            last_heartbeat: None,
        };
        self.store().create_client(&client).await.expect("client");
        (id, token)
    }

    /// Make a JSON request against the router.
    pub async fn request(
        &self,
        method: &str,
        uri: &str,
        body: Option<Value>,
        bearer: Option<&str>,
        admin_key: Option<&str>,
    ) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);

        if let Some(token) = bearer {
            builder = builder.header("Authorization", format!("Bearer {token}"));
        }
        if let Some(key) = admin_key {
            builder = builder.header("X-Admin-Key", key);
        }

        let body = match body {
            Some(v) => {
                builder = builder.header("Content-Type", "application/json");
                Body::from(serde_json::to_vec(&v).unwrap())
            }
            None => Body::empty(),
        };

        let request = builder.body(body).unwrap();
        let response = self.router.clone().oneshot(request).await.unwrap();

        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let json = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or(Value::Null)
        };

        (status, json)
    }

    /// Scanner-side POST shorthand.
    pub async fn scanner_post(
        &self,
        uri: &str,
        token: &str,
        body: Value,
    ) -> (StatusCode, Value) {
        self.request("POST", uri, Some(body), Some(token), None).await
    }

    /// Admin-side request shorthand using the test admin key.
    pub async fn admin(&self, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        self.request(method, uri, body, None, Some("test-admin-key"))
            .await
    }
}
