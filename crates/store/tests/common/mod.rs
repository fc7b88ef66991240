//! Shared fixtures for store tests.

use locmap_store::SqliteStore;
use locmap_store::models::ScannerClientRow;
use locmap_store::repos::{ClientRepo, FileRepo, SessionRepo};
use tempfile::TempDir;
use time::OffsetDateTime;
use uuid::Uuid;

/// Note: #[allow(dead_code)] because each test file compiles common/ separately.
#[allow(dead_code)]
pub struct TestStore {
    pub store: SqliteStore,
    _temp_dir: TempDir,
}

#[allow(dead_code)]
impl TestStore {
    pub async fn new() -> Self {
        let temp_dir = tempfile::tempdir().expect("tempdir");
        let store = SqliteStore::new(temp_dir.path().join("store.db"))
            .await
            .expect("open store");
        Self {
            store,
            _temp_dir: temp_dir,
        }
    }

    /// Insert a file and return its id.
    pub async fn insert_file(&self, filename: &str) -> i64 {
        self.store
            .upsert_file(filename, &format!("https://corpus.example/{filename}"), 1024)
            .await
            .expect("upsert file");
        let file = self
            .store
            .next_file_to_feed(OffsetDateTime::now_utc())
            .await
            .expect("next file")
            .expect("file present");
        file.id
    }

    /// Register a client with a fixed token hash and return its id.
    pub async fn insert_client(&self, name: &str) -> Uuid {
        let id = Uuid::new_v4();
        let client = ScannerClientRow {
            id,
            name: name.to_string(),
            token_hash: format!("hash-{id}"),
            created_at: OffsetDateTime::now_utc(),
            last_heartbeat: None,
        };
        self.store.create_client(&client).await.expect("client");
        id
    }

    /// Register a client and a session heartbeating at `at`.
    pub async fn insert_session(&self, session_id: &str, at: OffsetDateTime) -> Uuid {
        let client_id = self.insert_client(&format!("client-{session_id}")).await;
        self.store
            .upsert_session(session_id, client_id, at)
            .await
            .expect("session");
        client_id
    }
}

/// A LOC record fixture at the given coordinates.
#[allow(dead_code)]
pub fn loc_record(fqdn: &str, latitude: f64, longitude: f64) -> locmap_core::api::LocRecord {
    locmap_core::api::LocRecord {
        fqdn: fqdn.to_string(),
        raw_record: "52 22 23.000 N 4 53 32.000 E -2.00m 1m 10000m 10m".to_string(),
        latitude,
        longitude,
        altitude_m: -2.0,
        size_m: 1.0,
        horiz_prec_m: 10000.0,
        vert_prec_m: 10.0,
    }
}
