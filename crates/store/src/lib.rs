//! Durable queue and result store for the locmap coordinator.
//!
//! This crate owns the control-plane data model:
//! - Corpus files and their feed/drain lifecycle
//! - The batch queue (claim / complete / reclaim)
//! - Scanner clients, sessions, and liveness
//! - Discovered LOC records and the aggregated read model

pub mod error;
pub mod models;
pub mod postgres;
pub mod repos;
pub mod store;

pub use error::{StoreError, StoreResult};
pub use postgres::PostgresStore;
pub use store::{ScanStore, SqliteStore};

use locmap_core::config::DatabaseConfig;
use std::sync::Arc;

/// Create a store from configuration.
pub async fn from_config(config: &DatabaseConfig) -> StoreResult<Arc<dyn ScanStore>> {
    match config {
        DatabaseConfig::Sqlite { path } => {
            let store = SqliteStore::new(path).await?;
            Ok(Arc::new(store) as Arc<dyn ScanStore>)
        }
        DatabaseConfig::Postgres {
            url,
            max_connections,
        } => {
            tracing::info!("Connecting to PostgreSQL");
            let store = PostgresStore::new(url, *max_connections).await?;
            Ok(Arc::new(store) as Arc<dyn ScanStore>)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn from_config_sqlite() {
        let temp_dir = tempfile::tempdir().unwrap();
        let db_path = temp_dir.path().join("locmap.db");
        let config = DatabaseConfig::Sqlite {
            path: db_path.clone(),
        };

        let store = from_config(&config).await.unwrap();
        store.health_check().await.unwrap();
        assert!(db_path.exists());
    }
}
