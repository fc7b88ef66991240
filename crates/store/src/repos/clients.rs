//! Scanner client repository.

use crate::error::StoreResult;
use crate::models::ScannerClientRow;
use async_trait::async_trait;
use time::OffsetDateTime;
use uuid::Uuid;

/// A client together with its in-flight batch count.
#[derive(Debug, Clone)]
pub struct ClientWithStats {
    pub client: ScannerClientRow,
    pub in_flight_batches: i64,
}

/// Repository for scanner client identity.
#[async_trait]
pub trait ClientRepo: Send + Sync {
    /// Register a client. The caller generates the token and hands in
    /// only its hash; plaintext is never stored.
    async fn create_client(&self, client: &ScannerClientRow) -> StoreResult<()>;

    /// Look up a client by the SHA-256 hash of a presented bearer token.
    async fn get_client_by_token_hash(
        &self,
        token_hash: &str,
    ) -> StoreResult<Option<ScannerClientRow>>;

    /// All clients with their in-flight batch counts.
    async fn list_clients(&self) -> StoreResult<Vec<ClientWithStats>>;

    /// Delete a client. `NotFound` if the id does not exist.
    async fn delete_client(&self, client_id: Uuid) -> StoreResult<()>;

    /// Refresh the client-level heartbeat timestamp.
    async fn touch_client(&self, client_id: Uuid, now: OffsetDateTime) -> StoreResult<()>;
}
