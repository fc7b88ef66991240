//! Scanner session repository.
//!
//! Sessions are never pre-registered: they come into existence when the
//! coordinator upserts them on a scanner's first authenticated request,
//! and liveness is purely `now - last_heartbeat < heartbeat_timeout`.

use crate::error::StoreResult;
use crate::models::ScannerSessionRow;
use async_trait::async_trait;
use time::OffsetDateTime;
use uuid::Uuid;

/// Repository for scanner session liveness.
#[async_trait]
pub trait SessionRepo: Send + Sync {
    /// Insert the session or refresh its `last_heartbeat`.
    async fn upsert_session(
        &self,
        session_id: &str,
        client_id: Uuid,
        now: OffsetDateTime,
    ) -> StoreResult<()>;

    /// Fetch one session by id.
    async fn get_session(&self, session_id: &str) -> StoreResult<Option<ScannerSessionRow>>;

    /// Sessions with a heartbeat at or after `cutoff`.
    async fn count_active_sessions(&self, cutoff: OffsetDateTime) -> StoreResult<i64>;
}
