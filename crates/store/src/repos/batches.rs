//! Scan batch repository: the work queue.

use crate::error::StoreResult;
use crate::models::ScanBatchRow;
use async_trait::async_trait;
use time::OffsetDateTime;
use uuid::Uuid;

/// What a scanner receives from a successful claim.
#[derive(Debug, Clone)]
pub struct ClaimedBatch {
    pub id: i64,
    /// Newline-joined FQDN list as stored.
    pub domains: String,
}

/// What completing a batch hands back to the caller.
#[derive(Debug, Clone)]
pub struct CompletedBatch {
    /// Owning file, null for manual batches.
    pub file_id: Option<i64>,
    /// When the batch was claimed; lets the caller derive the
    /// processing duration.
    pub assigned_at: Option<OffsetDateTime>,
}

/// Repository for queue operations.
///
/// The queue promises at-most-one-in-flight per batch id: a claim takes
/// a row lock that skips already-locked rows, so concurrent claimants
/// never contend and never receive the same id twice.
#[async_trait]
pub trait BatchRepo: Send + Sync {
    /// Insert a batch and advance the owning file's resume cursor and
    /// `batches_created` counter, in one transaction.
    async fn create_batch_and_advance(
        &self,
        file_id: i64,
        line_start: i64,
        line_end: i64,
        domains: &str,
    ) -> StoreResult<()>;

    /// Insert an admin-queued batch with no owning file.
    async fn create_manual_batch(&self, domains: &str) -> StoreResult<()>;

    /// Claim the lowest-id pending batch for `(scanner_id, session_id)`.
    /// Returns `None` when the queue is empty.
    async fn claim_batch(
        &self,
        scanner_id: Uuid,
        session_id: &str,
        now: OffsetDateTime,
    ) -> StoreResult<Option<ClaimedBatch>>;

    /// Delete a batch and increment the owning file's
    /// `batches_completed`, in one transaction. Returns `None` when the
    /// batch no longer exists (late submission after a reclaim), which
    /// callers treat as a no-op.
    async fn complete_batch(&self, batch_id: i64) -> StoreResult<Option<CompletedBatch>>;

    /// Number of pending batches (feeder backpressure probe).
    async fn pending_batch_count(&self) -> StoreResult<i64>;

    /// Return in-flight batches of dead sessions to `pending`. A
    /// session is dead when its `last_heartbeat` is before `cutoff`.
    /// Single statement; returns the number reclaimed.
    async fn reclaim_dead_sessions(&self, cutoff: OffsetDateTime) -> StoreResult<i64>;

    /// Wall-time fallback for legacy rows without a session: in-flight
    /// batches with a null `session_id` assigned before `cutoff` go
    /// back to `pending`.
    async fn reclaim_stale_unsessioned(&self, cutoff: OffsetDateTime) -> StoreResult<i64>;

    /// Drop every batch (admin reset). Returns the number deleted.
    async fn delete_all_batches(&self) -> StoreResult<i64>;

    /// Fetch one batch by id.
    async fn get_batch(&self, batch_id: i64) -> StoreResult<Option<ScanBatchRow>>;
}
