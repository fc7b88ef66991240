//! Domain file repository.

use crate::error::StoreResult;
use crate::models::DomainFileRow;
use async_trait::async_trait;
use time::OffsetDateTime;

/// Repository for corpus file lifecycle operations.
#[async_trait]
pub trait FileRepo: Send + Sync {
    /// Insert a discovered file, or refresh its url and size.
    async fn upsert_file(&self, filename: &str, url: &str, size_bytes: i64) -> StoreResult<()>;

    /// Pick the next file the feeder should work on.
    ///
    /// Prefers the file already in `processing` (resume), then the
    /// lowest filename among `pending` ones. Files that are done
    /// feeding but still draining batches are skipped. A `pending`
    /// pick is atomically promoted to `processing` with
    /// `started_at = now`. Contended rows are skipped, not waited on.
    async fn next_file_to_feed(&self, now: OffsetDateTime) -> StoreResult<Option<DomainFileRow>>;

    /// The file currently in `processing`, if any (stats surface).
    async fn current_processing_file(&self) -> StoreResult<Option<DomainFileRow>>;

    /// Fetch one file by id.
    async fn get_file(&self, file_id: i64) -> StoreResult<Option<DomainFileRow>>;

    /// Latch `feeding_complete` once every line has been read.
    async fn mark_feeding_complete(&self, file_id: i64) -> StoreResult<()>;

    /// Opportunistically close a file: `processing` with
    /// `feeding_complete` and `batches_created = batches_completed`
    /// becomes `complete`. Idempotent; any caller may race to close.
    /// Returns whether this call performed the transition.
    async fn try_close_file(&self, file_id: i64, now: OffsetDateTime) -> StoreResult<bool>;

    /// Reset every file to `pending` with zeroed cursors, for a full
    /// re-scan. Returns the number of files touched.
    async fn reset_all_files(&self) -> StoreResult<i64>;
}
