//! Aggregate statistics repository.

use crate::error::StoreResult;
use async_trait::async_trait;
use time::OffsetDateTime;

/// Everything the stats endpoint and the metrics updater need, fetched
/// in a single round trip.
#[derive(Debug, Clone, Default)]
pub struct StatsSnapshot {
    pub files_total: i64,
    pub files_pending: i64,
    pub files_processing: i64,
    pub files_complete: i64,
    pub batches_pending: i64,
    pub batches_in_flight: i64,
    pub loc_records_total: i64,
    pub root_domains_with_loc: i64,
    pub scanners_total: i64,
    /// Sessions with a heartbeat at or after the cutoff.
    pub scanners_active: i64,
}

/// Repository for the one-shot stats snapshot.
#[async_trait]
pub trait StatsRepo: Send + Sync {
    async fn stats_snapshot(&self, heartbeat_cutoff: OffsetDateTime) -> StoreResult<StatsSnapshot>;
}
