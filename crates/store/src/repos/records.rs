//! LOC record repository.

use crate::error::StoreResult;
use crate::models::LocRecordRow;
use async_trait::async_trait;
use locmap_core::api::LocRecord;
use time::OffsetDateTime;

/// One page of the public record listing.
#[derive(Debug, Clone)]
pub struct RecordPage {
    pub records: Vec<LocRecordRow>,
    pub total: i64,
}

/// One location in the aggregated read model: every FQDN observed at
/// identical `(latitude, longitude, altitude_m, raw_record)` collapsed
/// into a single entry.
#[derive(Debug, Clone)]
pub struct AggregatedLocation {
    pub latitude: f64,
    pub longitude: f64,
    pub altitude_m: f64,
    pub raw_record: String,
    pub fqdns: Vec<String>,
    pub root_domains: Vec<String>,
    pub count: i64,
    pub first_seen: OffsetDateTime,
    pub last_seen: OffsetDateTime,
}

/// Repository for durable findings.
#[async_trait]
pub trait RecordRepo: Send + Sync {
    /// Insert a record, or update the geographic columns and
    /// `last_seen_at` of the existing row keyed by `fqdn`. Coordinates
    /// outside the RFC ranges are rejected by the store constraint and
    /// surface as `StoreError::Constraint`.
    async fn upsert_loc_record(
        &self,
        root_domain: &str,
        record: &LocRecord,
        now: OffsetDateTime,
    ) -> StoreResult<()>;

    /// Fetch one record by FQDN.
    async fn get_record_by_fqdn(&self, fqdn: &str) -> StoreResult<Option<LocRecordRow>>;

    /// Paginated listing, newest sightings first, optionally filtered
    /// by root domain.
    async fn list_records(
        &self,
        limit: i64,
        offset: i64,
        root_domain: Option<&str>,
    ) -> StoreResult<RecordPage>;

    /// The aggregated read model behind the map viewer.
    async fn aggregated_locations(&self) -> StoreResult<Vec<AggregatedLocation>>;
}
