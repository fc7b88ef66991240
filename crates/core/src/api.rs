//! Request and response types for the coordinator API.
//!
//! The scanner endpoints are bearer-token authenticated; the admin
//! endpoints use the admin key header; the public endpoints are open.

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

// =============================================================================
// Scanner API
// =============================================================================

/// Request body for POST /api/scanner/jobs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GetBatchRequest {
    /// Process-unique session id chosen by the scanner at startup.
    pub session_id: String,
}

/// Response for POST /api/scanner/jobs.
///
/// A missing `batch_id` together with empty `domains` means no work is
/// available right now.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GetBatchResponse {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub batch_id: Option<i64>,
    #[serde(default)]
    pub domains: Vec<String>,
}

/// Request body for POST /api/scanner/heartbeat.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HeartbeatRequest {
    pub session_id: String,
}

/// Response for POST /api/scanner/heartbeat.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HeartbeatResponse {
    pub ok: bool,
}

/// A discovered LOC record in decimal form.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocRecord {
    pub fqdn: String,
    pub raw_record: String,
    pub latitude: f64,
    pub longitude: f64,
    pub altitude_m: f64,
    pub size_m: f64,
    pub horiz_prec_m: f64,
    pub vert_prec_m: f64,
}

/// Request body for POST /api/scanner/results.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmitBatchRequest {
    pub batch_id: i64,
    /// Number of FQDNs actually looked up, for throughput accounting.
    pub domains_checked: i64,
    #[serde(default)]
    pub loc_records: Vec<LocRecord>,
}

/// Response for POST /api/scanner/results.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmitBatchResponse {
    pub accepted: usize,
}

// =============================================================================
// Admin API
// =============================================================================

/// Request body for POST /api/admin/clients.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegisterClientRequest {
    pub name: String,
}

/// Response for POST /api/admin/clients.
///
/// The plaintext token appears here exactly once; only its hash is stored.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegisterClientResponse {
    pub id: Uuid,
    pub name: String,
    pub token: String,
}

/// A scanner client in the list response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientInfo {
    pub id: Uuid,
    pub name: String,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub last_heartbeat: Option<OffsetDateTime>,
    pub in_flight_batches: i64,
    pub is_alive: bool,
}

/// Response for GET /api/admin/clients.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListClientsResponse {
    pub clients: Vec<ClientInfo>,
}

/// Response for POST /api/admin/discover-files.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscoverFilesResponse {
    pub files_discovered: usize,
}

/// Response for POST /api/admin/reset-scan.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResetScanResponse {
    pub files_reset: i64,
}

/// Request body for POST /api/admin/manual-scan.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManualScanRequest {
    pub domains: Vec<String>,
}

/// Response for POST /api/admin/manual-scan.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManualScanResponse {
    pub domains_queued: usize,
}

// =============================================================================
// Public API
// =============================================================================

/// A LOC record in the public listing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PublicLocRecord {
    pub fqdn: String,
    pub root_domain: String,
    pub raw_record: String,
    pub latitude: f64,
    pub longitude: f64,
    pub altitude_m: f64,
    pub size_m: f64,
    pub horiz_prec_m: f64,
    pub vert_prec_m: f64,
    #[serde(with = "time::serde::rfc3339")]
    pub first_seen_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub last_seen_at: OffsetDateTime,
}

/// Response for GET /api/public/records.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListRecordsResponse {
    pub records: Vec<PublicLocRecord>,
    pub total: i64,
    pub limit: i64,
    pub offset: i64,
}

/// File counts by status, for the stats endpoint.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DomainFileStats {
    pub total: i64,
    pub pending: i64,
    pub processing: i64,
    pub complete: i64,
}

/// Batch queue depth, for the stats endpoint.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BatchQueueStats {
    pub pending: i64,
    pub in_flight: i64,
}

/// Progress of the file currently being fed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CurrentFileProgress {
    pub filename: String,
    pub processed_lines: i64,
    pub batches_created: i64,
    pub batches_completed: i64,
    pub progress_pct: f64,
}

/// Response for GET /api/public/stats.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatsResponse {
    pub total_loc_records: i64,
    pub unique_root_domains_with_loc: i64,
    /// Scanner sessions with a heartbeat inside the timeout window.
    pub active_scanners: i64,
    pub domain_files: DomainFileStats,
    pub batch_queue: BatchQueueStats,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_file: Option<CurrentFileProgress>,
}

// =============================================================================
// GeoJSON read model
// =============================================================================

/// Point geometry: `[longitude, latitude]`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeoJsonPoint {
    #[serde(rename = "type")]
    pub kind: String,
    pub coordinates: [f64; 2],
}

/// Properties of one aggregated location feature.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeatureProperties {
    pub fqdns: Vec<String>,
    pub root_domains: Vec<String>,
    pub raw_record: String,
    pub altitude_m: f64,
    pub count: i64,
    #[serde(with = "time::serde::rfc3339")]
    pub first_seen: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub last_seen: OffsetDateTime,
}

/// One aggregated location.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeoJsonFeature {
    #[serde(rename = "type")]
    pub kind: String,
    pub geometry: GeoJsonPoint,
    pub properties: FeatureProperties,
}

/// The full feature collection served to the map viewer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeoJsonFeatureCollection {
    #[serde(rename = "type")]
    pub kind: String,
    pub features: Vec<GeoJsonFeature>,
}

/// Standard error body returned by every endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub code: String,
    pub message: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_batch_response_omits_batch_id() {
        let resp = GetBatchResponse::default();
        let json = serde_json::to_string(&resp).unwrap();
        assert_eq!(json, r#"{"domains":[]}"#);
    }

    #[test]
    fn batch_response_round_trips() {
        let resp = GetBatchResponse {
            batch_id: Some(42),
            domains: vec!["a.example".into(), "b.example".into()],
        };
        let back: GetBatchResponse =
            serde_json::from_str(&serde_json::to_string(&resp).unwrap()).unwrap();
        assert_eq!(back.batch_id, Some(42));
        assert_eq!(back.domains.len(), 2);
    }
}
