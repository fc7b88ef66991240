//! Database models mapping to the store schema.

use sqlx::FromRow;
use time::OffsetDateTime;
use uuid::Uuid;

// =============================================================================
// Domain files
// =============================================================================

/// One compressed corpus file known to exist upstream.
///
/// `processed_lines` is the monotone resume cursor; `feeding_complete`
/// latches true at EOF while scanners may still be draining batches.
#[derive(Debug, Clone, FromRow)]
pub struct DomainFileRow {
    pub id: i64,
    pub filename: String,
    pub url: String,
    pub size_bytes: Option<i64>,
    pub processed_lines: i64,
    pub batches_created: i64,
    pub batches_completed: i64,
    pub feeding_complete: bool,
    pub status: String,
    pub started_at: Option<OffsetDateTime>,
    pub completed_at: Option<OffsetDateTime>,
}

// =============================================================================
// Scan batches
// =============================================================================

/// A fixed-cardinality unit of FQDNs, the queue's atom of claim/complete.
///
/// `file_id` is null for admin-queued manual batches. Completed batches
/// are deleted, not retained.
#[derive(Debug, Clone, FromRow)]
pub struct ScanBatchRow {
    pub id: i64,
    pub file_id: Option<i64>,
    pub line_start: i64,
    pub line_end: i64,
    /// Newline-joined FQDN list.
    pub domains: String,
    pub status: String,
    pub assigned_at: Option<OffsetDateTime>,
    pub scanner_id: Option<Uuid>,
    pub session_id: Option<String>,
}

// =============================================================================
// Scanner identity
// =============================================================================

/// Long-lived scanner principal. Only the token hash is stored.
#[derive(Debug, Clone, FromRow)]
pub struct ScannerClientRow {
    pub id: Uuid,
    pub name: String,
    pub token_hash: String,
    pub created_at: OffsetDateTime,
    pub last_heartbeat: Option<OffsetDateTime>,
}

/// Per-process scanner incarnation; the id is chosen by the scanner.
#[derive(Debug, Clone, FromRow)]
pub struct ScannerSessionRow {
    pub id: String,
    pub client_id: Uuid,
    pub created_at: OffsetDateTime,
    pub last_heartbeat: OffsetDateTime,
}

// =============================================================================
// LOC records
// =============================================================================

/// A durable finding, keyed by FQDN. A rescan updates the geographic
/// columns and `last_seen_at` in place.
#[derive(Debug, Clone, FromRow)]
pub struct LocRecordRow {
    pub id: Uuid,
    pub fqdn: String,
    pub root_domain: String,
    pub raw_record: String,
    pub latitude: f64,
    pub longitude: f64,
    pub altitude_m: f64,
    pub size_m: f64,
    pub horiz_prec_m: f64,
    pub vert_prec_m: f64,
    pub first_seen_at: OffsetDateTime,
    pub last_seen_at: OffsetDateTime,
}
