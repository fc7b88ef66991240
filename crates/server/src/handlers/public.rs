//! Public handlers: record listing, GeoJSON read model, stats.

use crate::error::ApiResult;
use crate::state::AppState;
use axum::Json;
use axum::extract::{Query, State};
use axum::http::header;
use axum::response::IntoResponse;
use locmap_core::api::{
    BatchQueueStats, CurrentFileProgress, DomainFileStats, FeatureProperties,
    GeoJsonFeature, GeoJsonFeatureCollection, GeoJsonPoint, ListRecordsResponse, PublicLocRecord,
    StatsResponse,
};
use locmap_store::models::LocRecordRow;
use serde::Deserialize;
use time::OffsetDateTime;

const MAX_PAGE_SIZE: i64 = 1000;

#[derive(Debug, Deserialize)]
pub struct ListRecordsQuery {
    #[serde(default = "default_limit")]
    pub limit: i64,
    #[serde(default)]
    pub offset: i64,
    pub domain: Option<String>,
}

fn default_limit() -> i64 {
    100
}

fn to_public(row: LocRecordRow) -> PublicLocRecord {
    PublicLocRecord {
        fqdn: row.fqdn,
        root_domain: row.root_domain,
        raw_record: row.raw_record,
        latitude: row.latitude,
        longitude: row.longitude,
        altitude_m: row.altitude_m,
        size_m: row.size_m,
        horiz_prec_m: row.horiz_prec_m,
        vert_prec_m: row.vert_prec_m,
        first_seen_at: row.first_seen_at,
        last_seen_at: row.last_seen_at,
    }
}

/// Handler for GET /api/public/records.
pub async fn list_records(
    State(state): State<AppState>,
    Query(query): Query<ListRecordsQuery>,
) -> ApiResult<Json<ListRecordsResponse>> {
    let limit = query.limit.clamp(1, MAX_PAGE_SIZE);
    let offset = query.offset.max(0);

    let page = state
        .store
        .list_records(limit, offset, query.domain.as_deref())
        .await?;

    Ok(Json(ListRecordsResponse {
        records: page.records.into_iter().map(to_public).collect(),
        total: page.total,
        limit,
        offset,
    }))
}

/// Handler for GET /api/public/records.geojson.
///
/// The aggregated read model: every FQDN observed at identical
/// `(latitude, longitude, altitude_m, raw_record)` becomes one Point
/// feature. Powers the map viewer.
pub async fn records_geojson(State(state): State<AppState>) -> ApiResult<impl IntoResponse> {
    let locations = state.store.aggregated_locations().await?;

    let features = locations
        .into_iter()
        .map(|loc| GeoJsonFeature {
            kind: "Feature".to_string(),
            geometry: GeoJsonPoint {
                kind: "Point".to_string(),
                coordinates: [loc.longitude, loc.latitude],
            },
            properties: FeatureProperties {
                fqdns: loc.fqdns,
                root_domains: loc.root_domains,
                raw_record: loc.raw_record,
                altitude_m: loc.altitude_m,
                count: loc.count,
                first_seen: loc.first_seen,
                last_seen: loc.last_seen,
            },
        })
        .collect();

    let collection = GeoJsonFeatureCollection {
        kind: "FeatureCollection".to_string(),
        features,
    };

    Ok((
        [
            (header::CONTENT_TYPE, "application/geo+json"),
            (header::CACHE_CONTROL, "public, max-age=300"),
        ],
        Json(collection),
    ))
}

/// Handler for GET /api/public/stats.
pub async fn get_stats(State(state): State<AppState>) -> ApiResult<Json<StatsResponse>> {
    let cutoff = OffsetDateTime::now_utc() - state.config.server.heartbeat_timeout();
    let snapshot = state.store.stats_snapshot(cutoff).await?;

    let current_file = state.store.current_processing_file().await?.map(|f| {
        let progress_pct = if f.batches_created > 0 {
            f.batches_completed as f64 / f.batches_created as f64 * 100.0
        } else {
            0.0
        };
        CurrentFileProgress {
            filename: f.filename,
            processed_lines: f.processed_lines,
            batches_created: f.batches_created,
            batches_completed: f.batches_completed,
            progress_pct,
        }
    });

    Ok(Json(StatsResponse {
        total_loc_records: snapshot.loc_records_total,
        unique_root_domains_with_loc: snapshot.root_domains_with_loc,
        active_scanners: snapshot.scanners_active,
        domain_files: DomainFileStats {
            total: snapshot.files_total,
            pending: snapshot.files_pending,
            processing: snapshot.files_processing,
            complete: snapshot.files_complete,
        },
        batch_queue: BatchQueueStats {
            pending: snapshot.batches_pending,
            in_flight: snapshot.batches_in_flight,
        },
        current_file,
    }))
}
