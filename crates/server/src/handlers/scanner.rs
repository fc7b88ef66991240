//! Scanner-facing handlers: claim, heartbeat, submit.

use crate::auth::AuthenticatedClient;
use crate::error::{ApiError, ApiResult};
use crate::state::AppState;
use axum::extract::State;
use axum::{Extension, Json};
use locmap_core::api::{
    GetBatchRequest, GetBatchResponse, HeartbeatRequest, HeartbeatResponse, SubmitBatchRequest,
    SubmitBatchResponse,
};
use locmap_store::StoreError;
use time::OffsetDateTime;

/// Handler for POST /api/scanner/jobs.
///
/// Upserts the session (sessions exist only through this and the
/// heartbeat path) and claims the lowest-id pending batch.
pub async fn get_jobs(
    State(state): State<AppState>,
    Extension(AuthenticatedClient(client)): Extension<AuthenticatedClient>,
    Json(req): Json<GetBatchRequest>,
) -> ApiResult<Json<GetBatchResponse>> {
    if req.session_id.is_empty() {
        return Err(ApiError::BadRequest("session_id is required".to_string()));
    }

    let now = OffsetDateTime::now_utc();
    state
        .store
        .upsert_session(&req.session_id, client.id, now)
        .await?;
    state.store.touch_client(client.id, now).await?;

    let Some(batch) = state
        .store
        .claim_batch(client.id, &req.session_id, now)
        .await?
    else {
        return Ok(Json(GetBatchResponse::default()));
    };

    let domains: Vec<String> = batch
        .domains
        .lines()
        .map(str::trim)
        .filter(|d| !d.is_empty())
        .map(str::to_string)
        .collect();

    tracing::debug!(
        batch_id = batch.id,
        domains = domains.len(),
        session_id = %req.session_id,
        "Batch claimed"
    );

    Ok(Json(GetBatchResponse {
        batch_id: Some(batch.id),
        domains,
    }))
}

/// Handler for POST /api/scanner/heartbeat.
pub async fn heartbeat(
    State(state): State<AppState>,
    Extension(AuthenticatedClient(client)): Extension<AuthenticatedClient>,
    Json(req): Json<HeartbeatRequest>,
) -> ApiResult<Json<HeartbeatResponse>> {
    if req.session_id.is_empty() {
        return Err(ApiError::BadRequest("session_id is required".to_string()));
    }

    let now = OffsetDateTime::now_utc();
    state
        .store
        .upsert_session(&req.session_id, client.id, now)
        .await?;
    state.store.touch_client(client.id, now).await?;

    Ok(Json(HeartbeatResponse { ok: true }))
}

/// Handler for POST /api/scanner/results.
///
/// Upserts each LOC record (coordinate-constraint violations drop the
/// record, the rest of the submission proceeds), completes the batch,
/// and attempts the opportunistic file close. A submission for a batch
/// that was reclaimed and already completed elsewhere still ingests its
/// records; the completion itself becomes a no-op.
pub async fn submit_results(
    State(state): State<AppState>,
    Extension(AuthenticatedClient(client)): Extension<AuthenticatedClient>,
    Json(req): Json<SubmitBatchRequest>,
) -> ApiResult<Json<SubmitBatchResponse>> {
    if req.batch_id == 0 {
        return Err(ApiError::BadRequest("batch_id is required".to_string()));
    }

    let now = OffsetDateTime::now_utc();
    let mut accepted = 0usize;
    for record in &req.loc_records {
        let root = (state.root_domain_fn)(&record.fqdn);
        match state.store.upsert_loc_record(&root, record, now).await {
            Ok(()) => accepted += 1,
            Err(StoreError::Constraint(reason)) => {
                tracing::warn!(fqdn = %record.fqdn, reason = %reason, "Rejected LOC record");
            }
            Err(e) => return Err(e.into()),
        }
    }

    match state.store.complete_batch(req.batch_id).await? {
        Some(completed) => {
            state.metrics.batches_completed.inc();
            if let Some(assigned_at) = completed.assigned_at {
                let duration = (now - assigned_at).as_seconds_f64();
                if duration >= 0.0 {
                    state.metrics.batch_processing_seconds.observe(duration);
                }
            }
            if let Some(file_id) = completed.file_id
                && state.store.try_close_file(file_id, now).await?
            {
                tracing::info!(file_id, "File complete (all batches done)");
            }
        }
        None => {
            tracing::info!(
                batch_id = req.batch_id,
                client_id = %client.id,
                "Late submission for a reclaimed batch; records kept, completion skipped"
            );
        }
    }

    state.metrics.domains_checked.inc_by(req.domains_checked.max(0) as u64);
    state.metrics.loc_discoveries.inc_by(accepted as u64);

    Ok(Json(SubmitBatchResponse { accepted }))
}
