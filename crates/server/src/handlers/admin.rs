//! Admin handlers: client registration and operational controls.

use crate::error::{ApiError, ApiResult};
use crate::feeder::upstream;
use crate::state::AppState;
use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use locmap_core::api::{
    ClientInfo, DiscoverFilesResponse, ListClientsResponse, ManualScanRequest, ManualScanResponse,
    RegisterClientRequest, RegisterClientResponse, ResetScanResponse,
};
use locmap_store::models::ScannerClientRow;
use rand::RngCore;
use time::OffsetDateTime;
use uuid::Uuid;

/// Generate an opaque bearer token: 32 random bytes, hex-encoded.
fn generate_token() -> String {
    let mut bytes = [0u8; 32];
    rand::rng().fill_bytes(&mut bytes);
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

/// Handler for POST /api/admin/clients.
///
/// The plaintext token appears in this response and nowhere else.
pub async fn register_client(
    State(state): State<AppState>,
    Json(req): Json<RegisterClientRequest>,
) -> ApiResult<(StatusCode, Json<RegisterClientResponse>)> {
    if req.name.is_empty() {
        return Err(ApiError::BadRequest("name is required".to_string()));
    }

    let token = generate_token();
    let client = ScannerClientRow {
        id: Uuid::new_v4(),
        name: req.name.clone(),
        token_hash: crate::auth::hash_token(&token),
        created_at: OffsetDateTime::now_utc(),
        last_heartbeat: None,
    };
    state.store.create_client(&client).await?;

    tracing::info!(client_id = %client.id, name = %client.name, "Scanner client registered");

    Ok((
        StatusCode::CREATED,
        Json(RegisterClientResponse {
            id: client.id,
            name: req.name,
            token,
        }),
    ))
}

/// Handler for GET /api/admin/clients.
pub async fn list_clients(State(state): State<AppState>) -> ApiResult<Json<ListClientsResponse>> {
    let now = OffsetDateTime::now_utc();
    let timeout = state.config.server.heartbeat_timeout();
    let clients = state.store.list_clients().await?;

    let clients = clients
        .into_iter()
        .map(|c| {
            let is_alive = c
                .client
                .last_heartbeat
                .is_some_and(|hb| now - hb < timeout);
            ClientInfo {
                id: c.client.id,
                name: c.client.name,
                created_at: c.client.created_at,
                last_heartbeat: c.client.last_heartbeat,
                in_flight_batches: c.in_flight_batches,
                is_alive,
            }
        })
        .collect();

    Ok(Json(ListClientsResponse { clients }))
}

/// Handler for DELETE /api/admin/clients/{id}.
pub async fn delete_client(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<StatusCode> {
    state.store.delete_client(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Handler for POST /api/admin/discover-files.
pub async fn discover_files(
    State(state): State<AppState>,
) -> ApiResult<Json<DiscoverFilesResponse>> {
    let client = upstream::CorpusClient::new(&state.config.feeder.upstream)
        .map_err(|e| ApiError::Upstream(e.to_string()))?;
    let count = upstream::discover_files(&client, state.store.as_ref())
        .await
        .map_err(|e| ApiError::Upstream(e.to_string()))?;

    Ok(Json(DiscoverFilesResponse {
        files_discovered: count,
    }))
}

/// Handler for POST /api/admin/reset-scan.
///
/// Resets every file to pending and drops all batches, for a full
/// re-scan of the corpus.
pub async fn reset_scan(State(state): State<AppState>) -> ApiResult<Json<ResetScanResponse>> {
    let files_reset = state.store.reset_all_files().await?;
    let batches = state.store.delete_all_batches().await?;
    tracing::info!(files_reset, batches_deleted = batches, "Scan state reset");
    Ok(Json(ResetScanResponse { files_reset }))
}

/// Handler for POST /api/admin/manual-scan.
///
/// Queues an ad-hoc list of FQDNs as a single file-less batch.
pub async fn manual_scan(
    State(state): State<AppState>,
    Json(req): Json<ManualScanRequest>,
) -> ApiResult<Json<ManualScanResponse>> {
    let domains: Vec<&str> = req
        .domains
        .iter()
        .map(|d| d.trim())
        .filter(|d| !d.is_empty() && !d.starts_with('#'))
        .collect();

    if domains.is_empty() {
        return Err(ApiError::BadRequest(
            "at least one domain is required".to_string(),
        ));
    }

    state
        .store
        .create_manual_batch(&domains.join("\n"))
        .await?;

    Ok(Json(ManualScanResponse {
        domains_queued: domains.len(),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_tokens_are_64_hex_chars_and_unique() {
        let a = generate_token();
        let b = generate_token();
        assert_eq!(a.len(), 64);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(a, b);
    }
}
