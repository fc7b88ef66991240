//! Authentication middleware.
//!
//! Scanner endpoints authenticate with a bearer token: the SHA-256 of
//! the presented token is looked up against the stored client hashes
//! and the matching client rides along as a request extension. Admin
//! endpoints compare the `X-Admin-Key` header against the configured
//! key verbatim.

use crate::error::ApiError;
use crate::state::AppState;
use axum::extract::{Request, State};
use axum::http::header::AUTHORIZATION;
use axum::middleware::Next;
use axum::response::Response;
use locmap_store::models::ScannerClientRow;
use sha2::{Digest, Sha256};

/// The authenticated scanner client, injected by [`scanner_auth_middleware`].
#[derive(Clone, Debug)]
pub struct AuthenticatedClient(pub ScannerClientRow);

/// Extract bearer token from the Authorization header.
/// Per RFC 6750, the "Bearer" scheme is case-insensitive.
fn extract_bearer_token(req: &Request) -> Option<&str> {
    req.headers()
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| {
            if v.len() >= 7 && v[..7].eq_ignore_ascii_case("bearer ") {
                Some(&v[7..])
            } else {
                None
            }
        })
}

/// Hash a token for storage lookup.
pub fn hash_token(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    hex::encode(hasher.finalize())
}

/// Middleware validating scanner bearer tokens.
pub async fn scanner_auth_middleware(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let Some(token) = extract_bearer_token(&req) else {
        return Err(ApiError::Unauthorized("missing bearer token".to_string()));
    };

    let token_hash = hash_token(token);
    let Some(client) = state.store.get_client_by_token_hash(&token_hash).await? else {
        return Err(ApiError::Unauthorized("unknown token".to_string()));
    };

    req.extensions_mut().insert(AuthenticatedClient(client));
    Ok(next.run(req).await)
}

/// Middleware validating the admin API key.
pub async fn admin_auth_middleware(
    State(state): State<AppState>,
    req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let presented = req
        .headers()
        .get("x-admin-key")
        .and_then(|v| v.to_str().ok());

    match presented {
        Some(key) if key == state.config.admin.api_key => Ok(next.run(req).await),
        _ => Err(ApiError::Unauthorized("invalid admin key".to_string())),
    }
}

// Note: hex is a simple utility, we'll inline it
mod hex {
    pub fn encode(data: impl AsRef<[u8]>) -> String {
        data.as_ref().iter().map(|b| format!("{b:02x}")).collect()
    }
}
