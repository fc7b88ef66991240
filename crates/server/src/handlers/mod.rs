//! HTTP handlers for the coordinator API.

pub mod admin;
pub mod public;
pub mod scanner;

pub use admin::*;
pub use public::*;
pub use scanner::*;

use crate::error::ApiResult;
use axum::Json;
use serde_json::{Value, json};

/// Handler for GET /health (unauthenticated, for probes).
pub async fn health_check() -> ApiResult<Json<Value>> {
    Ok(Json(json!({ "status": "ok" })))
}
