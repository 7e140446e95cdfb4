//! Dashboard configuration endpoints.
//!
//! The document holds the gateway credential, so responses always carry the
//! redacted form.

use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};
use serde_json::{json, Value};

use crate::error::{ApiError, Result};
use crate::state::AppState;

/// Build the config router.
pub fn router() -> Router<Arc<AppState>> {
    Router::new().route(
        "/config",
        get(get_config)
            .put(write_config)
            .post(write_config)
            .delete(delete_config),
    )
}

/// GET /api/config - Stored config with the token masked.
async fn get_config(State(state): State<Arc<AppState>>) -> Result<Json<Value>> {
    Ok(Json(state.store.load().await.redacted()))
}

/// PUT|POST /api/config - Merge the supplied fields into the stored config.
///
/// POST is accepted for `navigator.sendBeacon` style saves.
async fn write_config(State(state): State<Arc<AppState>>, body: Bytes) -> Result<Json<Value>> {
    let patch: Value = serde_json::from_slice(&body)
        .map_err(|e| ApiError::InvalidRequest(format!("Invalid JSON body: {}", e)))?;
    let config = state.store.update(&patch).await?;
    Ok(Json(config.redacted()))
}

/// DELETE /api/config - Remove the stored config.
async fn delete_config(State(state): State<Arc<AppState>>) -> Result<Json<Value>> {
    state.store.reset().await?;
    Ok(Json(json!({ "ok": true })))
}
