//! Passthrough for arbitrary gateway methods.

use std::sync::Arc;

use axum::extract::State;
use axum::routing::post;
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{ApiError, Result};
use crate::state::AppState;

/// Build the call router.
pub fn router() -> Router<Arc<AppState>> {
    Router::new().route("/call", post(call))
}

#[derive(Debug, Deserialize)]
pub struct CallRequest {
    pub method: String,
    #[serde(default)]
    pub params: Option<Value>,
}

#[derive(Debug, Serialize)]
pub struct CallResponse {
    pub result: Value,
}

/// POST /api/call - Send one request over the gateway connection.
async fn call(
    State(state): State<Arc<AppState>>,
    Json(request): Json<CallRequest>,
) -> Result<Json<CallResponse>> {
    let method = request.method.trim();
    if method.is_empty() {
        return Err(ApiError::InvalidRequest("method must not be empty".to_string()));
    }

    let params = request
        .params
        .unwrap_or_else(|| Value::Object(Default::default()));
    tracing::debug!("Forwarding {} to gateway", method);
    let result = state.client.call(method, params).await?;

    Ok(Json(CallResponse { result }))
}
