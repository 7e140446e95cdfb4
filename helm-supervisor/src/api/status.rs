//! Connection status and dashboard snapshot.

use std::sync::Arc;

use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};
use helm_common::{GatewayStats, HelloOk};
use serde::Serialize;

use crate::gateway::ConnectionStatus;
use crate::refresh::DashboardSnapshot;
use crate::state::AppState;

/// Build the status router.
pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/status", get(get_status))
        .route("/dashboard", get(get_dashboard))
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct StatusResponse {
    status: ConnectionStatus,
    /// Gateway address, never the credential.
    #[serde(skip_serializing_if = "Option::is_none")]
    url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    hello: Option<HelloOk>,
    pending_requests: usize,
    stats: GatewayStats,
}

/// GET /api/status - Connection status and headline stats.
async fn get_status(State(state): State<Arc<AppState>>) -> Json<StatusResponse> {
    let client = &state.client;
    Json(StatusResponse {
        status: client.status(),
        url: client.endpoint().map(|e| e.url),
        hello: client.hello(),
        pending_requests: client.pending_requests(),
        stats: state.dashboard.stats().await,
    })
}

/// GET /api/dashboard - Everything the last refreshes collected.
async fn get_dashboard(State(state): State<Arc<AppState>>) -> Json<DashboardSnapshot> {
    Json(state.dashboard.snapshot().await)
}
