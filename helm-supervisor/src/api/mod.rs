//! Local HTTP API.

pub mod call;
pub mod config;
pub mod health;
pub mod local;
pub mod status;

use std::sync::Arc;

use axum::middleware;
use axum::routing::get;
use axum::Router;
use tower_http::trace::TraceLayer;

use crate::state::AppState;

/// Build the `/api` router. Every route is loopback-only.
pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .merge(config::router())
        .merge(status::router())
        .merge(call::router())
        .route_layer(middleware::from_fn(local::require_local))
}

/// Full application: `/api`, `/health` and the HTTP layers.
pub fn app(state: Arc<AppState>) -> Router {
    Router::new()
        .nest("/api", router())
        .route("/health", get(health::health))
        .layer(TraceLayer::new_for_http())
        .layer(local::cors())
        .with_state(state)
}
