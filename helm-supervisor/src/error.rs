//! Error types for the gateway supervisor.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

/// Failures surfaced by the gateway client.
///
/// Call failures are delivered to the individual caller; connection failures
/// show up as status transitions. None of them are fatal to the process.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ClientError {
    #[error("Invalid gateway endpoint: {0}")]
    InvalidEndpoint(String),

    #[error("Not connected to gateway")]
    NotConnected,

    #[error("Request timed out: {method}")]
    Timeout { method: String },

    #[error("Gateway error: {message}")]
    Remote { code: String, message: String },

    #[error("Connection closed (code {code}): {reason}")]
    ConnectionClosed { code: u16, reason: String },

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// Failures of the file-backed configuration store.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Config file I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("Config file is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("{0}")]
    Invalid(String),
}

/// Errors returned by the local HTTP API.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("Forbidden")]
    Forbidden,

    #[error("{0}")]
    InvalidRequest(String),

    #[error(transparent)]
    Gateway(#[from] ClientError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self {
            ApiError::Forbidden => StatusCode::FORBIDDEN,
            ApiError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Store(StoreError::Invalid(_)) => StatusCode::BAD_REQUEST,
            ApiError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::Gateway(err) => match err {
                ClientError::NotConnected | ClientError::ConnectionClosed { .. } => {
                    StatusCode::SERVICE_UNAVAILABLE
                }
                ClientError::Timeout { .. } => StatusCode::GATEWAY_TIMEOUT,
                ClientError::Remote { .. } | ClientError::Transport(_) => StatusCode::BAD_GATEWAY,
                ClientError::InvalidEndpoint(_) => StatusCode::BAD_REQUEST,
                ClientError::Serialization(_) => StatusCode::INTERNAL_SERVER_ERROR,
            },
        };

        let body = Json(json!({ "error": self.to_string() }));

        (status, body).into_response()
    }
}

pub type Result<T> = std::result::Result<T, ApiError>;
