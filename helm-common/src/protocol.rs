//! WebSocket protocol types for supervisor-gateway communication.
//!
//! This module defines the frame format exchanged between the supervisor and
//! the remote agent gateway.
//!
//! # Protocol Overview
//!
//! The protocol uses JSON-encoded frames over WebSocket. Each frame has a `type`
//! field that determines its structure:
//!
//! - `req`: a request sent by the client, carrying a correlation `id`
//! - `res`: the gateway's response to a request with the same `id`
//! - `event`: an unsolicited push from the gateway, with no correlation id
//!
//! ## Connection Flow
//!
//! 1. Client opens the WebSocket
//! 2. Gateway may push a `connect.challenge` event carrying a nonce
//! 3. Client sends a `connect` request (with the nonce if one arrived)
//! 4. Gateway answers `ok: true` with a hello payload, or an error and closes
//! 5. Client issues arbitrary requests; responses may arrive in any order
//!
//! # Security
//!
//! - Always use `wss://` in production to encrypt the connection
//! - The credential travels inside the `connect` request, never in the URL

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Protocol version spoken by this client.
pub const PROTOCOL_VERSION: u32 = 3;

/// Method name of the handshake request.
pub const CONNECT_METHOD: &str = "connect";

/// Event name of the optional handshake challenge.
pub const CHALLENGE_EVENT: &str = "connect.challenge";

/// A single frame on the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Frame {
    /// Client request.
    Req(RequestFrame),
    /// Response correlated to a request by id.
    Res(ResponseFrame),
    /// Server push event.
    Event(EventFrame),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestFrame {
    pub id: String,
    pub method: String,
    #[serde(default)]
    pub params: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponseFrame {
    pub id: String,
    pub ok: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorShape>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventFrame {
    pub event: String,
    #[serde(default)]
    pub payload: Value,
    /// Monotonic sequence number, if the gateway provides one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seq: Option<u64>,
}

/// Error carried by a failed response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorShape {
    #[serde(default)]
    pub code: String,
    pub message: String,
    #[serde(default)]
    pub retryable: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
}

impl Frame {
    pub fn request(id: impl Into<String>, method: impl Into<String>, params: Value) -> Self {
        Frame::Req(RequestFrame {
            id: id.into(),
            method: method.into(),
            params,
        })
    }

    pub fn parse(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }
}

impl ResponseFrame {
    /// Human-readable failure message, falling back to a generic one when the
    /// gateway omitted the error body.
    pub fn error_message(&self) -> String {
        self.error
            .as_ref()
            .map(|e| e.message.clone())
            .unwrap_or_else(|| "request failed".to_string())
    }
}

/// Parameters of the `connect` handshake request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectParams {
    pub min_protocol: u32,
    pub max_protocol: u32,
    pub client: ClientInfo,
    pub role: String,
    pub scopes: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub caps: Vec<String>,
    pub auth: ConnectAuth,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub locale: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_agent: Option<String>,
    /// Nonce echoed from the `connect.challenge` event, when one was received.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nonce: Option<String>,
}

/// Identity of the connecting client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientInfo {
    pub id: String,
    pub version: String,
    pub platform: String,
    pub mode: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
}

#[derive(Clone, PartialEq, Serialize, Deserialize)]
pub struct ConnectAuth {
    pub token: String,
}

impl std::fmt::Debug for ConnectAuth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectAuth").field("token", &"<redacted>").finish()
    }
}

/// Payload of the `connect.challenge` event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConnectChallenge {
    pub nonce: String,
    #[serde(default)]
    pub ts: Option<i64>,
}

impl ConnectChallenge {
    /// Extract a challenge from an event payload.
    ///
    /// Returns `None` for a missing or malformed payload, or an empty nonce.
    pub fn from_payload(payload: &Value) -> Option<Self> {
        serde_json::from_value::<ConnectChallenge>(payload.clone())
            .ok()
            .filter(|c| !c.nonce.is_empty())
    }
}

/// Payload of a successful `connect` response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct HelloOk {
    /// Protocol version negotiated by the gateway.
    #[serde(default)]
    pub protocol: Option<u32>,
    /// Everything else the gateway reports (server info, features, policy).
    #[serde(flatten)]
    pub extra: serde_json::Map<String, Value>,
}
