//! Gateway WebSocket client.
//!
//! Maintains a single authenticated connection to the agent gateway:
//! the `connect` handshake (with optional challenge nonce), request/response
//! correlation with per-call timeouts, server push events, and fixed-delay
//! reconnection after unexpected disconnects.

mod client;
mod endpoint;
mod handshake;
mod pending;
mod reconnect;
pub mod transport;

pub use client::{ConnectionStatus, GatewayClient};
pub use endpoint::EndpointConfig;
pub use transport::{BoxTransport, Connector, WsConnector};
