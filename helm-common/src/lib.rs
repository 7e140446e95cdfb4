//! Helm Common Types
//!
//! Shared types used by the gateway supervisor: wire frames exchanged with the
//! gateway, handshake parameters, and the dashboard data models.

pub mod dashboard;
pub mod protocol;

pub use dashboard::{
    CronJob, CronRunEntry, CronRunStatus, GatewayStats, Session, SessionKind, SessionMessage,
    SessionRole,
};
pub use protocol::{
    ClientInfo, ConnectAuth, ConnectChallenge, ConnectParams, ErrorShape, EventFrame, Frame,
    HelloOk, RequestFrame, ResponseFrame, CHALLENGE_EVENT, CONNECT_METHOD, PROTOCOL_VERSION,
};
