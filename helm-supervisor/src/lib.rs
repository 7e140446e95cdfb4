//! Helm supervisor - keeps an authenticated connection to an agent gateway
//! and serves its dashboard data over a local HTTP API.

pub mod api;
pub mod config;
pub mod error;
pub mod gateway;
pub mod refresh;
pub mod state;
pub mod store;
