//! Shared application state.

use std::sync::Arc;

use crate::gateway::GatewayClient;
use crate::refresh::Dashboard;
use crate::store::ConfigStore;

/// Shared application state passed to all handlers.
pub struct AppState {
    pub client: GatewayClient,
    pub store: Arc<ConfigStore>,
    pub dashboard: Arc<Dashboard>,
}

impl AppState {
    pub fn new(client: GatewayClient, store: Arc<ConfigStore>, dashboard: Arc<Dashboard>) -> Self {
        Self {
            client,
            store,
            dashboard,
        }
    }
}
