//! Configuration for the gateway supervisor.

use std::time::Duration;

use config::{Config as ConfigLoader, ConfigError, Environment, File};
use helm_common::PROTOCOL_VERSION;
use serde::Deserialize;

use crate::gateway::EndpointConfig;

/// Main configuration structure for the supervisor.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct Config {
    /// Gateway connection settings.
    #[serde(default)]
    pub gateway: GatewayConfig,
    /// Identity and scopes requested during the handshake.
    #[serde(default)]
    pub handshake: HandshakeConfig,
    #[serde(default)]
    pub refresh: RefreshConfig,
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub store: StoreConfig,
}

/// Gateway WebSocket connection configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct GatewayConfig {
    /// Initial endpoint, used when the config store has no credential yet.
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub token: Option<String>,
    #[serde(default = "default_request_timeout")]
    pub request_timeout_ms: u64,
    /// How long to wait for a `connect.challenge` before sending the handshake anyway.
    #[serde(default = "default_handshake_wait")]
    pub handshake_wait_ms: u64,
    #[serde(default = "default_reconnect_delay")]
    pub reconnect_delay_ms: u64,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            url: None,
            token: None,
            request_timeout_ms: default_request_timeout(),
            handshake_wait_ms: default_handshake_wait(),
            reconnect_delay_ms: default_reconnect_delay(),
        }
    }
}

impl GatewayConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn handshake_wait(&self) -> Duration {
        Duration::from_millis(self.handshake_wait_ms)
    }

    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_millis(self.reconnect_delay_ms)
    }

    /// Endpoint from the static configuration, if both url and token are set.
    pub fn endpoint(&self) -> Option<EndpointConfig> {
        match (&self.url, &self.token) {
            (Some(url), Some(token)) if !token.is_empty() => {
                Some(EndpointConfig::new(url.clone(), token.clone()))
            }
            _ => None,
        }
    }
}

/// What the client tells the gateway about itself during the handshake.
///
/// Role and scopes reflect a deployment's trust model, so nothing here is
/// hard-coded in the client.
#[derive(Debug, Clone, Deserialize)]
pub struct HandshakeConfig {
    #[serde(default = "default_client_id")]
    pub client_id: String,
    #[serde(default = "default_client_version")]
    pub client_version: String,
    #[serde(default = "default_platform")]
    pub platform: String,
    #[serde(default = "default_mode")]
    pub mode: String,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default = "default_role")]
    pub role: String,
    #[serde(default = "default_scopes")]
    pub scopes: Vec<String>,
    #[serde(default)]
    pub caps: Vec<String>,
    #[serde(default = "default_locale")]
    pub locale: String,
    /// Overrides the generated `helm/<version> (<os>)` user agent.
    #[serde(default)]
    pub user_agent: Option<String>,
    #[serde(default = "default_protocol")]
    pub min_protocol: u32,
    #[serde(default = "default_protocol")]
    pub max_protocol: u32,
}

impl Default for HandshakeConfig {
    fn default() -> Self {
        Self {
            client_id: default_client_id(),
            client_version: default_client_version(),
            platform: default_platform(),
            mode: default_mode(),
            display_name: None,
            role: default_role(),
            scopes: default_scopes(),
            caps: vec![],
            locale: default_locale(),
            user_agent: None,
            min_protocol: default_protocol(),
            max_protocol: default_protocol(),
        }
    }
}

/// Dashboard refresh configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct RefreshConfig {
    #[serde(default = "default_refresh_interval")]
    pub interval_secs: u64,
}

impl Default for RefreshConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_refresh_interval(),
        }
    }
}

impl RefreshConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct StoreConfig {
    /// Path of the persisted dashboard config (gateway endpoint, layout).
    #[serde(default = "default_store_path")]
    pub path: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: default_store_path(),
        }
    }
}

// Default values
fn default_request_timeout() -> u64 {
    30_000
}
fn default_handshake_wait() -> u64 {
    750
}
fn default_reconnect_delay() -> u64 {
    5_000
}
fn default_client_id() -> String {
    "gateway-client".to_string()
}
fn default_client_version() -> String {
    env!("CARGO_PKG_VERSION").to_string()
}
fn default_platform() -> String {
    std::env::consts::OS.to_string()
}
fn default_mode() -> String {
    "ui".to_string()
}
fn default_role() -> String {
    "operator".to_string()
}
fn default_scopes() -> Vec<String> {
    vec![
        "operator.read".to_string(),
        "operator.write".to_string(),
        "operator.admin".to_string(),
    ]
}
fn default_locale() -> String {
    "en-US".to_string()
}
fn default_protocol() -> u32 {
    PROTOCOL_VERSION
}
fn default_refresh_interval() -> u64 {
    15
}
fn default_host() -> String {
    "127.0.0.1".to_string()
}
fn default_port() -> u16 {
    3000
}
fn default_store_path() -> String {
    "data/helm-config.json".to_string()
}

impl Config {
    /// Load configuration from file and environment variables.
    ///
    /// Configuration sources (in order of precedence):
    /// 1. Environment variables (HELM__SECTION__KEY format)
    /// 2. helm.toml file (if present)
    /// 3. Built-in defaults
    pub fn load() -> Result<Self, ConfigError> {
        let config = ConfigLoader::builder()
            .set_default("api.host", default_host())?
            .set_default("api.port", default_port() as i64)?
            .set_default("store.path", default_store_path())?
            .add_source(File::with_name("helm").required(false))
            .add_source(
                Environment::with_prefix("HELM")
                    .separator("__")
                    .list_separator(",")
                    .with_list_parse_key("handshake.scopes")
                    .with_list_parse_key("handshake.caps")
                    .try_parsing(true),
            )
            .build()?;

        config.try_deserialize()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_gateway_timings() {
        let gateway = GatewayConfig::default();
        assert_eq!(gateway.request_timeout(), Duration::from_secs(30));
        assert_eq!(gateway.handshake_wait(), Duration::from_millis(750));
        assert_eq!(gateway.reconnect_delay(), Duration::from_secs(5));
    }

    #[test]
    fn test_gateway_endpoint_requires_token() {
        let mut gateway = GatewayConfig {
            url: Some("ws://localhost:18789".to_string()),
            ..Default::default()
        };
        assert!(gateway.endpoint().is_none());

        gateway.token = Some(String::new());
        assert!(gateway.endpoint().is_none());

        gateway.token = Some("tok".to_string());
        let endpoint = gateway.endpoint().unwrap();
        assert_eq!(endpoint.url, "ws://localhost:18789");
        assert_eq!(endpoint.token, "tok");
    }

    #[test]
    fn test_default_handshake_config() {
        let handshake = HandshakeConfig::default();
        assert_eq!(handshake.role, "operator");
        assert_eq!(handshake.min_protocol, PROTOCOL_VERSION);
        assert!(handshake.scopes.contains(&"operator.read".to_string()));
    }

    #[test]
    fn test_deserialize_partial_config() {
        let config: Config = serde_json::from_value(serde_json::json!({
            "gateway": { "reconnect_delay_ms": 1000 },
            "handshake": { "role": "node", "scopes": [] }
        }))
        .unwrap();
        assert_eq!(config.gateway.reconnect_delay(), Duration::from_secs(1));
        assert_eq!(config.gateway.request_timeout_ms, 30_000);
        assert_eq!(config.handshake.role, "node");
        assert!(config.handshake.scopes.is_empty());
        assert_eq!(config.api.port, 3000);
        assert_eq!(config.refresh.interval(), Duration::from_secs(15));
    }
}
