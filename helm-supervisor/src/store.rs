//! File-backed dashboard configuration.
//!
//! Persists the gateway endpoint together with the UI layout and edit mode as
//! a single JSON document. Changes to the gateway endpoint are published on a
//! watch channel so the client can be reconfigured.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use tokio::sync::{watch, Mutex};

use crate::error::StoreError;
use crate::gateway::EndpointConfig;

const DEFAULT_GATEWAY_URL: &str = "ws://localhost:18789";
const REDACTED_TOKEN: &str = "\u{2022}\u{2022}\u{2022}\u{2022}\u{2022}\u{2022}\u{2022}\u{2022}";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewaySettings {
    pub url: String,
    pub token: String,
}

impl Default for GatewaySettings {
    fn default() -> Self {
        Self {
            url: DEFAULT_GATEWAY_URL.to_string(),
            token: String::new(),
        }
    }
}

/// The persisted document.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct HelmConfig {
    pub gateway: GatewaySettings,
    pub layout: Vec<Value>,
    pub edit_mode: bool,
}

impl HelmConfig {
    /// Endpoint to connect to; `None` until a credential has been stored.
    pub fn endpoint(&self) -> Option<EndpointConfig> {
        if self.gateway.token.is_empty() {
            return None;
        }
        Some(EndpointConfig::new(
            self.gateway.url.clone(),
            self.gateway.token.clone(),
        ))
    }

    /// JSON view with the token masked.
    pub fn redacted(&self) -> Value {
        let has_token = !self.gateway.token.is_empty();
        json!({
            "gateway": {
                "url": self.gateway.url,
                "hasToken": has_token,
                "token": if has_token { REDACTED_TOKEN } else { "" },
            },
            "layout": self.layout,
            "editMode": self.edit_mode,
        })
    }

    /// Apply a partial update. Only fields present in `patch` change.
    ///
    /// A token equal to the redaction mask keeps the stored token, so a
    /// redacted document can be written back unchanged.
    fn apply(&mut self, patch: &Map<String, Value>) -> Result<(), StoreError> {
        validate_patch(patch)?;

        if let Some(gateway) = patch.get("gateway").and_then(Value::as_object) {
            if let Some(url) = gateway.get("url").and_then(Value::as_str) {
                self.gateway.url = url.to_string();
            }
            if let Some(token) = gateway.get("token").and_then(Value::as_str) {
                if token != REDACTED_TOKEN {
                    self.gateway.token = token.to_string();
                }
            }
        }
        if let Some(layout) = patch.get("layout").and_then(Value::as_array) {
            self.layout = layout.clone();
        }
        if let Some(edit_mode) = patch.get("editMode").and_then(Value::as_bool) {
            self.edit_mode = edit_mode;
        }
        Ok(())
    }
}

fn validate_patch(patch: &Map<String, Value>) -> Result<(), StoreError> {
    let invalid = |msg: &str| Err(StoreError::Invalid(msg.to_string()));

    if let Some(gateway) = patch.get("gateway") {
        let Some(gateway) = gateway.as_object() else {
            return invalid("gateway must be an object");
        };
        if gateway.get("url").is_some_and(|v| !v.is_string()) {
            return invalid("gateway.url must be a string");
        }
        if gateway.get("token").is_some_and(|v| !v.is_string()) {
            return invalid("gateway.token must be a string");
        }
    }
    if patch.get("layout").is_some_and(|v| !v.is_array()) {
        return invalid("layout must be an array");
    }
    if patch.get("editMode").is_some_and(|v| !v.is_boolean()) {
        return invalid("editMode must be a boolean");
    }
    Ok(())
}

/// Config document on disk plus change notification.
pub struct ConfigStore {
    path: PathBuf,
    /// Serializes read-modify-write cycles.
    write_lock: Mutex<()>,
    endpoint: watch::Sender<Option<EndpointConfig>>,
}

impl ConfigStore {
    /// Open the store, reading the current endpoint from disk.
    pub async fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let initial = read_config(&path).await.endpoint();
        let (endpoint, _) = watch::channel(initial);
        Self {
            path,
            write_lock: Mutex::new(()),
            endpoint,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Current document; defaults when the file is missing or unreadable.
    pub async fn load(&self) -> HelmConfig {
        read_config(&self.path).await
    }

    /// Merge `patch` into the stored document and persist it.
    pub async fn update(&self, patch: &Value) -> Result<HelmConfig, StoreError> {
        let Some(patch) = patch.as_object() else {
            return Err(StoreError::Invalid("body must be a JSON object".to_string()));
        };

        let _guard = self.write_lock.lock().await;
        let mut config = read_config(&self.path).await;
        config.apply(patch)?;
        write_config(&self.path, &config).await?;
        tracing::info!("Saved dashboard config to {}", self.path.display());

        self.publish(config.endpoint());
        Ok(config)
    }

    /// Delete the stored document. A missing file is not an error.
    pub async fn reset(&self) -> Result<(), StoreError> {
        let _guard = self.write_lock.lock().await;
        match tokio::fs::remove_file(&self.path).await {
            Ok(()) => tracing::info!("Removed dashboard config {}", self.path.display()),
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }
        self.publish(None);
        Ok(())
    }

    /// Notified whenever the stored gateway endpoint changes.
    pub fn subscribe(&self) -> watch::Receiver<Option<EndpointConfig>> {
        self.endpoint.subscribe()
    }

    pub fn endpoint(&self) -> Option<EndpointConfig> {
        self.endpoint.borrow().clone()
    }

    fn publish(&self, endpoint: Option<EndpointConfig>) {
        self.endpoint.send_if_modified(|current| {
            if *current == endpoint {
                return false;
            }
            *current = endpoint;
            true
        });
    }
}

async fn read_config(path: &Path) -> HelmConfig {
    let raw = match tokio::fs::read_to_string(path).await {
        Ok(raw) => raw,
        Err(e) if e.kind() == ErrorKind::NotFound => return HelmConfig::default(),
        Err(e) => {
            tracing::warn!("Failed to read {}: {}, using defaults", path.display(), e);
            return HelmConfig::default();
        }
    };
    serde_json::from_str(&raw).unwrap_or_else(|e| {
        tracing::warn!("Ignoring malformed {}: {}", path.display(), e);
        HelmConfig::default()
    })
}

async fn write_config(path: &Path, config: &HelmConfig) -> Result<(), StoreError> {
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(dir).await?;
    }
    let body = serde_json::to_string_pretty(config)?;
    tokio::fs::write(path, body).await?;
    Ok(())
}
