//! Periodic dashboard refresh.
//!
//! While the gateway connection is up, pulls stats, cron jobs and sessions on
//! a fixed interval (plus the raw gateway config once per connection) and
//! keeps the latest snapshot for the HTTP API.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use helm_common::{CronJob, GatewayStats, Session};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{json, Value};
use tokio::sync::RwLock;
use tokio::time::{interval_at, Instant, MissedTickBehavior};

use crate::gateway::{ConnectionStatus, GatewayClient};

/// Latest data pulled from the gateway.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardSnapshot {
    pub stats: GatewayStats,
    pub cron_jobs: Vec<CronJob>,
    pub sessions: Vec<Session>,
    /// Gateway config as pretty-printed JSON.
    pub raw_config: Option<String>,
    pub refreshed_at: Option<DateTime<Utc>>,
}

/// Shared dashboard state.
#[derive(Default)]
pub struct Dashboard {
    snapshot: RwLock<DashboardSnapshot>,
}

impl Dashboard {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn snapshot(&self) -> DashboardSnapshot {
        self.snapshot.read().await.clone()
    }

    pub async fn stats(&self) -> GatewayStats {
        self.snapshot.read().await.stats
    }

    async fn set_connected(&self, connected: bool) {
        self.snapshot.write().await.stats.connected = connected;
    }

    async fn update(&self, apply: impl FnOnce(&mut DashboardSnapshot)) {
        let mut snapshot = self.snapshot.write().await;
        apply(&mut snapshot);
        snapshot.refreshed_at = Some(Utc::now());
    }
}

/// Drives refreshes from connection status changes.
pub struct Refresher {
    client: GatewayClient,
    dashboard: Arc<Dashboard>,
    interval: Duration,
}

impl Refresher {
    pub fn new(client: GatewayClient, dashboard: Arc<Dashboard>, interval: Duration) -> Self {
        Self {
            client,
            dashboard,
            interval,
        }
    }

    /// Runs for the life of the process.
    ///
    /// The refresher holds a client handle, which keeps the status channel
    /// open, so this only returns if that channel closes.
    pub async fn run(self) {
        let mut status = self.client.subscribe_status();

        loop {
            let current = *status.borrow_and_update();
            let connected = current == ConnectionStatus::Connected;
            self.dashboard.set_connected(connected).await;

            if connected {
                tokio::join!(
                    self.refresh_stats(),
                    self.refresh_cron_jobs(),
                    self.refresh_sessions(),
                    self.refresh_config(),
                );

                let mut ticker = interval_at(Instant::now() + self.interval, self.interval);
                ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
                loop {
                    tokio::select! {
                        _ = ticker.tick() => {
                            tokio::join!(
                                self.refresh_stats(),
                                self.refresh_cron_jobs(),
                                self.refresh_sessions(),
                            );
                        }
                        changed = status.changed() => {
                            if changed.is_err() {
                                return;
                            }
                            break;
                        }
                    }
                }
            } else if status.changed().await.is_err() {
                return;
            }
        }
    }

    async fn refresh_stats(&self) {
        let Some(payload) = self.fetch("status").await else {
            return;
        };
        if !payload.is_object() {
            return;
        }
        self.dashboard
            .update(|s| s.stats.merge_status(&payload))
            .await;
    }

    async fn refresh_cron_jobs(&self) {
        let Some(payload) = self.fetch("cron.list").await else {
            return;
        };
        if let Some(jobs) = parse_list::<CronJob>(payload, "jobs") {
            self.dashboard.update(|s| s.cron_jobs = jobs).await;
        }
    }

    async fn refresh_sessions(&self) {
        let Some(payload) = self.fetch("sessions.list").await else {
            return;
        };
        if let Some(mut sessions) = parse_list::<Session>(payload, "sessions") {
            sort_by_activity(&mut sessions);
            self.dashboard.update(|s| s.sessions = sessions).await;
        }
    }

    async fn refresh_config(&self) {
        let Some(payload) = self.fetch("config.get").await else {
            return;
        };
        match serde_json::to_string_pretty(&payload) {
            Ok(raw) => self.dashboard.update(|s| s.raw_config = Some(raw)).await,
            Err(e) => tracing::debug!("Failed to format gateway config: {}", e),
        }
    }

    async fn fetch(&self, method: &str) -> Option<Value> {
        match self.client.call(method, json!({})).await {
            Ok(payload) => Some(payload),
            Err(e) => {
                tracing::debug!("Refresh {} failed: {}", method, e);
                None
            }
        }
    }
}

/// Accept either a bare array or an object wrapping the array under `key`.
///
/// Entries that do not deserialize are skipped. Returns `None` when the
/// payload has neither shape.
fn parse_list<T: DeserializeOwned>(payload: Value, key: &str) -> Option<Vec<T>> {
    let items = match payload {
        Value::Array(items) => items,
        Value::Object(mut map) => match map.remove(key) {
            Some(Value::Array(items)) => items,
            _ => return None,
        },
        _ => return None,
    };

    let parsed = items
        .into_iter()
        .filter_map(|item| match serde_json::from_value(item) {
            Ok(entry) => Some(entry),
            Err(e) => {
                tracing::debug!("Skipping malformed {} entry: {}", key, e);
                None
            }
        })
        .collect();
    Some(parsed)
}

/// Most recently active first; sessions without a timestamp go last.
fn sort_by_activity(sessions: &mut [Session]) {
    sessions.sort_by(|a, b| b.last_activity().cmp(&a.last_activity()));
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use helm_common::Frame;
    use tokio_tungstenite::tungstenite::Message;

    use super::*;
    use crate::config::{GatewayConfig, HandshakeConfig};
    use crate::gateway::transport::memory::{GatewaySide, MemoryConnector};
    use crate::gateway::EndpointConfig;

    /// Answer every request like a small gateway would, recording methods.
    async fn serve(mut side: GatewaySide, seen: Arc<Mutex<Vec<String>>>) {
        while let Some(message) = side.recv_message().await {
            let Message::Text(text) = message else {
                continue;
            };
            let Ok(Frame::Req(request)) = Frame::parse(&text) else {
                continue;
            };
            let (id, method) = (request.id, request.method);
            let payload = match method.as_str() {
                "connect" => json!({"type": "hello-ok", "protocol": 3}),
                "status" => json!({"activeSessions": 2, "uptime": 3600}),
                "cron.list" => json!({"jobs": [
                    {"name": "digest", "schedule": "0 8 * * *", "enabled": true},
                    {"broken": true}
                ]}),
                "sessions.list" => json!([
                    {"key": "agent:main:main", "updatedAt": "2026-01-01T10:00:00Z"},
                    {"key": "agent:main:cron:1", "updatedAt": "2026-01-02T10:00:00Z"}
                ]),
                "config.get" => json!({"agents": {"default": "main"}}),
                _ => json!(null),
            };
            seen.lock().unwrap().push(method);
            side.respond_ok(&id, payload);
        }
    }

    fn count(seen: &Arc<Mutex<Vec<String>>>, method: &str) -> usize {
        seen.lock().unwrap().iter().filter(|m| *m == method).count()
    }

    #[tokio::test(start_paused = true)]
    async fn test_refreshes_on_connect_and_on_interval() {
        let (connector, mut gateway) = MemoryConnector::new();
        let client = GatewayClient::new(
            GatewayConfig::default(),
            HandshakeConfig::default(),
            connector,
        );
        let dashboard = Arc::new(Dashboard::new());
        let refresher = Refresher::new(client.clone(), dashboard.clone(), Duration::from_secs(15));
        tokio::spawn(refresher.run());

        client
            .configure(EndpointConfig::new("ws://gw.example/", "tok123"))
            .unwrap();
        let seen = Arc::new(Mutex::new(Vec::new()));
        tokio::spawn(serve(gateway.accept().await, seen.clone()));

        tokio::time::sleep(Duration::from_secs(2)).await;
        let snapshot = dashboard.snapshot().await;
        assert!(snapshot.stats.connected);
        assert_eq!(snapshot.stats.active_sessions, 2);
        assert_eq!(snapshot.stats.uptime, 3600);
        assert_eq!(snapshot.cron_jobs.len(), 1);
        assert_eq!(snapshot.cron_jobs[0].name, "digest");
        assert_eq!(snapshot.sessions[0].key, "agent:main:cron:1");
        assert!(snapshot.raw_config.unwrap().contains("\"default\": \"main\""));
        assert_eq!(count(&seen, "config.get"), 1);
        assert_eq!(count(&seen, "status"), 1);

        tokio::time::sleep(Duration::from_secs(15)).await;
        assert_eq!(count(&seen, "status"), 2);
        assert_eq!(count(&seen, "cron.list"), 2);
        assert_eq!(count(&seen, "sessions.list"), 2);
        assert_eq!(count(&seen, "config.get"), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_refresh_pauses_while_disconnected() {
        let (connector, mut gateway) = MemoryConnector::new();
        let client = GatewayClient::new(
            GatewayConfig::default(),
            HandshakeConfig::default(),
            connector,
        );
        let dashboard = Arc::new(Dashboard::new());
        tokio::spawn(Refresher::new(client.clone(), dashboard.clone(), Duration::from_secs(15)).run());

        client
            .configure(EndpointConfig::new("ws://gw.example/", "tok123"))
            .unwrap();
        let seen = Arc::new(Mutex::new(Vec::new()));
        tokio::spawn(serve(gateway.accept().await, seen.clone()));
        tokio::time::sleep(Duration::from_secs(2)).await;
        assert!(dashboard.stats().await.connected);

        client.disconnect();
        tokio::time::sleep(Duration::from_secs(60)).await;
        assert!(!dashboard.stats().await.connected);
        assert_eq!(count(&seen, "status"), 1);
        // Data from the last refresh stays visible.
        assert_eq!(dashboard.snapshot().await.cron_jobs.len(), 1);

        // The refresher outlives the disconnect and picks up the next connection.
        client
            .configure(EndpointConfig::new("ws://gw.example/", "tok123"))
            .unwrap();
        tokio::spawn(serve(gateway.accept().await, seen.clone()));
        tokio::time::sleep(Duration::from_secs(2)).await;
        assert!(dashboard.stats().await.connected);
        assert_eq!(count(&seen, "status"), 2);
        assert_eq!(count(&seen, "config.get"), 2);
    }

    #[test]
    fn test_parse_list_shapes() {
        let bare: Vec<CronJob> =
            parse_list(json!([{"name": "a", "schedule": "* * * * *"}]), "jobs").unwrap();
        assert_eq!(bare.len(), 1);

        let wrapped: Vec<CronJob> =
            parse_list(json!({"jobs": [{"name": "b", "schedule": "@daily"}]}), "jobs").unwrap();
        assert_eq!(wrapped[0].name, "b");

        assert!(parse_list::<CronJob>(json!({"other": []}), "jobs").is_none());
        assert!(parse_list::<CronJob>(json!("nope"), "jobs").is_none());
    }

    #[test]
    fn test_sessions_without_timestamp_sort_last() {
        let mut sessions: Vec<Session> = serde_json::from_value(json!([
            {"key": "agent:x:main"},
            {"key": "agent:y:main", "updatedAt": "2026-03-01T00:00:00Z"},
            {"key": "agent:z:main", "updatedAt": "2026-04-01T00:00:00Z"}
        ]))
        .unwrap();
        sort_by_activity(&mut sessions);
        let keys: Vec<_> = sessions.iter().map(|s| s.key.as_str()).collect();
        assert_eq!(keys, vec!["agent:z:main", "agent:y:main", "agent:x:main"]);
    }
}
