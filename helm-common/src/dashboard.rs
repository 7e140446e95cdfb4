//! Dashboard data models reported by the gateway.
//!
//! The gateway owns cron scheduling and session management; these types only
//! describe what it reports back. Field names follow the gateway's camelCase
//! JSON and every optional field tolerates absence.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A scheduled job as reported by `cron.list`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CronJob {
    pub name: String,
    pub schedule: String,
    #[serde(default)]
    pub enabled: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_run: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_run: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub command: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config: Option<serde_json::Map<String, Value>>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub history: Vec<CronRunEntry>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CronRunEntry {
    pub timestamp: String,
    pub status: CronRunStatus,
    /// Run duration in milliseconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CronRunStatus {
    Success,
    Error,
    Running,
}

/// An agent session as reported by `sessions.list`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub key: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tokens: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub messages: Vec<SessionMessage>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionMessage {
    pub role: SessionRole,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionRole {
    User,
    Assistant,
    System,
}

/// Kind of session, derived from its key (`agent:<name>:<kind>[:<id>]`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionKind {
    Main,
    Cron,
    Subagent,
    Heartbeat,
    Unknown,
}

impl SessionKind {
    pub fn from_key(key: &str) -> Self {
        let parts: Vec<&str> = key.split(':').collect();
        if parts.contains(&"heartbeat") {
            SessionKind::Heartbeat
        } else if parts.contains(&"subagent") {
            SessionKind::Subagent
        } else if parts.contains(&"cron") {
            SessionKind::Cron
        } else if parts.len() >= 3 && parts[2].starts_with("main") {
            SessionKind::Main
        } else {
            SessionKind::Unknown
        }
    }
}

impl Session {
    pub fn kind(&self) -> SessionKind {
        SessionKind::from_key(&self.key)
    }

    /// Parsed `updatedAt`, if present and RFC 3339.
    pub fn last_activity(&self) -> Option<DateTime<Utc>> {
        self.updated_at
            .as_deref()
            .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
            .map(|dt| dt.with_timezone(&Utc))
    }
}

/// Headline numbers shown on the dashboard.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct GatewayStats {
    pub active_sessions: u64,
    pub total_cron_jobs: u64,
    /// Gateway uptime in seconds.
    pub uptime: u64,
    pub connected: bool,
}

impl GatewayStats {
    /// Merge a `status` payload, keeping previous values for absent or
    /// non-numeric fields.
    pub fn merge_status(&mut self, payload: &Value) {
        let field = |name: &str| payload.get(name).and_then(Value::as_u64);
        if let Some(v) = field("activeSessions") {
            self.active_sessions = v;
        }
        if let Some(v) = field("totalCronJobs") {
            self.total_cron_jobs = v;
        }
        if let Some(v) = field("uptime") {
            self.uptime = v;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_session_kind_from_key() {
        assert_eq!(SessionKind::from_key("agent:main:main"), SessionKind::Main);
        assert_eq!(SessionKind::from_key("agent:main:main.1234"), SessionKind::Main);
        assert_eq!(SessionKind::from_key("agent:main:cron:42"), SessionKind::Cron);
        assert_eq!(SessionKind::from_key("agent:main:subagent:7"), SessionKind::Subagent);
        assert_eq!(SessionKind::from_key("agent:main:heartbeat"), SessionKind::Heartbeat);
        assert_eq!(SessionKind::from_key(""), SessionKind::Unknown);
        assert_eq!(SessionKind::from_key("other"), SessionKind::Unknown);
    }

    #[test]
    fn test_cron_job_minimal() {
        let job: CronJob =
            serde_json::from_value(json!({"name": "digest", "schedule": "0 8 * * *"})).unwrap();
        assert_eq!(job.name, "digest");
        assert!(!job.enabled);
        assert!(job.history.is_empty());
    }

    #[test]
    fn test_cron_job_with_history() {
        let job: CronJob = serde_json::from_value(json!({
            "name": "backup",
            "schedule": "@daily",
            "enabled": true,
            "lastRun": "2026-01-01T00:00:00Z",
            "history": [{"timestamp": "2026-01-01T00:00:00Z", "status": "error", "error": "disk full"}]
        }))
        .unwrap();
        assert_eq!(job.last_run.as_deref(), Some("2026-01-01T00:00:00Z"));
        assert_eq!(job.history[0].status, CronRunStatus::Error);
        assert_eq!(job.history[0].error.as_deref(), Some("disk full"));
    }

    #[test]
    fn test_session_last_activity() {
        let session: Session = serde_json::from_value(json!({
            "key": "agent:main:main",
            "updatedAt": "2026-03-04T05:06:07Z"
        }))
        .unwrap();
        let ts = session.last_activity().unwrap();
        assert_eq!(ts.to_rfc3339(), "2026-03-04T05:06:07+00:00");
        assert_eq!(session.kind(), SessionKind::Main);
    }

    #[test]
    fn test_session_last_activity_invalid() {
        let session: Session =
            serde_json::from_value(json!({"key": "k", "updatedAt": "yesterday"})).unwrap();
        assert!(session.last_activity().is_none());
    }

    #[test]
    fn test_stats_merge_keeps_missing_fields() {
        let mut stats = GatewayStats {
            active_sessions: 2,
            total_cron_jobs: 5,
            uptime: 100,
            connected: true,
        };
        stats.merge_status(&json!({"uptime": 160, "activeSessions": "many"}));
        assert_eq!(stats.uptime, 160);
        assert_eq!(stats.active_sessions, 2);
        assert_eq!(stats.total_cron_jobs, 5);
        assert!(stats.connected);
    }

    #[test]
    fn test_stats_serialization() {
        let json = serde_json::to_string(&GatewayStats::default()).unwrap();
        assert!(json.contains(r#""activeSessions":0"#));
        assert!(json.contains(r#""connected":false"#));
    }
}
