//! Handshake parameters and the one-shot handshake latch.

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use helm_common::{ClientInfo, ConnectAuth, ConnectParams};
use tokio::time::{sleep, Sleep};

use crate::config::HandshakeConfig;

/// Close code used when the gateway rejects or never answers the handshake.
pub const HANDSHAKE_FAILED_CLOSE_CODE: u16 = 4008;

/// Build the `connect` parameters for a credential, without a nonce.
pub fn connect_params(config: &HandshakeConfig, token: &str) -> ConnectParams {
    let user_agent = config.user_agent.clone().unwrap_or_else(|| {
        format!(
            "helm/{} ({}; {})",
            config.client_version,
            std::env::consts::OS,
            std::env::consts::ARCH
        )
    });

    ConnectParams {
        min_protocol: config.min_protocol,
        max_protocol: config.max_protocol,
        client: ClientInfo {
            id: config.client_id.clone(),
            version: config.client_version.clone(),
            platform: config.platform.clone(),
            mode: config.mode.clone(),
            display_name: config.display_name.clone(),
        },
        role: config.role.clone(),
        scopes: config.scopes.clone(),
        caps: config.caps.clone(),
        auth: ConnectAuth {
            token: token.to_string(),
        },
        locale: Some(config.locale.clone()),
        user_agent: Some(user_agent),
        nonce: None,
    }
}

/// Releases the handshake request at most once per transport.
///
/// Armed when the transport opens. Either a `connect.challenge` or the wait
/// deadline fires it; the parameters are moved out on the first fire, so any
/// later trigger gets nothing.
pub struct HandshakeLatch {
    deadline: Option<Pin<Box<Sleep>>>,
    params: Option<ConnectParams>,
}

impl HandshakeLatch {
    pub fn new(wait: Duration, params: ConnectParams) -> Self {
        Self {
            deadline: Some(Box::pin(sleep(wait))),
            params: Some(params),
        }
    }

    /// Whether the wait deadline is still pending.
    pub fn is_waiting(&self) -> bool {
        self.deadline.is_some()
    }

    /// Resolves when the wait deadline elapses; never resolves once fired.
    pub fn expired(&mut self) -> impl Future<Output = ()> + '_ {
        async move {
            match self.deadline.as_mut() {
                Some(deadline) => deadline.as_mut().await,
                None => std::future::pending().await,
            }
        }
    }

    /// Take the handshake parameters, attaching the challenge nonce if any.
    ///
    /// Returns `None` if the handshake was already released.
    pub fn fire(&mut self, nonce: Option<String>) -> Option<ConnectParams> {
        self.deadline = None;
        let mut params = self.params.take()?;
        params.nonce = nonce;
        Some(params)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params() -> ConnectParams {
        connect_params(&HandshakeConfig::default(), "tok123")
    }

    #[test]
    fn test_connect_params_carry_identity_and_credential() {
        let config = HandshakeConfig {
            display_name: Some("ops desk".to_string()),
            caps: vec!["tool-events".to_string()],
            ..Default::default()
        };
        let params = connect_params(&config, "tok123");
        assert_eq!(params.auth.token, "tok123");
        assert_eq!(params.role, "operator");
        assert_eq!(params.client.id, "gateway-client");
        assert_eq!(params.client.display_name.as_deref(), Some("ops desk"));
        assert_eq!(params.caps, vec!["tool-events".to_string()]);
        assert_eq!(params.locale.as_deref(), Some("en-US"));
        assert!(params.user_agent.unwrap().starts_with("helm/"));
        assert!(params.nonce.is_none());
    }

    #[test]
    fn test_user_agent_override() {
        let config = HandshakeConfig {
            user_agent: Some("custom/1".to_string()),
            ..Default::default()
        };
        assert_eq!(connect_params(&config, "t").user_agent.as_deref(), Some("custom/1"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_fire_only_once() {
        let mut latch = HandshakeLatch::new(Duration::from_millis(750), params());
        assert!(latch.is_waiting());

        let first = latch.fire(Some("abc".to_string())).unwrap();
        assert_eq!(first.nonce.as_deref(), Some("abc"));
        assert!(!latch.is_waiting());
        assert!(latch.fire(None).is_none());
        assert!(latch.fire(Some("again".to_string())).is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_deadline_elapses_after_wait() {
        let start = tokio::time::Instant::now();
        let mut latch = HandshakeLatch::new(Duration::from_millis(750), params());
        latch.expired().await;
        assert!(start.elapsed() >= Duration::from_millis(750));

        let sent = latch.fire(None).unwrap();
        assert!(sent.nonce.is_none());
        assert!(latch.fire(None).is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_fired_latch_never_expires() {
        let mut latch = HandshakeLatch::new(Duration::from_millis(10), params());
        latch.fire(None);
        let waited = tokio::time::timeout(Duration::from_secs(5), latch.expired()).await;
        assert!(waited.is_err());
    }
}
