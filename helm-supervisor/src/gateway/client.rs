//! WebSocket client for the gateway connection.

use std::fmt;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use futures_util::{SinkExt, StreamExt};
use helm_common::{
    ConnectChallenge, ConnectParams, EventFrame, Frame, HelloOk, CHALLENGE_EVENT, CONNECT_METHOD,
};
use serde::Serialize;
use serde_json::Value;
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::Message;
use url::Url;

use crate::config::{GatewayConfig, HandshakeConfig};
use crate::error::ClientError;

use super::endpoint::EndpointConfig;
use super::handshake::{connect_params, HandshakeLatch, HANDSHAKE_FAILED_CLOSE_CODE};
use super::pending::{Outcome, PendingRequest, PendingRequests};
use super::reconnect::ReconnectTimer;
use super::transport::{BoxTransport, Connector, WsConnector};

const NORMAL_CLOSE_CODE: u16 = 1000;
const NO_STATUS_CLOSE_CODE: u16 = 1005;
const ABNORMAL_CLOSE_CODE: u16 = 1006;
const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Connection status as seen by consumers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionStatus {
    Disconnected,
    Connecting,
    Connected,
    Error,
}

impl ConnectionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectionStatus::Disconnected => "disconnected",
            ConnectionStatus::Connecting => "connecting",
            ConnectionStatus::Connected => "connected",
            ConnectionStatus::Error => "error",
        }
    }
}

impl fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a transport went away.
#[derive(Debug, Clone, PartialEq, Eq)]
struct CloseInfo {
    code: u16,
    reason: String,
}

impl CloseInfo {
    fn new(code: u16, reason: impl Into<String>) -> Self {
        Self {
            code,
            reason: reason.into(),
        }
    }

    fn abnormal(reason: impl Into<String>) -> Self {
        Self::new(ABNORMAL_CLOSE_CODE, reason)
    }

    fn from_frame(frame: Option<CloseFrame<'_>>) -> Self {
        match frame {
            Some(frame) => Self::new(u16::from(frame.code), frame.reason.into_owned()),
            None => Self::new(NO_STATUS_CLOSE_CODE, "no close reason"),
        }
    }

    fn to_error(&self) -> ClientError {
        ClientError::ConnectionClosed {
            code: self.code,
            reason: self.reason.clone(),
        }
    }
}

/// Close reasons are limited to 123 bytes on the wire.
fn truncate_reason(reason: &str) -> String {
    const MAX_REASON_BYTES: usize = 123;
    if reason.len() <= MAX_REASON_BYTES {
        return reason.to_string();
    }
    let mut end = MAX_REASON_BYTES;
    while !reason.is_char_boundary(end) {
        end -= 1;
    }
    reason[..end].to_string()
}

/// Work handed to the task that owns the transport.
enum Outbound {
    Text(String),
    Close(CloseInfo),
}

/// The single live transport, if any.
struct Link {
    generation: u64,
    /// Set once the transport is open.
    outbound: Option<mpsc::UnboundedSender<Outbound>>,
    task: JoinHandle<()>,
}

struct State {
    /// Last accepted endpoint; reconnection always reads it fresh.
    endpoint: Option<EndpointConfig>,
    generation: u64,
    link: Option<Link>,
    pending: PendingRequests,
    reconnect: ReconnectTimer,
    hello: Option<HelloOk>,
}

impl State {
    fn is_current(&self, generation: u64) -> bool {
        self.link.as_ref().is_some_and(|l| l.generation == generation)
    }
}

struct Inner {
    config: GatewayConfig,
    handshake: HandshakeConfig,
    connector: Arc<dyn Connector>,
    status: watch::Sender<ConnectionStatus>,
    events: broadcast::Sender<EventFrame>,
    state: Mutex<State>,
}

/// Gateway WebSocket client.
///
/// Owns at most one transport at a time, performs the `connect` handshake,
/// multiplexes requests by correlation id, and reconnects after any
/// disconnect the caller did not ask for. Cloning yields another handle to the
/// same connection.
#[derive(Clone)]
pub struct GatewayClient {
    inner: Arc<Inner>,
}

impl GatewayClient {
    pub fn new(
        config: GatewayConfig,
        handshake: HandshakeConfig,
        connector: Arc<dyn Connector>,
    ) -> Self {
        let (status, _) = watch::channel(ConnectionStatus::Disconnected);
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            inner: Arc::new(Inner {
                config,
                handshake,
                connector,
                status,
                events,
                state: Mutex::new(State {
                    endpoint: None,
                    generation: 0,
                    link: None,
                    pending: PendingRequests::new(),
                    reconnect: ReconnectTimer::new(),
                    hello: None,
                }),
            }),
        }
    }

    /// Client that talks to the network over tokio-tungstenite.
    pub fn websocket(config: GatewayConfig, handshake: HandshakeConfig) -> Self {
        Self::new(config, handshake, Arc::new(WsConnector))
    }

    /// Replace the endpoint and start a fresh connection cycle.
    ///
    /// Any previous transport is closed first. An invalid endpoint leaves the
    /// client in `error` with no transport and nothing to reconnect to.
    pub fn configure(&self, endpoint: EndpointConfig) -> Result<(), ClientError> {
        let inner = &self.inner;
        let mut state = inner.lock();
        state.reconnect.cancel();
        inner.close_link(
            &mut state,
            CloseInfo::new(NORMAL_CLOSE_CODE, "configuration replaced"),
        );

        let url = match endpoint.validate() {
            Ok(url) => url,
            Err(e) => {
                tracing::error!("Rejected gateway configuration: {}", e);
                state.endpoint = None;
                inner.set_status(ConnectionStatus::Error);
                return Err(e);
            }
        };

        tracing::info!("Connecting to gateway at {}", url);
        let token = endpoint.token.clone();
        state.endpoint = Some(endpoint);
        inner.open(&mut state, url, token);
        Ok(())
    }

    /// Forget the endpoint and disconnect.
    pub fn clear_config(&self) {
        self.inner.lock().endpoint = None;
        self.disconnect();
    }

    /// Close the connection on request. No reconnection follows.
    pub fn disconnect(&self) {
        let inner = &self.inner;
        let mut state = inner.lock();
        state.reconnect.cancel();
        inner.close_link(
            &mut state,
            CloseInfo::new(NORMAL_CLOSE_CODE, "disconnected by client"),
        );
        inner.set_status(ConnectionStatus::Disconnected);
        tracing::info!("Disconnected from gateway");
    }

    /// Send a request and wait for its response.
    ///
    /// The frame is sent when `call` is invoked, not when the future is first
    /// polled. Without an open transport the returned future is already
    /// failed with [`ClientError::NotConnected`] and nothing is sent.
    pub fn call(
        &self,
        method: &str,
        params: Value,
    ) -> impl Future<Output = Result<Value, ClientError>> + Send + 'static {
        let reply = self.inner.issue(None, method, params);
        async move { await_reply(reply?).await }
    }

    pub fn status(&self) -> ConnectionStatus {
        *self.inner.status.borrow()
    }

    pub fn subscribe_status(&self) -> watch::Receiver<ConnectionStatus> {
        self.inner.status.subscribe()
    }

    /// Server push events, excluding the handshake challenge.
    pub fn subscribe_events(&self) -> broadcast::Receiver<EventFrame> {
        self.inner.events.subscribe()
    }

    /// Payload of the last successful handshake on the current transport.
    pub fn hello(&self) -> Option<HelloOk> {
        self.inner.lock().hello.clone()
    }

    pub fn endpoint(&self) -> Option<EndpointConfig> {
        self.inner.lock().endpoint.clone()
    }

    pub fn pending_requests(&self) -> usize {
        self.inner.lock().pending.len()
    }
}

async fn await_reply(reply: oneshot::Receiver<Outcome>) -> Outcome {
    reply.await.unwrap_or_else(|_| {
        Err(ClientError::ConnectionClosed {
            code: ABNORMAL_CLOSE_CODE,
            reason: "request abandoned".to_string(),
        })
    })
}

impl Inner {
    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn set_status(&self, status: ConnectionStatus) {
        self.status.send_if_modified(|current| {
            if *current == status {
                return false;
            }
            tracing::debug!("Gateway status {} -> {}", current, status);
            *current = status;
            true
        });
    }

    /// Spawn the task owning a new transport.
    fn open(self: &Arc<Self>, state: &mut State, url: Url, token: String) {
        state.generation += 1;
        let generation = state.generation;
        self.set_status(ConnectionStatus::Connecting);

        let inner = Arc::clone(self);
        let task = tokio::spawn(async move {
            inner.run_connection(generation, url, token).await;
        });
        state.link = Some(Link {
            generation,
            outbound: None,
            task,
        });
    }

    /// Detach the current transport and reject everything pending on it.
    ///
    /// The old task is told to close (or aborted if it never opened); its
    /// completion is ignored because its generation is no longer current.
    fn close_link(&self, state: &mut State, close: CloseInfo) {
        state.hello = None;
        if let Some(link) = state.link.take() {
            match link.outbound {
                Some(tx) => {
                    let _ = tx.send(Outbound::Close(close.clone()));
                }
                None => link.task.abort(),
            }
        }
        let rejected = state.pending.reject_all(&close.to_error());
        if rejected > 0 {
            tracing::debug!("Rejected {} pending requests: {}", rejected, close.reason);
        }
    }

    async fn run_connection(self: Arc<Self>, generation: u64, url: Url, token: String) {
        let transport = match self.connector.connect(&url).await {
            Ok(transport) => transport,
            Err(e) => {
                self.on_connect_failed(generation, e);
                return;
            }
        };

        let (tx, rx) = mpsc::unbounded_channel();
        if !self.on_open(generation, tx) {
            return;
        }

        let latch = HandshakeLatch::new(
            self.config.handshake_wait(),
            connect_params(&self.handshake, &token),
        );
        let close = self.message_loop(generation, transport, rx, latch).await;
        self.on_closed(generation, close);
    }

    async fn message_loop(
        self: &Arc<Self>,
        generation: u64,
        transport: BoxTransport,
        mut rx: mpsc::UnboundedReceiver<Outbound>,
        mut latch: HandshakeLatch,
    ) -> CloseInfo {
        let (mut write, mut read) = transport.split();

        loop {
            tokio::select! {
                _ = latch.expired(), if latch.is_waiting() => {
                    if let Some(params) = latch.fire(None) {
                        tracing::debug!("No connect challenge received, sending handshake without nonce");
                        self.start_handshake(generation, params);
                    }
                }

                Some(outbound) = rx.recv() => match outbound {
                    Outbound::Text(text) => {
                        if let Err(e) = write.send(Message::Text(text)).await {
                            return CloseInfo::abnormal(format!("send failed: {}", e));
                        }
                    }
                    Outbound::Close(close) => {
                        let frame = CloseFrame {
                            code: CloseCode::from(close.code),
                            reason: truncate_reason(&close.reason).into(),
                        };
                        if let Err(e) = write.send(Message::Close(Some(frame))).await {
                            tracing::debug!("Failed to send close frame: {}", e);
                        }
                        return close;
                    }
                },

                incoming = read.next() => match incoming {
                    Some(Ok(Message::Text(text))) => {
                        self.handle_text(generation, &text, &mut latch);
                    }
                    Some(Ok(Message::Ping(data))) => {
                        if let Err(e) = write.send(Message::Pong(data)).await {
                            return CloseInfo::abnormal(format!("send failed: {}", e));
                        }
                    }
                    Some(Ok(Message::Close(frame))) => {
                        tracing::info!("Gateway sent close frame");
                        return CloseInfo::from_frame(frame);
                    }
                    Some(Ok(_)) => {} // Binary and pong frames carry nothing for us
                    Some(Err(e)) => {
                        return CloseInfo::abnormal(e.to_string());
                    }
                    None => {
                        return CloseInfo::abnormal("connection lost");
                    }
                },
            }
        }
    }

    fn handle_text(self: &Arc<Self>, generation: u64, text: &str, latch: &mut HandshakeLatch) {
        let frame = match Frame::parse(text) {
            Ok(frame) => frame,
            Err(e) => {
                tracing::warn!("Discarding malformed frame from gateway: {}", e);
                return;
            }
        };

        match frame {
            Frame::Res(response) => {
                let mut state = self.lock();
                if !state.is_current(generation) {
                    return;
                }
                let id = response.id.clone();
                if !state.pending.resolve(response) {
                    tracing::debug!("Ignoring response for unknown request {}", id);
                }
            }

            Frame::Event(event) if event.event == CHALLENGE_EVENT => {
                match ConnectChallenge::from_payload(&event.payload) {
                    Some(challenge) => match latch.fire(Some(challenge.nonce)) {
                        Some(params) => {
                            tracing::debug!("Received connect challenge");
                            self.start_handshake(generation, params);
                        }
                        None => tracing::debug!("Ignoring connect challenge after handshake"),
                    },
                    // Gateways without the challenge feature fall through to the timer
                    None => tracing::warn!("Ignoring malformed connect challenge"),
                }
            }

            Frame::Event(event) => {
                tracing::debug!("Gateway event: {}", event.event);
                let _ = self.events.send(event);
            }

            Frame::Req(request) => {
                tracing::debug!("Ignoring request frame from gateway: {}", request.method);
            }
        }
    }

    fn start_handshake(self: &Arc<Self>, generation: u64, params: ConnectParams) {
        let reply = serde_json::to_value(&params)
            .map_err(|e| ClientError::Serialization(e.to_string()))
            .and_then(|params| self.issue(Some(generation), CONNECT_METHOD, params));

        let inner = Arc::clone(self);
        tokio::spawn(async move {
            let outcome = match reply {
                Ok(reply) => await_reply(reply).await,
                Err(e) => Err(e),
            };
            match outcome {
                Ok(payload) => inner.on_handshake_ok(generation, payload),
                Err(e) => {
                    tracing::warn!("Gateway handshake failed: {}", e);
                    inner.request_close(
                        generation,
                        CloseInfo::new(HANDSHAKE_FAILED_CLOSE_CODE, format!("handshake failed: {}", e)),
                    );
                }
            }
        });
    }

    /// Register a pending request and hand its frame to the transport task.
    ///
    /// With `generation` set, the request only goes out on that transport.
    fn issue(
        self: &Arc<Self>,
        generation: Option<u64>,
        method: &str,
        params: Value,
    ) -> Result<oneshot::Receiver<Outcome>, ClientError> {
        let mut state = self.lock();
        let outbound = state
            .link
            .as_ref()
            .filter(|link| generation.map_or(true, |g| g == link.generation))
            .and_then(|link| link.outbound.clone())
            .ok_or(ClientError::NotConnected)?;

        let id = state.pending.next_id();
        let text = serde_json::to_string(&Frame::request(id.clone(), method, params))
            .map_err(|e| ClientError::Serialization(e.to_string()))?;
        outbound
            .send(Outbound::Text(text))
            .map_err(|_| ClientError::NotConnected)?;

        let timer = {
            let inner = Arc::clone(self);
            let id = id.clone();
            let timeout = self.config.request_timeout();
            tokio::spawn(async move {
                tokio::time::sleep(timeout).await;
                inner.expire(&id);
            })
        };
        tracing::debug!("Sent request {} ({})", method, id);

        let (tx, rx) = oneshot::channel();
        state
            .pending
            .insert(id, PendingRequest::new(method.to_string(), tx, timer));
        Ok(rx)
    }

    fn expire(&self, id: &str) {
        if self.lock().pending.expire(id) {
            tracing::warn!("Request {} timed out", id);
        }
    }

    fn on_open(&self, generation: u64, tx: mpsc::UnboundedSender<Outbound>) -> bool {
        let mut state = self.lock();
        match state.link.as_mut() {
            Some(link) if link.generation == generation => {
                link.outbound = Some(tx);
                tracing::debug!("Gateway transport open, waiting for challenge");
                true
            }
            _ => false,
        }
    }

    fn on_handshake_ok(&self, generation: u64, payload: Value) {
        let mut state = self.lock();
        if !state.is_current(generation) {
            return;
        }
        let hello: HelloOk = serde_json::from_value(payload).unwrap_or_default();
        tracing::info!(
            "Connected to gateway (protocol {})",
            hello.protocol.map_or_else(|| "unknown".to_string(), |p| p.to_string())
        );
        state.hello = Some(hello);
        self.set_status(ConnectionStatus::Connected);
    }

    fn request_close(&self, generation: u64, close: CloseInfo) {
        let state = self.lock();
        if !state.is_current(generation) {
            return;
        }
        if let Some(tx) = state.link.as_ref().and_then(|l| l.outbound.as_ref()) {
            let _ = tx.send(Outbound::Close(close));
        }
    }

    fn on_closed(self: &Arc<Self>, generation: u64, close: CloseInfo) {
        let mut state = self.lock();
        if !state.is_current(generation) {
            tracing::debug!("Superseded gateway transport closed");
            return;
        }
        state.link = None;
        state.hello = None;
        let rejected = state.pending.reject_all(&close.to_error());
        tracing::warn!(
            "Gateway connection closed (code {}): {}; rejected {} pending requests",
            close.code,
            close.reason,
            rejected
        );
        self.set_status(ConnectionStatus::Disconnected);
        self.schedule_reconnect(&mut state);
    }

    fn on_connect_failed(self: &Arc<Self>, generation: u64, error: ClientError) {
        let mut state = self.lock();
        if !state.is_current(generation) {
            return;
        }
        state.link = None;
        state.pending.reject_all(&error);
        tracing::error!("Gateway connection error: {}", error);
        self.set_status(ConnectionStatus::Error);
        self.schedule_reconnect(&mut state);
    }

    fn schedule_reconnect(self: &Arc<Self>, state: &mut State) {
        let delay = self.config.reconnect_delay();
        tracing::info!("Reconnecting in {} ms...", delay.as_millis());
        let inner = Arc::clone(self);
        state
            .reconnect
            .arm(delay, move |ticket| async move { inner.reconnect(ticket) });
    }

    fn reconnect(self: &Arc<Self>, ticket: u64) {
        let mut state = self.lock();
        if !state.reconnect.redeem(ticket) || state.link.is_some() {
            return;
        }
        let Some(endpoint) = state.endpoint.clone() else {
            tracing::debug!("No gateway configuration, skipping reconnect");
            return;
        };
        match endpoint.validate() {
            Ok(url) => {
                tracing::info!("Reconnecting to gateway at {}", url);
                self.open(&mut state, url, endpoint.token);
            }
            Err(e) => {
                tracing::error!("Cannot reconnect: {}", e);
                self.set_status(ConnectionStatus::Error);
            }
        }
    }
}
