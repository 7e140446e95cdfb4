//! Transport seam between the gateway client and the network.

use std::pin::Pin;

use async_trait::async_trait;
use futures_util::{Sink, Stream};
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::{self, Message};
use url::Url;

use crate::error::ClientError;

pub type WsError = tungstenite::Error;

/// A message-framed bidirectional connection.
pub trait Transport:
    Stream<Item = Result<Message, WsError>> + Sink<Message, Error = WsError> + Send + Unpin
{
}

impl<T> Transport for T where
    T: Stream<Item = Result<Message, WsError>> + Sink<Message, Error = WsError> + Send + Unpin
{
}

pub type BoxTransport = Pin<Box<dyn Transport>>;

/// Opens transports to a gateway address.
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self, url: &Url) -> Result<BoxTransport, ClientError>;
}

/// WebSocket connector backed by tokio-tungstenite.
#[derive(Debug, Default, Clone, Copy)]
pub struct WsConnector;

#[async_trait]
impl Connector for WsConnector {
    async fn connect(&self, url: &Url) -> Result<BoxTransport, ClientError> {
        let (stream, response) = connect_async(url.as_str())
            .await
            .map_err(|e| ClientError::Transport(e.to_string()))?;
        tracing::debug!("WebSocket upgrade completed with status {}", response.status());
        Ok(Box::pin(stream))
    }
}
