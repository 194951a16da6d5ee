//! Push connection transport.
//!
//! [`PushConnector`] opens one duplex text connection to the push
//! endpoint. [`WsConnector`] does this over WebSocket; tests plug in
//! in-process connectors built with [`PushConnection::from_parts`].

use std::pin::Pin;

use async_trait::async_trait;
use futures::{Sink, SinkExt, Stream, StreamExt};
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use url::Url;

use crate::error::TransportError;

/// Outgoing half of a push connection.
pub type TextSink = Pin<Box<dyn Sink<String, Error = TransportError> + Send>>;

/// Incoming half of a push connection.
///
/// Yields text frames. The stream ends, or yields
/// [`TransportError::Closed`], when the peer closes.
pub type TextStream = Pin<Box<dyn Stream<Item = Result<String, TransportError>> + Send>>;

/// An open push connection split into its two halves.
pub struct PushConnection {
    /// Frames sent to the server.
    pub sink: TextSink,
    /// Frames received from the server.
    pub stream: TextStream,
}

impl PushConnection {
    /// Builds a connection from any text sink and stream.
    pub fn from_parts<Si, St>(sink: Si, stream: St) -> Self
    where
        Si: Sink<String, Error = TransportError> + Send + 'static,
        St: Stream<Item = Result<String, TransportError>> + Send + 'static,
    {
        Self {
            sink: Box::pin(sink),
            stream: Box::pin(stream),
        }
    }
}

/// Opens push connections.
#[async_trait]
pub trait PushConnector: Send + Sync {
    /// Opens a new connection.
    ///
    /// # Errors
    ///
    /// [`TransportError`] if the connection cannot be established.
    async fn connect(&self) -> Result<PushConnection, TransportError>;
}

/// [`PushConnector`] over WebSocket.
///
/// Only text frames are surfaced. Ping, pong and binary frames are
/// dropped; a close frame ends the stream with [`TransportError::Closed`].
#[derive(Debug, Clone)]
pub struct WsConnector {
    url: Url,
}

impl WsConnector {
    /// Creates a connector for `url`.
    pub fn new(url: Url) -> Self {
        Self { url }
    }

    /// Returns the endpoint URL.
    pub fn url(&self) -> &Url {
        &self.url
    }
}

#[async_trait]
impl PushConnector for WsConnector {
    async fn connect(&self) -> Result<PushConnection, TransportError> {
        let (ws, _response) = connect_async(self.url.as_str()).await?;
        let (write, read) = ws.split();

        let sink = write
            .sink_map_err(TransportError::from)
            .with(|text: String| async move { Ok::<_, TransportError>(Message::text(text)) });

        let stream = read.filter_map(|frame| async move {
            match frame {
                Ok(Message::Text(text)) => Some(Ok(text.as_str().to_owned())),
                Ok(Message::Close(_)) => Some(Err(TransportError::Closed)),
                Ok(_) => None,
                Err(err) => Some(Err(TransportError::from(err))),
            }
        });

        Ok(PushConnection::from_parts(sink, stream))
    }
}
