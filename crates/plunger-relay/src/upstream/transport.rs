//! Upstream transport abstraction and the WebSocket implementation.

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tracing::{debug, info, trace};

use crate::errors::{CloseReason, RelayError};
use crate::message::RelayMessage;

/// One event read from an upstream transport.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum UpstreamEvent {
    /// A data payload.
    Message(RelayMessage),
    /// The connection ended. Nothing is read after this.
    Closed(CloseReason),
}

/// A live upstream connection.
///
/// `next_event` must be cancel-safe: the supervisor races it against
/// outbound sends and shutdown.
#[async_trait]
pub trait UpstreamTransport: Send {
    /// Wait for the next inbound payload or the terminal close.
    async fn next_event(&mut self) -> UpstreamEvent;

    /// Write a payload to the peer.
    async fn send(&mut self, payload: RelayMessage) -> Result<(), CloseReason>;

    /// Close the connection. Errors are ignored.
    async fn close(&mut self);
}

/// Opens upstream transports.
#[async_trait]
pub trait UpstreamConnector: Send + Sync {
    /// Connect to `url`.
    async fn connect(&self, url: &str) -> Result<Box<dyn UpstreamTransport>, RelayError>;
}

/// Connects with `tokio-tungstenite`.
#[derive(Clone, Copy, Debug, Default)]
pub struct WsConnector;

#[async_trait]
impl UpstreamConnector for WsConnector {
    async fn connect(&self, url: &str) -> Result<Box<dyn UpstreamTransport>, RelayError> {
        let (stream, _response) =
            connect_async(url)
                .await
                .map_err(|e| RelayError::ConnectFailure {
                    url: url.to_owned(),
                    message: e.to_string(),
                })?;
        info!(url, "upstream WebSocket connected");
        Ok(Box::new(WsTransport::new(stream)))
    }
}

/// WebSocket client stream to the upstream service.
pub struct WsTransport {
    stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

impl WsTransport {
    /// Wrap an established stream.
    pub fn new(stream: WebSocketStream<MaybeTlsStream<TcpStream>>) -> Self {
        Self { stream }
    }
}

#[async_trait]
impl UpstreamTransport for WsTransport {
    async fn next_event(&mut self) -> UpstreamEvent {
        loop {
            match self.stream.next().await {
                Some(Ok(Message::Text(text))) => {
                    return UpstreamEvent::Message(RelayMessage::Text(text.as_str().to_owned()));
                }
                Some(Ok(Message::Binary(data))) => {
                    return UpstreamEvent::Message(RelayMessage::Binary(data));
                }
                Some(Ok(Message::Ping(_) | Message::Pong(_) | Message::Frame(_))) => {
                    // tungstenite answers pings on the next read or write
                    trace!("upstream control frame");
                }
                Some(Ok(Message::Close(frame))) => {
                    let reason = match frame {
                        Some(cf) => {
                            info!(code = %cf.code, reason = %cf.reason, "upstream close frame received");
                            CloseReason::CloseFrame {
                                code: u16::from(cf.code),
                                reason: cf.reason.as_str().to_owned(),
                            }
                        }
                        None => CloseReason::CloseFrame {
                            code: u16::from(CloseCode::Status),
                            reason: String::new(),
                        },
                    };
                    return UpstreamEvent::Closed(reason);
                }
                Some(Err(e)) => return UpstreamEvent::Closed(CloseReason::Transport(e.to_string())),
                None => return UpstreamEvent::Closed(CloseReason::EndOfStream),
            }
        }
    }

    async fn send(&mut self, payload: RelayMessage) -> Result<(), CloseReason> {
        let frame = match payload {
            RelayMessage::Text(text) => Message::Text(text.into()),
            RelayMessage::Binary(data) => Message::Binary(data),
        };
        self.stream
            .send(frame)
            .await
            .map_err(|e| CloseReason::Transport(e.to_string()))
    }

    async fn close(&mut self) {
        if let Err(e) = self.stream.close(None).await {
            debug!(error = %e, "upstream close handshake failed");
        }
    }
}
