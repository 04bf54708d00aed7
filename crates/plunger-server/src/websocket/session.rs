//! Viewer session lifecycle, from upgrade through disconnect.

use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket};
use bytes::Bytes;
use futures::{SinkExt, StreamExt};
use metrics::{counter, gauge, histogram};
use plunger_relay::metrics::{
    WS_CONNECTION_DURATION_SECONDS, WS_CONNECTIONS_ACTIVE, WS_CONNECTIONS_TOTAL,
    WS_DISCONNECTIONS_TOTAL,
};
use plunger_relay::{RelayMessage, RelayRouter, ViewerConnection, ViewerId};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::config::ServerConfig;

/// Run a viewer session.
///
/// 1. Registers the viewer with the router so it receives broadcasts
/// 2. Drains the viewer's queue to the socket and sends periodic Pings
/// 3. Forwards every inbound text or binary frame upstream unchanged
/// 4. Unregisters on close, heartbeat timeout, eviction, or shutdown
#[instrument(skip_all, fields(viewer_id = %viewer_id))]
pub async fn run_viewer_session(
    ws: WebSocket,
    viewer_id: ViewerId,
    router: Arc<RelayRouter>,
    config: Arc<ServerConfig>,
    cancel: CancellationToken,
) {
    let (mut ws_tx, mut ws_rx) = ws.split();

    let (send_tx, mut send_rx) = mpsc::channel::<Arc<RelayMessage>>(config.viewer_queue_capacity);
    let viewer = Arc::new(ViewerConnection::with_id(viewer_id, send_tx));

    counter!(WS_CONNECTIONS_TOTAL).increment(1);
    gauge!(WS_CONNECTIONS_ACTIVE).increment(1.0);
    router.on_viewer_connect(Arc::clone(&viewer)).await;

    let outbound_viewer = Arc::clone(&viewer);
    let ping_every = config.heartbeat_interval().max(Duration::from_secs(1));
    let pong_timeout = effective_timeout(&config);
    let mut outbound = tokio::spawn(async move {
        let mut ping_interval = tokio::time::interval(ping_every);
        // Skip the immediate first tick
        let _ = ping_interval.tick().await;

        loop {
            tokio::select! {
                msg = send_rx.recv() => {
                    let Some(payload) = msg else { break };
                    if ws_tx.send(to_ws_message(&payload)).await.is_err() {
                        break;
                    }
                }
                _ = ping_interval.tick() => {
                    if !outbound_viewer.check_alive()
                        && outbound_viewer.last_pong_elapsed() > pong_timeout
                    {
                        warn!(timeout = ?pong_timeout, "viewer unresponsive, disconnecting");
                        break;
                    }
                    if ws_tx.send(Message::Ping(Bytes::new())).await.is_err() {
                        break;
                    }
                }
            }
        }
        let _ = ws_tx.close().await;
    });

    loop {
        tokio::select! {
            () = cancel.cancelled() => {
                debug!("shutdown, closing viewer session");
                break;
            }
            () = viewer.evicted() => {
                info!("viewer could not keep up, closing session");
                break;
            }
            _ = &mut outbound => break,
            frame = ws_rx.next() => {
                let Some(Ok(msg)) = frame else { break };
                match msg {
                    Message::Text(text) => {
                        forward(&router, viewer_id, RelayMessage::Text(text.as_str().to_owned()));
                    }
                    Message::Binary(data) => forward(&router, viewer_id, RelayMessage::Binary(data)),
                    Message::Ping(_) | Message::Pong(_) => viewer.mark_alive(),
                    Message::Close(_) => {
                        info!("viewer sent close frame");
                        break;
                    }
                }
            }
        }
    }

    outbound.abort();
    router.on_viewer_disconnect(viewer_id).await;
    counter!(WS_DISCONNECTIONS_TOTAL).increment(1);
    gauge!(WS_CONNECTIONS_ACTIVE).decrement(1.0);
    histogram!(WS_CONNECTION_DURATION_SECONDS).record(viewer.age().as_secs_f64());
    debug!(evicted = viewer.is_evicted(), "viewer session ended");
}

fn forward(router: &RelayRouter, viewer_id: ViewerId, payload: RelayMessage) {
    // No acknowledgement either way; the router counts drops.
    let _ = router.on_viewer_message(viewer_id, payload);
}

/// Map a relay payload to a frame of the same kind.
pub(crate) fn to_ws_message(payload: &RelayMessage) -> Message {
    match payload {
        RelayMessage::Text(text) => Message::Text(text.clone().into()),
        RelayMessage::Binary(data) => Message::Binary(data.clone()),
    }
}

/// How long a viewer may stay silent given the configured heartbeat.
pub(crate) fn effective_timeout(config: &ServerConfig) -> Duration {
    config.heartbeat_timeout().max(config.heartbeat_interval())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn text_payload_becomes_text_frame() {
        let msg = to_ws_message(&RelayMessage::from(r#"{"temp":72.3}"#));
        match msg {
            Message::Text(text) => assert_eq!(text.as_str(), r#"{"temp":72.3}"#),
            other => panic!("expected text frame, got {other:?}"),
        }
    }

    #[test]
    fn binary_payload_becomes_binary_frame() {
        let data = Bytes::from_static(&[1, 2, 3]);
        let msg = to_ws_message(&RelayMessage::Binary(data.clone()));
        assert_eq!(msg, Message::Binary(data));
    }

    #[test]
    fn timeout_never_shorter_than_interval() {
        let config = ServerConfig {
            heartbeat_interval_secs: 30,
            heartbeat_timeout_secs: 10,
            ..ServerConfig::default()
        };
        assert_eq!(effective_timeout(&config), Duration::from_secs(30));
    }
}
