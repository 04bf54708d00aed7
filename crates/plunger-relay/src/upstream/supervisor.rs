//! Reconnect loop that keeps the upstream link alive.
//!
//! The loop never gives up: a failed connect or a closed connection logs a
//! warning, waits a fixed delay, and tries the same URL again. There is no
//! backoff and no retry cap.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use metrics::{counter, gauge};
use serde::Serialize;
use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use crate::errors::{CloseReason, RelayError};
use crate::message::RelayMessage;
use crate::metrics::{UPSTREAM_CONNECT_ATTEMPTS_TOTAL, UPSTREAM_CONNECTED, UPSTREAM_MESSAGES_TOTAL};
use crate::upstream::link::UpstreamLink;
use crate::upstream::transport::{UpstreamConnector, UpstreamEvent, UpstreamTransport};

/// Delay between reconnect attempts unless configured otherwise.
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(5);

/// Supervisor lifecycle.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SupervisorState {
    /// Not started, or stopped by shutdown.
    Idle,
    /// A connect attempt is in flight.
    Connecting,
    /// Connected and pumping payloads.
    Connected,
    /// Sleeping before the next attempt.
    WaitingToRetry,
}

/// Receives inbound upstream payloads.
///
/// Called once per payload, in arrival order. The next payload is not read
/// until the call returns.
#[async_trait]
pub trait InboundHandler: Send + Sync {
    /// Handle one payload.
    async fn handle_inbound(&self, payload: RelayMessage);
}

/// Drives the upstream link through connect, read, close, and retry.
pub struct ReconnectSupervisor {
    link: Arc<UpstreamLink>,
    connector: Arc<dyn UpstreamConnector>,
    handler: Arc<dyn InboundHandler>,
    retry_delay: Duration,
    state_tx: watch::Sender<SupervisorState>,
}

impl ReconnectSupervisor {
    /// Create a supervisor in the `Idle` state.
    pub fn new(
        link: Arc<UpstreamLink>,
        connector: Arc<dyn UpstreamConnector>,
        handler: Arc<dyn InboundHandler>,
        retry_delay: Duration,
    ) -> Self {
        let (state_tx, _) = watch::channel(SupervisorState::Idle);
        Self {
            link,
            connector,
            handler,
            retry_delay,
            state_tx,
        }
    }

    /// Observe state transitions.
    pub fn subscribe(&self) -> watch::Receiver<SupervisorState> {
        self.state_tx.subscribe()
    }

    /// Current state.
    pub fn state(&self) -> SupervisorState {
        *self.state_tx.borrow()
    }

    fn set_state(&self, state: SupervisorState) {
        let _ = self.state_tx.send_replace(state);
    }

    /// Run until `cancel` fires.
    pub async fn run(self, cancel: CancellationToken) {
        let url = self.link.target().to_owned();
        let delay_ms = u64::try_from(self.retry_delay.as_millis()).unwrap_or(u64::MAX);

        loop {
            self.set_state(SupervisorState::Connecting);
            self.link.mark_connecting();
            counter!(UPSTREAM_CONNECT_ATTEMPTS_TOTAL).increment(1);
            debug!(url = %url, "connecting to upstream");

            let connected = tokio::select! {
                biased;
                () = cancel.cancelled() => break,
                result = self.connector.connect(&url) => result,
            };

            match connected {
                Ok(transport) => {
                    let (generation, outbound_rx) = self.link.attach();
                    self.set_state(SupervisorState::Connected);
                    gauge!(UPSTREAM_CONNECTED).set(1.0);
                    info!(url = %url, generation, "upstream link established");

                    let reason = self.pump(transport, outbound_rx, &cancel).await;
                    gauge!(UPSTREAM_CONNECTED).set(0.0);
                    if reason == CloseReason::Shutdown {
                        self.link.detach(generation, None);
                        break;
                    }
                    let error = RelayError::TransportClosed(reason);
                    warn!(url = %url, generation, error = %error, "upstream connection lost");
                    self.link.detach(generation, Some(&error));
                }
                Err(e) => {
                    warn!(url = %url, error = %e, "upstream connect failed");
                    self.link.record_failure(&e);
                }
            }

            self.set_state(SupervisorState::WaitingToRetry);
            debug!(delay_ms, "waiting before reconnect");
            tokio::select! {
                biased;
                () = cancel.cancelled() => break,
                () = tokio::time::sleep(self.retry_delay) => {}
            }
        }

        self.link.reset();
        self.set_state(SupervisorState::Idle);
        info!(url = %url, "upstream supervisor stopped");
    }

    /// Move payloads both ways until the connection ends.
    async fn pump(
        &self,
        mut transport: Box<dyn UpstreamTransport>,
        mut outbound_rx: mpsc::UnboundedReceiver<RelayMessage>,
        cancel: &CancellationToken,
    ) -> CloseReason {
        loop {
            tokio::select! {
                biased;
                () = cancel.cancelled() => {
                    transport.close().await;
                    return CloseReason::Shutdown;
                }
                event = transport.next_event() => match event {
                    UpstreamEvent::Message(payload) => {
                        counter!(UPSTREAM_MESSAGES_TOTAL).increment(1);
                        trace!(kind = payload.kind(), len = payload.len(), "upstream payload");
                        self.handler.handle_inbound(payload).await;
                    }
                    UpstreamEvent::Closed(reason) => return reason,
                },
                Some(payload) = outbound_rx.recv() => {
                    if let Err(reason) = transport.send(payload).await {
                        return reason;
                    }
                }
            }
        }
    }
}
