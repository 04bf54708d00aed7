//! Handle to the single upstream connection.

use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::mpsc;
use tracing::debug;

use crate::errors::{RelayError, Result};
use crate::message::RelayMessage;

/// Liveness of the upstream connection.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LinkState {
    /// No transport.
    Disconnected,
    /// A connect attempt is in flight.
    Connecting,
    /// Transport is live; sends are accepted.
    Connected,
}

#[derive(Debug)]
struct Slot {
    state: LinkState,
    generation: u64,
    outbound: Option<mpsc::UnboundedSender<RelayMessage>>,
    last_error: Option<String>,
}

/// Shared handle other components use to talk to upstream.
///
/// The supervisor owns the transport itself. This handle only holds the
/// sending half of the live connection's outbound queue, tagged with a
/// generation number so a stale connection can never clear a newer one.
#[derive(Debug)]
pub struct UpstreamLink {
    url: String,
    slot: Mutex<Slot>,
}

impl UpstreamLink {
    /// Create a disconnected link targeting `url`.
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            slot: Mutex::new(Slot {
                state: LinkState::Disconnected,
                generation: 0,
                outbound: None,
                last_error: None,
            }),
        }
    }

    /// Upstream URL; every reconnect targets the same one.
    pub fn target(&self) -> &str {
        &self.url
    }

    /// Current state.
    pub fn state(&self) -> LinkState {
        self.slot.lock().state
    }

    /// Whether sends are currently accepted.
    pub fn is_connected(&self) -> bool {
        self.state() == LinkState::Connected
    }

    /// Description of the most recent failure or close, if any.
    pub fn last_error(&self) -> Option<String> {
        self.slot.lock().last_error.clone()
    }

    /// Generation of the current (or most recent) connection. Zero before the
    /// first successful connect.
    pub fn generation(&self) -> u64 {
        self.slot.lock().generation
    }

    /// Hand a payload to the live connection.
    ///
    /// Returns [`RelayError::NotConnected`] when no connection is live. The
    /// payload is discarded in that case and never replayed.
    pub fn send(&self, payload: RelayMessage) -> Result<()> {
        let slot = self.slot.lock();
        match (&slot.state, &slot.outbound) {
            (LinkState::Connected, Some(tx)) => tx.send(payload).map_err(|_| RelayError::NotConnected),
            _ => Err(RelayError::NotConnected),
        }
    }

    pub(crate) fn mark_connecting(&self) {
        let mut slot = self.slot.lock();
        slot.state = LinkState::Connecting;
        slot.outbound = None;
    }

    /// Install a new connection and return its generation and outbound queue.
    pub(crate) fn attach(&self) -> (u64, mpsc::UnboundedReceiver<RelayMessage>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut slot = self.slot.lock();
        slot.generation += 1;
        slot.state = LinkState::Connected;
        slot.outbound = Some(tx);
        (slot.generation, rx)
    }

    /// Tear down connection `generation`. Ignored if a newer one is attached.
    ///
    /// `error` is `None` for an orderly shutdown, which keeps the previous
    /// `last_error`.
    pub(crate) fn detach(&self, generation: u64, error: Option<&RelayError>) {
        let mut slot = self.slot.lock();
        if slot.generation != generation {
            debug!(generation, current = slot.generation, "ignoring stale detach");
            return;
        }
        slot.state = LinkState::Disconnected;
        slot.outbound = None;
        if let Some(error) = error {
            slot.last_error = Some(error.to_string());
        }
    }

    pub(crate) fn reset(&self) {
        let mut slot = self.slot.lock();
        slot.state = LinkState::Disconnected;
        slot.outbound = None;
    }

    pub(crate) fn record_failure(&self, error: &RelayError) {
        let mut slot = self.slot.lock();
        slot.state = LinkState::Disconnected;
        slot.outbound = None;
        slot.last_error = Some(error.to_string());
    }
}
