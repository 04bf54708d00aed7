//! In-memory upstream used by unit tests.

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::time::Instant;

use crate::errors::{CloseReason, RelayError};
use crate::message::RelayMessage;
use crate::upstream::supervisor::InboundHandler;
use crate::upstream::transport::{UpstreamConnector, UpstreamEvent, UpstreamTransport};

/// Scripted result of one connect call.
pub(crate) enum Outcome {
    Fail,
    Connect(FakeTransport),
}

/// Connector that plays back a script, then fails forever.
pub(crate) struct FakeConnector {
    outcomes: Mutex<VecDeque<Outcome>>,
    attempts: Mutex<Vec<(Instant, String)>>,
}

impl FakeConnector {
    pub(crate) fn new(outcomes: Vec<Outcome>) -> Self {
        Self {
            outcomes: Mutex::new(outcomes.into()),
            attempts: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn attempts(&self) -> Vec<Instant> {
        self.attempts.lock().iter().map(|(at, _)| *at).collect()
    }

    pub(crate) fn urls(&self) -> Vec<String> {
        self.attempts.lock().iter().map(|(_, url)| url.clone()).collect()
    }
}

#[async_trait]
impl UpstreamConnector for FakeConnector {
    async fn connect(&self, url: &str) -> Result<Box<dyn UpstreamTransport>, RelayError> {
        self.attempts.lock().push((Instant::now(), url.to_owned()));
        let next = self.outcomes.lock().pop_front();
        match next {
            Some(Outcome::Connect(transport)) => Ok(Box::new(transport)),
            Some(Outcome::Fail) | None => Err(RelayError::ConnectFailure {
                url: url.to_owned(),
                message: "connection refused".into(),
            }),
        }
    }
}

/// Transport half handed to the supervisor.
pub(crate) struct FakeTransport {
    inbound: mpsc::UnboundedReceiver<UpstreamEvent>,
    shared: Arc<Shared>,
}

#[derive(Default)]
struct Shared {
    sent: Mutex<Vec<RelayMessage>>,
    fail_sends: AtomicBool,
    closed: AtomicBool,
}

/// Test-side control of a [`FakeTransport`].
pub(crate) struct FakeRemote {
    inbound: mpsc::UnboundedSender<UpstreamEvent>,
    shared: Arc<Shared>,
}

pub(crate) fn fake_transport() -> (FakeTransport, FakeRemote) {
    let (tx, rx) = mpsc::unbounded_channel();
    let shared = Arc::new(Shared::default());
    (
        FakeTransport {
            inbound: rx,
            shared: Arc::clone(&shared),
        },
        FakeRemote {
            inbound: tx,
            shared,
        },
    )
}

impl FakeRemote {
    pub(crate) fn push(&self, payload: RelayMessage) {
        let _ = self.inbound.send(UpstreamEvent::Message(payload));
    }

    pub(crate) fn close(&self) {
        let _ = self
            .inbound
            .send(UpstreamEvent::Closed(CloseReason::EndOfStream));
    }

    pub(crate) fn fail_sends(&self) {
        self.shared.fail_sends.store(true, Ordering::SeqCst);
    }

    pub(crate) fn sent(&self) -> Vec<RelayMessage> {
        self.shared.sent.lock().clone()
    }

    pub(crate) fn was_closed(&self) -> bool {
        self.shared.closed.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl UpstreamTransport for FakeTransport {
    async fn next_event(&mut self) -> UpstreamEvent {
        self.inbound
            .recv()
            .await
            .unwrap_or(UpstreamEvent::Closed(CloseReason::EndOfStream))
    }

    async fn send(&mut self, payload: RelayMessage) -> Result<(), CloseReason> {
        if self.shared.fail_sends.load(Ordering::SeqCst) {
            return Err(CloseReason::Transport("broken pipe".into()));
        }
        self.shared.sent.lock().push(payload);
        Ok(())
    }

    async fn close(&mut self) {
        self.shared.closed.store(true, Ordering::SeqCst);
    }
}

/// Forwards inbound payloads to a channel the test reads.
pub(crate) struct ChannelHandler(mpsc::UnboundedSender<RelayMessage>);

impl ChannelHandler {
    pub(crate) fn new() -> (Self, mpsc::UnboundedReceiver<RelayMessage>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self(tx), rx)
    }
}

#[async_trait]
impl InboundHandler for ChannelHandler {
    async fn handle_inbound(&self, payload: RelayMessage) {
        let _ = self.0.send(payload);
    }
}
