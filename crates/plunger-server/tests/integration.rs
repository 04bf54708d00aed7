//! End-to-end tests: fake upstream WebSocket server, the relay, and real
//! viewer clients.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{WebSocketStream, accept_async, connect_async};
use tokio_util::sync::CancellationToken;

use plunger_relay::{Relay, RelayRouter, SupervisorState, WsConnector};
use plunger_server::{RelayServer, ServerConfig};

const TIMEOUT: Duration = Duration::from_secs(5);
const RETRY: Duration = Duration::from_millis(200);

type ViewerStream =
    tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<TcpStream>>;
type UpstreamConn = WebSocketStream<TcpStream>;

/// Accepts upstream connections from the relay and hands them to the test.
struct FakeUpstream {
    addr: SocketAddr,
    conns: mpsc::UnboundedReceiver<UpstreamConn>,
}

impl FakeUpstream {
    async fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        Self::serve(listener)
    }

    async fn start_at(addr: SocketAddr) -> Self {
        let listener = TcpListener::bind(addr).await.unwrap();
        Self::serve(listener)
    }

    fn serve(listener: TcpListener) -> Self {
        let addr = listener.local_addr().unwrap();
        let (tx, conns) = mpsc::unbounded_channel();
        let _accept = tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                if let Ok(ws) = accept_async(stream).await {
                    if tx.send(ws).is_err() {
                        break;
                    }
                }
            }
        });
        Self { addr, conns }
    }

    async fn next_conn(&mut self) -> UpstreamConn {
        timeout(TIMEOUT, self.conns.recv())
            .await
            .expect("relay did not connect upstream in time")
            .unwrap()
    }
}

struct Booted {
    ws_url: String,
    router: Arc<RelayRouter>,
    state: tokio::sync::watch::Receiver<SupervisorState>,
    shutdown: CancellationToken,
}

/// Boot the relay against `upstream` and return the viewer URL.
async fn boot_relay(upstream: SocketAddr) -> Booted {
    let shutdown = CancellationToken::new();
    let relay = Relay::new(format!("ws://{upstream}/ws"), RETRY, Arc::new(WsConnector));
    let handle = relay.start(shutdown.clone());

    let config = ServerConfig {
        host: "127.0.0.1".into(),
        port: 0,
        ..ServerConfig::default()
    };
    let server = RelayServer::new(
        config,
        Arc::clone(&handle.router),
        handle.state.clone(),
        shutdown.clone(),
        None,
    );
    let (addr, _server_handle) = server.listen().await.unwrap();

    Booted {
        ws_url: format!("ws://{addr}/ws"),
        router: handle.router,
        state: handle.state,
        shutdown,
    }
}

async fn connect_viewer(url: &str) -> ViewerStream {
    let (ws, _) = timeout(TIMEOUT, connect_async(url))
        .await
        .expect("viewer connect timed out")
        .unwrap();
    ws
}

async fn wait_for_viewers(router: &RelayRouter, count: usize) {
    timeout(TIMEOUT, async {
        while router.registry().connection_count().await != count {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .unwrap_or_else(|_| panic!("viewer count never reached {count}"));
}

async fn wait_for_state(booted: &mut Booted, want: SupervisorState) {
    let _ = timeout(TIMEOUT, booted.state.wait_for(|s| *s == want))
        .await
        .expect("supervisor state not reached")
        .unwrap();
}

/// Next data frame as text, skipping control frames.
async fn next_text<S>(ws: &mut S) -> String
where
    S: futures::Stream<Item = Result<Message, tokio_tungstenite::tungstenite::Error>> + Unpin,
{
    loop {
        let msg = timeout(TIMEOUT, ws.next())
            .await
            .expect("timed out waiting for frame")
            .expect("stream ended")
            .unwrap();
        match msg {
            Message::Text(text) => return text.as_str().to_owned(),
            Message::Ping(_) | Message::Pong(_) => {}
            other => panic!("unexpected frame: {other:?}"),
        }
    }
}

#[tokio::test]
async fn upstream_payload_reaches_every_viewer_verbatim() {
    let mut upstream = FakeUpstream::start().await;
    let booted = boot_relay(upstream.addr).await;
    let mut conn = upstream.next_conn().await;

    let mut v1 = connect_viewer(&booted.ws_url).await;
    let mut v2 = connect_viewer(&booted.ws_url).await;
    wait_for_viewers(&booted.router, 2).await;

    conn.send(Message::text(r#"{"temp":72.3}"#.to_owned()))
        .await
        .unwrap();

    assert_eq!(next_text(&mut v1).await, r#"{"temp":72.3}"#);
    assert_eq!(next_text(&mut v2).await, r#"{"temp":72.3}"#);

    booted.shutdown.cancel();
}

#[tokio::test]
async fn payloads_arrive_in_order() {
    let mut upstream = FakeUpstream::start().await;
    let booted = boot_relay(upstream.addr).await;
    let mut conn = upstream.next_conn().await;

    let mut viewer = connect_viewer(&booted.ws_url).await;
    wait_for_viewers(&booted.router, 1).await;

    for i in 0..25 {
        conn.send(Message::text(format!("{{\"seq\":{i}}}")))
            .await
            .unwrap();
    }
    for i in 0..25 {
        assert_eq!(next_text(&mut viewer).await, format!("{{\"seq\":{i}}}"));
    }

    booted.shutdown.cancel();
}

#[tokio::test]
async fn binary_payload_stays_binary() {
    let mut upstream = FakeUpstream::start().await;
    let booted = boot_relay(upstream.addr).await;
    let mut conn = upstream.next_conn().await;

    let mut viewer = connect_viewer(&booted.ws_url).await;
    wait_for_viewers(&booted.router, 1).await;

    conn.send(Message::binary(vec![0x00, 0x7f, 0xff]))
        .await
        .unwrap();
    let frame = timeout(TIMEOUT, viewer.next()).await.unwrap().unwrap().unwrap();
    assert_eq!(frame, Message::binary(vec![0x00, 0x7f, 0xff]));

    booted.shutdown.cancel();
}

#[tokio::test]
async fn viewer_command_is_forwarded_upstream() {
    let mut upstream = FakeUpstream::start().await;
    let mut booted = boot_relay(upstream.addr).await;
    let mut conn = upstream.next_conn().await;
    wait_for_state(&mut booted, SupervisorState::Connected).await;

    let mut viewer = connect_viewer(&booted.ws_url).await;
    wait_for_viewers(&booted.router, 1).await;

    viewer
        .send(Message::text(r#"{"cmd":"pump_on"}"#.to_owned()))
        .await
        .unwrap();
    assert_eq!(next_text(&mut conn).await, r#"{"cmd":"pump_on"}"#);

    booted.shutdown.cancel();
}

#[tokio::test]
async fn command_while_upstream_down_is_dropped_not_replayed() {
    // Reserve a port, then free it so the first connect attempts fail.
    let reserved = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let upstream_addr = reserved.local_addr().unwrap();
    drop(reserved);

    let mut booted = boot_relay(upstream_addr).await;
    wait_for_state(&mut booted, SupervisorState::WaitingToRetry).await;

    let mut viewer = connect_viewer(&booted.ws_url).await;
    wait_for_viewers(&booted.router, 1).await;
    viewer
        .send(Message::text(r#"{"cmd":"pump_on"}"#.to_owned()))
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;

    let mut upstream = FakeUpstream::start_at(upstream_addr).await;
    let mut conn = upstream.next_conn().await;
    wait_for_state(&mut booted, SupervisorState::Connected).await;

    let replayed = timeout(Duration::from_millis(300), conn.next()).await;
    assert!(replayed.is_err(), "dropped command was replayed: {replayed:?}");

    viewer
        .send(Message::text(r#"{"cmd":"pump_off"}"#.to_owned()))
        .await
        .unwrap();
    assert_eq!(next_text(&mut conn).await, r#"{"cmd":"pump_off"}"#);

    booted.shutdown.cancel();
}

#[tokio::test]
async fn viewers_resume_after_upstream_restart() {
    let mut upstream = FakeUpstream::start().await;
    let mut booted = boot_relay(upstream.addr).await;
    let mut first = upstream.next_conn().await;

    let mut viewer = connect_viewer(&booted.ws_url).await;
    wait_for_viewers(&booted.router, 1).await;

    first.send(Message::text("before".to_owned())).await.unwrap();
    assert_eq!(next_text(&mut viewer).await, "before");
    let first_generation = booted.router.upstream().generation();

    first.close(None).await.unwrap();
    drop(first);

    let mut second = upstream.next_conn().await;
    wait_for_state(&mut booted, SupervisorState::Connected).await;
    assert!(booted.router.upstream().generation() > first_generation);

    second.send(Message::text("after".to_owned())).await.unwrap();
    assert_eq!(next_text(&mut viewer).await, "after");
    assert_eq!(booted.router.registry().connection_count().await, 1);

    booted.shutdown.cancel();
}

#[tokio::test]
async fn closed_viewer_is_removed_and_others_keep_receiving() {
    let mut upstream = FakeUpstream::start().await;
    let booted = boot_relay(upstream.addr).await;
    let mut conn = upstream.next_conn().await;

    let mut v1 = connect_viewer(&booted.ws_url).await;
    let mut v2 = connect_viewer(&booted.ws_url).await;
    let mut v3 = connect_viewer(&booted.ws_url).await;
    wait_for_viewers(&booted.router, 3).await;

    v2.close(None).await.unwrap();
    drop(v2);
    wait_for_viewers(&booted.router, 2).await;

    conn.send(Message::text("still here".to_owned())).await.unwrap();
    assert_eq!(next_text(&mut v1).await, "still here");
    assert_eq!(next_text(&mut v3).await, "still here");

    booted.shutdown.cancel();
}

#[tokio::test]
async fn shutdown_stops_supervisor() {
    let mut upstream = FakeUpstream::start().await;
    let mut booted = boot_relay(upstream.addr).await;
    let _conn = upstream.next_conn().await;
    wait_for_state(&mut booted, SupervisorState::Connected).await;

    booted.shutdown.cancel();
    wait_for_state(&mut booted, SupervisorState::Idle).await;
    assert!(!booted.router.upstream().is_connected());
}
