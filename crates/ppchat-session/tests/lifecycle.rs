//! Connection lifecycle over real loopback sockets.
//!
//! A small recording application sits on top of the runtime. Raw TCP
//! clients drive it by writing frames by hand, so every close path
//! (peer EOF, truncated frame, unknown tag, local close, close-all) can be
//! provoked directly.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use bytes::BytesMut;
use futures_util::StreamExt;
use ppchat_protocol::{
    ClientPacket, LoginPacket, MessageForClientPacket, MessageForServerPacket, PacketCodec,
    ServerPacket,
};
use ppchat_session::{
    Application, ChannelConsole, Connection, ConnectionSet, Console, ConsoleRemote, Initiator,
    PEER_CLOSED_REASON, SessionError, spawn_connection,
};
use ppchat_transport::{ConnectionId, TcpTransport, Transport};
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::sync::mpsc;
use tokio::time::timeout;
use tokio_util::codec::{Encoder, FramedRead};

const WAIT: Duration = Duration::from_secs(5);

// =========================================================================
// Recording application
// =========================================================================

#[derive(Debug, PartialEq)]
enum Event {
    Packet(ConnectionId, ClientPacket),
    Normal {
        id: ConnectionId,
        reason: String,
        initiator: Initiator,
        packets: usize,
    },
    Abrupt {
        id: ConnectionId,
        packets: usize,
    },
}

struct Recorder {
    connections: ConnectionSet<ServerPacket>,
    console: ChannelConsole,
    events: mpsc::UnboundedSender<Event>,
}

impl Application for Recorder {
    type Inbound = ClientPacket;
    type Outbound = ServerPacket;
    /// Packets seen on this connection.
    type Local = usize;

    fn connections(&self) -> &ConnectionSet<ServerPacket> {
        &self.connections
    }

    fn console(&self) -> &dyn Console {
        &self.console
    }

    async fn handle(
        &self,
        conn: &Arc<Connection<ServerPacket>>,
        local: &mut usize,
        packet: ClientPacket,
    ) {
        *local += 1;
        let echo = match &packet {
            ClientPacket::Login(_) => None,
            ClientPacket::MessageForServer(m) => Some(m.message.clone()),
        };
        let _ = self.events.send(Event::Packet(conn.id(), packet));

        if let Some(message) = echo {
            let close = message == "close";
            if conn.send_packet(MessageForClientPacket { message }).await.is_err() {
                return;
            }
            if close {
                conn.close("asked to close").await;
            }
        }
    }

    fn handle_normal_close(
        &self,
        conn: &Connection<ServerPacket>,
        local: &usize,
        reason: &str,
        initiator: Initiator,
    ) {
        let _ = self.events.send(Event::Normal {
            id: conn.id(),
            reason: reason.to_string(),
            initiator,
            packets: *local,
        });
    }

    fn handle_abrupt_close(
        &self,
        conn: &Connection<ServerPacket>,
        local: &usize,
        error: &SessionError,
    ) {
        self.write(&format!("abrupt: {error}"));
        let _ = self.events.send(Event::Abrupt {
            id: conn.id(),
            packets: *local,
        });
    }
}

struct Harness {
    app: Arc<Recorder>,
    addr: SocketAddr,
    events: mpsc::UnboundedReceiver<Event>,
    console: ConsoleRemote,
}

impl Harness {
    async fn start() -> Self {
        let mut transport = TcpTransport::bind("127.0.0.1:0").await.unwrap();
        let addr = transport.local_addr().unwrap();
        let (events_tx, events) = mpsc::unbounded_channel();
        let (console, remote) = ChannelConsole::new();
        let app = Arc::new(Recorder {
            connections: ConnectionSet::new(),
            console,
            events: events_tx,
        });

        let accept_app = Arc::clone(&app);
        tokio::spawn(async move {
            while let Ok(link) = transport.accept().await {
                spawn_connection(&accept_app, link);
            }
        });

        Self {
            app,
            addr,
            events,
            console: remote,
        }
    }

    async fn next_event(&mut self) -> Event {
        timeout(WAIT, self.events.recv())
            .await
            .expect("timed out waiting for an event")
            .expect("event channel closed")
    }

    /// Waits until the server side of `client` shows up in the live set.
    async fn server_side(&self, client: &RawClient) -> Arc<Connection<ServerPacket>> {
        timeout(WAIT, async {
            loop {
                let found = self
                    .app
                    .connections()
                    .snapshot()
                    .into_iter()
                    .find(|conn| conn.peer_addr() == client.local);
                if let Some(conn) = found {
                    return conn;
                }
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("server never registered the connection")
    }

    async fn until_empty(&self) {
        timeout(WAIT, async {
            while !self.app.connections().is_empty() {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("live set never emptied");
    }
}

// =========================================================================
// Raw client
// =========================================================================

struct RawClient {
    local: SocketAddr,
    frames: FramedRead<OwnedReadHalf, PacketCodec<ServerPacket>>,
    writer: OwnedWriteHalf,
}

impl RawClient {
    async fn connect(addr: SocketAddr) -> Self {
        let stream = TcpStream::connect(addr).await.unwrap();
        let local = stream.local_addr().unwrap();
        let (reader, writer) = stream.into_split();
        Self {
            local,
            frames: FramedRead::new(reader, PacketCodec::new()),
            writer,
        }
    }

    async fn send(&mut self, packet: impl Into<ClientPacket>) {
        let mut buf = BytesMut::new();
        PacketCodec::<ClientPacket>::new()
            .encode(&packet.into(), &mut buf)
            .unwrap();
        self.writer.write_all(&buf).await.unwrap();
    }

    async fn send_raw(&mut self, bytes: &[u8]) {
        self.writer.write_all(bytes).await.unwrap();
    }

    async fn next(&mut self) -> Option<ServerPacket> {
        timeout(WAIT, self.frames.next())
            .await
            .expect("timed out reading from server")
            .map(|frame| frame.expect("server frames should decode"))
    }
}

fn say(text: &str) -> MessageForServerPacket {
    MessageForServerPacket {
        message: text.into(),
    }
}

fn echo(text: &str) -> ServerPacket {
    MessageForClientPacket {
        message: text.into(),
    }
    .into()
}

// =========================================================================
// Dispatch
// =========================================================================

#[tokio::test]
async fn test_packets_dispatch_in_order_and_replies_flow_back() {
    let mut harness = Harness::start().await;
    let mut client = RawClient::connect(harness.addr).await;
    let conn = harness.server_side(&client).await;

    client
        .send(LoginPacket {
            username: "alice".into(),
        })
        .await;
    client.send(say("one")).await;
    client.send(say("two")).await;

    assert_eq!(
        harness.next_event().await,
        Event::Packet(
            conn.id(),
            LoginPacket {
                username: "alice".into()
            }
            .into()
        )
    );
    assert_eq!(harness.next_event().await, Event::Packet(conn.id(), say("one").into()));
    assert_eq!(harness.next_event().await, Event::Packet(conn.id(), say("two").into()));

    assert_eq!(client.next().await, Some(echo("one")));
    assert_eq!(client.next().await, Some(echo("two")));
}

#[tokio::test]
async fn test_other_connections_than_excludes_the_sender() {
    let harness = Harness::start().await;
    let a = RawClient::connect(harness.addr).await;
    let b = RawClient::connect(harness.addr).await;
    let a_conn = harness.server_side(&a).await;
    let b_conn = harness.server_side(&b).await;

    let others = harness.app.other_connections_than(a_conn.id());

    assert_eq!(others.len(), 1);
    assert_eq!(others[0].id(), b_conn.id());
}

// =========================================================================
// Peer-initiated closes
// =========================================================================

#[tokio::test]
async fn test_peer_shutdown_after_frames_is_one_graceful_close() {
    let mut harness = Harness::start().await;
    let mut client = RawClient::connect(harness.addr).await;
    let conn = harness.server_side(&client).await;

    client.send(say("a")).await;
    client.send(say("b")).await;
    assert_eq!(client.next().await, Some(echo("a")));
    assert_eq!(client.next().await, Some(echo("b")));
    client.writer.shutdown().await.unwrap();

    harness.next_event().await;
    harness.next_event().await;
    assert_eq!(
        harness.next_event().await,
        Event::Normal {
            id: conn.id(),
            reason: PEER_CLOSED_REASON.into(),
            initiator: Initiator::Peer,
            packets: 2,
        }
    );

    timeout(WAIT, conn.closed()).await.expect("close should finish");
    assert!(harness.app.connections().is_empty());

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(harness.events.try_recv().is_err(), "exactly one notification");
}

#[tokio::test]
async fn test_peer_closing_without_frames_is_graceful() {
    let mut harness = Harness::start().await;
    let mut client = RawClient::connect(harness.addr).await;
    let conn = harness.server_side(&client).await;

    client.writer.shutdown().await.unwrap();

    assert_eq!(
        harness.next_event().await,
        Event::Normal {
            id: conn.id(),
            reason: PEER_CLOSED_REASON.into(),
            initiator: Initiator::Peer,
            packets: 0,
        }
    );
    harness.until_empty().await;
}

#[tokio::test]
async fn test_stream_ending_mid_frame_is_abrupt() {
    let mut harness = Harness::start().await;
    let mut client = RawClient::connect(harness.addr).await;
    let conn = harness.server_side(&client).await;

    // Tag for MessageForServer, then a length prefix promising 10 bytes,
    // then only 3 of them.
    client
        .send_raw(&[0, 0, 0, 2, 0, 0, 0, 10, b'a', b'b', b'c'])
        .await;
    client.writer.shutdown().await.unwrap();

    assert_eq!(
        harness.next_event().await,
        Event::Abrupt {
            id: conn.id(),
            packets: 0,
        }
    );
    let line = timeout(WAIT, harness.console.next_output())
        .await
        .unwrap()
        .unwrap();
    assert!(line.starts_with("abrupt: "), "got {line:?}");
    harness.until_empty().await;
}

#[tokio::test]
async fn test_unknown_tag_is_abrupt() {
    let mut harness = Harness::start().await;
    let mut client = RawClient::connect(harness.addr).await;
    let conn = harness.server_side(&client).await;

    client.send(say("before")).await;
    client.send_raw(&[0, 0, 0, 99]).await;

    assert_eq!(
        harness.next_event().await,
        Event::Packet(conn.id(), say("before").into())
    );
    assert_eq!(
        harness.next_event().await,
        Event::Abrupt {
            id: conn.id(),
            packets: 1,
        }
    );
    harness.until_empty().await;
}

// =========================================================================
// Local closes
// =========================================================================

#[tokio::test]
async fn test_local_close_unblocks_loop_and_peer_sees_end_of_stream() {
    let mut harness = Harness::start().await;
    let mut client = RawClient::connect(harness.addr).await;
    let conn = harness.server_side(&client).await;

    assert!(conn.close("bye").await);
    assert!(!conn.close("again").await, "second close is a no-op");
    timeout(WAIT, conn.closed()).await.expect("close should finish");

    assert_eq!(
        harness.next_event().await,
        Event::Normal {
            id: conn.id(),
            reason: "bye".into(),
            initiator: Initiator::Local,
            packets: 0,
        }
    );
    assert!(harness.app.connections().is_empty());
    assert_eq!(client.next().await, None, "peer sees a clean end");
}

#[tokio::test]
async fn test_send_after_close_returns_connection_closed() {
    let harness = Harness::start().await;
    let client = RawClient::connect(harness.addr).await;
    let conn = harness.server_side(&client).await;

    conn.close("done").await;
    let result = conn.send(&echo("too late")).await;

    assert!(
        matches!(result, Err(SessionError::ConnectionClosed(id)) if id == conn.id()),
        "got {result:?}"
    );
}

#[tokio::test]
async fn test_handler_can_close_its_own_connection() {
    let mut harness = Harness::start().await;
    let mut client = RawClient::connect(harness.addr).await;
    let conn = harness.server_side(&client).await;

    client.send(say("close")).await;

    assert_eq!(client.next().await, Some(echo("close")));
    assert_eq!(client.next().await, None);

    harness.next_event().await;
    assert_eq!(
        harness.next_event().await,
        Event::Normal {
            id: conn.id(),
            reason: "asked to close".into(),
            initiator: Initiator::Local,
            packets: 1,
        }
    );
}

#[tokio::test]
async fn test_close_all_waits_for_every_connection() {
    let mut harness = Harness::start().await;
    let mut clients = Vec::new();
    for _ in 0..3 {
        let client = RawClient::connect(harness.addr).await;
        harness.server_side(&client).await;
        clients.push(client);
    }

    timeout(WAIT, harness.app.close_all_connections("shutting down"))
        .await
        .expect("close_all should finish");

    assert!(harness.app.connections().is_empty());
    for client in &mut clients {
        assert_eq!(client.next().await, None);
    }
    for _ in 0..3 {
        match harness.next_event().await {
            Event::Normal {
                reason, initiator, ..
            } => {
                assert_eq!(reason, "shutting down");
                assert_eq!(initiator, Initiator::Local);
            }
            other => panic!("expected a normal close, got {other:?}"),
        }
    }
}

#[tokio::test]
async fn test_close_abandons_a_send_stalled_on_a_peer_that_never_reads() {
    let harness = Harness::start().await;
    let client = RawClient::connect(harness.addr).await;
    let conn = harness.server_side(&client).await;

    let sender = Arc::clone(&conn);
    let writes = tokio::spawn(async move {
        let big = echo(&"x".repeat(512 * 1024));
        loop {
            if let Err(e) = sender.send(&big).await {
                return e;
            }
        }
    });
    // Long enough for the socket buffers to fill.
    tokio::time::sleep(Duration::from_millis(500)).await;

    let started = timeout(WAIT, conn.close("giving up"))
        .await
        .expect("close should not wait behind a stalled write");
    assert!(started);

    let error = timeout(WAIT, writes)
        .await
        .expect("the stalled send should give up")
        .unwrap();
    assert!(
        matches!(error, SessionError::ConnectionClosed(id) if id == conn.id()),
        "got {error:?}"
    );
    timeout(WAIT, conn.closed())
        .await
        .expect("connection should reach Closed");
}

#[tokio::test]
async fn test_close_all_finishes_while_a_handler_is_stalled_writing() {
    let mut harness = Harness::start().await;
    let client = RawClient::connect(harness.addr).await;
    let conn = harness.server_side(&client).await;

    // Every message is echoed back and this client never reads, so the
    // handler's echo write stalls once the buffers are full.
    let RawClient { frames, mut writer, .. } = client;
    let mut frame = BytesMut::new();
    PacketCodec::<ClientPacket>::new()
        .encode(&say(&"x".repeat(512 * 1024)).into(), &mut frame)
        .unwrap();
    let flood = tokio::spawn(async move {
        for _ in 0..64 {
            if writer.write_all(&frame).await.is_err() {
                break;
            }
        }
    });
    tokio::time::sleep(Duration::from_millis(500)).await;

    timeout(WAIT, harness.app.close_all_connections("shutting down"))
        .await
        .expect("close_all should not wait behind a stalled write");

    assert!(harness.app.connections().is_empty());
    assert!(conn.state().is_closed());
    loop {
        match harness.next_event().await {
            Event::Packet(..) => continue,
            Event::Normal {
                reason, initiator, ..
            } => {
                assert_eq!(reason, "shutting down");
                assert_eq!(initiator, Initiator::Local);
                break;
            }
            other => panic!("expected a normal close, got {other:?}"),
        }
    }

    flood.abort();
    drop(frames);
}
