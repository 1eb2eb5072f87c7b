//! A live connection and the loop that drives it.
//!
//! Spawning a connection splits its socket in two:
//!
//! - the **write half** stays in the [`Connection`] handle behind a lock, so
//!   any task (a handler, a broadcast, a console command) can send packets;
//! - the **read half** moves into a dedicated task that decodes frames and
//!   hands each packet to the [`Application`].
//!
//! # Closing
//!
//! A close can come from three places: a local [`Connection::close`], the
//! peer shutting its side down at a frame boundary, or something failing
//! (transport error, truncated frame, unknown tag). Whichever happens first
//! wins. The state moves `Open → Closing` exactly once, and the loop then:
//!
//! 1. stops dispatching and releases the socket,
//! 2. delivers exactly one close notification,
//! 3. removes the connection from the application's live set,
//! 4. moves the state to `Closed`, waking every [`Connection::closed`] waiter.
//!
//! A local close shuts down the write half immediately, so the peer sees a
//! clean end of stream, and wakes the receive loop through the state
//! channel. There is no goodbye packet; the reason stays local.

use std::marker::PhantomData;
use std::net::SocketAddr;
use std::sync::Arc;

use bytes::BytesMut;
use futures_util::StreamExt;
use ppchat_protocol::{PacketCodec, PacketSet, write_packet};
use ppchat_transport::{ConnectionId, TcpLink, TransportError};
use tokio::io::AsyncWriteExt;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::sync::{Mutex, watch};
use tokio_util::codec::FramedRead;

use crate::{Application, Closing, ConnectionState, SessionError};

/// One end of a chat connection that sends `Out` packets.
///
/// Handles are shared as `Arc<Connection<Out>>`. Cloning the `Arc` is how
/// handlers keep hold of a connection; the application's
/// [`ConnectionSet`](crate::ConnectionSet) holds one clone while the
/// connection is live.
pub struct Connection<Out> {
    id: ConnectionId,
    peer: SocketAddr,
    writer: Mutex<OwnedWriteHalf>,
    state: watch::Sender<ConnectionState>,
    _out: PhantomData<fn(&Out)>,
}

impl<Out: PacketSet> Connection<Out> {
    /// Wraps a freshly established link. Returns the handle and the read
    /// half that the receive loop will own.
    pub(crate) fn new(link: TcpLink) -> (Self, OwnedReadHalf) {
        let id = link.id();
        let peer = link.peer_addr();
        let (reader, writer) = link.into_split();
        let (state, _) = watch::channel(ConnectionState::Open);

        let conn = Self {
            id,
            peer,
            writer: Mutex::new(writer),
            state,
            _out: PhantomData,
        };
        (conn, reader)
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    /// The remote endpoint.
    pub fn peer_addr(&self) -> SocketAddr {
        self.peer
    }

    /// A snapshot of the current lifecycle state.
    pub fn state(&self) -> ConnectionState {
        self.state.borrow().clone()
    }

    /// Returns `true` until a close has started.
    pub fn is_open(&self) -> bool {
        self.state.borrow().is_open()
    }

    /// Encodes `packet` as one frame and writes it in full.
    ///
    /// Frames from concurrent callers never interleave. A connection that
    /// has started closing accepts no more frames, and a write still
    /// waiting on a peer that has stopped reading is abandoned as soon as a
    /// close starts.
    ///
    /// # Errors
    /// - [`SessionError::ConnectionClosed`] if a close has started.
    /// - [`SessionError::Protocol`] if the packet isn't registered or a
    ///   field is too long to be read back. Nothing is written and the
    ///   connection stays open.
    /// - [`SessionError::Transport`] if the socket write fails.
    pub async fn send(&self, packet: &Out) -> Result<(), SessionError> {
        let mut buf = BytesMut::new();
        write_packet(packet, &mut buf)?;

        let mut state = self.state.subscribe();
        let mut writer = tokio::select! {
            biased;
            () = close_requested(&mut state) => {
                return Err(SessionError::ConnectionClosed(self.id));
            }
            writer = self.writer.lock() => writer,
        };
        // A close may have landed while we waited for the lock.
        if !self.is_open() {
            return Err(SessionError::ConnectionClosed(self.id));
        }
        tokio::select! {
            biased;
            () = close_requested(&mut state) => {
                // The peer may be left holding part of a frame.
                tracing::debug!(conn_id = %self.id, packet = packet.name(), "write abandoned by close");
                return Err(SessionError::ConnectionClosed(self.id));
            }
            written = writer.write_all(&buf) => written.map_err(TransportError::SendFailed)?,
        }

        tracing::trace!(conn_id = %self.id, packet = packet.name(), bytes = buf.len(), "sent");
        Ok(())
    }

    /// Converts `packet` into the outbound set and sends it.
    pub async fn send_packet(&self, packet: impl Into<Out>) -> Result<(), SessionError> {
        self.send(&packet.into()).await
    }

    /// Requests a graceful close with `reason`.
    ///
    /// Returns `true` if this call started the close, `false` if one was
    /// already under way. Returns without waiting for the close to finish;
    /// use [`closed`](Self::closed) for that.
    pub async fn close(&self, reason: impl Into<String>) -> bool {
        let requested = Closing::local(reason);
        let started = self.state.send_if_modified(|state| {
            if state.is_open() {
                *state = ConnectionState::Closing(requested);
                true
            } else {
                false
            }
        });

        if started {
            tracing::debug!(conn_id = %self.id, "close requested");
            self.shutdown_writer().await;
        }
        started
    }

    /// Waits until the connection is fully closed: its notification has
    /// run and it has left the live set.
    ///
    /// Must not be awaited from inside this connection's own packet
    /// handler, since the receive loop is what completes the close.
    pub async fn closed(&self) {
        let mut state = self.state.subscribe();
        let _ = state.wait_for(ConnectionState::is_closed).await;
    }

    /// Moves `Open → Closing(candidate)` if nothing else got there first,
    /// and returns the close that actually won.
    fn begin_close(&self, candidate: Closing) -> Closing {
        let mut effective = candidate;
        self.state.send_if_modified(|state| match state {
            ConnectionState::Open => {
                *state = ConnectionState::Closing(effective.clone());
                true
            }
            ConnectionState::Closing(existing) => {
                effective = existing.clone();
                false
            }
            ConnectionState::Closed => false,
        });
        effective
    }

    async fn shutdown_writer(&self) {
        let mut writer = self.writer.lock().await;
        if let Err(e) = writer.shutdown().await {
            tracing::debug!(conn_id = %self.id, error = %e, "write shutdown failed");
        }
    }

    fn finish(&self) {
        self.state.send_replace(ConnectionState::Closed);
    }
}

impl<Out> std::fmt::Debug for Connection<Out> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("id", &self.id)
            .field("peer", &self.peer)
            .field("state", &*self.state.borrow())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Receive loop
// ---------------------------------------------------------------------------

/// Why the receive loop stopped.
enum Ended {
    Requested,
    PeerClosed,
    Failed(SessionError),
}

/// Registers `link` with `app` and starts its receive loop.
///
/// The connection is in `app.connections()` before this returns, so a
/// broadcast issued right after spawning already reaches it.
pub fn spawn_connection<A: Application>(
    app: &Arc<A>,
    link: TcpLink,
) -> Arc<Connection<A::Outbound>> {
    let (conn, reader) = Connection::new(link);
    let conn = Arc::new(conn);
    app.connections().add(Arc::clone(&conn));

    tracing::info!(conn_id = %conn.id, peer = %conn.peer, "connection opened");

    let frames = FramedRead::new(reader, PacketCodec::<A::Inbound>::new());
    tokio::spawn(receive_loop(Arc::clone(app), Arc::clone(&conn), frames));
    conn
}

async fn close_requested(state: &mut watch::Receiver<ConnectionState>) {
    let _ = state.wait_for(ConnectionState::is_closing).await;
}

async fn receive_loop<A: Application>(
    app: Arc<A>,
    conn: Arc<Connection<A::Outbound>>,
    mut frames: FramedRead<OwnedReadHalf, PacketCodec<A::Inbound>>,
) {
    let mut local = A::Local::default();
    let mut state = conn.state.subscribe();

    let ended = loop {
        tokio::select! {
            biased;

            () = close_requested(&mut state) => break Ended::Requested,

            frame = frames.next() => match frame {
                Some(Ok(packet)) => {
                    tracing::debug!(conn_id = %conn.id, packet = packet.name(), "received");
                    app.handle(&conn, &mut local, packet).await;
                }
                None => break Ended::PeerClosed,
                Some(Err(e)) => break Ended::Failed(SessionError::from_stream(e)),
            },
        }
    };

    let (closing, failure) = match ended {
        Ended::Requested | Ended::PeerClosed => (conn.begin_close(Closing::by_peer()), None),
        Ended::Failed(e) => (conn.begin_close(Closing::Abrupt), Some(e)),
    };

    // Release the socket before anyone hears about the close.
    drop(frames);
    conn.shutdown_writer().await;

    match closing {
        Closing::Graceful { reason, initiator } => {
            if let Some(e) = &failure {
                tracing::debug!(conn_id = %conn.id, error = %e, "error after close was requested");
            }
            tracing::info!(conn_id = %conn.id, ?initiator, %reason, "connection closed");
            app.handle_normal_close(&conn, &local, &reason, initiator);
        }
        Closing::Abrupt => {
            let error = failure.unwrap_or(SessionError::ConnectionClosed(conn.id));
            tracing::warn!(conn_id = %conn.id, error = %error, "connection terminated abruptly");
            app.handle_abrupt_close(&conn, &local, &error);
        }
    }

    app.connections().remove(conn.id);
    conn.finish();
}
