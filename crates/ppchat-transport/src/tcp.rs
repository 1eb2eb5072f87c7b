//! TCP transport implementation on top of `tokio::net`.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpListener, TcpStream};

use crate::{ConnectionId, Transport, TransportError};

/// Counter for generating unique connection IDs, shared by accepted and
/// dialed links.
static NEXT_CONNECTION_ID: AtomicU64 = AtomicU64::new(1);

fn next_id() -> ConnectionId {
    ConnectionId::new(NEXT_CONNECTION_ID.fetch_add(1, Ordering::Relaxed))
}

/// A TCP-based [`Transport`] that listens for incoming connections.
pub struct TcpTransport {
    listener: TcpListener,
}

impl TcpTransport {
    /// Binds a new TCP transport to the given address.
    ///
    /// Use port `0` to let the OS pick a free port, then read it back with
    /// [`Transport::local_addr`].
    pub async fn bind(addr: &str) -> Result<Self, TransportError> {
        let listener = TcpListener::bind(addr).await.map_err(|source| {
            TransportError::BindFailed {
                addr: addr.to_string(),
                source,
            }
        })?;
        tracing::info!(addr, "TCP transport listening");
        Ok(Self { listener })
    }
}

impl Transport for TcpTransport {
    type Link = TcpLink;
    type Error = TransportError;

    async fn accept(&mut self) -> Result<Self::Link, Self::Error> {
        let (stream, peer) = self
            .listener
            .accept()
            .await
            .map_err(TransportError::AcceptFailed)?;

        let link = TcpLink::new(stream, peer);
        tracing::debug!(id = %link.id, %peer, "accepted TCP connection");
        Ok(link)
    }

    fn local_addr(&self) -> Result<SocketAddr, Self::Error> {
        self.listener
            .local_addr()
            .map_err(TransportError::AcceptFailed)
    }
}

/// Opens an outbound TCP link to `addr`.
///
/// # Errors
/// Returns [`TransportError::ConnectFailed`] if the peer refuses or the
/// address is unreachable.
pub async fn connect(addr: SocketAddr) -> Result<TcpLink, TransportError> {
    let stream = TcpStream::connect(addr)
        .await
        .map_err(|source| TransportError::ConnectFailed { addr, source })?;
    let link = TcpLink::new(stream, addr);
    tracing::debug!(id = %link.id, peer = %addr, "connected");
    Ok(link)
}

/// One established TCP stream.
#[derive(Debug)]
pub struct TcpLink {
    id: ConnectionId,
    peer: SocketAddr,
    stream: TcpStream,
}

impl TcpLink {
    fn new(stream: TcpStream, peer: SocketAddr) -> Self {
        // Frames are small and written whole, so Nagle only adds latency.
        if let Err(e) = stream.set_nodelay(true) {
            tracing::debug!(%peer, error = %e, "failed to set TCP_NODELAY");
        }
        Self {
            id: next_id(),
            peer,
            stream,
        }
    }

    /// Returns the unique identifier for this link.
    pub fn id(&self) -> ConnectionId {
        self.id
    }

    /// Returns the remote address.
    pub fn peer_addr(&self) -> SocketAddr {
        self.peer
    }

    /// Returns the local address of the socket.
    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.stream.local_addr()
    }

    /// Splits the link into independently owned read and write halves.
    ///
    /// The socket is released once both halves are dropped.
    pub fn into_split(self) -> (OwnedReadHalf, OwnedWriteHalf) {
        self.stream.into_split()
    }
}
