//! Transport layer for PPchat.
//!
//! Provides the [`Transport`] trait for accepting incoming links, the
//! [`connect`] function for dialing out, and [`TcpLink`], one established
//! byte stream with its [`ConnectionId`].
//!
//! Nothing here knows about packets. A link is split into a read half and
//! a write half by the session layer, which puts framing on top.

#![allow(async_fn_in_trait)]

mod error;
mod tcp;

pub use error::TransportError;
pub use tcp::{TcpLink, TcpTransport, connect};

use std::fmt;

/// Opaque identifier for a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(u64);

impl ConnectionId {
    /// Creates a new `ConnectionId` from a raw `u64`.
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    /// Returns the underlying `u64` value.
    pub fn into_inner(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// Accepts new incoming links.
pub trait Transport: Send + Sync + 'static {
    /// The link type produced by this transport.
    type Link: Send + 'static;
    /// The error type for transport operations.
    type Error: std::error::Error + Send + Sync;

    /// Waits for and accepts the next incoming link.
    async fn accept(&mut self) -> Result<Self::Link, Self::Error>;

    /// Returns the address the transport is listening on.
    fn local_addr(&self) -> Result<std::net::SocketAddr, Self::Error>;
}
