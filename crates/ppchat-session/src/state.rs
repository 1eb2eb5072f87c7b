//! Connection state: where a connection is in its lifecycle.
//!
//! ```text
//!            ┌──(local close / peer EOF)──→ Closing(Graceful) ──┐
//!   Open ────┤                                                  ├──→ Closed
//!            └──(transport error / corrupt)─→ Closing(Abrupt) ──┘
//! ```
//!
//! - **Open**: the receive loop is running and writes are accepted.
//! - **Closing**: the loop has stopped dispatching (or is about to). No
//!   further writes go out. The variant records why.
//! - **Closed**: the close notification has been delivered and the
//!   connection is gone from its application's live set.

/// Reason reported when the peer ends the stream without saying why.
///
/// The wire protocol has no goodbye packet, so this is the reason of
/// every peer-initiated graceful close.
pub const PEER_CLOSED_REASON: &str = "connection closed by peer";

/// Which side ended a graceful close.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Initiator {
    /// This process asked for the close (a handler, a command, shutdown).
    Local,
    /// The peer shut its side down at a frame boundary.
    Peer,
}

/// How a connection is ending.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Closing {
    /// Orderly end: requested locally, or clean EOF from the peer.
    Graceful { reason: String, initiator: Initiator },
    /// Transport error, truncated frame, corruption, or unknown packet.
    Abrupt,
}

impl Closing {
    /// The graceful close seen when the peer ends the stream cleanly.
    pub fn by_peer() -> Self {
        Self::Graceful {
            reason: PEER_CLOSED_REASON.to_string(),
            initiator: Initiator::Peer,
        }
    }

    /// A graceful close requested by this process.
    pub fn local(reason: impl Into<String>) -> Self {
        Self::Graceful {
            reason: reason.into(),
            initiator: Initiator::Local,
        }
    }
}

/// The lifecycle state of one connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionState {
    /// Receiving and dispatching packets.
    Open,
    /// Shutting down for the given reason.
    Closing(Closing),
    /// Fully torn down.
    Closed,
}

impl ConnectionState {
    /// Returns `true` while the connection accepts writes.
    pub fn is_open(&self) -> bool {
        matches!(self, Self::Open)
    }

    /// Returns `true` once a close has started (or finished).
    pub fn is_closing(&self) -> bool {
        !self.is_open()
    }

    /// Returns `true` once the close notification has been delivered.
    pub fn is_closed(&self) -> bool {
        matches!(self, Self::Closed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_predicates() {
        assert!(ConnectionState::Open.is_open());
        assert!(!ConnectionState::Open.is_closing());

        let closing = ConnectionState::Closing(Closing::Abrupt);
        assert!(!closing.is_open());
        assert!(closing.is_closing());
        assert!(!closing.is_closed());

        assert!(ConnectionState::Closed.is_closing());
        assert!(ConnectionState::Closed.is_closed());
    }

    #[test]
    fn test_by_peer_uses_default_reason() {
        assert_eq!(
            Closing::by_peer(),
            Closing::Graceful {
                reason: PEER_CLOSED_REASON.into(),
                initiator: Initiator::Peer,
            }
        );
    }
}
