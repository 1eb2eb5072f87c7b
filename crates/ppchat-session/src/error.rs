//! Error types for the session layer.

use ppchat_protocol::ProtocolError;
use ppchat_transport::{ConnectionId, TransportError};

/// Errors that can occur on a live connection.
///
/// Inside the receive loop these never reach handler code: any error ends
/// the loop and is handed to the application's abrupt-close callback.
/// Callers of [`Connection::send`](crate::Connection::send) see them
/// directly.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// A write was attempted on a connection that is closing or closed.
    #[error("connection {0} is closed")]
    ConnectionClosed(ConnectionId),

    /// The socket failed underneath the connection.
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// A frame could not be encoded or decoded.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
}

impl SessionError {
    /// Converts an error from the frame stream.
    ///
    /// `FramedRead` reports socket read failures as
    /// [`ProtocolError::Io`]; those are transport errors, not protocol ones.
    pub(crate) fn from_stream(error: ProtocolError) -> Self {
        match error {
            ProtocolError::Io(io) => Self::Transport(TransportError::ReceiveFailed(io)),
            other => Self::Protocol(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_stream_maps_io_to_transport() {
        let io = std::io::Error::new(std::io::ErrorKind::ConnectionReset, "reset");
        let err = SessionError::from_stream(ProtocolError::Io(io));
        assert!(matches!(
            err,
            SessionError::Transport(TransportError::ReceiveFailed(_))
        ));
    }

    #[test]
    fn test_from_stream_keeps_protocol_errors() {
        let err = SessionError::from_stream(ProtocolError::UnknownPacketType(9));
        assert!(matches!(
            err,
            SessionError::Protocol(ProtocolError::UnknownPacketType(9))
        ));
        assert_eq!(err.to_string(), "unknown packet type 9");
    }

    #[test]
    fn test_connection_closed_display() {
        let err = SessionError::ConnectionClosed(ConnectionId::new(3));
        assert_eq!(err.to_string(), "connection conn-3 is closed");
    }
}
