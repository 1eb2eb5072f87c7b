//! Unified error type for PPchat.

use ppchat_protocol::ProtocolError;
use ppchat_session::SessionError;
use ppchat_transport::TransportError;

use crate::{ConfigError, SavedServersError};

/// Top-level error that wraps all crate-specific errors.
///
/// When using the `ppchat` crate, you deal with this single error type
/// instead of importing errors from each sub-crate. The `#[from]`
/// attribute on each variant lets `?` convert sub-crate errors.
#[derive(Debug, thiserror::Error)]
pub enum PpchatError {
    /// Binding, accepting, connecting, or socket I/O failed.
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// A packet could not be encoded or decoded.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// A live connection refused a write.
    #[error(transparent)]
    Session(#[from] SessionError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    SavedServers(#[from] SavedServersError),

    /// The console ran out of input while a line was required.
    #[error("console input ended")]
    InputClosed,
}

#[cfg(test)]
mod tests {
    use super::*;
    use ppchat_transport::ConnectionId;

    #[test]
    fn test_from_transport_error() {
        let err = TransportError::AcceptFailed(std::io::Error::other("gone"));
        let ppchat_err: PpchatError = err.into();
        assert!(matches!(ppchat_err, PpchatError::Transport(_)));
        assert!(ppchat_err.to_string().contains("gone"));
    }

    #[test]
    fn test_from_protocol_error() {
        let err = ProtocolError::UnknownPacketType(7);
        let ppchat_err: PpchatError = err.into();
        assert!(matches!(ppchat_err, PpchatError::Protocol(_)));
    }

    #[test]
    fn test_from_session_error() {
        let err = SessionError::ConnectionClosed(ConnectionId::new(1));
        let ppchat_err: PpchatError = err.into();
        assert!(matches!(ppchat_err, PpchatError::Session(_)));
        assert_eq!(ppchat_err.to_string(), "connection conn-1 is closed");
    }

    #[test]
    fn test_from_saved_servers_error() {
        let err = SavedServersError::Corrupt(ProtocolError::TruncatedFrame { remaining: 3 });
        let ppchat_err: PpchatError = err.into();
        assert!(matches!(ppchat_err, PpchatError::SavedServers(_)));
    }
}
