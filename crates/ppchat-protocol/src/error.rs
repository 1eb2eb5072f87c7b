//! Error types for the protocol layer.
//!
//! Every failure of the wire codec, the packet registry, and the frame
//! codec is a [`ProtocolError`]. The session layer looks at the variant to
//! decide whether a stream ended cleanly or has to be treated as lost.

/// Errors that can occur while encoding or decoding packets.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    /// Fewer bytes remain than the current field declares.
    ///
    /// While a frame is still arriving this only means "wait for more
    /// bytes". At a frame boundary with nothing left it is the clean end
    /// of the stream.
    #[error("end of stream: field needs {needed} bytes, {remaining} remaining")]
    EndOfStream { needed: usize, remaining: usize },

    /// The stream ended in the middle of a frame.
    #[error("stream ended mid-frame with {remaining} bytes left over")]
    TruncatedFrame { remaining: usize },

    /// A field was fully present but its contents are invalid
    /// (bad UTF-8, impossible address length, oversized length prefix).
    #[error("corrupt data: {0}")]
    Corrupt(String),

    /// A frame carried a tag with no registered packet type.
    #[error("unknown packet type {0}")]
    UnknownPacketType(u32),

    /// Two packet types were registered under the same tag.
    #[error("tag {tag} already registered for {existing}, cannot register {packet}")]
    DuplicateTag {
        tag: u32,
        existing: &'static str,
        packet: &'static str,
    },

    /// The same packet type was registered twice.
    #[error("packet {0} is already registered")]
    DuplicatePacket(&'static str),

    /// A length-prefixed field is longer than a reader would accept.
    #[error("field of {len} bytes exceeds maximum of {max}")]
    FieldTooLong { len: usize, max: usize },

    /// A packet was written whose type has no registered tag.
    #[error("packet {0} is not registered")]
    UnregisteredPacket(&'static str),

    /// Reading from the underlying stream failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl ProtocolError {
    /// Returns `true` for [`ProtocolError::EndOfStream`].
    pub fn is_end_of_stream(&self) -> bool {
        matches!(self, Self::EndOfStream { .. })
    }
}
