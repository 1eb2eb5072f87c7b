//! Frame codec: packets on a byte stream.
//!
//! [`PacketCodec`] plugs the registry into `tokio_util::codec`, so a
//! connection can wrap its read half in a `FramedRead` and get a stream of
//! typed packets out of it.
//!
//! There is no frame length on the wire. The codec simply tries to decode a
//! frame from whatever is buffered: if a field runs short
//! ([`ProtocolError::EndOfStream`]) it asks for more bytes; once the peer
//! stops sending, an empty buffer is a clean end and anything else is a
//! [`ProtocolError::TruncatedFrame`].
//!
//! A short read records how long the buffer must grow before the frame can
//! possibly complete, and the frame is not parsed again until it has.

use std::marker::PhantomData;

use bytes::{Buf, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

use crate::registry::{PacketRegistry, PacketSet};
use crate::wire::WireReader;
use crate::ProtocolError;

/// Encodes and decodes frames of the packet set `S`.
pub struct PacketCodec<S: 'static> {
    registry: &'static PacketRegistry<S>,
    /// Buffered length the pending frame needs before another attempt.
    want: usize,
    _set: PhantomData<fn() -> S>,
}

impl<S: PacketSet> PacketCodec<S> {
    /// Creates a codec backed by `S`'s process-wide registry.
    pub fn new() -> Self {
        Self {
            registry: S::registry(),
            want: 0,
            _set: PhantomData,
        }
    }
}

impl<S: PacketSet> Default for PacketCodec<S> {
    fn default() -> Self {
        Self::new()
    }
}

impl<S: 'static> std::fmt::Debug for PacketCodec<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PacketCodec")
            .field("registry", self.registry)
            .field("want", &self.want)
            .finish()
    }
}

impl<S: PacketSet> Decoder for PacketCodec<S> {
    type Item = S;
    type Error = ProtocolError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<S>, ProtocolError> {
        if src.is_empty() || src.len() < self.want {
            return Ok(None);
        }

        let mut reader = WireReader::new(src);
        let decoded = self.registry.decode(&mut reader);
        let position = reader.position();
        match decoded {
            Ok(packet) => {
                src.advance(position);
                self.want = 0;
                Ok(Some(packet))
            }
            Err(ProtocolError::EndOfStream { needed, .. }) => {
                // The partial frame stays in place and is decoded again
                // from the start once `want` bytes are buffered.
                self.want = position + needed;
                src.reserve(self.want - src.len());
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<S>, ProtocolError> {
        match self.decode(src)? {
            Some(packet) => Ok(Some(packet)),
            None if src.is_empty() => Ok(None),
            None => Err(ProtocolError::TruncatedFrame {
                remaining: src.len(),
            }),
        }
    }
}

impl<S: PacketSet> Encoder<&S> for PacketCodec<S> {
    type Error = ProtocolError;

    fn encode(&mut self, packet: &S, dst: &mut BytesMut) -> Result<(), ProtocolError> {
        self.registry.encode(packet, dst)
    }
}
