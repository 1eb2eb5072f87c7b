//! Packet registry: the mapping between packet types and wire tags.
//!
//! A frame on the wire is `[u32 tag][payload]`. The registry for a packet
//! set knows, for every member type, which tag it travels under and how to
//! decode its payload. It is built once per process and never mutated
//! afterwards; see [`PacketSet::registry`].

use std::collections::HashMap;
use std::fmt;

use bytes::BytesMut;

use crate::wire::{Wire, WireReader};
use crate::ProtocolError;

/// One concrete packet type.
pub trait Packet: Wire + fmt::Debug + Send + Sync + 'static {
    /// Stable name of the packet type, used for registration checks and
    /// diagnostics. Never sent over the wire.
    const NAME: &'static str;
}

/// A closed set of packets that one role receives (or sends).
///
/// Implemented by an enum with one variant per packet type. Receivers
/// `match` on it, so forgetting to handle a packet is a compile error.
pub trait PacketSet: fmt::Debug + Send + Sync + Sized + 'static {
    /// The process-wide registry for this set.
    fn registry() -> &'static PacketRegistry<Self>;

    /// [`Packet::NAME`] of the variant held by `self`.
    fn name(&self) -> &'static str;

    /// Appends the payload (without the tag) of the held packet.
    fn encode_payload(&self, buf: &mut BytesMut) -> Result<(), ProtocolError>;
}

type DecodeFn<S> = fn(&mut WireReader<'_>) -> Result<S, ProtocolError>;

struct Entry<S> {
    name: &'static str,
    decode: DecodeFn<S>,
}

/// Tag ↔ packet type table for the packet set `S`.
pub struct PacketRegistry<S> {
    by_tag: HashMap<u32, Entry<S>>,
    tags: HashMap<&'static str, u32>,
}

fn decode_as<T, S>(reader: &mut WireReader<'_>) -> Result<S, ProtocolError>
where
    T: Packet + Into<S>,
{
    T::decode(reader).map(Into::into)
}

impl<S: PacketSet> PacketRegistry<S> {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self {
            by_tag: HashMap::new(),
            tags: HashMap::new(),
        }
    }

    /// Registers packet type `T` under `tag`.
    ///
    /// # Errors
    /// - [`ProtocolError::DuplicateTag`] if `tag` is already taken
    /// - [`ProtocolError::DuplicatePacket`] if `T` is already registered
    pub fn register<T>(mut self, tag: u32) -> Result<Self, ProtocolError>
    where
        T: Packet + Into<S>,
    {
        if let Some(existing) = self.by_tag.get(&tag) {
            return Err(ProtocolError::DuplicateTag {
                tag,
                existing: existing.name,
                packet: T::NAME,
            });
        }
        if self.tags.contains_key(T::NAME) {
            return Err(ProtocolError::DuplicatePacket(T::NAME));
        }

        self.by_tag.insert(
            tag,
            Entry {
                name: T::NAME,
                decode: decode_as::<T, S>,
            },
        );
        self.tags.insert(T::NAME, tag);
        Ok(self)
    }

    /// Returns the tag registered for the packet named `name`.
    pub fn tag_of(&self, name: &str) -> Option<u32> {
        self.tags.get(name).copied()
    }

    /// Returns the name of the packet registered under `tag`.
    pub fn name_of(&self, tag: u32) -> Option<&'static str> {
        self.by_tag.get(&tag).map(|entry| entry.name)
    }

    /// Number of registered packet types.
    pub fn len(&self) -> usize {
        self.by_tag.len()
    }

    /// Returns `true` if nothing is registered.
    pub fn is_empty(&self) -> bool {
        self.by_tag.is_empty()
    }

    /// Writes one frame: the packet's tag, then its payload.
    ///
    /// Either the whole frame is appended to `buf` or nothing is.
    ///
    /// # Errors
    /// - [`ProtocolError::UnregisteredPacket`] if the packet's type has no tag
    /// - [`ProtocolError::FieldTooLong`] if a field is too long to be read
    ///   back
    pub fn encode(&self, packet: &S, buf: &mut BytesMut) -> Result<(), ProtocolError> {
        let tag = self
            .tag_of(packet.name())
            .ok_or(ProtocolError::UnregisteredPacket(packet.name()))?;
        let start = buf.len();
        let written = tag.encode(buf).and_then(|()| packet.encode_payload(buf));
        if written.is_err() {
            buf.truncate(start);
        }
        written
    }

    /// Reads one frame: a tag, then the payload of the matching type.
    ///
    /// # Errors
    /// - [`ProtocolError::EndOfStream`] if the frame is incomplete
    /// - [`ProtocolError::UnknownPacketType`] if the tag is not registered
    /// - any payload decoding error
    pub fn decode(&self, reader: &mut WireReader<'_>) -> Result<S, ProtocolError> {
        let tag = u32::decode(reader)?;
        let entry = self
            .by_tag
            .get(&tag)
            .ok_or(ProtocolError::UnknownPacketType(tag))?;
        (entry.decode)(reader)
    }
}

impl<S: PacketSet> Default for PacketRegistry<S> {
    fn default() -> Self {
        Self::new()
    }
}

impl<S> fmt::Debug for PacketRegistry<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut tags: Vec<_> = self.tags.iter().map(|(n, t)| (*t, *n)).collect();
        tags.sort_unstable();
        f.debug_map().entries(tags).finish()
    }
}

/// Writes `packet` as one frame using its set's process-wide registry.
pub fn write_packet<S: PacketSet>(packet: &S, buf: &mut BytesMut) -> Result<(), ProtocolError> {
    S::registry().encode(packet, buf)
}

/// Reads one frame of set `S` using its process-wide registry.
pub fn read_packet<S: PacketSet>(reader: &mut WireReader<'_>) -> Result<S, ProtocolError> {
    S::registry().decode(reader)
}
