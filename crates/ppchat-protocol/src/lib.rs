//! Wire protocol for PPchat.
//!
//! This crate defines the "language" that clients and servers speak:
//!
//! - **Wire codec** ([`Wire`], [`WireReader`]): how single values
//!   (integers, strings, addresses, tuples) become bytes.
//! - **Packets** ([`ClientPacket`], [`ServerPacket`] and their members):
//!   the messages that travel on the wire.
//! - **Registry** ([`PacketRegistry`], [`PacketSet`]): which tag each
//!   packet type travels under.
//! - **Frame codec** ([`PacketCodec`]): packets on a byte stream, for
//!   `tokio_util::codec`.
//! - **Errors** ([`ProtocolError`]).
//!
//! # Architecture
//!
//! The protocol layer sits between transport (raw bytes) and session
//! (live connections). It doesn't know about sockets or handlers.
//!
//! ```text
//! Transport (bytes) → Protocol (frames → packets) → Session (dispatch)
//! ```

mod codec;
mod error;
mod packets;
mod registry;
pub mod wire;

pub use codec::PacketCodec;
pub use error::ProtocolError;
pub use packets::{
    ClientPacket, LoginPacket, MessageForClientPacket, MessageForServerPacket,
    ServerPacket, client_registry, server_registry, tags,
};
pub use registry::{Packet, PacketRegistry, PacketSet, read_packet, write_packet};
pub use wire::{MAX_FIELD_LEN, Wire, WireReader};
