//! Chat packets: every type that travels on the wire.
//!
//! Packets are grouped by direction into one enum per receiving role:
//!
//! - [`ClientPacket`]: sent by clients, handled by the server
//! - [`ServerPacket`]: sent by the server, handled by clients
//!
//! All packets share a single tag space (see [`tags`]), so a frame that
//! reaches the wrong role fails with `UnknownPacketType` instead of being
//! decoded as something else.

use std::sync::OnceLock;

use bytes::BytesMut;

use crate::registry::{Packet, PacketRegistry, PacketSet};
use crate::wire::{Wire, WireReader};
use crate::ProtocolError;

/// Wire tags of every packet type.
pub mod tags {
    /// [`LoginPacket`](super::LoginPacket)
    pub const LOGIN: u32 = 1;
    /// [`MessageForServerPacket`](super::MessageForServerPacket)
    pub const MESSAGE_FOR_SERVER: u32 = 2;
    /// [`MessageForClientPacket`](super::MessageForClientPacket)
    pub const MESSAGE_FOR_CLIENT: u32 = 3;
}

// ---------------------------------------------------------------------------
// Client → Server
// ---------------------------------------------------------------------------

/// Client → Server: "call me `username`."
///
/// The name is self-declared and not checked against anything.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoginPacket {
    pub username: String,
}

/// Client → Server: a chat line to relay to everyone else.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageForServerPacket {
    pub message: String,
}

// ---------------------------------------------------------------------------
// Server → Client
// ---------------------------------------------------------------------------

/// Server → Client: a line of text to show the user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageForClientPacket {
    pub message: String,
}

impl Wire for LoginPacket {
    fn encode(&self, buf: &mut BytesMut) -> Result<(), ProtocolError> {
        self.username.encode(buf)
    }

    fn decode(reader: &mut WireReader<'_>) -> Result<Self, ProtocolError> {
        Ok(Self {
            username: reader.read()?,
        })
    }
}

impl Wire for MessageForServerPacket {
    fn encode(&self, buf: &mut BytesMut) -> Result<(), ProtocolError> {
        self.message.encode(buf)
    }

    fn decode(reader: &mut WireReader<'_>) -> Result<Self, ProtocolError> {
        Ok(Self {
            message: reader.read()?,
        })
    }
}

impl Wire for MessageForClientPacket {
    fn encode(&self, buf: &mut BytesMut) -> Result<(), ProtocolError> {
        self.message.encode(buf)
    }

    fn decode(reader: &mut WireReader<'_>) -> Result<Self, ProtocolError> {
        Ok(Self {
            message: reader.read()?,
        })
    }
}

impl Packet for LoginPacket {
    const NAME: &'static str = "LoginPacket";
}

impl Packet for MessageForServerPacket {
    const NAME: &'static str = "MessageForServerPacket";
}

impl Packet for MessageForClientPacket {
    const NAME: &'static str = "MessageForClientPacket";
}

// ---------------------------------------------------------------------------
// Packet sets
// ---------------------------------------------------------------------------

/// Every packet a client may send.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientPacket {
    Login(LoginPacket),
    MessageForServer(MessageForServerPacket),
}

/// Every packet the server may send.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerPacket {
    MessageForClient(MessageForClientPacket),
}

impl From<LoginPacket> for ClientPacket {
    fn from(packet: LoginPacket) -> Self {
        Self::Login(packet)
    }
}

impl From<MessageForServerPacket> for ClientPacket {
    fn from(packet: MessageForServerPacket) -> Self {
        Self::MessageForServer(packet)
    }
}

impl From<MessageForClientPacket> for ServerPacket {
    fn from(packet: MessageForClientPacket) -> Self {
        Self::MessageForClient(packet)
    }
}

/// Builds the registry of client-originated packets.
pub fn client_registry() -> Result<PacketRegistry<ClientPacket>, ProtocolError> {
    PacketRegistry::new()
        .register::<LoginPacket>(tags::LOGIN)?
        .register::<MessageForServerPacket>(tags::MESSAGE_FOR_SERVER)
}

/// Builds the registry of server-originated packets.
pub fn server_registry() -> Result<PacketRegistry<ServerPacket>, ProtocolError> {
    PacketRegistry::new().register::<MessageForClientPacket>(tags::MESSAGE_FOR_CLIENT)
}

impl PacketSet for ClientPacket {
    fn registry() -> &'static PacketRegistry<Self> {
        static REGISTRY: OnceLock<PacketRegistry<ClientPacket>> = OnceLock::new();
        // Tags are constants, so this only fails if `tags` has a clash.
        REGISTRY.get_or_init(|| client_registry().expect("client packet tags are unique"))
    }

    fn name(&self) -> &'static str {
        match self {
            Self::Login(_) => LoginPacket::NAME,
            Self::MessageForServer(_) => MessageForServerPacket::NAME,
        }
    }

    fn encode_payload(&self, buf: &mut BytesMut) -> Result<(), ProtocolError> {
        match self {
            Self::Login(p) => p.encode(buf),
            Self::MessageForServer(p) => p.encode(buf),
        }
    }
}

impl PacketSet for ServerPacket {
    fn registry() -> &'static PacketRegistry<Self> {
        static REGISTRY: OnceLock<PacketRegistry<ServerPacket>> = OnceLock::new();
        REGISTRY.get_or_init(|| server_registry().expect("server packet tags are unique"))
    }

    fn name(&self) -> &'static str {
        match self {
            Self::MessageForClient(_) => MessageForClientPacket::NAME,
        }
    }

    fn encode_payload(&self, buf: &mut BytesMut) -> Result<(), ProtocolError> {
        match self {
            Self::MessageForClient(p) => p.encode(buf),
        }
    }
}
