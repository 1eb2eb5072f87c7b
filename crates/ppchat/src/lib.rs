//! # PPchat
//!
//! A minimal TCP chat: a server relays text between logged-in clients over
//! a typed, tag-framed binary protocol.
//!
//! This crate holds the two roles built on the shared connection runtime:
//!
//! - [`ChatServer`]: accepts connections, greets logins, relays messages
//! - [`ChatClient`]: one server connection, a username prompt, chat lines
//!   on the console
//!
//! plus the [`config`] files both binaries read and the client's
//! [`SavedServers`] table.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use ppchat::prelude::*;
//!
//! # async fn demo() -> Result<(), PpchatError> {
//! let server = ChatServer::builder()
//!     .bind("127.0.0.1:2048")
//!     .build()
//!     .await?;
//! server.run_until(async { let _ = tokio::signal::ctrl_c().await; }).await
//! # }
//! ```

mod client;
pub mod config;
mod error;
mod saved_servers;
mod server;

pub use client::ChatClient;
pub use config::{ClientConfig, ConfigError, ServerConfig};
pub use error::PpchatError;
pub use saved_servers::{SavedServer, SavedServers, SavedServersError};
pub use server::{ChatServer, ChatServerBuilder, ServerHandle, ServerSession};

/// Reasons reported when a role closes every connection.
pub mod reasons {
    pub use crate::client::{RECONNECT_REASON, SHUTDOWN_REASON as CLIENT_SHUTDOWN};
    pub use crate::server::SHUTDOWN_REASON as SERVER_SHUTDOWN;
    pub use ppchat_session::PEER_CLOSED_REASON;
}

/// Everything needed to run a server or client.
pub mod prelude {
    pub use crate::{
        ChatClient, ChatServer, ClientConfig, PpchatError, SavedServers, ServerConfig,
        ServerHandle,
    };
    pub use ppchat_protocol::{
        ClientPacket, LoginPacket, MessageForClientPacket, MessageForServerPacket, ServerPacket,
    };
    pub use ppchat_session::{ChannelConsole, Console, ConsoleRemote, StdConsole};
}
