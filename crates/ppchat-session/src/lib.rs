//! Connection runtime for PPchat.
//!
//! This crate turns an established TCP link into a live connection:
//!
//! 1. **Connections** ([`Connection`], [`spawn_connection`]): a write handle
//!    plus a receive loop that decodes frames and dispatches packets
//! 2. **Lifecycle** ([`ConnectionState`], [`Closing`]): graceful and abrupt
//!    closes, each notified exactly once
//! 3. **Live set** ([`ConnectionSet`]): who is connected right now
//! 4. **Roles** ([`Application`], [`Console`]): what server and client plug
//!    in on top
//!
//! # How it fits in the stack
//!
//! ```text
//! Roles (above)  ← ppchat server and client implement Application
//!     ↕
//! Session Layer (this crate)  ← receive loops, close handling, live set
//!     ↕
//! Protocol + Transport (below)  ← packets, frames, TCP links
//! ```

#![allow(async_fn_in_trait)]

mod application;
mod connection;
mod console;
mod error;
mod set;
mod state;

pub use application::Application;
pub use connection::{Connection, spawn_connection};
pub use console::{ChannelConsole, Console, ConsoleRemote, StdConsole};
pub use error::SessionError;
pub use set::ConnectionSet;
pub use state::{Closing, ConnectionState, Initiator, PEER_CLOSED_REASON};
