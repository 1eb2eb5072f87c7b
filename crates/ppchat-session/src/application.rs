//! The application seam: what a role (server or client) plugs into the
//! connection runtime.
//!
//! The runtime owns sockets, framing and the close state machine. The
//! application decides what each packet means, what gets printed, and
//! which connections exist. A receive loop calls into it:
//!
//! ```text
//! frame → Inbound packet → handle()            (once per packet, in order)
//! close                  → handle_normal_close() or handle_abrupt_close()
//!                                                (exactly once)
//! ```
//!
//! Packet dispatch is a plain `match` on the role's inbound enum inside
//! [`Application::handle`], so a role that forgets a packet type doesn't
//! compile.

use std::future::Future;
use std::sync::Arc;

use ppchat_protocol::PacketSet;
use ppchat_transport::ConnectionId;

use crate::{Connection, ConnectionSet, Console, Initiator, SessionError};

/// A role that owns connections and reacts to their packets.
pub trait Application: Send + Sync + 'static {
    /// Packets this role receives.
    type Inbound: PacketSet;
    /// Packets this role sends.
    type Outbound: PacketSet;
    /// Per-connection state, created fresh for each connection and owned
    /// by its receive loop.
    type Local: Default + Send + 'static;

    /// The live connection set.
    fn connections(&self) -> &ConnectionSet<Self::Outbound>;

    /// Where [`write`](Self::write) sends its lines.
    fn console(&self) -> &dyn Console;

    /// Handles one inbound packet.
    ///
    /// Runs on the connection's receive loop: the next packet isn't decoded
    /// until this returns. Handlers must not await
    /// [`Connection::closed`] or
    /// [`ConnectionSet::close_all`] on that account.
    fn handle(
        &self,
        conn: &Arc<Connection<Self::Outbound>>,
        local: &mut Self::Local,
        packet: Self::Inbound,
    ) -> impl Future<Output = ()> + Send;

    /// Called once when a connection ends gracefully.
    fn handle_normal_close(
        &self,
        conn: &Connection<Self::Outbound>,
        local: &Self::Local,
        reason: &str,
        initiator: Initiator,
    ) {
        let _ = local;
        match initiator {
            Initiator::Peer => self.write(&format!("{} closed the connection", conn.peer_addr())),
            Initiator::Local => self.write(&format!(
                "closed connection to {}, reason: {reason}",
                conn.peer_addr()
            )),
        }
    }

    /// Called once when a connection fails.
    fn handle_abrupt_close(
        &self,
        conn: &Connection<Self::Outbound>,
        local: &Self::Local,
        error: &SessionError,
    ) {
        let _ = local;
        self.write(&format!("connection to {} lost: {error}", conn.peer_addr()));
    }

    /// Writes a line to the console.
    fn write(&self, line: &str) {
        self.console().write(line);
    }

    /// Every live connection except `id`.
    fn other_connections_than(&self, id: ConnectionId) -> Vec<Arc<Connection<Self::Outbound>>> {
        self.connections().other_than(id)
    }

    /// Closes every live connection with `reason` and waits for them.
    fn close_all_connections(&self, reason: &str) -> impl Future<Output = ()> + Send {
        self.connections().close_all(reason)
    }
}
