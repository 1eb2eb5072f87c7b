//! The chat client: at most one server connection, driven by the user.
//!
//! [`ChatClient`] is what the command layer talks to. Every outcome the
//! user should see (prompts, failures, incoming chat lines) is written to
//! the client's [`Console`]; the `Result`s are for the caller's control
//! flow and logs.

use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;

use ppchat_protocol::{ClientPacket, LoginPacket, MessageForServerPacket, ServerPacket};
use ppchat_session::{
    Application, Connection, ConnectionSet, Console, Initiator, SessionError, spawn_connection,
};

use crate::PpchatError;

/// Reason given to the server when the client exits.
pub const SHUTDOWN_REASON: &str = "disconnecting because the client is shutting down";

/// Reason given when `connect` replaces an existing connection.
pub const RECONNECT_REASON: &str = "connecting to another server";

/// Client-side application state.
struct ClientState {
    /// Holds zero or one connection.
    connections: ConnectionSet<ClientPacket>,
    console: Box<dyn Console>,
}

impl Application for ClientState {
    type Inbound = ServerPacket;
    type Outbound = ClientPacket;
    type Local = ();

    fn connections(&self) -> &ConnectionSet<ClientPacket> {
        &self.connections
    }

    fn console(&self) -> &dyn Console {
        self.console.as_ref()
    }

    async fn handle(
        &self,
        _conn: &Arc<Connection<ClientPacket>>,
        _local: &mut (),
        packet: ServerPacket,
    ) {
        match packet {
            ServerPacket::MessageForClient(m) => self.write(&m.message),
        }
    }

    fn handle_normal_close(
        &self,
        _conn: &Connection<ClientPacket>,
        _local: &(),
        reason: &str,
        initiator: Initiator,
    ) {
        match initiator {
            Initiator::Peer => {
                self.write(&format!("server terminated the connection, reason: {reason}"));
            }
            // `disconnect` reports its own closes.
            Initiator::Local => tracing::debug!(%reason, "closed server connection"),
        }
    }

    fn handle_abrupt_close(
        &self,
        conn: &Connection<ClientPacket>,
        _local: &(),
        error: &SessionError,
    ) {
        tracing::debug!(conn_id = %conn.id(), error = %error, "server connection lost");
        self.write("server abruptly terminated the connection");
    }
}

/// A chat client.
pub struct ChatClient {
    state: Arc<ClientState>,
}

impl ChatClient {
    /// Creates a disconnected client that talks to the user through
    /// `console`.
    pub fn new(console: impl Console) -> Self {
        Self {
            state: Arc::new(ClientState {
                connections: ConnectionSet::new(),
                console: Box::new(console),
            }),
        }
    }

    /// The current server connection, if one is live.
    fn current(&self) -> Option<Arc<Connection<ClientPacket>>> {
        self.state.connections.snapshot().into_iter().next()
    }

    /// Returns `true` while a server connection is live.
    pub fn is_connected(&self) -> bool {
        self.current().is_some_and(|conn| conn.is_open())
    }

    /// The address of the server we're connected to.
    pub fn server_addr(&self) -> Option<SocketAddr> {
        self.current().map(|conn| conn.peer_addr())
    }

    pub fn console(&self) -> &dyn Console {
        self.state.console()
    }

    /// Writes a line on the console.
    pub fn write(&self, line: &str) {
        self.state.write(line);
    }

    /// Connects to `address:port`, then prompts for a username and logs in.
    ///
    /// An existing connection is closed first.
    ///
    /// # Errors
    /// - [`TransportError::ConnectFailed`](ppchat_transport::TransportError::ConnectFailed)
    ///   if the server can't be reached (`"couldn't connect"` is written).
    /// - [`PpchatError::InputClosed`] if the console ends before a
    ///   username is entered; the new connection is closed again.
    /// - [`PpchatError::Session`] if the login can't be sent.
    pub async fn connect(&self, address: IpAddr, port: u16) -> Result<(), PpchatError> {
        if let Some(current) = self.current() {
            current.close(RECONNECT_REASON).await;
            current.closed().await;
        }

        let addr = SocketAddr::new(address, port);
        let link = match ppchat_transport::connect(addr).await {
            Ok(link) => link,
            Err(e) => {
                tracing::info!(%addr, error = %e, "connect failed");
                self.write("couldn't connect");
                return Err(e.into());
            }
        };
        let conn = spawn_connection(&self.state, link);
        tracing::info!(conn_id = %conn.id(), %addr, "connected");

        self.write("enter your username:");
        let Some(username) = self.state.console.read_line().await else {
            conn.close("no username entered").await;
            conn.closed().await;
            return Err(PpchatError::InputClosed);
        };

        conn.send_packet(LoginPacket { username }).await?;
        Ok(())
    }

    /// Sends `message` to the server, or writes `"you are not connected"`.
    pub async fn send_message(&self, message: impl Into<String>) -> Result<(), PpchatError> {
        let Some(conn) = self.current() else {
            self.write("you are not connected");
            return Ok(());
        };
        let packet = MessageForServerPacket {
            message: message.into(),
        };
        match conn.send_packet(packet).await {
            Ok(()) => Ok(()),
            Err(SessionError::ConnectionClosed(_)) => {
                self.write("you are not connected");
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Closes the connection with `reason`, waits for it to finish and
    /// writes `"disconnected"`. Writes `"you're not connected to any
    /// server"` instead when there is no connection.
    pub async fn disconnect(&self, reason: &str) {
        let Some(conn) = self.current() else {
            self.write("you're not connected to any server");
            return;
        };
        let started = conn.close(reason).await;
        conn.closed().await;
        // Otherwise the server got there first and that close was reported.
        if started {
            self.write("disconnected");
        }
    }

    /// Closes any connection with [`SHUTDOWN_REASON`].
    pub async fn shutdown(&self) {
        self.state.close_all_connections(SHUTDOWN_REASON).await;
    }
}

impl std::fmt::Debug for ChatClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChatClient")
            .field("connections", &self.state.connections)
            .finish()
    }
}
