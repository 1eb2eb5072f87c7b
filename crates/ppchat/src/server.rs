//! `ChatServer` builder, server loop, and the server's packet handlers.
//!
//! This is the entry point for running a PPchat server. It ties together
//! all the layers: transport → protocol → session → chat rules.
//!
//! The chat rules are small:
//!
//! - **Login** stores the username on the connection, greets the user and
//!   reports the login on the console.
//! - **MessageForServer** is reported on the console and relayed to every
//!   *other* live connection as `"{name} said: {message}"`.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use ppchat_protocol::{
    ClientPacket, LoginPacket, MessageForClientPacket, MessageForServerPacket, ServerPacket,
};
use ppchat_session::{
    Application, Connection, ConnectionSet, Console, Initiator, SessionError, StdConsole,
    spawn_connection,
};
use ppchat_transport::{TcpLink, TcpTransport, Transport, TransportError};

use crate::{PpchatError, ServerConfig};
use crate::config::DEFAULT_BIND_ADDR;

/// Reason given to every connection when the server stops.
pub const SHUTDOWN_REASON: &str = "the server is shutting down";

// ---------------------------------------------------------------------------
// Per-connection and shared state
// ---------------------------------------------------------------------------

/// What the server knows about one connection.
#[derive(Debug, Default)]
pub struct ServerSession {
    /// Set by the most recent login.
    username: Option<String>,
}

impl ServerSession {
    pub fn username(&self) -> Option<&str> {
        self.username.as_deref()
    }

    /// The name used in reports: the username, or the peer address before
    /// login.
    fn display_name(&self, conn: &Connection<ServerPacket>) -> String {
        match &self.username {
            Some(name) => name.clone(),
            None => conn.peer_addr().to_string(),
        }
    }
}

/// Shared server state handed to every receive loop.
pub(crate) struct ServerState {
    connections: ConnectionSet<ServerPacket>,
    console: Box<dyn Console>,
}

impl ServerState {
    async fn on_login(
        &self,
        conn: &Arc<Connection<ServerPacket>>,
        session: &mut ServerSession,
        login: LoginPacket,
    ) {
        let username = login.username;
        tracing::info!(conn_id = %conn.id(), %username, "login");

        let greeting = MessageForClientPacket {
            message: format!("hi, {username}!"),
        };
        if let Err(e) = conn.send_packet(greeting).await {
            tracing::debug!(conn_id = %conn.id(), error = %e, "greeting not delivered");
        }
        self.write(&format!("user {username} logged in"));
        session.username = Some(username);
    }

    async fn on_message(
        &self,
        conn: &Arc<Connection<ServerPacket>>,
        session: &ServerSession,
        packet: MessageForServerPacket,
    ) {
        let line = format!("{} said: {}", session.display_name(conn), packet.message);
        self.write(&line);

        let relay = ServerPacket::from(MessageForClientPacket { message: line });
        for other in self.other_connections_than(conn.id()) {
            // A peer that is closing just misses the message.
            if let Err(e) = other.send(&relay).await {
                tracing::debug!(conn_id = %other.id(), error = %e, "relay not delivered");
            }
        }
    }
}

impl Application for ServerState {
    type Inbound = ClientPacket;
    type Outbound = ServerPacket;
    type Local = ServerSession;

    fn connections(&self) -> &ConnectionSet<ServerPacket> {
        &self.connections
    }

    fn console(&self) -> &dyn Console {
        self.console.as_ref()
    }

    async fn handle(
        &self,
        conn: &Arc<Connection<ServerPacket>>,
        session: &mut ServerSession,
        packet: ClientPacket,
    ) {
        match packet {
            ClientPacket::Login(login) => self.on_login(conn, session, login).await,
            ClientPacket::MessageForServer(message) => {
                self.on_message(conn, session, message).await;
            }
        }
    }

    fn handle_normal_close(
        &self,
        conn: &Connection<ServerPacket>,
        session: &ServerSession,
        reason: &str,
        initiator: Initiator,
    ) {
        let name = session.display_name(conn);
        match initiator {
            Initiator::Peer => self.write(&format!("user {name} disconnected")),
            Initiator::Local => self.write(&format!("disconnected user {name}, reason: {reason}")),
        }
    }

    fn handle_abrupt_close(
        &self,
        conn: &Connection<ServerPacket>,
        session: &ServerSession,
        error: &SessionError,
    ) {
        tracing::debug!(conn_id = %conn.id(), error = %error, "abrupt close");
        self.write(&format!(
            "user {} abruptly terminated the connection",
            session.display_name(conn)
        ));
    }
}

// ---------------------------------------------------------------------------
// Builder
// ---------------------------------------------------------------------------

/// Builder for configuring and starting a chat server.
///
/// # Example
///
/// ```rust,ignore
/// use ppchat::prelude::*;
///
/// let server = ChatServer::builder()
///     .bind("0.0.0.0:2048")
///     .build()
///     .await?;
/// server.run().await
/// ```
pub struct ChatServerBuilder {
    bind_addr: String,
    console: Option<Box<dyn Console>>,
}

impl ChatServerBuilder {
    /// Creates a new builder with default settings.
    pub fn new() -> Self {
        Self {
            bind_addr: DEFAULT_BIND_ADDR.to_string(),
            console: None,
        }
    }

    /// Sets the address to bind the server to.
    pub fn bind(mut self, addr: impl Into<String>) -> Self {
        self.bind_addr = addr.into();
        self
    }

    /// Takes settings from a loaded config.
    pub fn config(self, config: &ServerConfig) -> Self {
        self.bind(config.bind_addr.clone())
    }

    /// Sets where operator output goes. Defaults to stdout.
    pub fn console(mut self, console: impl Console) -> Self {
        self.console = Some(Box::new(console));
        self
    }

    /// Binds the listener.
    ///
    /// # Errors
    /// [`TransportError::BindFailed`] if the address is invalid or taken.
    pub async fn build(self) -> Result<ChatServer, PpchatError> {
        let transport = TcpTransport::bind(&self.bind_addr).await?;
        let console = self
            .console
            .unwrap_or_else(|| Box::new(StdConsole::new()));

        let state = Arc::new(ServerState {
            connections: ConnectionSet::new(),
            console,
        });

        Ok(ChatServer { transport, state })
    }
}

impl Default for ChatServerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Server
// ---------------------------------------------------------------------------

/// A bound chat server.
///
/// Call [`run()`](Self::run) or [`run_until()`](Self::run_until) to start
/// accepting connections. Grab a [`ServerHandle`] first if you need to
/// inspect or close connections while it runs.
pub struct ChatServer {
    transport: TcpTransport,
    state: Arc<ServerState>,
}

impl ChatServer {
    /// Creates a new builder.
    pub fn builder() -> ChatServerBuilder {
        ChatServerBuilder::new()
    }

    /// Returns the local address the server is bound to.
    pub fn local_addr(&self) -> Result<SocketAddr, PpchatError> {
        Ok(self.transport.local_addr()?)
    }

    /// A handle onto the server's live connections.
    pub fn handle(&self) -> ServerHandle {
        ServerHandle {
            state: Arc::clone(&self.state),
        }
    }

    /// Runs the accept loop forever.
    ///
    /// Each accepted socket gets its own receive loop task. A failed accept
    /// is logged and the loop carries on.
    pub async fn run(mut self) -> Result<(), PpchatError> {
        tracing::info!("PPchat server running");

        loop {
            let accepted = self.transport.accept().await;
            self.on_accept(accepted);
        }
    }

    /// Runs the accept loop until `shutdown` resolves, then closes every
    /// connection with [`SHUTDOWN_REASON`] and waits for them.
    pub async fn run_until<F>(mut self, shutdown: F) -> Result<(), PpchatError>
    where
        F: Future<Output = ()> + Send,
    {
        tracing::info!("PPchat server running");
        tokio::pin!(shutdown);

        loop {
            let accepted = tokio::select! {
                () = &mut shutdown => break,
                accepted = self.transport.accept() => accepted,
            };
            self.on_accept(accepted);
        }

        tracing::info!(live = self.state.connections.len(), "server shutting down");
        let ChatServer { transport, state } = self;
        drop(transport);
        state.close_all_connections(SHUTDOWN_REASON).await;
        Ok(())
    }

    fn on_accept(&self, accepted: Result<TcpLink, TransportError>) {
        match accepted {
            Ok(link) => {
                spawn_connection(&self.state, link);
            }
            Err(e) => {
                tracing::error!(error = %e, "accept failed");
            }
        }
    }
}

/// A cloneable view of a running server's connections.
#[derive(Clone)]
pub struct ServerHandle {
    state: Arc<ServerState>,
}

impl ServerHandle {
    pub fn connection_count(&self) -> usize {
        self.state.connections.len()
    }

    /// Every live connection, oldest first.
    pub fn connections(&self) -> Vec<Arc<Connection<ServerPacket>>> {
        self.state.connections.snapshot()
    }

    /// Closes every live connection with `reason` and waits for them.
    pub async fn close_all(&self, reason: &str) {
        self.state.close_all_connections(reason).await;
    }

    /// Writes a line on the server's console.
    pub fn write(&self, line: &str) {
        self.state.write(line);
    }
}

impl std::fmt::Debug for ServerHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServerHandle")
            .field("connections", &self.state.connections)
            .finish()
    }
}
