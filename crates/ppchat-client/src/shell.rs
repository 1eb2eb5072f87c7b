//! The interactive shell: reads command lines and carries them out.

use std::net::{IpAddr, Ipv4Addr};
use std::path::PathBuf;

use ppchat::prelude::*;

use crate::commands::{self, Command, Target};

/// Reason sent when the user types `disconnect`.
pub const DISCONNECT_REASON: &str = "disconnecting by command";

/// Whether the shell keeps reading after a command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Exit,
}

/// A chat client plus the user-side settings the commands change.
pub struct Shell {
    client: ChatClient,
    saved: SavedServers,
    saved_path: PathBuf,
    default_port: u16,
}

impl Shell {
    pub fn new(client: ChatClient, saved: SavedServers, config: &ClientConfig) -> Self {
        Self {
            client,
            saved,
            saved_path: config.saved_servers_path.clone(),
            default_port: config.default_port,
        }
    }

    /// Reads and runs commands until `exit` or the end of input, then
    /// disconnects and saves the saved-server table.
    pub async fn run(&mut self) -> Result<(), PpchatError> {
        while let Some(line) = self.client.console().read_line().await {
            match commands::parse(&line) {
                Ok(Some(command)) => {
                    if self.execute(command).await == Flow::Exit {
                        break;
                    }
                }
                Ok(None) => {}
                Err(e) => self.client.write(&e.to_string()),
            }
        }
        self.finish().await
    }

    /// Carries out one command.
    pub async fn execute(&mut self, command: Command) -> Flow {
        tracing::debug!(?command, "executing");
        match command {
            Command::Connect(target) => self.connect(target).await,
            Command::Say(text) | Command::Message(text) => {
                if let Err(e) = self.client.send_message(text).await {
                    tracing::warn!(error = %e, "message not sent");
                }
            }
            Command::Disconnect => self.client.disconnect(DISCONNECT_REASON).await,
            Command::PrintPort => {
                self.client
                    .write(&format!("the default port is: {}", self.default_port));
            }
            Command::SetPort(port) => {
                self.client.write(&format!(
                    "the default port was changed from: {}, to: {port}",
                    self.default_port
                ));
                self.default_port = port;
            }
            Command::Save {
                name,
                address,
                port,
            } => {
                self.saved.insert(name, address, port);
            }
            Command::ListServers => self.list_servers(),
            Command::Exit => return Flow::Exit,
        }
        Flow::Continue
    }

    async fn connect(&self, target: Target) {
        let loopback = IpAddr::V4(Ipv4Addr::LOCALHOST);
        let (address, port) = match target {
            Target::Default => (loopback, self.default_port),
            Target::Port(port) => (loopback, port),
            Target::Address(address) => (address, self.default_port),
            Target::Endpoint(address, port) => (address, port),
            Target::Saved(name) => match self.saved.get(&name) {
                Some(endpoint) => endpoint,
                None => {
                    self.client
                        .write(&format!("There is no saved server named {name}"));
                    return;
                }
            },
        };

        // Failures have already been reported on the console.
        if let Err(e) = self.client.connect(address, port).await {
            tracing::debug!(%address, port, error = %e, "connect did not complete");
        }
    }

    fn list_servers(&self) {
        if self.saved.is_empty() {
            self.client.write("you don't have any saved servers");
            return;
        }
        self.client.write("your saved servers are:");
        for server in self.saved.iter() {
            self.client
                .write(&format!("{}: {}, {}", server.name, server.address, server.port));
        }
    }

    async fn finish(&self) -> Result<(), PpchatError> {
        self.client.shutdown().await;
        self.saved.save(&self.saved_path).await?;
        Ok(())
    }
}
