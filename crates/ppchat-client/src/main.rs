//! `ppchat-client`: an interactive chat client.
//!
//! Type commands (`connect`, `say`, `disconnect`, `port`, `save`,
//! `servers`, `exit`) or plain text to chat. Chat output goes to stdout;
//! logs go to stderr and are filtered by `RUST_LOG` (default `info`).

mod commands;
mod shell;

use std::path::PathBuf;

use clap::Parser;
use ppchat::prelude::*;

use crate::shell::Shell;

#[derive(Parser, Debug)]
#[command(author, version, about = "PPchat client", long_about = None)]
struct Cli {
    /// JSON config file. Missing keys take their defaults.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Port used by `connect` commands that don't give one.
    #[arg(long)]
    port: Option<u16>,

    /// File the saved servers are loaded from and written back to.
    #[arg(long)]
    saved_servers: Option<PathBuf>,
}

impl Cli {
    /// The config file (or defaults) with command-line overrides applied.
    fn resolve(&self) -> Result<ClientConfig, PpchatError> {
        let mut config: ClientConfig = ppchat::config::load(self.config.as_deref())?;
        if let Some(port) = self.port {
            config.default_port = port;
        }
        if let Some(path) = &self.saved_servers {
            config.saved_servers_path.clone_from(path);
        }
        Ok(config.validated())
    }
}

fn init_logging() {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

#[tokio::main]
async fn main() -> Result<(), PpchatError> {
    init_logging();

    let cli = Cli::parse();
    let config = cli.resolve()?;
    let saved = SavedServers::load(&config.saved_servers_path).await?;

    let mut shell = Shell::new(ChatClient::new(StdConsole::new()), saved, &config);
    shell.run().await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_without_flags_uses_defaults() {
        let cli = Cli::try_parse_from(["ppchat-client"]).unwrap();
        assert_eq!(cli.resolve().unwrap(), ClientConfig::default());
    }

    #[test]
    fn test_resolve_flags_override() {
        let cli = Cli::try_parse_from([
            "ppchat-client",
            "--port",
            "4000",
            "--saved-servers",
            "/tmp/servers",
        ])
        .unwrap();

        let config = cli.resolve().unwrap();

        assert_eq!(config.default_port, 4000);
        assert_eq!(config.saved_servers_path, PathBuf::from("/tmp/servers"));
    }

    #[test]
    fn test_resolve_port_zero_falls_back() {
        let cli = Cli::try_parse_from(["ppchat-client", "--port", "0"]).unwrap();
        assert_eq!(cli.resolve().unwrap().default_port, 2048);
    }
}
