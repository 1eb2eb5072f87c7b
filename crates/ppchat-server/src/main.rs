//! `ppchat-server`: accepts chat clients and relays their messages.
//!
//! Operator output (logins, relayed lines, disconnects) goes to stdout.
//! Logs go to stderr and are filtered by `RUST_LOG` (default `info`).
//! Ctrl-C closes every connection with a shutdown reason and exits.

use std::path::PathBuf;

use clap::Parser;
use ppchat::prelude::*;

#[derive(Parser, Debug)]
#[command(author, version, about = "PPchat server", long_about = None)]
struct Cli {
    /// JSON config file. Missing keys take their defaults.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Socket address to listen on, e.g. 127.0.0.1:2048.
    #[arg(long)]
    bind: Option<String>,

    /// Port to listen on, on all interfaces.
    #[arg(long, conflicts_with = "bind")]
    port: Option<u16>,
}

impl Cli {
    /// The config file (or defaults) with command-line overrides applied.
    fn resolve(&self) -> Result<ServerConfig, PpchatError> {
        let mut config: ServerConfig = ppchat::config::load(self.config.as_deref())?;
        if let Some(bind) = &self.bind {
            config.bind_addr.clone_from(bind);
        }
        if let Some(port) = self.port {
            config.bind_addr = format!("0.0.0.0:{port}");
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
        .init();
}

#[tokio::main]
async fn main() -> Result<(), PpchatError> {
    init_logging();

    let cli = Cli::parse();
    let config = cli.resolve()?;

    let server = ChatServer::builder().config(&config).build().await?;
    tracing::info!(addr = %server.local_addr()?, "server listening");

    server
        .run_until(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::warn!(error = %e, "failed to install ctrl-c handler");
            }
        })
        .await
}
