//! Configuration for the server and client binaries.
//!
//! Both configs are plain serde structs with every field defaulted, so a
//! config file only needs the keys it wants to change:
//!
//! ```json
//! { "bind_addr": "127.0.0.1:4000" }
//! ```
//!
//! Command-line flags are applied on top by the binaries.

use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

/// Port used when none is given.
pub const DEFAULT_PORT: u16 = 2048;

/// Address the server binds to when none is given.
pub const DEFAULT_BIND_ADDR: &str = "0.0.0.0:2048";

/// Where the client keeps its saved servers when no path is given.
pub const DEFAULT_SAVED_SERVERS_PATH: &str = "saved_servers";

/// Errors from loading a config file.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("invalid config file {path}: {source}")]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },
}

/// Server settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// `host:port` to listen on.
    pub bind_addr: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: DEFAULT_BIND_ADDR.to_string(),
        }
    }
}

impl ServerConfig {
    /// Replaces values that can't work with their defaults.
    pub fn validated(mut self) -> Self {
        if self.bind_addr.trim().is_empty() {
            tracing::warn!(default = DEFAULT_BIND_ADDR, "empty bind_addr, using default");
            self.bind_addr = DEFAULT_BIND_ADDR.to_string();
        }
        self
    }
}

/// Client settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Port used by `connect` commands that don't name one.
    pub default_port: u16,
    /// File the saved-server table is loaded from and saved to.
    pub saved_servers_path: PathBuf,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            default_port: DEFAULT_PORT,
            saved_servers_path: PathBuf::from(DEFAULT_SAVED_SERVERS_PATH),
        }
    }
}

impl ClientConfig {
    /// Replaces values that can't work with their defaults.
    pub fn validated(mut self) -> Self {
        if self.default_port == 0 {
            tracing::warn!(default = DEFAULT_PORT, "default_port 0 is not dialable, using default");
            self.default_port = DEFAULT_PORT;
        }
        if self.saved_servers_path.as_os_str().is_empty() {
            tracing::warn!(
                default = DEFAULT_SAVED_SERVERS_PATH,
                "empty saved_servers_path, using default"
            );
            self.saved_servers_path = PathBuf::from(DEFAULT_SAVED_SERVERS_PATH);
        }
        self
    }
}

/// Loads a config from `path`, or returns the defaults if `path` is `None`.
///
/// # Errors
/// [`ConfigError::Read`] if the file can't be read, [`ConfigError::Parse`]
/// if it isn't valid JSON for `T`.
pub fn load<T>(path: Option<&Path>) -> Result<T, ConfigError>
where
    T: DeserializeOwned + Default,
{
    let Some(path) = path else {
        return Ok(T::default());
    };

    let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    let config = serde_json::from_str(&text).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })?;

    tracing::info!(path = %path.display(), "loaded config");
    Ok(config)
}
