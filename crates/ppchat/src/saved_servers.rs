//! The client's saved servers: short names for addresses it dials often.
//!
//! On disk the table is a bare sequence of wire-encoded records, one per
//! server, in insertion order:
//!
//! ```text
//! [String name][u32 addr len][addr octets][u16 port]   (repeated)
//! ```
//!
//! There is no header or count. The file ends where the last record ends.

use std::net::IpAddr;
use std::path::{Path, PathBuf};

use bytes::BytesMut;
use ppchat_protocol::{ProtocolError, Wire, WireReader};

/// Errors from loading or saving the saved-server file.
#[derive(Debug, thiserror::Error)]
pub enum SavedServersError {
    #[error("saved servers file {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// The file holds something other than whole, valid records.
    #[error("saved servers file is corrupt: {0}")]
    Corrupt(#[from] ProtocolError),

    /// An entry can't be written in a form that reads back.
    #[error("saved server can't be encoded: {0}")]
    Encode(ProtocolError),
}

/// One saved server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SavedServer {
    pub name: String,
    pub address: IpAddr,
    pub port: u16,
}

/// Insertion-ordered table of saved servers, keyed by name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SavedServers {
    entries: Vec<SavedServer>,
}

impl SavedServers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Saves `name`. An existing entry with the same name is replaced in
    /// place and its old endpoint returned.
    pub fn insert(&mut self, name: impl Into<String>, address: IpAddr, port: u16) -> Option<(IpAddr, u16)> {
        let name = name.into();
        if let Some(existing) = self.entries.iter_mut().find(|e| e.name == name) {
            let old = (existing.address, existing.port);
            existing.address = address;
            existing.port = port;
            return Some(old);
        }
        self.entries.push(SavedServer { name, address, port });
        None
    }

    pub fn get(&self, name: &str) -> Option<(IpAddr, u16)> {
        self.entries
            .iter()
            .find(|e| e.name == name)
            .map(|e| (e.address, e.port))
    }

    pub fn iter(&self) -> impl Iterator<Item = &SavedServer> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Encodes every record, in order.
    ///
    /// # Errors
    /// [`SavedServersError::Encode`] if a name is longer than a reader
    /// accepts.
    pub fn to_bytes(&self) -> Result<BytesMut, SavedServersError> {
        let mut buf = BytesMut::new();
        for entry in &self.entries {
            (entry.name.clone(), (entry.address, entry.port))
                .encode(&mut buf)
                .map_err(SavedServersError::Encode)?;
        }
        Ok(buf)
    }

    /// Decodes a full record sequence.
    ///
    /// # Errors
    /// [`SavedServersError::Corrupt`] if the last record is cut short or
    /// any field is invalid.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, SavedServersError> {
        let mut reader = WireReader::new(bytes);
        let mut servers = Self::new();
        while let Some((name, (address, port))) = reader.read_record::<(String, (IpAddr, u16))>()? {
            servers.insert(name, address, port);
        }
        Ok(servers)
    }

    /// Loads the table from `path`. A missing file is an empty table.
    pub async fn load(path: &Path) -> Result<Self, SavedServersError> {
        let bytes = match tokio::fs::read(path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "no saved servers file");
                return Ok(Self::new());
            }
            Err(source) => {
                return Err(SavedServersError::Io {
                    path: path.to_path_buf(),
                    source,
                });
            }
        };

        let servers = Self::from_bytes(&bytes)?;
        tracing::info!(path = %path.display(), count = servers.len(), "loaded saved servers");
        Ok(servers)
    }

    /// Writes the table to `path`, replacing whatever was there.
    pub async fn save(&self, path: &Path) -> Result<(), SavedServersError> {
        let bytes = self.to_bytes()?;
        tokio::fs::write(path, bytes)
            .await
            .map_err(|source| SavedServersError::Io {
                path: path.to_path_buf(),
                source,
            })?;
        tracing::info!(path = %path.display(), count = self.len(), "saved servers written");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::{Ipv4Addr, Ipv6Addr};

    fn sample() -> SavedServers {
        let mut servers = SavedServers::new();
        servers.insert("home", IpAddr::V4(Ipv4Addr::new(192, 168, 1, 10)), 2048);
        servers.insert("work", IpAddr::V6(Ipv6Addr::LOCALHOST), 9000);
        servers
    }

    fn temp_path(name: &str) -> PathBuf {
        std::env::temp_dir().join(format!("ppchat-saved-{}-{name}", std::process::id()))
    }

    #[test]
    fn test_insert_new_name_appends() {
        let servers = sample();
        let names: Vec<_> = servers.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["home", "work"]);
    }

    #[test]
    fn test_insert_existing_name_replaces_in_place() {
        let mut servers = sample();

        let old = servers.insert("home", IpAddr::V4(Ipv4Addr::LOCALHOST), 1);

        assert_eq!(old, Some((IpAddr::V4(Ipv4Addr::new(192, 168, 1, 10)), 2048)));
        assert_eq!(servers.len(), 2);
        assert_eq!(servers.iter().next().unwrap().name, "home");
        assert_eq!(servers.get("home"), Some((IpAddr::V4(Ipv4Addr::LOCALHOST), 1)));
    }

    #[test]
    fn test_get_unknown_name_returns_none() {
        assert_eq!(sample().get("nowhere"), None);
    }

    #[test]
    fn test_from_bytes_empty_is_empty_table() {
        assert!(SavedServers::from_bytes(&[]).unwrap().is_empty());
    }

    #[test]
    fn test_from_bytes_preserves_order_and_values() {
        let servers = sample();
        let decoded = SavedServers::from_bytes(&servers.to_bytes().unwrap()).unwrap();
        assert_eq!(decoded, servers);
    }

    #[test]
    fn test_from_bytes_truncated_record_is_corrupt() {
        let bytes = sample().to_bytes().unwrap();

        let result = SavedServers::from_bytes(&bytes[..bytes.len() - 1]);

        assert!(
            matches!(result, Err(SavedServersError::Corrupt(ProtocolError::TruncatedFrame { .. }))),
            "got {result:?}"
        );
    }

    #[test]
    fn test_from_bytes_bad_address_length_is_corrupt() {
        let mut buf = BytesMut::new();
        "x".to_string().encode(&mut buf).unwrap();
        5u32.encode(&mut buf).unwrap();
        buf.extend_from_slice(&[1, 2, 3, 4, 5]);
        80u16.encode(&mut buf).unwrap();

        assert!(matches!(
            SavedServers::from_bytes(&buf),
            Err(SavedServersError::Corrupt(ProtocolError::Corrupt(_)))
        ));
    }

    #[tokio::test]
    async fn test_load_missing_file_is_empty() {
        let servers = SavedServers::load(&temp_path("missing")).await.unwrap();
        assert!(servers.is_empty());
    }

    #[tokio::test]
    async fn test_save_then_load_restores_table() {
        let path = temp_path("save-load");
        let servers = sample();

        servers.save(&path).await.unwrap();
        let loaded = SavedServers::load(&path).await.unwrap();

        assert_eq!(loaded, servers);
        tokio::fs::remove_file(&path).await.ok();
    }

    #[tokio::test]
    async fn test_save_overlong_name_fails_without_writing() {
        let path = temp_path("overlong");
        let mut servers = sample();
        let name = "n".repeat(ppchat_protocol::MAX_FIELD_LEN + 1);
        servers.insert(name, IpAddr::V4(Ipv4Addr::LOCALHOST), 2048);

        let result = servers.save(&path).await;

        assert!(
            matches!(result, Err(SavedServersError::Encode(ProtocolError::FieldTooLong { .. }))),
            "got {result:?}"
        );
        assert!(!path.exists());
    }
}
