//! # Client Configuration
//!
//! Purpose: Collect every recognized client option in one plain struct with
//! sane defaults, so construction stays declarative and explicit.
//!
//! ## Design Principles
//! 1. **Plain Data**: Public fields plus `Default`; no builder machinery for
//!    a handful of options.
//! 2. **Immutable Endpoint**: The endpoint is fixed once a client is
//!    constructed; switching servers means constructing a new client.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use crate::codec::ValueCodec;

/// One logical server, identified by host and port.
///
/// Used as the pool key, so equality and hashing follow the host string
/// verbatim (no DNS normalization).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Endpoint {
    pub host: String,
    pub port: u16,
}

impl Endpoint {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Endpoint {
            host: host.into(),
            port,
        }
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// Configuration for a client and the connections it opens.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Server host name or address.
    pub host: String,
    /// Server port.
    pub port: u16,
    /// Connect, read and write timeout for the underlying stream.
    pub timeout: Duration,
    /// When false, closing or dropping the client evicts its pooled
    /// connection instead of leaving it for later clients on the same pool.
    pub persistent: bool,
    /// Retry a failed send exactly once on a fresh connection.
    pub auto_reconnect: bool,
    /// Password for the `AUTH` handshake step, if the server requires one.
    pub password: Option<String>,
    /// Database index for the `SELECT` handshake step; 0 skips the step.
    pub database: u32,
    /// Optional codec applied to structured command values.
    pub codec: Option<Arc<dyn ValueCodec>>,
    /// Commands whose value argument is encoded through the codec.
    pub codec_write_commands: Vec<String>,
    /// Commands whose bulk reply is decoded through the codec.
    pub codec_read_commands: Vec<String>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        ClientConfig {
            host: "127.0.0.1".to_string(),
            port: 6379,
            timeout: Duration::from_secs(1),
            persistent: true,
            auto_reconnect: true,
            password: None,
            database: 0,
            codec: None,
            codec_write_commands: vec!["SET".to_string(), "HSET".to_string()],
            codec_read_commands: vec!["GET".to_string(), "HGET".to_string()],
        }
    }
}

impl ClientConfig {
    /// The endpoint this configuration points at.
    pub fn endpoint(&self) -> Endpoint {
        Endpoint::new(self.host.clone(), self.port)
    }

    /// True when `command` should have its value argument encoded.
    pub(crate) fn encodes_command(&self, command: &[u8]) -> bool {
        self.codec.is_some() && contains_command(&self.codec_write_commands, command)
    }

    /// True when `command` should have its bulk reply decoded.
    pub(crate) fn decodes_command(&self, command: &[u8]) -> bool {
        self.codec.is_some() && contains_command(&self.codec_read_commands, command)
    }
}

fn contains_command(set: &[String], command: &[u8]) -> bool {
    set.iter().any(|name| name.as_bytes().eq_ignore_ascii_case(command))
}
