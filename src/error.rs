//! # Client Errors
//!
//! Purpose: Give every failure mode of the client a distinct, typed variant
//! so callers can tell connection faults from server-side command errors.
//!
//! ## Design Principles
//! 1. **Fail Fast**: Protocol violations surface immediately, never papered over.
//! 2. **Typed Outcomes**: A server `-ERR` reply is a normal result, not a
//!    connection fault, and carries the server's message verbatim.
//! 3. **No Silent State**: Batch misuse is a programmer error and is reported
//!    synchronously instead of being ignored.

use std::io;

use thiserror::Error;

/// Result type for all client operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors surfaced by the client.
#[derive(Debug, Error)]
pub enum Error {
    /// The endpoint could not be reached or resolved within the timeout.
    #[error("connect to {addr} failed: {source}")]
    Connect {
        addr: String,
        #[source]
        source: io::Error,
    },

    /// The server rejected the `AUTH` handshake step.
    #[error("authentication rejected: {0}")]
    Auth(String),

    /// The server rejected the `SELECT` handshake step.
    #[error("database selection rejected: {0}")]
    Select(String),

    /// Read or write failure on an established connection.
    #[error("io error: {0}")]
    Io(#[from] io::Error),

    /// Malformed or unrecognized RESP framing.
    #[error("protocol error: {0}")]
    Protocol(&'static str),

    /// The server returned an error reply to a command.
    #[error("server error: {0}")]
    Command(String),

    /// A structured value could not be converted for wire encoding.
    #[error("value encoding failed: {0}")]
    Encode(#[from] serde_json::Error),

    /// A typed wrapper received a reply of a type its command never returns.
    #[error("unexpected reply: {0}")]
    UnexpectedReply(&'static str),

    /// A pipeline or transaction method was called in the wrong state.
    #[error("batch state violation: {0}")]
    BatchState(&'static str),
}

impl Error {
    /// True for write/read failures that mark a connection unusable.
    pub fn is_io(&self) -> bool {
        matches!(self, Error::Io(_))
    }
}
