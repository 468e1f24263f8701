//! # resp-client
//!
//! Purpose: Provide a lightweight, synchronous Redis client speaking RESP2
//! directly, with connection pooling, auto-reconnect, pipelining and
//! transaction bracketing, without a pre-built driver underneath.
//!
//! ## Design Principles
//! 1. **Protocol Clarity**: Encode and parse RESP2 explicitly for correctness.
//! 2. **Shared Connections**: One pooled connection per endpoint, replaced
//!    transparently after a detected break.
//! 3. **Open Command Set**: Any command name routes through one generic
//!    `call`; wrappers for common commands are sugar, not the surface.
//! 4. **Best-Effort Codec**: Structured-value (de)serialization is pluggable
//!    and advisory, never a source of command failures.

mod client;
mod codec;
mod config;
mod connection;
mod error;
mod pool;
mod resp;

pub use client::{CommandArg, RedisClient, Ttl};
pub use codec::{JsonCodec, ValueCodec};
pub use config::{ClientConfig, Endpoint};
pub use connection::Connection;
pub use error::{Error, Result};
pub use pool::{ConnectionPool, Slot};
pub use resp::{Command, Reply};
