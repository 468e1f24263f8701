//! # Connection
//!
//! Purpose: Own one TCP stream to one endpoint, run the handshake exactly
//! once, and move encoded frames in and out through the codec.
//!
//! ## Design Principles
//! 1. **All-Or-Nothing Handshake**: `establish` returns a connection only
//!    after AUTH and SELECT have succeeded; partially handshaked connections
//!    are never exposed.
//! 2. **Broken Flag**: Any send/receive failure marks the connection
//!    unhealthy so the pool replaces it instead of reusing a desynced stream.
//! 3. **Buffer Reuse**: Write and line buffers live on the connection to
//!    avoid per-call allocations.

use std::fmt;
use std::io::{BufReader, Write};
use std::net::{Shutdown, TcpStream, ToSocketAddrs};

use tracing::{debug, trace};

use crate::config::{ClientConfig, Endpoint};
use crate::error::{Error, Result};
use crate::resp::{encode_command, read_reply, Command, Reply};

/// One stream socket to one endpoint, fully handshaked.
pub struct Connection {
    endpoint: Endpoint,
    reader: BufReader<TcpStream>,
    line_buf: Vec<u8>,
    write_buf: Vec<u8>,
    healthy: bool,
    authenticated: bool,
    database: u32,
}

impl Connection {
    /// Opens a stream to the endpoint and runs the handshake.
    ///
    /// Connect, read and write all share the configured timeout. Fails with
    /// `Connect` when the endpoint is unreachable or unresolvable, with
    /// `Auth`/`Select` when the server rejects a handshake step.
    pub fn establish(endpoint: &Endpoint, config: &ClientConfig) -> Result<Self> {
        let stream = open_stream(endpoint, config)?;
        stream.set_read_timeout(Some(config.timeout))?;
        stream.set_write_timeout(Some(config.timeout))?;
        // Disable Nagle to keep request latency low for small payloads.
        stream.set_nodelay(true)?;

        let mut conn = Connection {
            endpoint: endpoint.clone(),
            reader: BufReader::new(stream),
            line_buf: Vec::with_capacity(128),
            write_buf: Vec::with_capacity(256),
            healthy: true,
            authenticated: false,
            database: 0,
        };
        conn.handshake(config)?;

        debug!(endpoint = %conn.endpoint, database = conn.database, "connection established");
        Ok(conn)
    }

    fn handshake(&mut self, config: &ClientConfig) -> Result<()> {
        if let Some(password) = &config.password {
            let reply = self.round_trip(&Command::new("AUTH", vec![password.clone().into_bytes()]))?;
            if !reply.is_ok() {
                return Err(Error::Auth(describe_rejection(&reply)));
            }
            self.authenticated = true;
        }

        if config.database != 0 {
            let arg = config.database.to_string().into_bytes();
            let reply = self.round_trip(&Command::new("SELECT", vec![arg]))?;
            if !reply.is_ok() {
                return Err(Error::Select(describe_rejection(&reply)));
            }
            self.database = config.database;
        }

        Ok(())
    }

    fn round_trip(&mut self, command: &Command) -> Result<Reply> {
        self.send(command)?;
        self.receive()
    }

    /// Encodes and writes one command, without reading a reply.
    pub fn send(&mut self, command: &Command) -> Result<()> {
        self.write_buf.clear();
        encode_command(command, &mut self.write_buf);

        let stream = self.reader.get_mut();
        let written = stream
            .write_all(&self.write_buf)
            .and_then(|()| stream.flush());
        if let Err(err) = written {
            self.healthy = false;
            return Err(Error::Io(err));
        }

        trace!(endpoint = %self.endpoint, command = %String::from_utf8_lossy(command.name()), "command sent");
        Ok(())
    }

    /// Reads exactly one reply.
    ///
    /// Any failure marks the connection unhealthy: an IO error because the
    /// stream broke, a protocol error because the stream position is no
    /// longer known.
    pub fn receive(&mut self) -> Result<Reply> {
        match read_reply(&mut self.reader, &mut self.line_buf) {
            Ok(reply) => Ok(reply),
            Err(err) => {
                self.healthy = false;
                Err(err)
            }
        }
    }

    /// True while no send or receive has failed on this connection.
    pub fn is_healthy(&self) -> bool {
        self.healthy
    }

    /// Shuts the stream down and marks the connection broken. Idempotent.
    pub fn close(&mut self) {
        if self.healthy {
            debug!(endpoint = %self.endpoint, "connection closed");
        }
        self.healthy = false;
        let _ = self.reader.get_ref().shutdown(Shutdown::Both);
    }
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("endpoint", &self.endpoint)
            .field("healthy", &self.healthy)
            .field("authenticated", &self.authenticated)
            .field("database", &self.database)
            .finish()
    }
}

fn open_stream(endpoint: &Endpoint, config: &ClientConfig) -> Result<TcpStream> {
    let connect_err = |source| Error::Connect {
        addr: endpoint.to_string(),
        source,
    };

    let mut addrs = (endpoint.host.as_str(), endpoint.port)
        .to_socket_addrs()
        .map_err(connect_err)?;
    let addr = addrs.next().ok_or_else(|| Error::Connect {
        addr: endpoint.to_string(),
        source: std::io::Error::new(std::io::ErrorKind::NotFound, "no address resolved"),
    })?;

    TcpStream::connect_timeout(&addr, config.timeout).map_err(connect_err)
}

fn describe_rejection(reply: &Reply) -> String {
    match reply {
        Reply::Error(message) => message.clone(),
        Reply::Simple(text) => text.clone(),
        other => format!("unexpected reply: {other:?}"),
    }
}
