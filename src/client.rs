//! # Synchronous Client API
//!
//! Purpose: Expose a compact, blocking API for issuing Redis commands over
//! RESP2, with pooled connections, single-retry reconnection, pipelining and
//! transaction bracketing.
//!
//! ## Design Principles
//! 1. **Facade Pattern**: `RedisClient` hides pooling and protocol details.
//! 2. **Open Command Set**: One generic `call` accepts any command name;
//!    typed wrappers exist only for convenience.
//! 3. **Single-Caller Batches**: Batch-mutating methods take `&mut self`, so
//!    a pending batch cannot be shared between concurrent callers.
//! 4. **Bounded Retry**: A failed send reconnects and retries exactly once,
//!    and only outside an open batch; reads never retry.

use std::io;
use std::mem;
use std::sync::MutexGuard;
use std::time::Duration;

use serde::Serialize;
use serde_json::Value;
use tracing::{debug, warn};

use crate::config::{ClientConfig, Endpoint};
use crate::connection::Connection;
use crate::error::{Error, Result};
use crate::pool::{ConnectionPool, Slot};
use crate::resp::{Command, Reply};

/// One command argument: raw bytes, or a structured value routed through the
/// configured codec.
#[derive(Debug, Clone)]
pub enum CommandArg {
    Bytes(Vec<u8>),
    Structured(Value),
}

impl From<&str> for CommandArg {
    fn from(value: &str) -> Self {
        CommandArg::Bytes(value.as_bytes().to_vec())
    }
}

impl From<String> for CommandArg {
    fn from(value: String) -> Self {
        CommandArg::Bytes(value.into_bytes())
    }
}

impl From<&[u8]> for CommandArg {
    fn from(value: &[u8]) -> Self {
        CommandArg::Bytes(value.to_vec())
    }
}

impl<const N: usize> From<&[u8; N]> for CommandArg {
    fn from(value: &[u8; N]) -> Self {
        CommandArg::Bytes(value.to_vec())
    }
}

impl From<Vec<u8>> for CommandArg {
    fn from(value: Vec<u8>) -> Self {
        CommandArg::Bytes(value)
    }
}

impl From<i64> for CommandArg {
    fn from(value: i64) -> Self {
        CommandArg::Bytes(value.to_string().into_bytes())
    }
}

impl From<u64> for CommandArg {
    fn from(value: u64) -> Self {
        CommandArg::Bytes(value.to_string().into_bytes())
    }
}

impl From<Value> for CommandArg {
    fn from(value: Value) -> Self {
        CommandArg::Structured(value)
    }
}

impl From<&Value> for CommandArg {
    fn from(value: &Value) -> Self {
        CommandArg::Structured(value.clone())
    }
}

/// TTL state returned by the server, mirroring Redis semantics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ttl {
    /// Key is missing or already expired.
    Missing,
    /// Key exists without expiration.
    NoExpiry,
    /// Key expires after the provided duration.
    ExpiresIn(Duration),
}

/// Batch state machine: Idle -> Pipelining -> Idle, Idle -> Transaction -> Idle.
#[derive(Debug)]
enum BatchState {
    Idle,
    /// Commands written but with replies still owed, in send order.
    Pipeline { pending: Vec<Command> },
    /// Between MULTI and EXEC/DISCARD; the server queues commands.
    Transaction,
}

/// Synchronous Redis client over a pooled connection.
///
/// Each call occupies the caller until the round trip completes (or, while
/// pipelining, until the write completes). A single client must not be shared
/// for concurrent sends; give each concurrent caller its own client, sharing
/// a `ConnectionPool` only when they target distinct endpoints or serialize
/// externally.
#[derive(Debug)]
pub struct RedisClient {
    config: ClientConfig,
    endpoint: Endpoint,
    pool: ConnectionPool,
    batch: BatchState,
}

impl RedisClient {
    /// Creates a client with its own pool, connecting eagerly so
    /// configuration and handshake problems surface immediately.
    pub fn connect(config: ClientConfig) -> Result<Self> {
        let client = Self::with_pool(config, ConnectionPool::new());
        client.pool.acquire(&client.endpoint, &client.config)?;
        Ok(client)
    }

    /// Creates a client on a shared pool. No connection is opened until the
    /// first command.
    pub fn with_pool(config: ClientConfig, pool: ConnectionPool) -> Self {
        let endpoint = config.endpoint();
        RedisClient {
            config,
            endpoint,
            pool,
            batch: BatchState::Idle,
        }
    }

    /// The endpoint this client talks to.
    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    /// Issues an arbitrary command and returns the decoded reply.
    ///
    /// The name is upper-cased on the wire; arguments accept anything
    /// convertible to [`CommandArg`]. A server error reply surfaces as
    /// [`Error::Command`]. While a pipeline is open the command is written
    /// immediately, recorded, and `Reply::Null` is returned as the deferred
    /// placeholder; the real reply arrives from [`pipeline_execute`].
    ///
    /// [`pipeline_execute`]: RedisClient::pipeline_execute
    pub fn call<I>(&mut self, name: &str, args: I) -> Result<Reply>
    where
        I: IntoIterator,
        I::Item: Into<CommandArg>,
    {
        let command = self.build_command(name, args);
        self.dispatch(command)
    }

    /// Releases this client's claim on its pooled connection.
    ///
    /// A non-persistent client evicts and closes the pooled connection; a
    /// persistent one leaves it for later clients sharing the pool.
    /// Idempotent. Any open batch is abandoned client-side.
    pub fn close(&mut self) {
        self.batch = BatchState::Idle;
        if !self.config.persistent {
            self.pool.evict(&self.endpoint);
        }
    }

    // ---- pipelining -------------------------------------------------------

    /// Begins a pipeline. Subsequent calls write immediately but defer their
    /// replies until [`pipeline_execute`](RedisClient::pipeline_execute).
    pub fn pipeline_start(&mut self) -> Result<()> {
        match self.batch {
            BatchState::Idle => {
                self.batch = BatchState::Pipeline {
                    pending: Vec::new(),
                };
                Ok(())
            }
            _ => Err(Error::BatchState("pipeline_start requires an idle client")),
        }
    }

    /// Collects one reply per pipelined command, in send order.
    ///
    /// Error replies stay in place as `Reply::Error` elements so positions
    /// keep lining up with the submitted commands.
    pub fn pipeline_execute(&mut self) -> Result<Vec<Reply>> {
        let pending = match mem::replace(&mut self.batch, BatchState::Idle) {
            BatchState::Pipeline { pending } => pending,
            other => {
                self.batch = other;
                return Err(Error::BatchState("pipeline_execute requires an open pipeline"));
            }
        };
        if pending.is_empty() {
            return Ok(Vec::new());
        }

        let slot = self.pool.acquire(&self.endpoint, &self.config)?;
        let mut guard = lock_slot(&slot);
        let conn = live_connection(&mut guard)?;
        let mut replies = Vec::with_capacity(pending.len());
        for _ in 0..pending.len() {
            replies.push(conn.receive()?);
        }
        Ok(replies)
    }

    // ---- transactions -----------------------------------------------------

    /// Sends `MULTI` and opens a transaction. Subsequent calls are queued
    /// server-side and acknowledged with `QUEUED`, which is returned as-is.
    pub fn multi(&mut self) -> Result<()> {
        if !matches!(self.batch, BatchState::Idle) {
            return Err(Error::BatchState("multi requires an idle client"));
        }
        let reply = reply_to_result(self.round_trip(&Command::new("MULTI", Vec::new()), self.config.auto_reconnect)?)?;
        if !reply.is_ok() {
            return Err(Error::UnexpectedReply("MULTI did not return OK"));
        }
        self.batch = BatchState::Transaction;
        Ok(())
    }

    /// Sends `EXEC` and closes the transaction.
    ///
    /// Returns `Some` with one reply per queued command in submission order,
    /// or `None` when the server aborted the transaction (for example after a
    /// failed `WATCH`). An empty transaction yields `Some(vec![])`, which is
    /// distinct from the aborted case.
    pub fn exec(&mut self) -> Result<Option<Vec<Reply>>> {
        if !matches!(self.batch, BatchState::Transaction) {
            return Err(Error::BatchState("exec requires an open transaction"));
        }
        self.batch = BatchState::Idle;
        // No reconnect retry: the queued commands only exist on the original
        // connection.
        match reply_to_result(self.round_trip(&Command::new("EXEC", Vec::new()), false)?)? {
            Reply::Array(items) => Ok(Some(items)),
            Reply::Null => Ok(None),
            _ => Err(Error::UnexpectedReply("EXEC returned neither array nor null")),
        }
    }

    /// Sends `DISCARD`, dropping the queued commands, and closes the
    /// transaction. Returns the server's acknowledgement.
    pub fn discard(&mut self) -> Result<Reply> {
        if !matches!(self.batch, BatchState::Transaction) {
            return Err(Error::BatchState("discard requires an open transaction"));
        }
        self.batch = BatchState::Idle;
        reply_to_result(self.round_trip(&Command::new("DISCARD", Vec::new()), false)?)
    }

    // ---- typed convenience wrappers ---------------------------------------

    /// Fetches a value by key. `Ok(None)` when the key is missing.
    pub fn get(&mut self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        match self.call("GET", [key])? {
            Reply::Bulk(data) => Ok(Some(data)),
            Reply::Null => Ok(None),
            _ => Err(Error::UnexpectedReply("GET returned neither bulk nor null")),
        }
    }

    /// Sets a value for a key without expiration.
    pub fn set(&mut self, key: &[u8], value: &[u8]) -> Result<()> {
        let reply = self.call("SET", [key, value])?;
        if reply.is_ok() {
            Ok(())
        } else {
            Err(Error::UnexpectedReply("SET did not return OK"))
        }
    }

    /// Deletes a key. Returns true when a key was removed.
    pub fn del(&mut self, key: &[u8]) -> Result<bool> {
        match self.call("DEL", [key])? {
            Reply::Integer(count) => Ok(count > 0),
            _ => Err(Error::UnexpectedReply("DEL did not return an integer")),
        }
    }

    /// Increments the integer value of a key, returning the new value.
    pub fn incr(&mut self, key: &[u8]) -> Result<i64> {
        match self.call("INCR", [key])? {
            Reply::Integer(value) => Ok(value),
            _ => Err(Error::UnexpectedReply("INCR did not return an integer")),
        }
    }

    /// Sets a time-to-live on a key. Returns true when the TTL was set.
    pub fn expire(&mut self, key: &[u8], ttl: Duration) -> Result<bool> {
        let seconds = CommandArg::from(ttl.as_secs());
        match self.call("EXPIRE", [CommandArg::from(key), seconds])? {
            Reply::Integer(value) => Ok(value == 1),
            _ => Err(Error::UnexpectedReply("EXPIRE did not return an integer")),
        }
    }

    /// Returns TTL status for a key.
    pub fn ttl(&mut self, key: &[u8]) -> Result<Ttl> {
        match self.call("TTL", [key])? {
            Reply::Integer(-2) => Ok(Ttl::Missing),
            Reply::Integer(-1) => Ok(Ttl::NoExpiry),
            Reply::Integer(value) if value >= 0 => Ok(Ttl::ExpiresIn(Duration::from_secs(value as u64))),
            _ => Err(Error::UnexpectedReply("TTL did not return a known integer")),
        }
    }

    /// Pings the server, returning the raw payload.
    pub fn ping(&mut self, payload: Option<&[u8]>) -> Result<Vec<u8>> {
        let reply = match payload {
            Some(data) => self.call("PING", [data])?,
            None => self.call("PING", Vec::<CommandArg>::new())?,
        };
        match reply {
            Reply::Simple(text) => Ok(text.into_bytes()),
            Reply::Bulk(data) => Ok(data),
            _ => Err(Error::UnexpectedReply("PING returned neither simple nor bulk")),
        }
    }

    // ---- codec-aware accessors --------------------------------------------

    /// Stores a structured value, encoding it through the configured codec
    /// when `SET` is in the codec write set.
    pub fn set_value<T: Serialize>(&mut self, key: &[u8], value: &T) -> Result<()> {
        let value = serde_json::to_value(value)?;
        let reply = self.call("SET", [CommandArg::from(key), CommandArg::from(value)])?;
        if reply.is_ok() {
            Ok(())
        } else {
            Err(Error::UnexpectedReply("SET did not return OK"))
        }
    }

    /// Fetches a structured value.
    ///
    /// When a codec is configured and `GET` is in the read set, the payload
    /// is decoded best-effort: a payload not valid in the codec's format
    /// comes back unchanged as a string value, never as an error.
    pub fn get_value(&mut self, key: &[u8]) -> Result<Option<Value>> {
        match self.call("GET", [key])? {
            Reply::Bulk(raw) => Ok(Some(self.decode_payload("GET", raw))),
            Reply::Null => Ok(None),
            _ => Err(Error::UnexpectedReply("GET returned neither bulk nor null")),
        }
    }

    /// Fetches a structured hash field, with the same best-effort decoding
    /// as [`get_value`](RedisClient::get_value).
    pub fn hget_value(&mut self, key: &[u8], field: &[u8]) -> Result<Option<Value>> {
        match self.call("HGET", [key, field])? {
            Reply::Bulk(raw) => Ok(Some(self.decode_payload("HGET", raw))),
            Reply::Null => Ok(None),
            _ => Err(Error::UnexpectedReply("HGET returned neither bulk nor null")),
        }
    }

    // ---- dispatch ---------------------------------------------------------

    fn build_command<I>(&self, name: &str, args: I) -> Command
    where
        I: IntoIterator,
        I::Item: Into<CommandArg>,
    {
        let upper = name.to_ascii_uppercase();
        let encode_structured = self.config.encodes_command(upper.as_bytes());
        let parts = args
            .into_iter()
            .map(|arg| match arg.into() {
                CommandArg::Bytes(bytes) => bytes,
                CommandArg::Structured(value) => match (&self.config.codec, encode_structured) {
                    (Some(codec), true) => codec.encode(&value),
                    // Outside the codec's scope a structured argument is
                    // stringified as plain JSON text.
                    _ => serde_json::to_vec(&value).unwrap_or_default(),
                },
            })
            .collect();
        Command::new(&upper, parts)
    }

    fn dispatch(&mut self, command: Command) -> Result<Reply> {
        if let BatchState::Pipeline { .. } = self.batch {
            self.send_only(&command)?;
            if let BatchState::Pipeline { pending } = &mut self.batch {
                pending.push(command);
            }
            return Ok(Reply::Null);
        }

        let retry_send = self.config.auto_reconnect && matches!(self.batch, BatchState::Idle);
        reply_to_result(self.round_trip(&command, retry_send)?)
    }

    /// Writes the command on the pooled connection without reading a reply.
    /// Used while pipelining, where a reconnect retry would orphan the
    /// replies already owed, so send failures are fatal here.
    fn send_only(&self, command: &Command) -> Result<()> {
        let slot = self.pool.acquire(&self.endpoint, &self.config)?;
        let mut guard = lock_slot(&slot);
        live_connection(&mut guard)?.send(command)
    }

    /// One full send/receive round trip, holding the connection lock across
    /// the pair so replies cannot be misattributed between pool sharers.
    fn round_trip(&self, command: &Command, retry_send: bool) -> Result<Reply> {
        let slot = self.pool.acquire(&self.endpoint, &self.config)?;
        let mut guard = lock_slot(&slot);
        let conn = live_connection(&mut guard)?;

        match conn.send(command) {
            Ok(()) => return conn.receive(),
            Err(err) if retry_send && err.is_io() => {
                warn!(endpoint = %self.endpoint, error = %err, "send failed, reconnecting once");
            }
            Err(err) => return Err(err),
        }
        drop(guard);

        // Evict the broken connection; acquire opens and handshakes a fresh
        // one. A second send failure is fatal.
        self.pool.evict(&self.endpoint);
        let slot = self.pool.acquire(&self.endpoint, &self.config)?;
        let mut guard = lock_slot(&slot);
        let conn = live_connection(&mut guard)?;
        conn.send(command)?;
        debug!(endpoint = %self.endpoint, "send retried on fresh connection");
        conn.receive()
    }

    fn decode_payload(&self, command: &str, raw: Vec<u8>) -> Value {
        if self.config.decodes_command(command.as_bytes()) {
            if let Some(codec) = &self.config.codec {
                if let Some(value) = codec.decode(&raw) {
                    return value;
                }
            }
        }
        Value::String(String::from_utf8_lossy(&raw).into_owned())
    }
}

impl Drop for RedisClient {
    fn drop(&mut self) {
        self.close();
    }
}

fn lock_slot(slot: &Slot) -> MutexGuard<'_, Option<Connection>> {
    slot.lock().expect("pool slot mutex poisoned")
}

fn live_connection<'a>(
    guard: &'a mut MutexGuard<'_, Option<Connection>>,
) -> Result<&'a mut Connection> {
    guard.as_mut().ok_or_else(|| {
        Error::Io(io::Error::new(
            io::ErrorKind::NotConnected,
            "pooled connection evicted while in use",
        ))
    })
}

/// Converts a top-level error reply into a typed command error and passes
/// every other reply through.
fn reply_to_result(reply: Reply) -> Result<Reply> {
    match reply {
        Reply::Error(message) => Err(Error::Command(message)),
        other => Ok(other),
    }
}
