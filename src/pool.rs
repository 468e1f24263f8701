//! # Connection Pool
//!
//! Purpose: Share at most one live connection per endpoint between clients,
//! and replace broken entries transparently on the next acquisition.
//!
//! ## Design Principles
//! 1. **Per-Endpoint Slots**: Each endpoint key owns one slot; the slot mutex
//!    serializes handshakes and send/receive pairs for that endpoint while
//!    distinct endpoints proceed independently.
//! 2. **Minimal Locking**: The registry mutex is held only to look up or
//!    insert a slot, never across connect or handshake.
//! 3. **No Implicit Teardown**: Entries live until explicitly evicted or
//!    replaced after a detected break.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tracing::debug;

use crate::config::{ClientConfig, Endpoint};
use crate::connection::Connection;
use crate::error::Result;

/// Shared per-endpoint connection slot.
///
/// `None` means no live connection; the slot itself persists so its mutex
/// keeps serializing access for that endpoint.
pub type Slot = Arc<Mutex<Option<Connection>>>;

/// Registry of shared connections, keyed by endpoint.
///
/// Cheap to clone; clones share the same registry.
#[derive(Debug, Clone, Default)]
pub struct ConnectionPool {
    inner: Arc<PoolInner>,
}

#[derive(Debug, Default)]
struct PoolInner {
    slots: Mutex<HashMap<Endpoint, Slot>>,
}

impl ConnectionPool {
    /// Creates an empty pool.
    pub fn new() -> Self {
        ConnectionPool::default()
    }

    /// Returns the endpoint's slot with a healthy connection established.
    ///
    /// Reuses the existing connection when present and healthy; otherwise
    /// closes any broken remnant and opens plus handshakes a fresh one before
    /// returning. At most one handshake is in flight per endpoint because the
    /// slot mutex is held across it.
    pub fn acquire(&self, endpoint: &Endpoint, config: &ClientConfig) -> Result<Slot> {
        let slot = self.slot(endpoint);
        {
            let mut conn = slot.lock().expect("pool slot mutex poisoned");
            let reusable = conn.as_ref().is_some_and(Connection::is_healthy);
            if !reusable {
                if let Some(mut broken) = conn.take() {
                    broken.close();
                    debug!(endpoint = %endpoint, "replacing broken pooled connection");
                }
                *conn = Some(Connection::establish(endpoint, config)?);
            }
        }
        Ok(slot)
    }

    /// Closes and removes the endpoint's connection, if any. Idempotent.
    pub fn evict(&self, endpoint: &Endpoint) {
        let slot = {
            let slots = self.inner.slots.lock().expect("pool registry mutex poisoned");
            slots.get(endpoint).cloned()
        };
        if let Some(slot) = slot {
            let mut conn = slot.lock().expect("pool slot mutex poisoned");
            if let Some(mut live) = conn.take() {
                live.close();
                debug!(endpoint = %endpoint, "evicted pooled connection");
            }
        }
    }

    fn slot(&self, endpoint: &Endpoint) -> Slot {
        let mut slots = self.inner.slots.lock().expect("pool registry mutex poisoned");
        slots.entry(endpoint.clone()).or_default().clone()
    }
}
