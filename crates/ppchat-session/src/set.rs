//! The live connection set: every connection an application currently has.
//!
//! Spawning a connection adds it here; its receive loop removes it once the
//! close notification has run. Everything else (broadcasts, shutdown,
//! console listings) reads from it.
//!
//! # Concurrency note
//!
//! Receive loops, handlers and the accept loop all touch the set at the
//! same time, so it sits behind a `std::sync::Mutex`. The lock is only held
//! for map operations, never across an `.await`: iteration goes through
//! [`snapshot`](ConnectionSet::snapshot) and
//! [`other_than`](ConnectionSet::other_than), which clone the handles out
//! first.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use ppchat_protocol::PacketSet;
use ppchat_transport::ConnectionId;

use crate::Connection;

/// Thread-safe map of live connections, keyed by [`ConnectionId`].
pub struct ConnectionSet<Out> {
    connections: Mutex<HashMap<ConnectionId, Arc<Connection<Out>>>>,
}

impl<Out: PacketSet> ConnectionSet<Out> {
    /// Creates an empty set.
    pub fn new() -> Self {
        Self {
            connections: Mutex::new(HashMap::new()),
        }
    }

    /// Adds a connection. Returns `false` if its ID was already present,
    /// in which case the set is unchanged.
    pub fn add(&self, conn: Arc<Connection<Out>>) -> bool {
        let id = conn.id();
        let mut connections = self.lock();
        if connections.contains_key(&id) {
            return false;
        }
        connections.insert(id, conn);
        tracing::debug!(conn_id = %id, live = connections.len(), "connection added");
        true
    }

    /// Removes a connection. Removing an absent ID is a no-op.
    pub fn remove(&self, id: ConnectionId) -> Option<Arc<Connection<Out>>> {
        let mut connections = self.lock();
        let removed = connections.remove(&id);
        if removed.is_some() {
            tracing::debug!(conn_id = %id, live = connections.len(), "connection removed");
        }
        removed
    }

    pub fn get(&self, id: ConnectionId) -> Option<Arc<Connection<Out>>> {
        self.lock().get(&id).cloned()
    }

    pub fn contains(&self, id: ConnectionId) -> bool {
        self.lock().contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Clones out every live connection, ordered by ID (oldest first).
    pub fn snapshot(&self) -> Vec<Arc<Connection<Out>>> {
        let mut all: Vec<_> = self.lock().values().cloned().collect();
        all.sort_by_key(|conn| conn.id());
        all
    }

    /// Every live connection except `id`, ordered by ID.
    ///
    /// This is the broadcast audience for a packet that arrived on `id`.
    pub fn other_than(&self, id: ConnectionId) -> Vec<Arc<Connection<Out>>> {
        let mut others: Vec<_> = self
            .lock()
            .values()
            .filter(|conn| conn.id() != id)
            .cloned()
            .collect();
        others.sort_by_key(|conn| conn.id());
        others
    }

    /// Closes every live connection with `reason` and waits for all of them
    /// to finish closing.
    ///
    /// Connections that are already closing are waited on as well. Must not
    /// be awaited from inside a packet handler: the handler's own receive
    /// loop would never get to finish its close.
    pub async fn close_all(&self, reason: &str) {
        let connections = self.snapshot();
        for conn in &connections {
            conn.close(reason).await;
        }
        for conn in &connections {
            conn.closed().await;
        }
        tracing::info!(count = connections.len(), %reason, "closed all connections");
    }

    /// Locks the map. A panic elsewhere can't leave the map itself in a
    /// bad state, so a poisoned lock is simply taken over.
    fn lock(&self) -> MutexGuard<'_, HashMap<ConnectionId, Arc<Connection<Out>>>> {
        self.connections
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

impl<Out: PacketSet> Default for ConnectionSet<Out> {
    fn default() -> Self {
        Self::new()
    }
}

impl<Out> std::fmt::Debug for ConnectionSet<Out> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let live = self
            .connections
            .lock()
            .map(|connections| connections.len())
            .unwrap_or_default();
        f.debug_struct("ConnectionSet").field("live", &live).finish()
    }
}

// =========================================================================
// Tests
// =========================================================================
