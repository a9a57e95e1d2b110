//! Connection tracking for the shared listener.
//!
//! Every accepted TCP connection registers here and receives a
//! [`ConnectionGuard`]; dropping the guard (when the connection's last
//! request handle goes away) removes the entry.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use dashmap::DashMap;
use tracing::debug;

use crate::observability::metrics::OPEN_CONNECTIONS;

/// Unique identifier for a connection, assigned by the registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(pub u64);

/// What the registry knows about one live connection.
#[derive(Debug)]
pub struct ConnectionInfo {
    pub id: ConnectionId,
    pub peer: SocketAddr,
    pub connected_at: Instant,
    requests: AtomicU64,
}

impl ConnectionInfo {
    /// Number of requests served on this connection so far.
    #[must_use]
    pub fn request_count(&self) -> u64 {
        self.requests.load(Ordering::Relaxed)
    }
}

/// Thread-safe registry of all open connections.
///
/// Uses `DashMap` so accept and close never contend on a global lock.
#[derive(Debug)]
pub struct ConnectionRegistry {
    connections: DashMap<ConnectionId, Arc<ConnectionInfo>>,
    next_id: AtomicU64,
}

impl ConnectionRegistry {
    /// Creates a new empty registry.
    ///
    /// Connection IDs start at 1.
    #[must_use]
    pub fn new() -> Self {
        Self {
            connections: DashMap::new(),
            next_id: AtomicU64::new(1),
        }
    }

    /// Registers a newly accepted connection from `peer`.
    #[must_use]
    pub fn register(self: &Arc<Self>, peer: SocketAddr) -> ConnectionGuard {
        let id = ConnectionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let info = Arc::new(ConnectionInfo {
            id,
            peer,
            connected_at: Instant::now(),
            requests: AtomicU64::new(0),
        });
        self.connections.insert(id, Arc::clone(&info));
        metrics::gauge!(OPEN_CONNECTIONS).increment(1.0);
        debug!(connection_id = id.0, %peer, open = self.count(), "connection opened");
        ConnectionGuard {
            info,
            registry: Arc::clone(self),
        }
    }

    /// Looks up a connection by ID.
    pub fn get(&self, id: ConnectionId) -> Option<Arc<ConnectionInfo>> {
        self.connections.get(&id).map(|r| Arc::clone(r.value()))
    }

    /// Returns the total number of open connections.
    #[must_use]
    pub fn count(&self) -> usize {
        self.connections.len()
    }

    /// Returns all open connections as a collected `Vec`.
    #[must_use]
    pub fn connections(&self) -> Vec<Arc<ConnectionInfo>> {
        self.connections
            .iter()
            .map(|entry| Arc::clone(entry.value()))
            .collect()
    }

    fn release(&self, id: ConnectionId) {
        if let Some((_, info)) = self.connections.remove(&id) {
            metrics::gauge!(OPEN_CONNECTIONS).decrement(1.0);
            let lifetime = info.connected_at.elapsed();
            debug!(
                connection_id = id.0,
                peer = %info.peer,
                requests = info.request_count(),
                lifetime_ms = u64::try_from(lifetime.as_millis()).unwrap_or(u64::MAX),
                "connection closed"
            );
        }
    }
}

impl Default for ConnectionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Registration of one connection; removes it from the registry on drop.
#[derive(Debug)]
pub struct ConnectionGuard {
    info: Arc<ConnectionInfo>,
    registry: Arc<ConnectionRegistry>,
}

impl ConnectionGuard {
    #[must_use]
    pub fn id(&self) -> ConnectionId {
        self.info.id
    }

    #[must_use]
    pub fn peer(&self) -> SocketAddr {
        self.info.peer
    }

    /// Counts one more request served on this connection.
    pub fn record_request(&self) {
        self.info.requests.fetch_add(1, Ordering::Relaxed);
    }
}

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        self.registry.release(self.info.id);
    }
}
