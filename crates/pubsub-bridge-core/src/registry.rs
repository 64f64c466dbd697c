//! Registry of live client connections.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use bytes::Bytes;
use parking_lot::Mutex;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::sink::ClientSink;

/// Identifier handed out by [`ConnectionRegistry::register`].
pub type ConnectionId = String;

/// Outcome of a single [`ConnectionRegistry::broadcast`] call.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct BroadcastReport {
    /// Connections the message was queued for.
    pub delivered: usize,
    /// Connections whose delivery failed; they are no longer registered.
    pub evicted: Vec<ConnectionId>,
}

/// The authoritative set of live connections.
///
/// One mutex guards the map. It is held only while the map is read or
/// written, never across I/O: broadcasting hands frames to each
/// connection's non-blocking [`ClientSink`] under the lock, remembers which
/// ones failed, and removes those only after the lock has been released.
pub struct ConnectionRegistry {
    connections: Mutex<HashMap<ConnectionId, Box<dyn ClientSink>>>,
    registered: AtomicU64,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self {
            connections: Mutex::new(HashMap::new()),
            registered: AtomicU64::new(0),
        }
    }

    /// Take ownership of a connection and return its fresh identifier.
    pub fn register(&self, sink: Box<dyn ClientSink>) -> ConnectionId {
        let mut conns = self.connections.lock();
        let id = loop {
            let candidate = Uuid::new_v4().to_string();
            if !conns.contains_key(&candidate) {
                break candidate;
            }
        };
        conns.insert(id.clone(), sink);
        let total = conns.len();
        drop(conns);

        self.registered.fetch_add(1, Ordering::Relaxed);
        debug!(conn_id = %id, connections = total, "connection registered");
        id
    }

    /// Close and remove a connection.
    ///
    /// Returns whether the id was registered; unknown ids are ignored.
    pub fn deregister(&self, id: &str) -> bool {
        let removed = self.connections.lock().remove(id);
        match removed {
            Some(sink) => {
                sink.close();
                debug!(conn_id = %id, "connection deregistered");
                true
            }
            None => false,
        }
    }

    /// Deliver `payload` to every registered connection.
    ///
    /// A connection that cannot take the message is treated as dead: it is
    /// closed and removed before this call returns, and delivery to the
    /// other connections carries on.
    pub fn broadcast(&self, payload: &Bytes) -> BroadcastReport {
        let mut report = BroadcastReport::default();
        {
            let conns = self.connections.lock();
            for (id, sink) in conns.iter() {
                match sink.try_deliver(payload) {
                    Ok(()) => report.delivered += 1,
                    Err(e) => {
                        warn!(
                            conn_id = %id,
                            size = payload.len(),
                            error = %e,
                            "Error writing to connection, closing and removing it"
                        );
                        report.evicted.push(id.clone());
                    }
                }
            }
        }

        for id in &report.evicted {
            self.deregister(id);
        }
        report
    }

    /// Close and remove every connection.
    pub fn close_all(&self) -> usize {
        let drained: Vec<_> = self.connections.lock().drain().collect();
        let count = drained.len();
        for (_, sink) in drained {
            sink.close();
        }
        count
    }

    pub fn len(&self) -> usize {
        self.connections.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.connections.lock().is_empty()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.connections.lock().contains_key(id)
    }

    pub fn ids(&self) -> Vec<ConnectionId> {
        self.connections.lock().keys().cloned().collect()
    }

    /// Connections registered over the registry's lifetime. Reported by
    /// the health endpoint.
    pub fn total_registered(&self) -> u64 {
        self.registered.load(Ordering::Relaxed)
    }
}

impl Default for ConnectionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
#[path = "registry_tests.rs"]
mod tests;
