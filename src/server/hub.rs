//! Client Registry
//!
//! Tracks every connected dashboard and fans each snapshot out to all of
//! them. Each client owns a single-slot `watch` channel holding the latest
//! payload: a client that falls behind skips straight to the newest snapshot
//! instead of draining stale ones.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::watch;

use crate::error::Result;
use crate::telemetry::Snapshot;

/// Unique identifier for a connected client
pub type ClientId = u64;

/// Serialized message shared by every recipient of one broadcast
pub type Payload = Arc<str>;

/// Receiving end of a client's latest-payload slot (`None` until the first broadcast)
pub type ClientSlot = watch::Receiver<Option<Payload>>;

/// Outcome of one broadcast pass
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BroadcastReport {
    /// Clients whose slot now holds the payload
    pub delivered: usize,
    /// Clients found closed and removed during this pass
    pub removed: usize,
}

/// Set of connected clients
#[derive(Debug)]
pub struct ClientRegistry {
    clients: Mutex<HashMap<ClientId, watch::Sender<Option<Payload>>>>,
    next_id: AtomicU64,
}

impl ClientRegistry {
    pub fn new() -> Self {
        Self {
            clients: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(1),
        }
    }

    /// Register a new client and return its id and payload slot
    ///
    /// Dropping the client from the registry drops the only sender, which
    /// closes the slot and with it the client's session.
    pub fn register(&self) -> (ClientId, ClientSlot) {
        let (tx, rx) = watch::channel(None);
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.lock().insert(id, tx);
        tracing::info!(client_id = id, clients = self.len(), "Client registered");
        (id, rx)
    }

    /// Remove a client; returns false if it was already gone
    pub fn unregister(&self, id: ClientId) -> bool {
        let removed = self.lock().remove(&id).is_some();
        if removed {
            tracing::info!(client_id = id, clients = self.len(), "Client unregistered");
        }
        removed
    }

    /// Remove every client, ending all sessions
    pub fn close_all(&self) -> usize {
        let mut clients = self.lock();
        let count = clients.len();
        clients.clear();
        count
    }

    pub fn contains(&self, id: ClientId) -> bool {
        self.lock().contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Serialize `snapshot` once and push it to every client
    pub fn broadcast_snapshot(&self, snapshot: &Snapshot) -> Result<BroadcastReport> {
        let payload: Payload = serde_json::to_string(snapshot)?.into();
        Ok(self.broadcast(payload))
    }

    /// Push a pre-serialized payload to every client
    ///
    /// The payload replaces whatever a client has not yet sent. Clients whose
    /// receiving end is gone are removed in the same pass.
    pub fn broadcast(&self, payload: Payload) -> BroadcastReport {
        let mut report = BroadcastReport::default();
        let mut clients = self.lock();

        clients.retain(|&id, slot| match slot.send(Some(Arc::clone(&payload))) {
            Ok(()) => {
                report.delivered += 1;
                true
            }
            Err(_) => {
                tracing::debug!(client_id = id, "Client gone, removing");
                report.removed += 1;
                false
            }
        });

        drop(clients);
        if report.delivered > 0 {
            tracing::trace!(clients = report.delivered, "Broadcast snapshot");
        }
        report
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<ClientId, watch::Sender<Option<Payload>>>> {
        self.clients.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for ClientRegistry {
    fn default() -> Self {
        Self::new()
    }
}
