//! Registry of currently connected clients.
//!
//! The registry maps each open connection's [`ClientId`] to its
//! [`ClientHandle`]. It is pure bookkeeping: no frames are written here, the
//! handle only owns the sending half of the client's outbound queue.
//!
//! # Thread Safety
//!
//! [`ConnectionRegistry`] uses interior mutability with [`RwLock`]. Every
//! operation takes the lock for the duration of one map access and never
//! across an `.await`, so [`ConnectionRegistry::snapshot`] always observes a
//! complete membership.
//!
//! # Example
//!
//! ```rust
//! use relay_server::registry::{ClientHandle, ConnectionRegistry};
//! use relay_server::types::ClientId;
//! use tokio::sync::mpsc;
//!
//! let registry = ConnectionRegistry::new();
//! let (tx, _rx) = mpsc::channel(16);
//! let id = ClientId::new();
//!
//! registry.register(ClientHandle::new(id, tx)).expect("id is unique");
//! assert_eq!(registry.len(), 1);
//!
//! registry.deregister(&id);
//! registry.deregister(&id); // already gone, no-op
//! assert!(registry.is_empty());
//! ```

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, trace};

use crate::types::{ClientId, Envelope};

/// Sending half of a client's outbound queue.
pub type Outbound = mpsc::Sender<Arc<Envelope>>;

/// Receiving half of a client's outbound queue, drained by the writer task.
pub type OutboundReceiver = mpsc::Receiver<Arc<Envelope>>;

/// Errors returned by registry mutations.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RegistryError {
    /// A handle with the same identifier is already registered.
    #[error("client {0} is already registered")]
    DuplicateClient(ClientId),
}

/// Errors returned when pushing a message to a single client.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum SendError {
    /// The client's writer has gone away; the connection is closing.
    #[error("client {0} is no longer connected")]
    Closed(ClientId),

    /// The client's outbound queue is full; the message was dropped for it.
    #[error("outbound queue for client {0} is full")]
    Full(ClientId),
}

/// In-memory representative of one open connection.
///
/// Cloning a handle is cheap; clones share the same outbound queue and the
/// same dropped-message counter.
#[derive(Debug, Clone)]
pub struct ClientHandle {
    id: ClientId,
    outbound: Outbound,
    dropped: Arc<AtomicU64>,
}

impl ClientHandle {
    /// Creates a handle for `id` that delivers into `outbound`.
    #[must_use]
    pub fn new(id: ClientId, outbound: Outbound) -> Self {
        Self {
            id,
            outbound,
            dropped: Arc::new(AtomicU64::new(0)),
        }
    }

    /// The connection's identifier.
    #[must_use]
    pub fn id(&self) -> ClientId {
        self.id
    }

    /// Queues a message for this client without waiting.
    ///
    /// # Errors
    ///
    /// Returns [`SendError::Closed`] if the client's writer has shut down and
    /// [`SendError::Full`] if its queue has no free capacity. A full queue
    /// counts towards [`ClientHandle::dropped`].
    pub fn send(&self, envelope: Arc<Envelope>) -> Result<(), SendError> {
        self.outbound.try_send(envelope).map_err(|err| match err {
            mpsc::error::TrySendError::Closed(_) => SendError::Closed(self.id),
            mpsc::error::TrySendError::Full(_) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                SendError::Full(self.id)
            }
        })
    }

    /// Number of messages dropped for this client because its queue was full.
    #[must_use]
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

/// Thread-safe set of open connections keyed by [`ClientId`].
#[derive(Debug, Default)]
pub struct ConnectionRegistry {
    clients: RwLock<HashMap<ClientId, ClientHandle>>,
}

impl ConnectionRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        debug!("Creating connection registry");
        Self::default()
    }

    /// Adds a handle to the registry.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::DuplicateClient`] if a handle with the same
    /// identifier is already present. The existing entry is left untouched.
    pub fn register(&self, handle: ClientHandle) -> Result<(), RegistryError> {
        let id = handle.id();
        let mut clients = self.write();
        if clients.contains_key(&id) {
            return Err(RegistryError::DuplicateClient(id));
        }
        clients.insert(id, handle);
        trace!(client_id = %id, connected = clients.len(), "Client registered");
        Ok(())
    }

    /// Removes the handle for `id`, returning it if it was present.
    ///
    /// Removing an identifier that is not registered is a no-op; disconnects
    /// may be reported more than once.
    pub fn deregister(&self, id: &ClientId) -> Option<ClientHandle> {
        let mut clients = self.write();
        let removed = clients.remove(id);
        match removed {
            Some(_) => trace!(client_id = %id, connected = clients.len(), "Client deregistered"),
            None => trace!(client_id = %id, "Deregister of unknown client ignored"),
        }
        removed
    }

    /// Returns a point-in-time copy of every registered handle.
    #[must_use]
    pub fn snapshot(&self) -> Vec<ClientHandle> {
        self.read().values().cloned().collect()
    }

    /// Returns `true` if a handle for `id` is registered.
    #[must_use]
    pub fn contains(&self, id: &ClientId) -> bool {
        self.read().contains_key(id)
    }

    /// Number of registered handles.
    #[must_use]
    pub fn len(&self) -> usize {
        self.read().len()
    }

    /// Returns `true` if no client is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    /// Drops every handle, closing all outbound queues.
    ///
    /// Returns how many handles were removed.
    pub fn clear(&self) -> usize {
        let removed = {
            let mut clients = self.write();
            let count = clients.len();
            clients.clear();
            count
        };
        debug!(removed, "Connection registry cleared");
        removed
    }

    // No operation leaves the map half-updated, so a poisoned lock is safe
    // to keep using.
    fn read(&self) -> RwLockReadGuard<'_, HashMap<ClientId, ClientHandle>> {
        self.clients
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<ClientId, ClientHandle>> {
        self.clients
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
