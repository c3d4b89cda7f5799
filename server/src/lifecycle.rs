//! Per-connection lifecycle for the relay server.
//!
//! Every WebSocket connection moves through a fixed set of states:
//!
//! ```text
//! Connecting --open()--> Open --close()--> Closed
//!      |                  ^  |
//!      |                  |  on_message()
//!      |                  +--+
//!      +------close()----------------------> Closed
//! ```
//!
//! The transport task owns one [`Connection`] and drives it with the events it
//! observes. Registration happens on `open`, deregistration on `close`, and
//! each inbound message while `Open` is handed to the [`Broadcaster`]. Events
//! that arrive in any other state are ignored.
//!
//! # Example
//!
//! ```rust
//! use relay_server::lifecycle::{ConnectionState, LifecycleManager};
//! use relay_server::types::ClientId;
//! use tokio::sync::mpsc;
//!
//! let manager = LifecycleManager::default();
//! let (tx, mut rx) = mpsc::channel(16);
//!
//! let mut connection = manager.accept(ClientId::new());
//! connection.open(tx).expect("fresh id");
//! assert_eq!(connection.state(), ConnectionState::Open);
//!
//! connection.on_message("hi");
//! assert!(rx.try_recv().is_ok());
//!
//! connection.close();
//! connection.close(); // no-op
//! assert_eq!(manager.connected(), 0);
//! ```

use std::fmt;
use std::sync::Arc;

use thiserror::Error;
use tracing::{info, trace, warn};

use crate::broadcast::{BroadcastReport, Broadcaster};
use crate::registry::{ClientHandle, ConnectionRegistry, Outbound, RegistryError};
use crate::types::{ClientId, Envelope, Payload};

/// Lifecycle state of a single connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Upgrade accepted, not yet registered.
    Connecting,

    /// Registered and relaying messages.
    Open,

    /// Deregistered. Terminal.
    Closed,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Connecting => "connecting",
            Self::Open => "open",
            Self::Closed => "closed",
        };
        f.write_str(name)
    }
}

/// Errors raised by lifecycle transitions.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LifecycleError {
    /// `open` was called on a connection that is not `Connecting`.
    #[error("cannot open client {id} in state {state}")]
    InvalidTransition {
        /// The connection's identifier.
        id: ClientId,
        /// The state the connection was in.
        state: ConnectionState,
    },

    /// The registry refused the connection.
    #[error(transparent)]
    Registry(#[from] RegistryError),
}

/// Wires connections to the shared registry and broadcaster.
///
/// `LifecycleManager` is cheap to clone and is stored in the router state.
#[derive(Debug, Clone)]
pub struct LifecycleManager {
    broadcaster: Broadcaster,
}

impl LifecycleManager {
    /// Creates a manager over `registry`.
    #[must_use]
    pub fn new(registry: Arc<ConnectionRegistry>) -> Self {
        Self {
            broadcaster: Broadcaster::new(registry),
        }
    }

    /// Starts tracking a connection that has completed its handshake.
    ///
    /// The returned connection is `Connecting`; call [`Connection::open`] to
    /// register it.
    #[must_use]
    pub fn accept(&self, id: ClientId) -> Connection {
        trace!(client_id = %id, "Connection accepted");
        Connection {
            id,
            state: ConnectionState::Connecting,
            broadcaster: self.broadcaster.clone(),
        }
    }

    /// The shared connection registry.
    #[must_use]
    pub fn registry(&self) -> &Arc<ConnectionRegistry> {
        self.broadcaster.registry()
    }

    /// Number of currently open connections.
    #[must_use]
    pub fn connected(&self) -> usize {
        self.registry().len()
    }
}

impl Default for LifecycleManager {
    fn default() -> Self {
        Self::new(Arc::new(ConnectionRegistry::new()))
    }
}

/// State machine for one connection.
///
/// Dropping a connection that is still `Open` closes it, so a transport task
/// that ends early never leaves a stale registry entry behind.
#[derive(Debug)]
pub struct Connection {
    id: ClientId,
    state: ConnectionState,
    broadcaster: Broadcaster,
}

impl Connection {
    /// The connection's identifier.
    #[must_use]
    pub fn id(&self) -> ClientId {
        self.id
    }

    /// The current lifecycle state.
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// `Connecting -> Open`: registers the client with `outbound` as its
    /// send capability.
    ///
    /// # Errors
    ///
    /// Returns [`LifecycleError::InvalidTransition`] if the connection is not
    /// `Connecting`, and [`LifecycleError::Registry`] if the registry rejects
    /// the identifier. A rejected connection moves to `Closed`.
    pub fn open(&mut self, outbound: Outbound) -> Result<(), LifecycleError> {
        if self.state != ConnectionState::Connecting {
            return Err(LifecycleError::InvalidTransition {
                id: self.id,
                state: self.state,
            });
        }

        let registry = self.broadcaster.registry();
        if let Err(err) = registry.register(ClientHandle::new(self.id, outbound)) {
            warn!(client_id = %self.id, error = %err, "Client registration rejected");
            self.state = ConnectionState::Closed;
            return Err(err.into());
        }

        self.state = ConnectionState::Open;
        info!(client_id = %self.id, connected = registry.len(), "Client connected");
        Ok(())
    }

    /// Relays an inbound message to every connected client.
    ///
    /// Returns `None` without broadcasting if the connection is not `Open`.
    pub fn on_message(&self, payload: impl Into<Payload>) -> Option<BroadcastReport> {
        let payload = payload.into();
        if self.state != ConnectionState::Open {
            trace!(
                client_id = %self.id,
                state = %self.state,
                kind = payload.kind(),
                "Ignoring message outside open state"
            );
            return None;
        }

        Some(self.broadcaster.broadcast(Envelope::new(self.id, payload)))
    }

    /// Moves the connection to `Closed`, deregistering it if it was open.
    ///
    /// Closing an already closed connection does nothing.
    pub fn close(&mut self) {
        match self.state {
            ConnectionState::Closed => {
                trace!(client_id = %self.id, "Duplicate disconnect ignored");
            }
            ConnectionState::Connecting => {
                self.state = ConnectionState::Closed;
                trace!(client_id = %self.id, "Connection abandoned before open");
            }
            ConnectionState::Open => {
                self.state = ConnectionState::Closed;
                let registry = self.broadcaster.registry();
                registry.deregister(&self.id);
                info!(client_id = %self.id, connected = registry.len(), "Client disconnected");
            }
        }
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        if self.state == ConnectionState::Open {
            self.close();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::OutboundReceiver;
    use tokio::sync::mpsc;

    fn open_client(manager: &LifecycleManager) -> (Connection, OutboundReceiver) {
        let (tx, rx) = mpsc::channel(8);
        let mut connection = manager.accept(ClientId::new());
        connection.open(tx).unwrap();
        (connection, rx)
    }

    fn text(rx: &mut OutboundReceiver) -> Option<String> {
        match rx.try_recv().ok()?.payload.clone() {
            Payload::Text(text) => Some(text.as_str().to_owned()),
            Payload::Binary(_) => None,
        }
    }

    #[test]
    fn accept_starts_connecting() {
        let manager = LifecycleManager::default();
        let connection = manager.accept(ClientId::new());
        assert_eq!(connection.state(), ConnectionState::Connecting);
        assert_eq!(manager.connected(), 0);
    }

    #[test]
    fn open_registers_client() {
        let manager = LifecycleManager::default();
        let (connection, _rx) = open_client(&manager);

        assert_eq!(connection.state(), ConnectionState::Open);
        assert!(manager.registry().contains(&connection.id()));
    }

    #[test]
    fn open_twice_is_rejected() {
        let manager = LifecycleManager::default();
        let (mut connection, _rx) = open_client(&manager);
        let (tx, _rx2) = mpsc::channel(8);

        let err = connection.open(tx).unwrap_err();
        assert_eq!(
            err,
            LifecycleError::InvalidTransition {
                id: connection.id(),
                state: ConnectionState::Open,
            }
        );
        assert_eq!(connection.state(), ConnectionState::Open);
        assert_eq!(manager.connected(), 1);
    }

    #[test]
    fn duplicate_id_closes_new_connection() {
        let manager = LifecycleManager::default();
        let (existing, _rx) = open_client(&manager);

        let mut duplicate = manager.accept(existing.id());
        let (tx, _rx2) = mpsc::channel(8);
        let err = duplicate.open(tx).unwrap_err();

        assert_eq!(
            err,
            LifecycleError::Registry(RegistryError::DuplicateClient(existing.id()))
        );
        assert_eq!(duplicate.state(), ConnectionState::Closed);

        // Dropping the rejected duplicate must not remove the existing entry.
        drop(duplicate);
        assert!(manager.registry().contains(&existing.id()));
    }

    #[test]
    fn single_client_receives_own_message() {
        let manager = LifecycleManager::default();
        let (a, mut rx_a) = open_client(&manager);

        let report = a.on_message("hi").unwrap();
        assert_eq!(report.delivered, 1);
        assert_eq!(text(&mut rx_a).as_deref(), Some("hi"));
    }

    #[test]
    fn two_clients_both_receive() {
        let manager = LifecycleManager::default();
        let (a, mut rx_a) = open_client(&manager);
        let (_b, mut rx_b) = open_client(&manager);

        a.on_message("x");

        assert_eq!(text(&mut rx_a).as_deref(), Some("x"));
        assert_eq!(text(&mut rx_b).as_deref(), Some("x"));
    }

    #[test]
    fn disconnected_client_receives_nothing() {
        let manager = LifecycleManager::default();
        let (a, mut rx_a) = open_client(&manager);
        let (mut b, mut rx_b) = open_client(&manager);

        b.close();
        a.on_message("y");

        assert_eq!(text(&mut rx_a).as_deref(), Some("y"));
        assert_eq!(text(&mut rx_b), None);
    }

    #[test]
    fn double_disconnect_leaves_registry_empty() {
        let manager = LifecycleManager::default();
        let (mut a, _rx) = open_client(&manager);

        a.close();
        a.close();

        assert_eq!(a.state(), ConnectionState::Closed);
        assert_eq!(manager.connected(), 0);
    }

    #[test]
    fn late_message_after_close_is_ignored() {
        let manager = LifecycleManager::default();
        let (mut a, _rx_a) = open_client(&manager);
        let (_b, mut rx_b) = open_client(&manager);

        a.close();
        assert!(a.on_message("too late").is_none());
        assert_eq!(text(&mut rx_b), None);
    }

    #[test]
    fn message_before_open_is_ignored() {
        let manager = LifecycleManager::default();
        let (_b, mut rx_b) = open_client(&manager);
        let pending = manager.accept(ClientId::new());

        assert!(pending.on_message("early").is_none());
        assert_eq!(text(&mut rx_b), None);
    }

    #[test]
    fn close_before_open_is_terminal() {
        let manager = LifecycleManager::default();
        let mut connection = manager.accept(ClientId::new());
        connection.close();
        assert_eq!(connection.state(), ConnectionState::Closed);

        let (tx, _rx) = mpsc::channel(8);
        assert!(matches!(
            connection.open(tx),
            Err(LifecycleError::InvalidTransition {
                state: ConnectionState::Closed,
                ..
            })
        ));
        assert_eq!(manager.connected(), 0);
    }

    #[test]
    fn dropping_open_connection_deregisters() {
        let manager = LifecycleManager::default();
        let (a, _rx) = open_client(&manager);
        assert_eq!(manager.connected(), 1);

        drop(a);
        assert_eq!(manager.connected(), 0);
    }

    #[test]
    fn binary_payload_is_relayed_unchanged() {
        let manager = LifecycleManager::default();
        let (a, mut rx_a) = open_client(&manager);

        a.on_message(vec![0u8, 255, 7]);

        let received = rx_a.try_recv().unwrap();
        assert_eq!(received.payload, Payload::from(vec![0u8, 255, 7]));
    }

    #[test]
    fn state_display_names() {
        assert_eq!(ConnectionState::Connecting.to_string(), "connecting");
        assert_eq!(ConnectionState::Open.to_string(), "open");
        assert_eq!(ConnectionState::Closed.to_string(), "closed");
    }
}
