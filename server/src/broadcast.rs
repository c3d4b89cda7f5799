//! Message fan-out for the relay server.
//!
//! The [`Broadcaster`] delivers one inbound message to every client that is
//! registered at the moment the broadcast starts, including the client that
//! sent it.
//!
//! # Delivery Semantics
//!
//! - The target list is a [`ConnectionRegistry::snapshot`] taken once per
//!   broadcast. Clients that join afterwards do not receive the message.
//! - Each handle is sent to independently. A client whose queue is closed or
//!   full is skipped and logged; the remaining clients still receive the
//!   message and no error reaches the caller.
//! - Sends never wait, so a slow client cannot stall a broadcast.
//!
//! # Example
//!
//! ```rust
//! use std::sync::Arc;
//!
//! use relay_server::broadcast::Broadcaster;
//! use relay_server::registry::{ClientHandle, ConnectionRegistry};
//! use relay_server::types::{ClientId, Envelope};
//! use tokio::sync::mpsc;
//!
//! let registry = Arc::new(ConnectionRegistry::new());
//! let broadcaster = Broadcaster::new(Arc::clone(&registry));
//!
//! let sender = ClientId::new();
//! let (tx, mut rx) = mpsc::channel(16);
//! registry.register(ClientHandle::new(sender, tx)).unwrap();
//!
//! let report = broadcaster.broadcast(Envelope::new(sender, "hello"));
//! assert_eq!(report.delivered, 1);
//!
//! // The sender receives its own message.
//! let received = rx.try_recv().unwrap();
//! assert_eq!(received.origin, sender);
//! ```

use std::sync::Arc;

use tracing::{debug, trace, warn};

use crate::registry::{ConnectionRegistry, SendError};
use crate::types::Envelope;

/// Outcome of a single broadcast.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BroadcastReport {
    /// Number of clients in the snapshot.
    pub targeted: usize,

    /// Number of clients the message was queued for.
    pub delivered: usize,

    /// Number of clients that could not be reached.
    pub failed: usize,
}

/// Fans messages out to every registered client.
///
/// `Broadcaster` is `Clone`; clones share the same registry.
#[derive(Debug, Clone)]
pub struct Broadcaster {
    registry: Arc<ConnectionRegistry>,
}

impl Broadcaster {
    /// Creates a broadcaster over `registry`.
    #[must_use]
    pub fn new(registry: Arc<ConnectionRegistry>) -> Self {
        Self { registry }
    }

    /// The registry this broadcaster reads its targets from.
    #[must_use]
    pub fn registry(&self) -> &Arc<ConnectionRegistry> {
        &self.registry
    }

    /// Delivers `envelope` to every client registered right now.
    ///
    /// Failures are per recipient: they are logged and counted in the
    /// returned report, never returned as errors.
    pub fn broadcast(&self, envelope: Envelope) -> BroadcastReport {
        let targets = self.registry.snapshot();
        let envelope = Arc::new(envelope);

        trace!(
            origin = %envelope.origin,
            kind = envelope.payload.kind(),
            bytes = envelope.payload.len(),
            targets = targets.len(),
            "Broadcasting message"
        );

        let mut report = BroadcastReport {
            targeted: targets.len(),
            ..BroadcastReport::default()
        };

        for handle in &targets {
            match handle.send(Arc::clone(&envelope)) {
                Ok(()) => report.delivered += 1,
                Err(err @ SendError::Closed(_)) => {
                    // Expected when a client disconnects mid-broadcast.
                    debug!(error = %err, origin = %envelope.origin, "Skipping closed client");
                    report.failed += 1;
                }
                Err(err @ SendError::Full(_)) => {
                    warn!(
                        error = %err,
                        origin = %envelope.origin,
                        dropped = handle.dropped(),
                        "Dropping message for slow client"
                    );
                    report.failed += 1;
                }
            }
        }

        trace!(
            origin = %envelope.origin,
            delivered = report.delivered,
            failed = report.failed,
            "Broadcast complete"
        );

        report
    }
}
