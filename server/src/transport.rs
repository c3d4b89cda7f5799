//! WebSocket transport for the relay.
//!
//! `GET /ws` upgrades the connection and hands it to [`handle_socket`], which
//! drives one [`Connection`](crate::lifecycle::Connection):
//!
//! - a fresh [`ClientId`] is assigned and the connection is opened with a
//!   bounded outbound queue,
//! - a writer task drains that queue into the socket,
//! - the reader loop turns every text or binary frame into a broadcast,
//! - a close frame, a read error, or a failed write closes the connection.
//!
//! Closing deregisters the client, which drops the last sender of its queue.
//! The writer then drains what is left and closes the sink, flushing the
//! close reply so the peer sees a clean close handshake.
//!
//! Handshake, framing and ping/pong are handled by axum.

use std::time::Duration;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::Response;
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio::time::timeout;
use tracing::{debug, error, trace, warn};

use crate::lifecycle::LifecycleManager;
use crate::routes::AppState;
use crate::types::{ClientId, Payload};

/// How long a closing connection's writer may take to flush before it is
/// aborted.
const CLOSE_TIMEOUT: Duration = Duration::from_secs(5);

/// GET /ws - WebSocket relay endpoint.
///
/// Every text or binary frame a client sends is relayed to every connected
/// client, the sender included, as a frame of the same kind.
///
/// # Responses
///
/// - `101 Switching Protocols` - WebSocket upgrade successful
pub async fn get_ws(State(state): State<AppState>, ws: WebSocketUpgrade) -> Response {
    let lifecycle = state.lifecycle.clone();
    let buffer = state.config.client_buffer;

    ws.on_upgrade(move |socket| handle_socket(socket, lifecycle, buffer))
}

/// Runs an upgraded WebSocket until either side goes away.
pub async fn handle_socket(socket: WebSocket, lifecycle: LifecycleManager, buffer: usize) {
    let id = ClientId::new();
    let mut connection = lifecycle.accept(id);

    let (outbound_tx, mut outbound_rx) = mpsc::channel(buffer.max(1));
    if let Err(err) = connection.open(outbound_tx) {
        error!(client_id = %id, error = %err, "Failed to open connection");
        return;
    }

    let (mut sink, mut stream) = socket.split();

    // Forward queued messages to the client.
    let mut writer = tokio::spawn(async move {
        while let Some(envelope) = outbound_rx.recv().await {
            trace!(
                client_id = %id,
                origin = %envelope.origin,
                kind = envelope.payload.kind(),
                "Sending message to client"
            );
            if let Err(err) = sink.send(envelope.payload.to_frame()).await {
                debug!(client_id = %id, error = %err, "Failed to write to client");
                break;
            }
        }
        let _ = sink.close().await;
    });

    let mut writer_done = false;
    loop {
        tokio::select! {
            frame = stream.next() => match frame {
                Some(Ok(Message::Close(frame))) => {
                    debug!(client_id = %id, close = ?frame, "Client sent close frame");
                    break;
                }
                Some(Ok(message)) => {
                    if let Some(payload) = Payload::from_frame(message) {
                        connection.on_message(payload);
                    }
                }
                Some(Err(err)) => {
                    debug!(client_id = %id, error = %err, "WebSocket read error");
                    break;
                }
                None => break,
            },
            // The writer only stops early when the socket can no longer be
            // written to.
            _ = &mut writer => {
                writer_done = true;
                break;
            }
        }
    }

    connection.close();

    if !writer_done && timeout(CLOSE_TIMEOUT, &mut writer).await.is_err() {
        warn!(client_id = %id, "Writer did not finish in time, aborting");
        writer.abort();
    }
}
