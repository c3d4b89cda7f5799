//! Listener setup and the serve loop.
//!
//! Binding is split from serving so a bind failure surfaces as a
//! [`ServerError::Bind`] before anything is reported as listening.

use std::future::Future;
use std::net::SocketAddr;

use tokio::net::TcpListener;
use tracing::{error, info};

use crate::error::{Result, ServerError};
use crate::routes::{create_router, AppState};

/// Binds the listening socket.
///
/// # Errors
///
/// Returns [`ServerError::Bind`] if the address cannot be bound, for example
/// because another process already holds the port.
pub async fn bind(addr: SocketAddr) -> Result<TcpListener> {
    match TcpListener::bind(addr).await {
        Ok(listener) => {
            let local = listener.local_addr().unwrap_or(addr);
            info!(address = %local, port = local.port(), "Server listening");
            Ok(listener)
        }
        Err(err) => {
            error!(error = %err, address = %addr, "Failed to bind to address");
            Err(ServerError::bind(addr, err))
        }
    }
}

/// Serves the relay on `listener` until `shutdown` resolves.
///
/// Once the server has stopped, every remaining connection is dropped from
/// the registry.
///
/// # Errors
///
/// Returns [`ServerError::Serve`] if the accept loop fails.
pub async fn run<F>(listener: TcpListener, state: AppState, shutdown: F) -> Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let registry = state.lifecycle.registry().clone();
    let app = create_router(state);

    info!("Server ready to accept connections");

    let result = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await
        .map_err(ServerError::Serve);

    let dropped = registry.clear();
    info!(dropped, "Connection registry torn down");

    result
}
