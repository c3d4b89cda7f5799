//! Relay Server - Main entry point.
//!
//! This binary starts the relay with:
//! - Structured JSON logging
//! - Graceful shutdown handling (SIGTERM/SIGINT)
//! - A non-zero exit status if configuration or binding fails
//!
//! # Configuration
//!
//! See [`relay_server::config`] for environment variable configuration.
//!
//! # Example
//!
//! ```bash
//! PORT=8080 RUST_LOG=debug cargo run --bin relay-server
//! ```

use std::process::ExitCode;

use tokio::signal;
use tracing::{error, info};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

use relay_server::config::Config;
use relay_server::error::Result;
use relay_server::routes::AppState;
use relay_server::server;

#[tokio::main]
async fn main() -> ExitCode {
    init_logging();

    let config = match Config::from_env() {
        Ok(config) => config,
        Err(err) => {
            error!(error = %err, "Failed to load configuration");
            eprintln!("Error: {err}");
            eprintln!();
            eprintln!("Optional environment variables:");
            eprintln!("  PORT                 - HTTP server port (default: 3001)");
            eprintln!("  RELAY_HOST           - Bind address (default: 0.0.0.0)");
            eprintln!("  RELAY_CLIENT_BUFFER  - Outbound queue size per client (default: 256)");
            eprintln!("  RUST_LOG             - Log level filter (default: info)");
            return ExitCode::from(1);
        }
    };

    info!(
        port = config.port,
        host = %config.host,
        client_buffer = config.client_buffer,
        "Relay server starting"
    );

    if let Err(err) = serve(config).await {
        if err.is_startup_error() {
            // `bind` has already logged the cause.
            error!("Relay server failed to start");
        } else {
            error!(error = %err, "Server error");
        }
        return ExitCode::from(1);
    }

    info!("Server shutdown complete");
    ExitCode::SUCCESS
}

/// Binds the listener and serves until a shutdown signal arrives.
async fn serve(config: Config) -> Result<()> {
    let listener = server::bind(config.bind_addr()).await?;
    server::run(listener, AppState::new(config), shutdown_signal()).await
}

/// Initialize structured logging with tracing.
///
/// Uses `RUST_LOG` when set, otherwise `info` for our crates with request
/// tracing from tower-http at `debug`.
fn init_logging() {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,tower_http=debug,axum::rejection=trace"));

    let json_layer = fmt::layer()
        .json()
        .with_target(true)
        .with_level(true)
        .with_file(false)
        .with_line_number(false);

    tracing_subscriber::registry()
        .with(env_filter)
        .with(json_layer)
        .init();
}

/// Resolves when SIGINT (Ctrl+C) or SIGTERM is received.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = signal::ctrl_c().await {
            error!(error = %err, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(err) => {
                error!(error = %err, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received SIGINT (Ctrl+C), initiating graceful shutdown");
        }
        _ = terminate => {
            info!("Received SIGTERM, initiating graceful shutdown");
        }
    }
}
