//! Error types for the relay server.
//!
//! Each component defines its own error enum next to the code that raises it:
//!
//! - [`ConfigError`](crate::config::ConfigError) - environment parsing
//! - [`RegistryError`](crate::registry::RegistryError) and
//!   [`SendError`](crate::registry::SendError) - connection bookkeeping
//! - [`LifecycleError`](crate::lifecycle::LifecycleError) - state transitions
//!
//! [`ServerError`] is the top-level error for starting and running the
//! process. Any of its variants means the server is not serving and the
//! process should exit non-zero.

use std::error::Error;
use std::fmt;
use std::io;
use std::net::SocketAddr;

use crate::config::ConfigError;

/// Top-level error type for the relay server.
#[derive(Debug)]
pub enum ServerError {
    /// Configuration could not be loaded.
    Config(ConfigError),

    /// The listening socket could not be bound.
    Bind {
        /// Address that was requested.
        addr: SocketAddr,
        /// Underlying OS error (e.g. address already in use).
        source: io::Error,
    },

    /// The server stopped because of an I/O failure.
    Serve(io::Error),
}

impl fmt::Display for ServerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Config(err) => write!(f, "configuration error: {err}"),
            Self::Bind { addr, source } => write!(f, "failed to bind to {addr}: {source}"),
            Self::Serve(err) => write!(f, "server error: {err}"),
        }
    }
}

impl Error for ServerError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Config(err) => Some(err),
            Self::Bind { source, .. } => Some(source),
            Self::Serve(err) => Some(err),
        }
    }
}

impl From<ConfigError> for ServerError {
    fn from(err: ConfigError) -> Self {
        Self::Config(err)
    }
}

impl ServerError {
    /// Creates a bind error for `addr`.
    pub fn bind(addr: SocketAddr, source: io::Error) -> Self {
        Self::Bind { addr, source }
    }

    /// Returns `true` if the error happened before the server started serving.
    pub fn is_startup_error(&self) -> bool {
        matches!(self, Self::Config(_) | Self::Bind { .. })
    }
}

/// A specialized Result type for server operations.
pub type Result<T> = std::result::Result<T, ServerError>;
