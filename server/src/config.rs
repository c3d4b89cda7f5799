//! Server configuration module.
//!
//! Parses configuration from environment variables for the relay server.
//!
//! # Environment Variables
//!
//! | Variable | Required | Default | Description |
//! |----------|----------|---------|-------------|
//! | `PORT` | No | 3001 | HTTP/WebSocket server port |
//! | `RELAY_HOST` | No | 0.0.0.0 | Address to bind to |
//! | `RELAY_CLIENT_BUFFER` | No | 256 | Outbound queue size per client |

use std::env;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};

use thiserror::Error;

/// Default HTTP server port.
pub const DEFAULT_PORT: u16 = 3001;

/// Default bind address (all interfaces).
pub const DEFAULT_HOST: IpAddr = IpAddr::V4(Ipv4Addr::UNSPECIFIED);

/// Default number of messages queued per client before new ones are dropped.
pub const DEFAULT_CLIENT_BUFFER: usize = 256;

/// Errors that can occur when parsing configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Environment variable has invalid format.
    #[error("invalid format for {var}: {message}")]
    InvalidFormat { var: String, message: String },

    /// Port number is invalid.
    #[error("invalid port number: {0}")]
    InvalidPort(#[from] std::num::ParseIntError),

    /// Configuration validation failed.
    #[error("configuration validation failed: {0}")]
    ValidationError(String),
}

/// Server configuration parsed from environment variables.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Address to bind to.
    pub host: IpAddr,

    /// HTTP server port.
    pub port: u16,

    /// Capacity of each client's outbound queue.
    pub client_buffer: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST,
            port: DEFAULT_PORT,
            client_buffer: DEFAULT_CLIENT_BUFFER,
        }
    }
}

impl Config {
    /// Parse configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if:
    /// - Port number is not a valid u16
    /// - `RELAY_HOST` is not an IP address
    /// - `RELAY_CLIENT_BUFFER` is not a positive integer
    ///
    /// # Example
    ///
    /// ```no_run
    /// use relay_server::config::Config;
    ///
    /// let config = Config::from_env().expect("Failed to load config");
    /// println!("Server will listen on port {}", config.port);
    /// ```
    pub fn from_env() -> Result<Self, ConfigError> {
        let config = Self {
            host: parse_host()?,
            port: parse_port()?,
            client_buffer: parse_client_buffer()?,
        };

        config.validate()?;

        Ok(config)
    }

    /// The socket address to bind the listener to.
    #[must_use]
    pub fn bind_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }

    /// Validate the configuration.
    fn validate(&self) -> Result<(), ConfigError> {
        if self.client_buffer == 0 {
            return Err(ConfigError::ValidationError(
                "RELAY_CLIENT_BUFFER must be greater than zero".to_string(),
            ));
        }

        Ok(())
    }
}

/// Read an optional environment variable, rejecting non-unicode values.
fn read_env(name: &str) -> Result<Option<String>, ConfigError> {
    match env::var(name) {
        Ok(value) if value.trim().is_empty() => Ok(None),
        Ok(value) => Ok(Some(value.trim().to_string())),
        Err(env::VarError::NotPresent) => Ok(None),
        Err(env::VarError::NotUnicode(_)) => Err(ConfigError::InvalidFormat {
            var: name.to_string(),
            message: "contains invalid unicode".to_string(),
        }),
    }
}

/// Parse the PORT environment variable.
///
/// Returns the default port if not set.
fn parse_port() -> Result<u16, ConfigError> {
    match read_env("PORT")? {
        Some(port_str) => Ok(port_str.parse()?),
        None => Ok(DEFAULT_PORT),
    }
}

/// Parse the RELAY_HOST environment variable.
fn parse_host() -> Result<IpAddr, ConfigError> {
    match read_env("RELAY_HOST")? {
        Some(host) => host.parse().map_err(|err| ConfigError::InvalidFormat {
            var: "RELAY_HOST".to_string(),
            message: format!("'{host}' is not an IP address: {err}"),
        }),
        None => Ok(DEFAULT_HOST),
    }
}

/// Parse the RELAY_CLIENT_BUFFER environment variable.
fn parse_client_buffer() -> Result<usize, ConfigError> {
    match read_env("RELAY_CLIENT_BUFFER")? {
        Some(size) => size.parse().map_err(|err| ConfigError::InvalidFormat {
            var: "RELAY_CLIENT_BUFFER".to_string(),
            message: format!("'{size}' is not a positive integer: {err}"),
        }),
        None => Ok(DEFAULT_CLIENT_BUFFER),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::env;

    /// Helper to temporarily set environment variables for testing.
    struct EnvGuard {
        vars: Vec<(String, Option<String>)>,
    }

    impl EnvGuard {
        fn new() -> Self {
            Self { vars: Vec::new() }
        }

        fn set(&mut self, key: &str, value: &str) {
            let old_value = env::var(key).ok();
            self.vars.push((key.to_string(), old_value));
            env::set_var(key, value);
        }

        fn remove(&mut self, key: &str) {
            let old_value = env::var(key).ok();
            self.vars.push((key.to_string(), old_value));
            env::remove_var(key);
        }
    }

    impl Drop for EnvGuard {
        fn drop(&mut self) {
            // Restore in reverse so the first recorded value wins.
            for (key, value) in self.vars.iter().rev() {
                match value {
                    Some(v) => env::set_var(key, v),
                    None => env::remove_var(key),
                }
            }
        }
    }

    fn clear_all(guard: &mut EnvGuard) {
        guard.remove("PORT");
        guard.remove("RELAY_HOST");
        guard.remove("RELAY_CLIENT_BUFFER");
    }

    #[test]
    #[serial]
    fn test_config_defaults() {
        let mut guard = EnvGuard::new();
        clear_all(&mut guard);

        let config = Config::from_env().expect("should parse config");
        assert_eq!(config, Config::default());
        assert_eq!(config.port, DEFAULT_PORT);
        assert_eq!(config.host, DEFAULT_HOST);
        assert_eq!(config.client_buffer, DEFAULT_CLIENT_BUFFER);
        assert_eq!(config.bind_addr().to_string(), "0.0.0.0:3001");
    }

    #[test]
    #[serial]
    fn test_config_all_values_set() {
        let mut guard = EnvGuard::new();
        guard.set("PORT", "9090");
        guard.set("RELAY_HOST", "127.0.0.1");
        guard.set("RELAY_CLIENT_BUFFER", "32");

        let config = Config::from_env().expect("should parse config");
        assert_eq!(config.port, 9090);
        assert_eq!(config.host, IpAddr::V4(Ipv4Addr::LOCALHOST));
        assert_eq!(config.client_buffer, 32);
        assert_eq!(config.bind_addr().to_string(), "127.0.0.1:9090");
    }

    #[test]
    #[serial]
    fn test_config_ipv6_host() {
        let mut guard = EnvGuard::new();
        clear_all(&mut guard);
        guard.set("RELAY_HOST", "::1");
        guard.set("PORT", "4000");

        let config = Config::from_env().expect("should parse config");
        assert_eq!(config.bind_addr().to_string(), "[::1]:4000");
    }

    #[test]
    #[serial]
    fn test_config_rejects_zero_buffer() {
        let mut guard = EnvGuard::new();
        clear_all(&mut guard);
        guard.set("RELAY_CLIENT_BUFFER", "0");

        let result = Config::from_env();
        assert!(matches!(result, Err(ConfigError::ValidationError(_))));
    }

    #[test]
    #[serial]
    fn test_parse_client_buffer_invalid() {
        let mut guard = EnvGuard::new();
        guard.set("RELAY_CLIENT_BUFFER", "lots");

        let result = parse_client_buffer();
        assert!(
            matches!(result, Err(ConfigError::InvalidFormat { var, .. }) if var == "RELAY_CLIENT_BUFFER")
        );
    }

    #[test]
    #[serial]
    fn test_parse_host_invalid() {
        let mut guard = EnvGuard::new();
        guard.set("RELAY_HOST", "not-an-ip");

        let result = parse_host();
        assert!(
            matches!(result, Err(ConfigError::InvalidFormat { var, .. }) if var == "RELAY_HOST")
        );
    }

    #[test]
    #[serial]
    fn test_parse_port_default() {
        let mut guard = EnvGuard::new();
        guard.remove("PORT");

        let port = parse_port().expect("should parse port");
        assert_eq!(port, DEFAULT_PORT);
    }

    #[test]
    #[serial]
    fn test_parse_port_blank_uses_default() {
        let mut guard = EnvGuard::new();
        guard.set("PORT", "   ");

        let port = parse_port().expect("should parse port");
        assert_eq!(port, DEFAULT_PORT);
    }

    #[test]
    #[serial]
    fn test_parse_port_custom() {
        let mut guard = EnvGuard::new();
        guard.set("PORT", "3000");

        let port = parse_port().expect("should parse port");
        assert_eq!(port, 3000);
    }

    #[test]
    #[serial]
    fn test_parse_port_invalid() {
        let mut guard = EnvGuard::new();
        guard.set("PORT", "not-a-number");

        let result = parse_port();
        assert!(result.is_err());
        assert!(matches!(result.unwrap_err(), ConfigError::InvalidPort(_)));
    }

    #[test]
    #[serial]
    fn test_parse_port_out_of_range() {
        let mut guard = EnvGuard::new();
        guard.set("PORT", "99999");

        let result = parse_port();
        assert!(result.is_err());
    }
}
