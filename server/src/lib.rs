//! Relay Server - Real-time message relay.
//!
//! Clients connect over WebSocket at `/ws`. Every message a client sends is
//! broadcast to all connected clients, the sender included. A small HTTP
//! surface (healthcheck and greeting routes) shares the process.
//!
//! # Architecture
//!
//! - [`registry`] - the set of open connections
//! - [`broadcast`] - fan-out of one message to a registry snapshot
//! - [`lifecycle`] - the per-connection `Connecting -> Open -> Closed` state machine
//! - [`transport`] - the axum WebSocket adapter that drives the lifecycle
//! - [`routes`] - HTTP routes and shared state
//!
//! Messages are relayed in real-time without persistent storage.

pub mod broadcast;
pub mod config;
pub mod error;
pub mod lifecycle;
pub mod registry;
pub mod routes;
pub mod server;
pub mod transport;
pub mod types;
