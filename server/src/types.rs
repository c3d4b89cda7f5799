//! Shared types for the relay server.
//!
//! The relay is content-agnostic: a [`Payload`] is carried from one client to
//! every other client without being inspected. An [`Envelope`] adds the
//! metadata the server keeps for logging.

use std::fmt;

use axum::body::Bytes;
use axum::extract::ws::{Message, Utf8Bytes};
use chrono::{DateTime, Utc};
use uuid::Uuid;

/// Unique identifier of one WebSocket connection.
///
/// Assigned when the upgrade completes and stable for the lifetime of the
/// connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ClientId(Uuid);

impl ClientId {
    /// Generates a fresh random identifier.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ClientId {
    fn default() -> Self {
        Self::new()
    }
}

impl From<Uuid> for ClientId {
    fn from(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

impl fmt::Display for ClientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Opaque message content relayed between clients.
///
/// Both variants are reference-counted buffers, so turning a payload back
/// into a frame for each recipient never copies the bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Payload {
    /// A UTF-8 text frame.
    Text(Utf8Bytes),

    /// A binary frame.
    Binary(Bytes),
}

impl Payload {
    /// Size of the payload in bytes.
    #[must_use]
    pub fn len(&self) -> usize {
        match self {
            Self::Text(text) => text.len(),
            Self::Binary(data) => data.len(),
        }
    }

    /// Returns `true` if the payload carries no bytes.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Short label used in log records.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Text(_) => "text",
            Self::Binary(_) => "binary",
        }
    }

    /// Extracts a relayable payload from an inbound WebSocket frame.
    ///
    /// Control frames (ping, pong, close) carry no payload and return `None`.
    #[must_use]
    pub fn from_frame(message: Message) -> Option<Self> {
        match message {
            Message::Text(text) => Some(Self::Text(text)),
            Message::Binary(data) => Some(Self::Binary(data)),
            Message::Ping(_) | Message::Pong(_) | Message::Close(_) => None,
        }
    }

    /// Builds the outbound WebSocket frame for this payload.
    #[must_use]
    pub fn to_frame(&self) -> Message {
        match self {
            Self::Text(text) => Message::Text(text.clone()),
            Self::Binary(data) => Message::Binary(data.clone()),
        }
    }
}

impl From<&str> for Payload {
    fn from(text: &str) -> Self {
        Self::Text(text.into())
    }
}

impl From<String> for Payload {
    fn from(text: String) -> Self {
        Self::Text(text.into())
    }
}

impl From<Vec<u8>> for Payload {
    fn from(data: Vec<u8>) -> Self {
        Self::Binary(data.into())
    }
}

/// A payload together with the metadata recorded when it arrived.
///
/// The origin is kept for logging only; it never restricts delivery, so the
/// sender receives its own message like every other client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Envelope {
    /// Connection the payload was received from.
    pub origin: ClientId,

    /// When the server received the payload.
    pub received_at: DateTime<Utc>,

    /// The relayed content.
    pub payload: Payload,
}

impl Envelope {
    /// Wraps a payload received now from `origin`.
    #[must_use]
    pub fn new(origin: ClientId, payload: impl Into<Payload>) -> Self {
        Self {
            origin,
            received_at: Utc::now(),
            payload: payload.into(),
        }
    }
}
