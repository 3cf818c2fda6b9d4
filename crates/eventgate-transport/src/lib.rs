//! Transport abstraction layer for Eventgate.
//!
//! Provides the [`Transport`] and [`Connection`] traits that the session
//! layer is written against, plus a WebSocket implementation.
//!
//! # Feature Flags
//!
//! - `websocket` (default): WebSocket transport via `tokio-tungstenite`

#![allow(async_fn_in_trait)]

mod error;
#[cfg(feature = "websocket")]
mod websocket;

pub use error::TransportError;
#[cfg(feature = "websocket")]
pub use websocket::{PendingWebSocket, WebSocketConnection, WebSocketTransport};

use std::fmt;
use std::future::Future;

use bytes::Bytes;

/// Opaque identifier for a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(u64);

impl ConnectionId {
    /// Creates a new `ConnectionId` from a raw `u64`.
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    /// Returns the underlying `u64` value.
    pub fn into_inner(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// One outbound message. Text frames must hold UTF-8.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// A text frame (JSON encodings).
    Text(Bytes),
    /// A binary frame (MessagePack encodings).
    Binary(Bytes),
}

impl Frame {
    /// The payload bytes regardless of frame kind.
    pub fn as_bytes(&self) -> &[u8] {
        match self {
            Self::Text(b) | Self::Binary(b) => b,
        }
    }
}

/// Why the server is closing a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseReason {
    /// Orderly shutdown.
    Normal,
    /// The session ended (expired or closed by the server).
    SessionEnded,
    /// Another connection took over the session.
    Superseded,
    /// The client asked to resume a session that does not exist.
    SessionNotFound,
    /// The connection request was malformed.
    BadRequest,
}

impl CloseReason {
    /// WebSocket close code sent to the peer.
    pub fn code(self) -> u16 {
        match self {
            Self::Normal => 1000,
            Self::SessionEnded => 1001,
            Self::BadRequest => 1008,
            Self::Superseded => 4000,
            Self::SessionNotFound => 4004,
        }
    }

    /// Human-readable reason sent with the close frame.
    pub fn message(self) -> &'static str {
        match self {
            Self::Normal => "",
            Self::SessionEnded => "Session ended.",
            Self::BadRequest => "Bad request.",
            Self::Superseded => "Session attached to a new connection.",
            Self::SessionNotFound => "Session not found.",
        }
    }
}

/// Request metadata captured during the upgrade.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Handshake {
    /// Request path, e.g. `/`.
    pub path: String,
    /// Raw query string without the leading `?`.
    pub query: Option<String>,
}

/// Accepts new incoming connections.
///
/// Accepting is split in two. [`accept`](Self::accept) only takes the next
/// raw connection off the listener; the protocol handshake happens in
/// [`PendingConnection::upgrade`], which callers run on their own task so a
/// slow client never holds up the accept loop.
pub trait Transport: Send + Sync + 'static {
    /// The connection type produced by this transport.
    type Connection: Connection;
    /// The error type for transport operations.
    type Error: std::error::Error + Send + Sync;
    /// An accepted connection that has not completed its handshake.
    type Pending: PendingConnection<Connection = Self::Connection, Error = Self::Error>;

    /// Waits for the next incoming connection.
    async fn accept(&mut self) -> Result<Self::Pending, Self::Error>;
}

/// An accepted connection awaiting its handshake.
pub trait PendingConnection: Send + 'static {
    /// The connection produced once the handshake completes.
    type Connection: Connection;
    /// The error type for a failed handshake.
    type Error: std::error::Error + Send + Sync;

    /// Completes the handshake, returning the connection together with the
    /// upgrade request's metadata. Has no timeout of its own.
    fn upgrade(
        self,
    ) -> impl Future<Output = Result<(Self::Connection, Handshake), Self::Error>> + Send;
}

/// A single connection that can send frames and report closure.
///
/// Methods return `Send` futures so sessions can drive connections from
/// spawned tasks without knowing the concrete type.
pub trait Connection: Send + Sync + 'static {
    /// The error type for connection operations.
    type Error: std::error::Error + Send + Sync + 'static;

    /// Sends one frame to the remote peer.
    fn send(&self, frame: Frame) -> impl Future<Output = Result<(), Self::Error>> + Send;

    /// Receives the next message from the remote peer.
    ///
    /// Returns `Ok(None)` when the peer closed cleanly (normal or
    /// going-away). Any other closure surfaces as an error.
    fn recv(&self) -> impl Future<Output = Result<Option<Vec<u8>>, Self::Error>> + Send;

    /// Sends a keep-alive ping.
    ///
    /// Defaults to a no-op. Transports with a native ping should override.
    fn ping(&self) -> impl Future<Output = Result<(), Self::Error>> + Send {
        async { Ok(()) }
    }

    /// Closes the connection with the given reason.
    fn close(&self, reason: CloseReason) -> impl Future<Output = Result<(), Self::Error>> + Send;

    /// Returns the unique identifier for this connection.
    fn id(&self) -> ConnectionId;
}
