//! # Eventgate
//!
//! Real-time event distribution over WebSocket.
//!
//! Eventgate subscribes to domain events published by a backing
//! application, translates each one into every client protocol version,
//! and fans it out to connected sessions. Every packet carries a global
//! nonce; a client that drops can reconnect with its session id and the
//! last nonce it saw and receive exactly what it missed.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use eventgate::prelude::*;
//!
//! # async fn start() -> Result<(), EventgateError> {
//! let source = RedisSource::connect("redis://127.0.0.1/", DEFAULT_CHANNEL).await?;
//! let server = EventgateServer::builder()
//!     .bind("0.0.0.0:3000")
//!     .build(source)
//!     .await?;
//! server.run().await
//! # }
//! ```

mod error;
mod handler;
mod server;

pub use error::EventgateError;
pub use server::{DEFAULT_BIND_ADDR, EventgateServer, EventgateServerBuilder, HANDSHAKE_TIMEOUT};

/// Re-exports for building and running a server.
pub mod prelude {
    pub use crate::{DEFAULT_BIND_ADDR, EventgateError, EventgateServer, EventgateServerBuilder};
    pub use eventgate_ingest::{
        ChannelSource, DEFAULT_CHANNEL, DomainEvent, EventSource, IngestError, RedisSource,
    };
    pub use eventgate_protocol::{Encoding, ProtocolVersion, WireFormat};
    pub use eventgate_session::{Audience, Hub, SessionConfig, SessionError, SessionId};
    pub use eventgate_snowflake::{Snowflake, SnowflakeGenerator};
    pub use eventgate_transport::{CloseReason, WebSocketConnection};
}
