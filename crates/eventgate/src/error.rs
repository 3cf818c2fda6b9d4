//! Unified error type for Eventgate.

use eventgate_ingest::IngestError;
use eventgate_protocol::ProtocolError;
use eventgate_session::SessionError;
use eventgate_snowflake::SnowflakeError;
use eventgate_transport::TransportError;

/// Top-level error that wraps every crate's error.
///
/// The `#[from]` conversions let `?` lift sub-crate errors directly.
#[derive(Debug, thiserror::Error)]
pub enum EventgateError {
    /// Listening, accepting, or writing to a connection failed.
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// A handshake parameter or packet was invalid.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// Session lookup or attachment failed.
    #[error(transparent)]
    Session(#[from] SessionError),

    /// The event source failed.
    #[error(transparent)]
    Ingest(#[from] IngestError),

    /// The id generator could not be created.
    #[error(transparent)]
    Snowflake(#[from] SnowflakeError),
}
