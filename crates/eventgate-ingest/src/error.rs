//! Error types for event ingestion.

/// Errors raised while reading or decoding domain events.
///
/// Only [`Source`](IngestError::Source) stops an ingestion loop; the rest
/// are per-message and get logged and skipped.
#[derive(Debug, thiserror::Error)]
pub enum IngestError {
    /// The message had no opcode byte.
    #[error("empty event message")]
    Empty,

    /// The opcode byte is not one this server knows.
    #[error("unknown opcode {0}")]
    UnknownOpcode(u8),

    /// The payload did not match the opcode's event shape.
    #[error("failed to decode {opcode:?} payload: {source}")]
    Decode {
        opcode: crate::Opcode,
        #[source]
        source: rmp_serde::decode::Error,
    },

    /// An event could not be encoded for publishing.
    #[error("failed to encode event: {0}")]
    Encode(#[source] rmp_serde::encode::Error),

    /// The translated event could not be published.
    #[error("failed to publish event: {0}")]
    Publish(#[from] eventgate_session::SessionError),

    /// The pub/sub connection failed.
    #[error("event source failed: {0}")]
    Source(#[from] redis::RedisError),
}
