//! Error types for the protocol layer.
//!
//! Each crate in Eventgate defines its own error enum. A `ProtocolError`
//! always means a problem turning values into bytes (or back), never a
//! network or session problem.

/// Errors that can occur in the protocol layer.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    /// JSON serialization failed.
    #[error("json encode failed: {0}")]
    JsonEncode(#[source] serde_json::Error),

    /// JSON deserialization failed: malformed input or a shape mismatch.
    #[error("json decode failed: {0}")]
    JsonDecode(#[source] serde_json::Error),

    /// MessagePack serialization failed.
    #[error("msgpack encode failed: {0}")]
    MsgpackEncode(#[source] rmp_serde::encode::Error),

    /// MessagePack deserialization failed.
    #[error("msgpack decode failed: {0}")]
    MsgpackDecode(#[source] rmp_serde::decode::Error),

    /// A protocol version or format string was not recognized.
    #[error("invalid message: {0}")]
    InvalidMessage(String),

    /// The version/format combination has no wire shape.
    #[error("unsupported encoding: version {version} with format {format}")]
    UnsupportedEncoding {
        /// Requested protocol version.
        version: crate::ProtocolVersion,
        /// Requested wire format.
        format: crate::WireFormat,
    },
}
