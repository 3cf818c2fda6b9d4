//! Codec trait and implementations for serializing/deserializing messages.
//!
//! A codec converts between Rust types and raw bytes. Packets are encoded
//! once per codec at fan-out time, so every session reuses the same bytes.
//!
//! - [`JsonCodec`]: text clients, both protocol versions.
//! - [`MsgpackCodec`]: binary clients on the legacy version, and the
//!   format of domain events arriving from the pub/sub transport.

use serde::{Serialize, de::DeserializeOwned};

use crate::ProtocolError;

/// A codec that can encode Rust types to bytes and decode bytes back.
///
/// `Send + Sync + 'static` so one instance can be shared across tasks.
pub trait Codec: Send + Sync + 'static {
    /// Serializes a value into bytes.
    ///
    /// # Errors
    /// Returns an encode variant of [`ProtocolError`] if the value can't be
    /// represented in this format.
    fn encode<T: Serialize>(&self, value: &T) -> Result<Vec<u8>, ProtocolError>;

    /// Deserializes bytes back into a value.
    ///
    /// # Errors
    /// Returns a decode variant of [`ProtocolError`] if the bytes are
    /// malformed, truncated, or don't match the expected type.
    fn decode<T: DeserializeOwned>(&self, data: &[u8]) -> Result<T, ProtocolError>;
}

// ---------------------------------------------------------------------------
// JsonCodec
// ---------------------------------------------------------------------------

/// A [`Codec`] that uses JSON (via `serde_json`).
///
/// ```rust
/// use eventgate_protocol::{Codec, JsonCodec, ChatRef};
///
/// let bytes = JsonCodec.encode(&ChatRef::from(0)).unwrap();
/// assert_eq!(bytes, b"\"home\"");
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

impl Codec for JsonCodec {
    fn encode<T: Serialize>(&self, value: &T) -> Result<Vec<u8>, ProtocolError> {
        serde_json::to_vec(value).map_err(ProtocolError::JsonEncode)
    }

    fn decode<T: DeserializeOwned>(&self, data: &[u8]) -> Result<T, ProtocolError> {
        serde_json::from_slice(data).map_err(ProtocolError::JsonDecode)
    }
}

// ---------------------------------------------------------------------------
// MsgpackCodec
// ---------------------------------------------------------------------------

/// A [`Codec`] that uses MessagePack (via `rmp-serde`).
///
/// Structs are written as maps keyed by field name, not as positional
/// arrays, so clients can read them without a schema.
#[derive(Debug, Clone, Copy, Default)]
pub struct MsgpackCodec;

impl Codec for MsgpackCodec {
    fn encode<T: Serialize>(&self, value: &T) -> Result<Vec<u8>, ProtocolError> {
        rmp_serde::to_vec_named(value).map_err(ProtocolError::MsgpackEncode)
    }

    fn decode<T: DeserializeOwned>(&self, data: &[u8]) -> Result<T, ProtocolError> {
        rmp_serde::from_slice(data).map_err(ProtocolError::MsgpackDecode)
    }
}
