//! Encodings and pre-encoded packets.
//!
//! A [`Packet`] is encoded once, when it is built, into every encoding a
//! client can negotiate. Sessions then pick the bytes matching their own
//! encoding without re-serializing anything.

use std::fmt;
use std::str::FromStr;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use bytes::Bytes;
use eventgate_transport::Frame;
use tokio::time::Instant;

use crate::codec::{Codec, JsonCodec, MsgpackCodec};
use crate::envelope::{CurrentEnvelope, CurrentEvent, Hello, LegacyEnvelope, LegacyEvent};
use crate::ProtocolError;

// ---------------------------------------------------------------------------
// Negotiation
// ---------------------------------------------------------------------------

/// Protocol version requested with `v=`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ProtocolVersion {
    /// `v=0`.
    #[default]
    Legacy,
    /// `v=1`.
    Current,
}

impl FromStr for ProtocolVersion {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "0" => Ok(Self::Legacy),
            "1" => Ok(Self::Current),
            other => Err(ProtocolError::InvalidMessage(format!(
                "unknown protocol version {other:?}"
            ))),
        }
    }
}

impl fmt::Display for ProtocolVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Legacy => f.write_str("0"),
            Self::Current => f.write_str("1"),
        }
    }
}

/// Wire format requested with `format=`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum WireFormat {
    #[default]
    Json,
    Msgpack,
}

impl FromStr for WireFormat {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "json" => Ok(Self::Json),
            "msgpack" => Ok(Self::Msgpack),
            other => Err(ProtocolError::InvalidMessage(format!(
                "unknown wire format {other:?}"
            ))),
        }
    }
}

impl fmt::Display for WireFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Json => f.write_str("json"),
            Self::Msgpack => f.write_str("msgpack"),
        }
    }
}

/// A negotiated version × format pair that has a wire shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Encoding {
    #[default]
    LegacyJson,
    LegacyMsgpack,
    CurrentJson,
}

impl Encoding {
    /// Resolves a client's request into an encoding.
    ///
    /// # Errors
    /// [`ProtocolError::UnsupportedEncoding`] for the current version with
    /// MessagePack, which no client speaks.
    pub fn negotiate(version: ProtocolVersion, format: WireFormat) -> Result<Self, ProtocolError> {
        match (version, format) {
            (ProtocolVersion::Legacy, WireFormat::Json) => Ok(Self::LegacyJson),
            (ProtocolVersion::Legacy, WireFormat::Msgpack) => Ok(Self::LegacyMsgpack),
            (ProtocolVersion::Current, WireFormat::Json) => Ok(Self::CurrentJson),
            (version, format) => Err(ProtocolError::UnsupportedEncoding { version, format }),
        }
    }

    pub fn version(self) -> ProtocolVersion {
        match self {
            Self::LegacyJson | Self::LegacyMsgpack => ProtocolVersion::Legacy,
            Self::CurrentJson => ProtocolVersion::Current,
        }
    }

    fn frame(self, bytes: Bytes) -> Frame {
        match self {
            Self::LegacyMsgpack => Frame::Binary(bytes),
            Self::LegacyJson | Self::CurrentJson => Frame::Text(bytes),
        }
    }
}

// ---------------------------------------------------------------------------
// Packet
// ---------------------------------------------------------------------------

/// Hands out packet sequence numbers.
pub trait NonceSource {
    /// Returns the next nonce. Successive calls return strictly
    /// increasing values.
    fn next_nonce(&self) -> i64;
}

/// One event, encoded for every client encoding and stamped with a nonce.
#[derive(Debug, Clone)]
pub struct Packet {
    nonce: i64,
    created: Instant,
    created_at_ms: i64,
    legacy_json: Option<Bytes>,
    legacy_msgpack: Option<Bytes>,
    current_json: Bytes,
}

impl Packet {
    /// Takes a nonce, stamps it into both envelopes, and encodes them.
    ///
    /// `legacy` is `None` for event kinds with no legacy shape; legacy
    /// sessions skip such packets.
    ///
    /// # Errors
    /// Returns a [`ProtocolError`] if either envelope fails to serialize.
    /// The nonce is consumed regardless.
    pub fn build(
        nonces: &impl NonceSource,
        legacy: Option<LegacyEnvelope>,
        mut current: CurrentEnvelope,
    ) -> Result<Self, ProtocolError> {
        let nonce = nonces.next_nonce();
        let stamp = nonce.to_string();

        let (legacy_json, legacy_msgpack) = match legacy {
            Some(mut legacy) => {
                legacy.nonce = Some(stamp.clone());
                (
                    Some(Bytes::from(JsonCodec.encode(&legacy)?)),
                    Some(Bytes::from(MsgpackCodec.encode(&legacy)?)),
                )
            }
            None => (None, None),
        };

        current.nonce = Some(stamp);
        let current_json = Bytes::from(JsonCodec.encode(&current)?);

        Ok(Self {
            nonce,
            created: Instant::now(),
            created_at_ms: unix_ms(),
            legacy_json,
            legacy_msgpack,
            current_json,
        })
    }

    pub fn nonce(&self) -> i64 {
        self.nonce
    }

    /// Monotonic creation instant, used for history pruning.
    pub fn created(&self) -> Instant {
        self.created
    }

    /// Wall-clock creation time in unix milliseconds.
    pub fn created_at_ms(&self) -> i64 {
        self.created_at_ms
    }

    /// Time since the packet was built.
    pub fn age(&self) -> Duration {
        self.created.elapsed()
    }

    /// Raw bytes for an encoding, if the packet has that form.
    pub fn bytes(&self, encoding: Encoding) -> Option<&Bytes> {
        match encoding {
            Encoding::LegacyJson => self.legacy_json.as_ref(),
            Encoding::LegacyMsgpack => self.legacy_msgpack.as_ref(),
            Encoding::CurrentJson => Some(&self.current_json),
        }
    }

    /// The frame to write for an encoding, or `None` if this packet has
    /// no form for it.
    pub fn frame(&self, encoding: Encoding) -> Option<Frame> {
        self.bytes(encoding).map(|b| encoding.frame(b.clone()))
    }
}

/// Encodes the hello greeting for one connection.
///
/// Hello carries no nonce and is never part of history.
pub fn hello_frame(encoding: Encoding, hello: Hello) -> Result<Frame, ProtocolError> {
    let bytes = match encoding {
        Encoding::LegacyJson => JsonCodec.encode(&LegacyEnvelope::new(LegacyEvent::Hello(hello)))?,
        Encoding::LegacyMsgpack => {
            MsgpackCodec.encode(&LegacyEnvelope::new(LegacyEvent::Hello(hello)))?
        }
        Encoding::CurrentJson => {
            JsonCodec.encode(&CurrentEnvelope::new(CurrentEvent::Hello(hello)))?
        }
    };
    Ok(encoding.frame(Bytes::from(bytes)))
}

fn unix_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicI64, Ordering};

    use serde_json::Value;

    use super::*;
    use crate::envelope::{BulkDeletePosts, CurrentTyping, LegacyTyping, TYPING_STATE_CHAT};
    use crate::models::{ChatRef, CurrentUser};

    #[derive(Default)]
    struct Counter(AtomicI64);

    impl NonceSource for Counter {
        fn next_nonce(&self) -> i64 {
            self.0.fetch_add(1, Ordering::SeqCst)
        }
    }

    fn user() -> CurrentUser {
        CurrentUser {
            id: "5".into(),
            username: "alice".into(),
            flags: 0,
            icon: String::new(),
            legacy_icon: 0,
            color: "#000".into(),
            quote: None,
        }
    }

    fn typing(chat: i64) -> (LegacyEnvelope, CurrentEnvelope) {
        let legacy = LegacyEnvelope::new(LegacyEvent::Typing(LegacyTyping {
            chat_id: "livechat".into(),
            state: TYPING_STATE_CHAT,
            username: "alice".into(),
        }));
        let current = CurrentEnvelope::new(CurrentEvent::Typing(CurrentTyping {
            chat_id: ChatRef::from(chat),
            user: user(),
            username: "alice".into(),
        }));
        (legacy, current)
    }

    fn json(bytes: &[u8]) -> Value {
        serde_json::from_slice(bytes).unwrap()
    }

    #[test]
    fn test_negotiate_rejects_current_msgpack() {
        assert_eq!(
            Encoding::negotiate(ProtocolVersion::Legacy, WireFormat::Msgpack).unwrap(),
            Encoding::LegacyMsgpack
        );
        assert!(matches!(
            Encoding::negotiate(ProtocolVersion::Current, WireFormat::Msgpack),
            Err(ProtocolError::UnsupportedEncoding { .. })
        ));
    }

    #[test]
    fn test_from_str_unknown_values_error() {
        assert_eq!("1".parse::<ProtocolVersion>().unwrap(), ProtocolVersion::Current);
        assert!("2".parse::<ProtocolVersion>().is_err());
        assert_eq!("msgpack".parse::<WireFormat>().unwrap(), WireFormat::Msgpack);
        assert!("xml".parse::<WireFormat>().is_err());
    }

    #[test]
    fn test_build_stamps_nonce_into_every_encoding() {
        let nonces = Counter::default();
        let (legacy, current) = typing(42);
        let first = Packet::build(&nonces, Some(legacy.clone()), current.clone()).unwrap();
        let second = Packet::build(&nonces, Some(legacy), current).unwrap();

        assert_eq!(first.nonce(), 0);
        assert_eq!(second.nonce(), 1);

        let legacy_json = json(first.bytes(Encoding::LegacyJson).unwrap());
        let current_json = json(first.bytes(Encoding::CurrentJson).unwrap());
        assert_eq!(legacy_json["nonce"], "0");
        assert_eq!(current_json["nonce"], "0");
        assert_eq!(current_json["val"]["chat_id"], "42");

        let msgpack: Value =
            rmp_serde::from_slice(first.bytes(Encoding::LegacyMsgpack).unwrap()).unwrap();
        assert_eq!(msgpack["nonce"], "0");
        assert_eq!(msgpack["val"]["chatid"], "livechat");
    }

    #[test]
    fn test_build_home_chat_renders_home() {
        let (legacy, current) = typing(0);
        let packet = Packet::build(&Counter::default(), Some(legacy), current).unwrap();
        let current_json = json(packet.bytes(Encoding::CurrentJson).unwrap());
        assert_eq!(current_json["val"]["chat_id"], "home");
    }

    #[test]
    fn test_frame_kind_follows_encoding() {
        let (legacy, current) = typing(42);
        let packet = Packet::build(&Counter::default(), Some(legacy), current).unwrap();
        assert!(matches!(packet.frame(Encoding::LegacyJson), Some(Frame::Text(_))));
        assert!(matches!(packet.frame(Encoding::LegacyMsgpack), Some(Frame::Binary(_))));
        assert!(matches!(packet.frame(Encoding::CurrentJson), Some(Frame::Text(_))));
    }

    #[test]
    fn test_frame_current_only_packet_has_no_legacy_form() {
        let current = CurrentEnvelope::new(CurrentEvent::BulkDeletePosts(BulkDeletePosts {
            chat_id: ChatRef::from(42),
            start_id: "1".into(),
            end_id: "9".into(),
            post_ids: vec!["3".into()],
        }));
        let packet = Packet::build(&Counter::default(), None, current).unwrap();
        assert!(packet.frame(Encoding::LegacyJson).is_none());
        assert!(packet.frame(Encoding::LegacyMsgpack).is_none());
        assert!(packet.frame(Encoding::CurrentJson).is_some());
    }

    #[test]
    fn test_hello_frame_has_no_nonce() {
        let hello = Hello {
            session_id: "77".into(),
            ping_interval: 45_000,
        };
        let frame = hello_frame(Encoding::CurrentJson, hello).unwrap();
        let value = json(frame.as_bytes());
        assert_eq!(value["cmd"], "hello");
        assert_eq!(value["val"]["session_id"], "77");
        assert!(value.get("nonce").is_none());
    }
}
