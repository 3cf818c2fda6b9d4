//! Wire protocol for Eventgate.
//!
//! Defines what clients receive: the two envelope versions, the entity
//! shapes inside them, the codecs that turn them into bytes, and the
//! [`Packet`] that carries one event pre-encoded for every encoding.
//!
//! Nothing here performs I/O.

mod codec;
mod envelope;
mod error;
mod models;
mod packet;

pub use codec::{Codec, JsonCodec, MsgpackCodec};
pub use envelope::{
    BulkDeletePosts, CurrentDeletePost, CurrentEnvelope, CurrentEvent, CurrentTyping, Hello,
    LegacyCreatePost, LegacyDeletePost, LegacyEnvelope, LegacyEvent, LegacyTyping,
    ReactionUpdate, RelationshipUpdate, TYPING_STATE_CHAT, TYPING_STATE_HOME,
};
pub use error::ProtocolError;
pub use models::{
    ChatRef, CurrentUser, LegacyAttachment, LegacyEmote, LegacyPost, LegacyReactionIndex,
    LegacyTimestamp, LegacyUser, POST_TYPE_REGULAR,
};
pub use packet::{Encoding, NonceSource, Packet, ProtocolVersion, WireFormat, hello_frame};
