//! Domain events and their one-byte opcodes.
//!
//! A message on the pub/sub channel is one opcode byte followed by a
//! MessagePack map:
//!
//! ```text
//! ┌────────┬──────────────────────────────┐
//! │ opcode │ msgpack payload              │
//! │ 1 byte │ named-field map              │
//! └────────┴──────────────────────────────┘
//! ```
//!
//! Every opcode the backing application emits is recognized, but only
//! the ones clients are told about have a [`DomainEvent`] variant.

use std::collections::HashMap;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};

use crate::IngestError;
use crate::entities::{Attachment, Emote, Post, User};

// ---------------------------------------------------------------------------
// Opcode
// ---------------------------------------------------------------------------

/// Event kind tag, the first byte of every message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Opcode {
    CreateUser = 0,
    UpdateUser = 1,
    DeleteUser = 2,
    UpdateUserSettings = 3,
    RevokeSession = 4,
    UpdateRelationship = 5,
    CreateChat = 6,
    UpdateChat = 7,
    DeleteChat = 8,
    CreateChatMember = 9,
    UpdateChatMember = 10,
    DeleteChatMember = 11,
    CreateChatEmote = 12,
    UpdateChatEmote = 13,
    DeleteChatEmote = 14,
    Typing = 15,
    CreatePost = 16,
    UpdatePost = 17,
    DeletePost = 18,
    BulkDeletePosts = 19,
    PostReactionAdd = 20,
    PostReactionRemove = 21,
}

impl TryFrom<u8> for Opcode {
    type Error = IngestError;

    fn try_from(byte: u8) -> Result<Self, Self::Error> {
        use Opcode::*;
        Ok(match byte {
            0 => CreateUser,
            1 => UpdateUser,
            2 => DeleteUser,
            3 => UpdateUserSettings,
            4 => RevokeSession,
            5 => UpdateRelationship,
            6 => CreateChat,
            7 => UpdateChat,
            8 => DeleteChat,
            9 => CreateChatMember,
            10 => UpdateChatMember,
            11 => DeleteChatMember,
            12 => CreateChatEmote,
            13 => UpdateChatEmote,
            14 => DeleteChatEmote,
            15 => Typing,
            16 => CreatePost,
            17 => UpdatePost,
            18 => DeletePost,
            19 => BulkDeletePosts,
            20 => PostReactionAdd,
            21 => PostReactionRemove,
            other => return Err(IngestError::UnknownOpcode(other)),
        })
    }
}

// ---------------------------------------------------------------------------
// Payloads
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateUser {
    pub user: User,
}

/// `from` changed their relationship with `to`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateRelationship {
    pub from: User,
    pub to: User,
    pub state: i8,
    pub updated_at: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Typing {
    pub chat_id: i64,
    pub user: User,
}

/// A created or edited post plus everything needed to render it.
///
/// Producers send nil for empty maps and for entries they could not load,
/// so every map accepts nil and `reply_to` / `users` entries may be `None`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostEvent {
    pub post: Post,
    #[serde(default, deserialize_with = "nil_as_default")]
    pub reply_to: HashMap<i64, Option<Post>>,
    #[serde(default, deserialize_with = "nil_as_default")]
    pub users: HashMap<i64, Option<User>>,
    #[serde(default, deserialize_with = "nil_as_default")]
    pub emotes: HashMap<String, Emote>,
    #[serde(default, deserialize_with = "nil_as_default")]
    pub attachments: HashMap<String, Attachment>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeletePost {
    pub chat_id: i64,
    pub post_id: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BulkDeletePosts {
    pub chat_id: i64,
    pub start_id: i64,
    pub end_id: i64,
    #[serde(default, deserialize_with = "nil_as_default")]
    pub post_ids: Vec<i64>,
}

/// Reads nil as the type's default (empty map or list).
fn nil_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostReaction {
    pub chat_id: i64,
    pub post_id: i64,
    pub emoji: String,
    pub user: User,
}

// ---------------------------------------------------------------------------
// DomainEvent
// ---------------------------------------------------------------------------

/// A decoded event that clients are told about.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DomainEvent {
    UpdateUser(UpdateUser),
    UpdateRelationship(UpdateRelationship),
    Typing(Typing),
    CreatePost(PostEvent),
    UpdatePost(PostEvent),
    DeletePost(DeletePost),
    BulkDeletePosts(BulkDeletePosts),
    PostReactionAdd(PostReaction),
    PostReactionRemove(PostReaction),
}

fn parse<T: DeserializeOwned>(opcode: Opcode, payload: &[u8]) -> Result<T, IngestError> {
    rmp_serde::from_slice(payload).map_err(|source| IngestError::Decode { opcode, source })
}

impl DomainEvent {
    /// Decodes one pub/sub message.
    ///
    /// Returns `Ok(None)` for recognized opcodes that are not broadcast.
    ///
    /// # Errors
    /// [`IngestError::Empty`], [`IngestError::UnknownOpcode`], or
    /// [`IngestError::Decode`] when the payload doesn't fit the opcode.
    pub fn decode(raw: &[u8]) -> Result<Option<Self>, IngestError> {
        let (&byte, payload) = raw.split_first().ok_or(IngestError::Empty)?;
        let opcode = Opcode::try_from(byte)?;
        let event = match opcode {
            Opcode::UpdateUser => Self::UpdateUser(parse(opcode, payload)?),
            Opcode::UpdateRelationship => Self::UpdateRelationship(parse(opcode, payload)?),
            Opcode::Typing => Self::Typing(parse(opcode, payload)?),
            Opcode::CreatePost => Self::CreatePost(parse(opcode, payload)?),
            Opcode::UpdatePost => Self::UpdatePost(parse(opcode, payload)?),
            Opcode::DeletePost => Self::DeletePost(parse(opcode, payload)?),
            Opcode::BulkDeletePosts => Self::BulkDeletePosts(parse(opcode, payload)?),
            Opcode::PostReactionAdd => Self::PostReactionAdd(parse(opcode, payload)?),
            Opcode::PostReactionRemove => Self::PostReactionRemove(parse(opcode, payload)?),
            _ => return Ok(None),
        };
        Ok(Some(event))
    }

    pub fn opcode(&self) -> Opcode {
        match self {
            Self::UpdateUser(_) => Opcode::UpdateUser,
            Self::UpdateRelationship(_) => Opcode::UpdateRelationship,
            Self::Typing(_) => Opcode::Typing,
            Self::CreatePost(_) => Opcode::CreatePost,
            Self::UpdatePost(_) => Opcode::UpdatePost,
            Self::DeletePost(_) => Opcode::DeletePost,
            Self::BulkDeletePosts(_) => Opcode::BulkDeletePosts,
            Self::PostReactionAdd(_) => Opcode::PostReactionAdd,
            Self::PostReactionRemove(_) => Opcode::PostReactionRemove,
        }
    }

    /// Encodes the event as a pub/sub message, for in-process publishers.
    pub fn encode(&self) -> Result<Vec<u8>, IngestError> {
        let mut out = vec![self.opcode() as u8];
        match self {
            Self::UpdateUser(e) => rmp_serde::encode::write_named(&mut out, e),
            Self::UpdateRelationship(e) => rmp_serde::encode::write_named(&mut out, e),
            Self::Typing(e) => rmp_serde::encode::write_named(&mut out, e),
            Self::CreatePost(e) | Self::UpdatePost(e) => {
                rmp_serde::encode::write_named(&mut out, e)
            }
            Self::DeletePost(e) => rmp_serde::encode::write_named(&mut out, e),
            Self::BulkDeletePosts(e) => rmp_serde::encode::write_named(&mut out, e),
            Self::PostReactionAdd(e) | Self::PostReactionRemove(e) => {
                rmp_serde::encode::write_named(&mut out, e)
            }
        }
        .map_err(IngestError::Encode)?;
        Ok(out)
    }
}
