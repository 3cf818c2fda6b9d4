//! Version-specific envelopes.
//!
//! Each event kind is one variant of a closed enum per protocol version.
//! The legacy encoder pattern-matches on the variant to pick one of the
//! historical envelope layouts:
//!
//! ```text
//! {cmd:"direct", val:{mode:"update_post", payload:{...}}, nonce:"7"}   mode-wrapped
//! {cmd:"direct", val:{chatid:"livechat", state:100, u:"..."}, ...}     bare val
//! {cmd:"direct", val:{mode:1, _id:"...", p:"...", ...}, ...}           create post
//! ```
//!
//! The current encoder always writes one flat `{cmd, val, listener?, nonce?}`.

use serde::ser::Error as _;
use serde::{Serialize, Serializer};

use crate::models::{ChatRef, CurrentUser, LegacyPost, LegacyUser};

// ---------------------------------------------------------------------------
// Payloads
// ---------------------------------------------------------------------------

/// Sent on every attach, before any replay.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Hello {
    pub session_id: String,
    /// Milliseconds between server housekeeping ticks; also the grace
    /// window for resuming after a drop.
    pub ping_interval: u64,
}

/// Legacy typing indicator. Home typing is reported in livechat.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LegacyTyping {
    #[serde(rename = "chatid")]
    pub chat_id: String,
    /// [`TYPING_STATE_CHAT`] or [`TYPING_STATE_HOME`].
    pub state: i8,
    #[serde(rename = "u")]
    pub username: String,
}

/// Legacy typing `state` for regular chats and livechat.
pub const TYPING_STATE_CHAT: i8 = 100;
/// Legacy typing `state` for the home feed.
pub const TYPING_STATE_HOME: i8 = 101;

/// Current typing indicator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CurrentTyping {
    pub chat_id: ChatRef,
    pub user: CurrentUser,
    pub username: String,
}

/// A new post in the legacy shape: the post's own fields plus `mode: 1`
/// for home posts or `state: 2` for chat posts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LegacyCreatePost {
    pub post: LegacyPost,
}

impl Serialize for LegacyCreatePost {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        // Going through a JSON map keeps the field count known up front,
        // which the MessagePack serializer needs.
        let mut fields = match serde_json::to_value(&self.post).map_err(S::Error::custom)? {
            serde_json::Value::Object(map) => map,
            _ => return Err(S::Error::custom("post did not serialize to a map")),
        };
        if self.post.chat == ChatRef::Home {
            fields.insert("mode".into(), 1.into());
        } else {
            fields.insert("state".into(), 2.into());
        }
        fields.serialize(serializer)
    }
}

/// Legacy post deletion; serialized as `{mode: "delete", id}`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LegacyDeletePost {
    pub post_id: String,
}

/// Current post deletion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CurrentDeletePost {
    pub chat_id: ChatRef,
    pub post_id: String,
}

/// Removal of a range of posts. Only the current version has this event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BulkDeletePosts {
    pub chat_id: ChatRef,
    pub start_id: String,
    pub end_id: String,
    pub post_ids: Vec<String>,
}

/// A relationship change as seen by the user who made it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RelationshipUpdate<U> {
    pub user: U,
    pub username: String,
    pub state: i8,
    pub updated_at: i64,
}

/// A reaction added to or removed from a post.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReactionUpdate<U> {
    pub chat_id: ChatRef,
    pub post_id: String,
    pub emoji: String,
    pub user: U,
    pub username: String,
}

// ---------------------------------------------------------------------------
// Legacy envelope
// ---------------------------------------------------------------------------

/// Every event kind the legacy protocol knows about.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LegacyEvent {
    Hello(Hello),
    UpdateProfile(LegacyUser),
    UpdateRelationship(RelationshipUpdate<LegacyUser>),
    Typing(LegacyTyping),
    CreatePost(LegacyCreatePost),
    UpdatePost(LegacyPost),
    DeletePost(LegacyDeletePost),
    PostReactionAdd(ReactionUpdate<LegacyUser>),
    PostReactionRemove(ReactionUpdate<LegacyUser>),
}

/// A legacy packet before encoding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LegacyEnvelope {
    pub event: LegacyEvent,
    pub listener: Option<String>,
    /// Stamped by [`Packet::build`](crate::Packet::build).
    pub nonce: Option<String>,
}

impl LegacyEnvelope {
    /// Wraps an event with no listener and no nonce.
    pub fn new(event: LegacyEvent) -> Self {
        Self {
            event,
            listener: None,
            nonce: None,
        }
    }
}

#[derive(Serialize)]
struct LegacyWire<'a, V> {
    cmd: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    val: Option<V>,
    #[serde(skip_serializing_if = "Option::is_none")]
    listener: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    nonce: Option<&'a str>,
}

#[derive(Serialize)]
struct ModePayload<'a, P> {
    mode: &'static str,
    payload: &'a P,
}

#[derive(Serialize)]
struct DeleteVal<'a> {
    mode: &'static str,
    id: &'a str,
}

impl LegacyEnvelope {
    fn wire<V>(&self, cmd: &'static str, val: V) -> LegacyWire<'_, V> {
        LegacyWire {
            cmd,
            val: Some(val),
            listener: self.listener.as_deref(),
            nonce: self.nonce.as_deref(),
        }
    }

    fn direct<'a, P>(&'a self, mode: &'static str, payload: &'a P) -> LegacyWire<'a, ModePayload<'a, P>> {
        self.wire("direct", ModePayload { mode, payload })
    }
}

impl Serialize for LegacyEnvelope {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match &self.event {
            LegacyEvent::Hello(hello) => self.wire("hello", hello).serialize(serializer),
            LegacyEvent::UpdateProfile(user) => {
                self.direct("update_profile", user).serialize(serializer)
            }
            LegacyEvent::UpdateRelationship(update) => {
                self.direct("update_relationship", update).serialize(serializer)
            }
            LegacyEvent::Typing(typing) => self.wire("direct", typing).serialize(serializer),
            LegacyEvent::CreatePost(create) => self.wire("direct", create).serialize(serializer),
            LegacyEvent::UpdatePost(post) => self.direct("update_post", post).serialize(serializer),
            LegacyEvent::DeletePost(delete) => self
                .wire(
                    "direct",
                    DeleteVal {
                        mode: "delete",
                        id: &delete.post_id,
                    },
                )
                .serialize(serializer),
            LegacyEvent::PostReactionAdd(reaction) => {
                self.direct("post_reaction_add", reaction).serialize(serializer)
            }
            LegacyEvent::PostReactionRemove(reaction) => {
                self.direct("post_reaction_remove", reaction).serialize(serializer)
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Current envelope
// ---------------------------------------------------------------------------

/// Every event kind the current protocol knows about.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum CurrentEvent {
    Hello(Hello),
    UpdateProfile(CurrentUser),
    UpdateRelationship(RelationshipUpdate<CurrentUser>),
    Typing(CurrentTyping),
    Post(LegacyPost),
    UpdatePost(LegacyPost),
    DeletePost(CurrentDeletePost),
    BulkDeletePosts(BulkDeletePosts),
    PostReactionAdd(ReactionUpdate<CurrentUser>),
    PostReactionRemove(ReactionUpdate<CurrentUser>),
}

impl CurrentEvent {
    /// The `cmd` string clients dispatch on.
    pub fn cmd(&self) -> &'static str {
        match self {
            Self::Hello(_) => "hello",
            Self::UpdateProfile(_) => "update_profile",
            Self::UpdateRelationship(_) => "update_relationship",
            Self::Typing(_) => "typing",
            Self::Post(_) => "post",
            Self::UpdatePost(_) => "update_post",
            Self::DeletePost(_) => "delete_post",
            Self::BulkDeletePosts(_) => "bulk_delete_posts",
            Self::PostReactionAdd(_) => "post_reaction_add",
            Self::PostReactionRemove(_) => "post_reaction_remove",
        }
    }
}

/// A current-version packet before encoding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CurrentEnvelope {
    pub event: CurrentEvent,
    pub listener: Option<String>,
    /// Stamped by [`Packet::build`](crate::Packet::build).
    pub nonce: Option<String>,
}

impl CurrentEnvelope {
    /// Wraps an event with no listener and no nonce.
    pub fn new(event: CurrentEvent) -> Self {
        Self {
            event,
            listener: None,
            nonce: None,
        }
    }
}

#[derive(Serialize)]
struct CurrentWire<'a> {
    cmd: &'static str,
    val: &'a CurrentEvent,
    #[serde(skip_serializing_if = "Option::is_none")]
    listener: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    nonce: Option<&'a str>,
}

impl Serialize for CurrentEnvelope {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        CurrentWire {
            cmd: self.event.cmd(),
            val: &self.event,
            listener: self.listener.as_deref(),
            nonce: self.nonce.as_deref(),
        }
        .serialize(serializer)
    }
}
