//! Domain entities as the backing application publishes them.
//!
//! Field names match the MessagePack maps on the pub/sub channel. Optional
//! fields may be absent or nil.

use serde::{Deserialize, Serialize};

/// A user account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: i64,
    pub username: String,
    #[serde(default)]
    pub flags: i64,
    #[serde(default)]
    pub permissions: Option<i64>,
    #[serde(default)]
    pub icon_id: String,
    #[serde(default)]
    pub legacy_icon: i8,
    #[serde(default)]
    pub color: String,
    #[serde(default)]
    pub quote: Option<String>,
    #[serde(default)]
    pub last_seen_at: Option<i64>,
}

/// Id of the placeholder that stands in for deleted or unknown users.
pub const DELETED_USER_ID: i64 = 1;

impl User {
    /// The placeholder shown as the author of posts whose author is gone.
    pub fn deleted() -> Self {
        Self {
            id: DELETED_USER_ID,
            username: "Deleted".into(),
            flags: 0,
            permissions: None,
            icon_id: String::new(),
            legacy_icon: 0,
            color: String::new(),
            quote: None,
            last_seen_at: None,
        }
    }
}

/// A post in a chat or on home.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Post {
    pub id: i64,
    /// `0` is home, `1` is livechat.
    pub chat_id: i64,
    #[serde(default)]
    pub author_id: Option<i64>,
    #[serde(default)]
    pub reply_to_ids: Option<Vec<i64>>,
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub emoji_ids: Option<Vec<String>>,
    #[serde(default)]
    pub sticker_ids: Option<Vec<String>>,
    #[serde(default)]
    pub attachment_ids: Option<Vec<String>>,
    #[serde(default)]
    pub reactions: Option<Vec<ReactionIndex>>,
    #[serde(default)]
    pub last_edited: Option<i64>,
    #[serde(default)]
    pub pinned: Option<bool>,
}

/// An uploaded file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attachment {
    pub id: String,
    pub mime: String,
    pub filename: String,
    pub size: i64,
    pub width: i64,
    pub height: i64,
}

/// A custom emoji or sticker belonging to a chat.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Emote {
    pub id: String,
    pub chat_id: i64,
    pub name: String,
    #[serde(default)]
    pub animated: bool,
}

/// Reaction count for one emoji on a post.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReactionIndex {
    pub emoji: String,
    pub count: i64,
}
