//! Entity shapes as clients see them.
//!
//! These are outbound-only views: translators in the ingestion layer build
//! them from domain entities, and the envelope types carry them. Field
//! names follow what each protocol version's clients already parse, which
//! is why the serde renames look irregular.

use std::fmt;

use serde::{Serialize, Serializer};

// ---------------------------------------------------------------------------
// ChatRef
// ---------------------------------------------------------------------------

/// A chat identifier as rendered on the wire.
///
/// Chat `0` is the home feed and chat `1` is livechat; clients know them by
/// name. Every other chat is its decimal id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChatRef {
    /// Chat id `0`.
    Home,
    /// Chat id `1`.
    Livechat,
    /// Any other chat.
    Chat(i64),
}

impl ChatRef {
    /// The numeric id this reference stands for.
    pub fn id(self) -> i64 {
        match self {
            Self::Home => 0,
            Self::Livechat => 1,
            Self::Chat(id) => id,
        }
    }
}

impl From<i64> for ChatRef {
    fn from(id: i64) -> Self {
        match id {
            0 => Self::Home,
            1 => Self::Livechat,
            other => Self::Chat(other),
        }
    }
}

impl fmt::Display for ChatRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Home => f.write_str("home"),
            Self::Livechat => f.write_str("livechat"),
            Self::Chat(id) => write!(f, "{id}"),
        }
    }
}

impl Serialize for ChatRef {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

// ---------------------------------------------------------------------------
// Users
// ---------------------------------------------------------------------------

/// A user in the legacy shape. The username doubles as `_id`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LegacyUser {
    #[serde(rename = "uuid")]
    pub id: String,
    #[serde(rename = "_id")]
    pub username: String,
    pub flags: i64,
    pub avatar: String,
    #[serde(rename = "pfp_data")]
    pub legacy_avatar: i8,
    #[serde(rename = "avatar_color")]
    pub color: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub quote: Option<String>,
}

/// A user in the current shape.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CurrentUser {
    pub id: String,
    pub username: String,
    pub flags: i64,
    pub icon: String,
    pub legacy_icon: i8,
    pub color: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub quote: Option<String>,
}

// ---------------------------------------------------------------------------
// Post and its parts
// ---------------------------------------------------------------------------

/// A custom emoji or sticker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LegacyEmote {
    #[serde(rename = "_id")]
    pub id: String,
    pub chat_id: String,
    pub name: String,
    pub animated: bool,
}

/// An uploaded file attached to a post.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LegacyAttachment {
    pub id: String,
    pub filename: String,
    pub mime: String,
    pub size: i64,
    pub width: i64,
    pub height: i64,
}

/// Reaction totals for one emoji on a post.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LegacyReactionIndex {
    pub emoji: String,
    pub count: i64,
    /// Always `false` in broadcasts; per-user state is not known here.
    pub user_reacted: bool,
}

/// Wrapper for the legacy `t: {e: ...}` timestamp object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct LegacyTimestamp {
    #[serde(rename = "e")]
    pub unix: i64,
}

/// Post type marker for regular chat/home posts.
pub const POST_TYPE_REGULAR: i8 = 1;

/// A post. Both protocol versions share this shape.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LegacyPost {
    #[serde(rename = "_id")]
    pub id: String,
    pub post_id: String,
    #[serde(rename = "post_origin")]
    pub chat: ChatRef,
    #[serde(rename = "type")]
    pub kind: i8,
    pub author: Option<LegacyUser>,
    #[serde(rename = "u")]
    pub author_username: String,
    /// Replied-to posts in order; `None` where the original is gone.
    pub reply_to: Vec<Option<LegacyPost>>,
    #[serde(rename = "t")]
    pub timestamp: LegacyTimestamp,
    #[serde(rename = "p")]
    pub content: String,
    pub emojis: Vec<LegacyEmote>,
    pub stickers: Vec<LegacyEmote>,
    pub attachments: Vec<LegacyAttachment>,
    pub reactions: Vec<LegacyReactionIndex>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_edited: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pinned: Option<bool>,
    #[serde(rename = "isDeleted")]
    pub deleted: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chat_ref_sentinels_render_by_name() {
        assert_eq!(ChatRef::from(0).to_string(), "home");
        assert_eq!(ChatRef::from(1).to_string(), "livechat");
        assert_eq!(ChatRef::from(42).to_string(), "42");
    }

    #[test]
    fn test_chat_ref_serializes_as_string() {
        assert_eq!(serde_json::to_string(&ChatRef::Home).unwrap(), "\"home\"");
        assert_eq!(serde_json::to_string(&ChatRef::from(42)).unwrap(), "\"42\"");
        assert_eq!(ChatRef::from(42).id(), 42);
        assert_eq!(ChatRef::Livechat.id(), 1);
    }

    #[test]
    fn test_legacy_user_field_names() {
        let user = LegacyUser {
            id: "10".into(),
            username: "tnix".into(),
            flags: 0,
            avatar: "abc".into(),
            legacy_avatar: 21,
            color: "#fff".into(),
            quote: None,
        };
        let json = serde_json::to_value(&user).unwrap();
        assert_eq!(json["uuid"], "10");
        assert_eq!(json["_id"], "tnix");
        assert_eq!(json["avatar"], "abc");
        assert_eq!(json["pfp_data"], 21);
        assert_eq!(json["avatar_color"], "#fff");
        assert!(json.get("quote").is_none());
    }

    #[test]
    fn test_current_user_uses_icon_names() {
        let user = CurrentUser {
            id: "10".into(),
            username: "tnix".into(),
            flags: 4,
            icon: "abc".into(),
            legacy_icon: 2,
            color: "#000".into(),
            quote: Some("hi".into()),
        };
        let json = serde_json::to_value(&user).unwrap();
        assert_eq!(json["icon"], "abc");
        assert_eq!(json["legacy_icon"], 2);
        assert_eq!(json["quote"], "hi");
        assert!(json.get("avatar").is_none());
    }
}
