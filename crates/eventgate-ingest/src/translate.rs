//! Turns domain events into client envelopes.
//!
//! Each event yields a legacy envelope (unless the event kind has no
//! legacy shape) and a current envelope. Both are addressed to every
//! session; this layer has no notion of who may see what.

use std::collections::HashMap;

use eventgate_protocol::{
    BulkDeletePosts, ChatRef, CurrentDeletePost, CurrentEnvelope, CurrentEvent, CurrentTyping,
    CurrentUser, LegacyAttachment, LegacyCreatePost, LegacyDeletePost, LegacyEmote,
    LegacyEnvelope, LegacyEvent, LegacyPost, LegacyReactionIndex, LegacyTimestamp, LegacyTyping,
    LegacyUser, POST_TYPE_REGULAR, ReactionUpdate, RelationshipUpdate, TYPING_STATE_CHAT,
    TYPING_STATE_HOME,
};
use eventgate_session::Audience;
use eventgate_snowflake::Snowflake;

use crate::entities::{Attachment, Emote, Post, ReactionIndex, User};
use crate::events::{self, DomainEvent, PostEvent};

/// The envelopes for one event and who receives them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Translation {
    /// `None` when legacy clients have no form of this event.
    pub legacy: Option<LegacyEnvelope>,
    pub current: CurrentEnvelope,
    pub audience: Audience,
}

impl Translation {
    fn both(legacy: LegacyEvent, current: CurrentEvent) -> Self {
        Self {
            legacy: Some(LegacyEnvelope::new(legacy)),
            current: CurrentEnvelope::new(current),
            audience: Audience::All,
        }
    }

    fn current_only(current: CurrentEvent) -> Self {
        Self {
            legacy: None,
            current: CurrentEnvelope::new(current),
            audience: Audience::All,
        }
    }
}

/// Builds both envelopes for an event.
pub fn translate(event: &DomainEvent) -> Translation {
    match event {
        DomainEvent::UpdateUser(e) => Translation::both(
            LegacyEvent::UpdateProfile(legacy_user(&e.user)),
            CurrentEvent::UpdateProfile(current_user(&e.user)),
        ),
        DomainEvent::UpdateRelationship(e) => relationship(e),
        DomainEvent::Typing(e) => typing(e),
        DomainEvent::CreatePost(e) => {
            let post = render_post(&e.post, e, true);
            Translation::both(
                LegacyEvent::CreatePost(LegacyCreatePost { post: post.clone() }),
                CurrentEvent::Post(post),
            )
        }
        DomainEvent::UpdatePost(e) => {
            let post = render_post(&e.post, e, true);
            Translation::both(
                LegacyEvent::UpdatePost(post.clone()),
                CurrentEvent::UpdatePost(post),
            )
        }
        DomainEvent::DeletePost(e) => Translation::both(
            LegacyEvent::DeletePost(LegacyDeletePost {
                post_id: e.post_id.to_string(),
            }),
            CurrentEvent::DeletePost(CurrentDeletePost {
                chat_id: ChatRef::from(e.chat_id),
                post_id: e.post_id.to_string(),
            }),
        ),
        DomainEvent::BulkDeletePosts(e) => {
            Translation::current_only(CurrentEvent::BulkDeletePosts(BulkDeletePosts {
                chat_id: ChatRef::from(e.chat_id),
                start_id: e.start_id.to_string(),
                end_id: e.end_id.to_string(),
                post_ids: e.post_ids.iter().map(ToString::to_string).collect(),
            }))
        }
        DomainEvent::PostReactionAdd(e) => Translation::both(
            LegacyEvent::PostReactionAdd(reaction(e, legacy_user)),
            CurrentEvent::PostReactionAdd(reaction(e, current_user)),
        ),
        DomainEvent::PostReactionRemove(e) => Translation::both(
            LegacyEvent::PostReactionRemove(reaction(e, legacy_user)),
            CurrentEvent::PostReactionRemove(reaction(e, current_user)),
        ),
    }
}

// ---------------------------------------------------------------------------
// Per-event builders
// ---------------------------------------------------------------------------

fn relationship(e: &events::UpdateRelationship) -> Translation {
    Translation::both(
        LegacyEvent::UpdateRelationship(RelationshipUpdate {
            user: legacy_user(&e.to),
            username: e.to.username.clone(),
            state: e.state,
            updated_at: e.updated_at,
        }),
        CurrentEvent::UpdateRelationship(RelationshipUpdate {
            user: current_user(&e.to),
            username: e.to.username.clone(),
            state: e.state,
            updated_at: e.updated_at,
        }),
    )
}

fn typing(e: &events::Typing) -> Translation {
    // Legacy clients only know livechat; home typing shows up there with
    // its own state code.
    let legacy = LegacyTyping {
        chat_id: match e.chat_id {
            0 | 1 => "livechat".to_owned(),
            id => id.to_string(),
        },
        state: if e.chat_id == 0 {
            TYPING_STATE_HOME
        } else {
            TYPING_STATE_CHAT
        },
        username: e.user.username.clone(),
    };
    let current = CurrentTyping {
        chat_id: ChatRef::from(e.chat_id),
        user: current_user(&e.user),
        username: e.user.username.clone(),
    };
    Translation::both(LegacyEvent::Typing(legacy), CurrentEvent::Typing(current))
}

fn reaction<U>(e: &events::PostReaction, user: fn(&User) -> U) -> ReactionUpdate<U> {
    ReactionUpdate {
        chat_id: ChatRef::from(e.chat_id),
        post_id: e.post_id.to_string(),
        emoji: e.emoji.clone(),
        user: user(&e.user),
        username: e.user.username.clone(),
    }
}

// ---------------------------------------------------------------------------
// Entity rendering
// ---------------------------------------------------------------------------

pub(crate) fn legacy_user(user: &User) -> LegacyUser {
    LegacyUser {
        id: user.id.to_string(),
        username: user.username.clone(),
        flags: user.flags,
        avatar: user.icon_id.clone(),
        legacy_avatar: user.legacy_icon,
        color: user.color.clone(),
        quote: user.quote.clone(),
    }
}

pub(crate) fn current_user(user: &User) -> CurrentUser {
    CurrentUser {
        id: user.id.to_string(),
        username: user.username.clone(),
        flags: user.flags,
        icon: user.icon_id.clone(),
        legacy_icon: user.legacy_icon,
        color: user.color.clone(),
        quote: user.quote.clone(),
    }
}

fn emote(emote: &Emote) -> LegacyEmote {
    LegacyEmote {
        id: emote.id.clone(),
        chat_id: emote.chat_id.to_string(),
        name: emote.name.clone(),
        animated: emote.animated,
    }
}

fn attachment(attachment: &Attachment) -> LegacyAttachment {
    LegacyAttachment {
        id: attachment.id.clone(),
        filename: attachment.filename.clone(),
        mime: attachment.mime.clone(),
        size: attachment.size,
        width: attachment.width,
        height: attachment.height,
    }
}

fn reaction_index(index: &ReactionIndex) -> LegacyReactionIndex {
    LegacyReactionIndex {
        emoji: index.emoji.clone(),
        count: index.count,
        user_reacted: false,
    }
}

fn lookup<'a, K, V, T>(ids: Option<&'a [K]>, table: &'a HashMap<K, V>, render: fn(&V) -> T) -> Vec<T>
where
    K: std::hash::Hash + Eq,
{
    ids.unwrap_or_default()
        .iter()
        .filter_map(|id| table.get(id))
        .map(render)
        .collect()
}

/// Renders a post. Replies are rendered one level deep; a reply whose
/// original is gone or nil becomes `None`. A missing or nil author is the
/// deleted-user placeholder.
fn render_post(post: &Post, ctx: &PostEvent, with_replies: bool) -> LegacyPost {
    let author = post.author_id.map(|id| match ctx.users.get(&id) {
        Some(Some(user)) => legacy_user(user),
        Some(None) | None => legacy_user(&User::deleted()),
    });
    let author_username = author
        .as_ref()
        .map(|a| a.username.clone())
        .unwrap_or_default();

    let reply_to = if with_replies {
        post.reply_to_ids
            .as_deref()
            .unwrap_or_default()
            .iter()
            .map(|id| {
                ctx.reply_to
                    .get(id)
                    .and_then(Option::as_ref)
                    .map(|reply| render_post(reply, ctx, false))
            })
            .collect()
    } else {
        Vec::new()
    };

    LegacyPost {
        id: post.id.to_string(),
        post_id: post.id.to_string(),
        chat: ChatRef::from(post.chat_id),
        kind: POST_TYPE_REGULAR,
        author,
        author_username,
        reply_to,
        timestamp: LegacyTimestamp {
            unix: Snowflake(post.id).timestamp_ms(),
        },
        content: post.content.clone().unwrap_or_default(),
        emojis: lookup(post.emoji_ids.as_deref(), &ctx.emotes, emote),
        stickers: lookup(post.sticker_ids.as_deref(), &ctx.emotes, emote),
        attachments: lookup(post.attachment_ids.as_deref(), &ctx.attachments, attachment),
        reactions: post
            .reactions
            .as_deref()
            .unwrap_or_default()
            .iter()
            .map(reaction_index)
            .collect(),
        last_edited: post.last_edited,
        pinned: post.pinned,
        deleted: false,
    }
}
