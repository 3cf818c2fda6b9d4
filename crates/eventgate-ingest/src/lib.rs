//! Domain event ingestion for Eventgate.
//!
//! The backing application publishes domain events (a post was created, a
//! user is typing) on a pub/sub channel. This crate decodes them,
//! translates them into both client protocol versions, and publishes the
//! result through a [`Hub`](eventgate_session::Hub).

pub mod entities;
mod error;
pub mod events;
mod ingestor;
pub mod source;
pub mod translate;

pub use entities::{Attachment, DELETED_USER_ID, Emote, Post, ReactionIndex, User};
pub use error::IngestError;
pub use events::{DomainEvent, Opcode};
pub use ingestor::Ingestor;
pub use source::{ChannelSource, DEFAULT_CHANNEL, EventSource, RedisSource};
pub use translate::{Translation, translate};
