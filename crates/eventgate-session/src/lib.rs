//! Client sessions and the hub that owns them.
//!
//! # How it fits in the stack
//!
//! ```text
//! Ingestion (above)   → hands the hub envelopes to publish
//!     ↓
//! Session Layer (this crate)
//!     Hub      → assigns nonces, fans packets out to sessions
//!     Session  → queues, delivers, remembers, and replays packets
//!     ↓
//! Transport (below)   → the attached connection, if any
//! ```
//!
//! A session keeps running while no connection is attached. Clients
//! reconnect with their session id and the last nonce they saw; the
//! session replays whatever they missed from its history.

mod config;
mod error;
mod hub;
mod jobs;
mod queue;
mod session;

pub use config::SessionConfig;
pub use error::SessionError;
pub use hub::{Audience, Hub};
pub use jobs::JobQueue;
pub use session::{Session, SessionSnapshot, SessionState};

/// Sessions are identified by snowflakes from the hub's generator.
pub type SessionId = eventgate_snowflake::Snowflake;
