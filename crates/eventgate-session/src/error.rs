//! Error types for the session layer.

use eventgate_protocol::ProtocolError;

use crate::SessionId;

/// Errors that can occur while creating, resuming, or attaching sessions.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// No live session has this id. It never existed, or it ended.
    #[error("session {0} not found")]
    NotFound(SessionId),

    /// The session ended before the operation could complete.
    #[error("session {0} has ended")]
    Ended(SessionId),

    /// A packet or greeting could not be encoded.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// Writing to a newly attached connection failed or timed out.
    #[error("connection write failed: {0}")]
    Transport(String),

    /// The task generating a session id panicked or was cancelled.
    #[error("session id generation failed: {0}")]
    IdGeneration(#[source] tokio::task::JoinError),
}
