//! The hub: registry of live sessions and source of packet nonces.
//!
//! One [`Hub`] exists per server. It creates sessions, finds them again for
//! resumption, and fans packets out to them. Sessions deregister
//! themselves when they end.
//!
//! # Locking
//!
//! The session map sits behind a Tokio `RwLock`; the nonce counter has its
//! own `std::sync::Mutex`, held only to read and bump the value. Fan-out
//! takes the map's read lock and pushes onto each session's queue without
//! awaiting, so a slow client never holds the map.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use eventgate_protocol::{CurrentEnvelope, LegacyEnvelope, NonceSource, Packet};
use eventgate_snowflake::SnowflakeGenerator;
use eventgate_transport::Connection;
use tokio::sync::RwLock;

use crate::jobs::JobQueue;
use crate::{Session, SessionConfig, SessionError, SessionId};

/// Which sessions a packet goes to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Audience {
    /// Every live session.
    All,
    /// Only these sessions. Unknown ids are ignored.
    Sessions(Vec<SessionId>),
}

pub(crate) struct HubInner<C: Connection> {
    sessions: RwLock<HashMap<SessionId, Session<C>>>,
    nonce: Mutex<i64>,
    ids: SnowflakeGenerator,
    config: SessionConfig,
    jobs: JobQueue,
}

impl<C: Connection> HubInner<C> {
    pub(crate) async fn deregister(&self, id: SessionId) {
        self.sessions.write().await.remove(&id);
    }
}

/// Registry of live sessions. Cheap to clone; clones share the registry.
pub struct Hub<C: Connection> {
    inner: Arc<HubInner<C>>,
}

impl<C: Connection> Clone for Hub<C> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<C: Connection> Hub<C> {
    /// Creates an empty hub. Must be called inside a Tokio runtime.
    ///
    /// Session ids come from `ids`, so hubs on different nodes should use
    /// generators with different node ids.
    pub fn new(config: SessionConfig, ids: SnowflakeGenerator) -> Self {
        Self {
            inner: Arc::new(HubInner {
                sessions: RwLock::new(HashMap::new()),
                nonce: Mutex::new(0),
                ids,
                config: config.validated(),
                jobs: JobQueue::start(),
            }),
        }
    }

    pub fn config(&self) -> &SessionConfig {
        &self.inner.config
    }

    /// Resolves a connecting client to a session.
    ///
    /// With `Some(id)` returns the live session with that id. With `None`
    /// creates, registers, and starts a new session.
    ///
    /// # Errors
    /// [`SessionError::NotFound`] if `id` names no live session. Nothing is
    /// created in that case.
    pub async fn connect(&self, resume: Option<SessionId>) -> Result<Session<C>, SessionError> {
        if let Some(id) = resume {
            let sessions = self.inner.sessions.read().await;
            return match sessions.get(&id) {
                Some(session) if !session.is_ended() => {
                    tracing::debug!(session_id = %id, "session found for resume");
                    Ok(session.clone())
                }
                _ => Err(SessionError::NotFound(id)),
            };
        }

        // Exhausting a millisecond makes the generator spin until the clock
        // moves, so it runs off the async workers.
        let inner = Arc::clone(&self.inner);
        let id = tokio::task::spawn_blocking(move || inner.ids.generate())
            .await
            .map_err(SessionError::IdGeneration)?;
        let session = Session::start(
            id,
            self.inner.config.clone(),
            self.inner.jobs.clone(),
            Arc::downgrade(&self.inner),
        );
        self.inner.sessions.write().await.insert(id, session.clone());
        tracing::info!(session_id = %id, "session created");
        Ok(session)
    }

    /// Takes the next packet nonce. The first is `0`.
    pub fn next_nonce(&self) -> i64 {
        let mut nonce = self.inner.nonce.lock().unwrap_or_else(PoisonError::into_inner);
        let current = *nonce;
        *nonce += 1;
        current
    }

    /// Queues `packet` on every session in `audience`. Returns how many
    /// sessions it was queued on.
    pub async fn dispatch(&self, packet: Arc<Packet>, audience: &Audience) -> usize {
        let sessions = self.inner.sessions.read().await;
        match audience {
            Audience::All => {
                for session in sessions.values() {
                    session.enqueue(Arc::clone(&packet));
                }
                sessions.len()
            }
            Audience::Sessions(ids) => {
                let mut queued = 0;
                for session in ids.iter().filter_map(|id| sessions.get(id)) {
                    session.enqueue(Arc::clone(&packet));
                    queued += 1;
                }
                queued
            }
        }
    }

    /// Builds a packet from the two envelopes and dispatches it. Returns the
    /// packet's nonce.
    ///
    /// # Errors
    /// [`SessionError::Protocol`] if an envelope fails to encode. Nothing is
    /// dispatched, but the nonce is spent.
    pub async fn publish(
        &self,
        legacy: Option<LegacyEnvelope>,
        current: CurrentEnvelope,
        audience: &Audience,
    ) -> Result<i64, SessionError> {
        let packet = Arc::new(Packet::build(self, legacy, current)?);
        let nonce = packet.nonce();
        let recipients = self.dispatch(packet, audience).await;
        tracing::trace!(nonce, recipients, "packet published");
        Ok(nonce)
    }

    pub async fn get(&self, id: SessionId) -> Option<Session<C>> {
        self.inner.sessions.read().await.get(&id).cloned()
    }

    /// Number of live sessions.
    pub async fn len(&self) -> usize {
        self.inner.sessions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.inner.sessions.read().await.is_empty()
    }

    pub async fn session_ids(&self) -> Vec<SessionId> {
        self.inner.sessions.read().await.keys().copied().collect()
    }

    /// Ends every session, closing attached connections.
    pub async fn shutdown(&self) {
        let sessions: Vec<Session<C>> = self.inner.sessions.read().await.values().cloned().collect();
        let count = sessions.len();
        for session in sessions {
            session.end().await;
        }
        tracing::info!(sessions = count, "hub shut down");
    }
}

impl<C: Connection> NonceSource for Hub<C> {
    fn next_nonce(&self) -> i64 {
        Hub::next_nonce(self)
    }
}
