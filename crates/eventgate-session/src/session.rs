//! A resumable client session.
//!
//! A [`Session`] outlives the connections that carry it. Packets keep
//! flowing into its queue and history while no connection is attached,
//! and a client that reconnects within one ping interval picks up where
//! it left off by presenting the last nonce it saw.
//!
//! ```text
//!                 attach              read error / write failure
//!  Connecting ──────────────→ Active ─────────────────────────→ Disconnected
//!      │                        ↑  │                                │
//!      │                        └──┼────────── attach ──────────────┘
//!      │                           │ clean close                    │
//!      └── grace elapsed ──────────┴──────→ Ended ←── grace elapsed ┘
//! ```
//!
//! Each session runs two tasks for its whole life (delivery and
//! housekeeping) plus a read task and a write task per attached
//! connection. Connection writes happen only on the write task, never
//! under the session lock.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use eventgate_protocol::{Encoding, Hello, Packet, hello_frame};
use eventgate_transport::{CloseReason, Connection, ConnectionId, Frame};
use rand::Rng;
use tokio::sync::{Mutex, mpsc, oneshot};
use tokio::time::{Instant, MissedTickBehavior};

use crate::hub::HubInner;
use crate::jobs::JobQueue;
use crate::queue::{OutboundQueue, Push};
use crate::{SessionConfig, SessionError, SessionId};

// ---------------------------------------------------------------------------
// SessionState
// ---------------------------------------------------------------------------

/// Where a session is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Created, no connection attached yet.
    Connecting,
    /// A connection is attached and receiving packets.
    Active,
    /// The last connection dropped; packets are only buffered.
    Disconnected,
    /// Terminal. The session is gone from the hub.
    Ended,
}

/// Point-in-time view of a session, for inspection and tests.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionSnapshot {
    pub state: SessionState,
    pub connection: Option<ConnectionId>,
    pub encoding: Option<Encoding>,
    pub last_seen: Option<i64>,
    /// Nonces currently held for replay, oldest first.
    pub history: Vec<i64>,
}

// ---------------------------------------------------------------------------
// Session
// ---------------------------------------------------------------------------

/// Work for an attachment's write task, processed in order.
enum Outgoing {
    Frame(Frame),
    Ping,
    /// Signalled once everything queued before it was written.
    Flushed(oneshot::Sender<()>),
}

struct Attachment<C> {
    conn: Arc<C>,
    encoding: Encoding,
    /// Dropping this ends the write task once its backlog is written.
    outgoing: mpsc::UnboundedSender<Outgoing>,
}

struct SessionCore<C> {
    state: SessionState,
    attachment: Option<Attachment<C>>,
    history: VecDeque<Arc<Packet>>,
    last_seen: Option<i64>,
    /// Set while no connection is attached. Starts at creation so a client
    /// that never attaches still expires.
    disconnected_at: Option<Instant>,
}

struct SessionShared<C: Connection> {
    id: SessionId,
    config: SessionConfig,
    /// Frames are handed to the write task while this is held, so replay
    /// and live delivery to one connection never interleave.
    core: Mutex<SessionCore<C>>,
    queue: OutboundQueue,
    ended: AtomicBool,
    jobs: JobQueue,
    hub: Weak<HubInner<C>>,
}

/// Handle to a session. Cheap to clone; all clones refer to the same
/// session.
pub struct Session<C: Connection> {
    shared: Arc<SessionShared<C>>,
}

impl<C: Connection> Clone for Session<C> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<C: Connection> Session<C> {
    /// Creates a session and spawns its delivery and housekeeping tasks.
    pub(crate) fn start(
        id: SessionId,
        config: SessionConfig,
        jobs: JobQueue,
        hub: Weak<HubInner<C>>,
    ) -> Self {
        let session = Self {
            shared: Arc::new(SessionShared {
                id,
                queue: OutboundQueue::new(config.queue_capacity),
                core: Mutex::new(SessionCore {
                    state: SessionState::Connecting,
                    attachment: None,
                    history: VecDeque::new(),
                    last_seen: None,
                    disconnected_at: Some(Instant::now()),
                }),
                config,
                ended: AtomicBool::new(false),
                jobs,
                hub,
            }),
        };
        tokio::spawn(session.clone().deliver_loop());
        tokio::spawn(session.clone().housekeeping_loop());
        session
    }

    pub fn id(&self) -> SessionId {
        self.shared.id
    }

    /// `true` once [`end`](Self::end) has run. Never goes back to `false`.
    pub fn is_ended(&self) -> bool {
        self.shared.ended.load(Ordering::Acquire)
    }

    pub async fn state(&self) -> SessionState {
        self.shared.core.lock().await.state
    }

    pub async fn snapshot(&self) -> SessionSnapshot {
        let core = self.shared.core.lock().await;
        SessionSnapshot {
            state: core.state,
            connection: core.attachment.as_ref().map(|a| a.conn.id()),
            encoding: core.attachment.as_ref().map(|a| a.encoding),
            last_seen: core.last_seen,
            history: core.history.iter().map(|p| p.nonce()).collect(),
        }
    }

    // -- Connections --------------------------------------------------------

    /// Attaches a connection, replacing any current one.
    ///
    /// The previous connection, if any, is closed as superseded without
    /// waiting on its pending writes. The new one receives the hello
    /// greeting, then every packet in history with a nonce greater than
    /// `resume_from` in order. With no `resume_from` nothing is replayed.
    /// Returns once the greeting and replay are written.
    ///
    /// # Errors
    /// - [`SessionError::Ended`] if the session already ended; the
    ///   connection is closed.
    /// - [`SessionError::Transport`] if the greeting or replay could not be
    ///   written within the write timeout; the session is left detached.
    pub async fn attach(
        &self,
        conn: C,
        encoding: Encoding,
        resume_from: Option<i64>,
    ) -> Result<(), SessionError> {
        let session_id = self.shared.id;
        let conn = Arc::new(conn);
        let conn_id = conn.id();
        let hello = hello_frame(
            encoding,
            Hello {
                session_id: session_id.to_string(),
                ping_interval: self.shared.config.ping_interval.as_millis() as u64,
            },
        )?;

        let (greeted_tx, greeted_rx) = oneshot::channel();
        let mut core = self.shared.core.lock().await;
        if core.state == SessionState::Ended {
            self.close_later(conn, CloseReason::SessionEnded);
            return Err(SessionError::Ended(session_id));
        }

        if let Some(previous) = core.attachment.take() {
            tracing::debug!(%session_id, conn_id = %previous.conn.id(), "connection superseded");
            self.close_later(previous.conn, CloseReason::Superseded);
        }

        let (outgoing, rx) = mpsc::unbounded_channel();
        let _ = outgoing.send(Outgoing::Frame(hello));
        let mut replayed = 0usize;
        if let Some(after) = resume_from {
            for frame in core
                .history
                .iter()
                .filter(|p| p.nonce() > after)
                .filter_map(|p| p.frame(encoding))
            {
                let _ = outgoing.send(Outgoing::Frame(frame));
                replayed += 1;
            }
        }
        let _ = outgoing.send(Outgoing::Flushed(greeted_tx));

        core.attachment = Some(Attachment {
            conn: Arc::clone(&conn),
            encoding,
            outgoing,
        });
        core.state = SessionState::Active;
        core.disconnected_at = None;
        drop(core);

        tokio::spawn(self.clone().write_loop(Arc::clone(&conn), rx));
        tokio::spawn(self.clone().read_loop(Arc::clone(&conn)));

        match tokio::time::timeout(self.shared.config.write_timeout, greeted_rx).await {
            Ok(Ok(())) => {}
            Ok(Err(_)) => {
                return Err(SessionError::Transport(format!("greeting to {conn_id} failed")));
            }
            Err(_) => {
                let mut core = self.shared.core.lock().await;
                self.detach_locked(&mut core, conn_id, Some(CloseReason::Normal));
                return Err(SessionError::Transport(format!("greeting to {conn_id} timed out")));
            }
        }

        tracing::info!(
            %session_id,
            %conn_id,
            ?encoding,
            resume_from = ?resume_from,
            replayed,
            "connection attached"
        );
        Ok(())
    }

    /// Detaches and closes the current connection, if any. The session
    /// stays resumable for one ping interval.
    pub async fn detach(&self) {
        let mut core = self.shared.core.lock().await;
        if let Some(conn_id) = core.attachment.as_ref().map(|a| a.conn.id()) {
            self.detach_locked(&mut core, conn_id, Some(CloseReason::Normal));
        }
    }

    /// Detaches `conn_id` if it is still the attached connection.
    fn detach_locked(
        &self,
        core: &mut SessionCore<C>,
        conn_id: ConnectionId,
        close: Option<CloseReason>,
    ) -> bool {
        if core.attachment.as_ref().map(|a| a.conn.id()) != Some(conn_id) {
            return false;
        }
        let Some(attachment) = core.attachment.take() else {
            return false;
        };
        core.state = SessionState::Disconnected;
        core.disconnected_at = Some(Instant::now());
        if let Some(reason) = close {
            self.close_later(attachment.conn, reason);
        }
        tracing::info!(session_id = %self.shared.id, %conn_id, "connection detached");
        true
    }

    fn close_later(&self, conn: Arc<C>, reason: CloseReason) {
        self.shared
            .jobs
            .submit("close_connection", async move { conn.close(reason).await });
    }

    // -- Packets ------------------------------------------------------------

    /// Queues a packet for delivery without waiting.
    ///
    /// When the queue is full the oldest undelivered packet is dropped.
    /// Does nothing once the session has ended.
    pub fn enqueue(&self, packet: Arc<Packet>) {
        match self.shared.queue.push(packet) {
            Push::Queued | Push::Closed => {}
            Push::DroppedOldest(nonce) => {
                tracing::warn!(
                    session_id = %self.shared.id,
                    nonce,
                    "outbound queue full, dropped oldest packet"
                );
            }
        }
    }

    async fn deliver(&self, packet: Arc<Packet>) {
        let session_id = self.shared.id;
        let mut core = self.shared.core.lock().await;
        if core.state == SessionState::Ended {
            return;
        }

        let nonce = packet.nonce();
        if core.last_seen.is_some_and(|seen| nonce <= seen) {
            tracing::trace!(%session_id, nonce, "stale packet skipped");
            return;
        }
        core.last_seen = Some(nonce);

        if let Some(attachment) = core.attachment.as_ref() {
            if let Some(frame) = packet.frame(attachment.encoding) {
                let _ = attachment.outgoing.send(Outgoing::Frame(frame));
            }
        }

        core.history.push_back(packet);
        while core.history.len() > self.shared.config.history_limit {
            core.history.pop_front();
        }
    }

    // -- Lifecycle ----------------------------------------------------------

    /// Ends the session: deregisters it, drops its queue and history, and
    /// closes any attached connection. Safe to call more than once.
    pub async fn end(&self) {
        if self.shared.ended.swap(true, Ordering::AcqRel) {
            return;
        }
        let session_id = self.shared.id;

        {
            let mut core = self.shared.core.lock().await;
            core.state = SessionState::Ended;
            core.history.clear();
            if let Some(attachment) = core.attachment.take() {
                self.close_later(attachment.conn, CloseReason::SessionEnded);
            }
        }
        self.shared.queue.close();

        if let Some(hub) = self.shared.hub.upgrade() {
            hub.deregister(session_id).await;
        }
        tracing::info!(%session_id, "session ended");
    }

    /// One housekeeping pass: prune history older than one ping interval,
    /// then ping the attached connection or, if detached for a full ping
    /// interval, end the session.
    pub async fn housekeep(&self) {
        let session_id = self.shared.id;
        let ping_interval = self.shared.config.ping_interval;
        let mut core = self.shared.core.lock().await;
        if core.state == SessionState::Ended {
            return;
        }

        let before = core.history.len();
        while core
            .history
            .front()
            .is_some_and(|p| p.age() >= ping_interval)
        {
            core.history.pop_front();
        }
        let pruned = before - core.history.len();
        if pruned > 0 {
            tracing::trace!(%session_id, pruned, "history pruned");
        }

        if let Some(attachment) = core.attachment.as_ref() {
            let _ = attachment.outgoing.send(Outgoing::Ping);
            return;
        }

        let expired = core
            .disconnected_at
            .is_none_or(|at| at.elapsed() >= ping_interval);
        drop(core);
        if expired {
            tracing::debug!(%session_id, "resume window elapsed");
            self.end().await;
        }
    }

    // -- Tasks --------------------------------------------------------------

    async fn deliver_loop(self) {
        while let Some(packet) = self.shared.queue.pop().await {
            self.deliver(packet).await;
        }
        tracing::trace!(session_id = %self.shared.id, "delivery task finished");
    }

    async fn housekeeping_loop(self) {
        let period = self.shared.config.ping_interval;
        let jitter = first_tick_jitter(self.shared.config.housekeeping_jitter);
        let mut ticker = tokio::time::interval_at(Instant::now() + period + jitter, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;
            if self.is_ended() {
                break;
            }
            self.housekeep().await;
        }
    }

    /// Writes one connection's frames and pings in order. A failed or
    /// timed-out write detaches the connection if it is still attached.
    async fn write_loop(self, conn: Arc<C>, mut rx: mpsc::UnboundedReceiver<Outgoing>) {
        let session_id = self.shared.id;
        let conn_id = conn.id();
        let limit = self.shared.config.write_timeout;

        while let Some(item) = rx.recv().await {
            let (what, result) = match item {
                Outgoing::Frame(frame) => {
                    ("write", tokio::time::timeout(limit, conn.send(frame)).await)
                }
                Outgoing::Ping => ("ping", tokio::time::timeout(limit, conn.ping()).await),
                Outgoing::Flushed(done) => {
                    let _ = done.send(());
                    continue;
                }
            };
            let error = match result {
                Ok(Ok(())) => continue,
                Ok(Err(e)) => e.to_string(),
                Err(_) => format!("timed out after {limit:?}"),
            };
            tracing::warn!(%session_id, %conn_id, error = %error, "connection {what} failed");
            let mut core = self.shared.core.lock().await;
            self.detach_locked(&mut core, conn_id, Some(CloseReason::Normal));
            return;
        }
    }

    /// Watches one connection for closure. Inbound data is ignored.
    async fn read_loop(self, conn: Arc<C>) {
        let conn_id = conn.id();
        let clean = loop {
            match conn.recv().await {
                Ok(Some(_)) => continue,
                Ok(None) => break true,
                Err(e) => {
                    tracing::debug!(session_id = %self.shared.id, %conn_id, error = %e, "connection read failed");
                    break false;
                }
            }
        };
        drop(conn);

        let mut core = self.shared.core.lock().await;
        if clean {
            if self.detach_locked(&mut core, conn_id, None) {
                drop(core);
                tracing::info!(session_id = %self.shared.id, %conn_id, "client closed session");
                self.end().await;
            }
        } else {
            self.detach_locked(&mut core, conn_id, None);
        }
    }
}

fn first_tick_jitter(max: Duration) -> Duration {
    let max_us = max.as_micros() as u64;
    if max_us == 0 {
        return Duration::ZERO;
    }
    Duration::from_micros(rand::rng().random_range(0..max_us))
}
