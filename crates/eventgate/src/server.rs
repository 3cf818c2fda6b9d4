//! `EventgateServer` builder and server loop.
//!
//! This is the entry point for running an Eventgate node. It ties the
//! layers together: transport → session hub ← ingestion.

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use eventgate_ingest::{EventSource, Ingestor};
use eventgate_session::{Hub, SessionConfig};
use eventgate_snowflake::SnowflakeGenerator;
use eventgate_transport::{PendingConnection, Transport, WebSocketConnection, WebSocketTransport};

use crate::EventgateError;
use crate::handler::handle_connection;

/// Default listen address.
pub const DEFAULT_BIND_ADDR: &str = "127.0.0.1:3000";

/// How long a client may take to complete the WebSocket upgrade.
pub const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);

type Ingestion = Pin<Box<dyn Future<Output = ()> + Send>>;

/// Builder for configuring and starting an Eventgate server.
///
/// # Example
///
/// ```rust,ignore
/// use eventgate::prelude::*;
///
/// let source = RedisSource::connect("redis://127.0.0.1/", DEFAULT_CHANNEL).await?;
/// let server = EventgateServer::builder()
///     .bind("0.0.0.0:3000")
///     .build(source)
///     .await?;
/// server.run().await
/// ```
pub struct EventgateServerBuilder {
    bind_addr: String,
    session_config: SessionConfig,
    node_id: u16,
}

impl EventgateServerBuilder {
    /// Creates a new builder with default settings.
    pub fn new() -> Self {
        Self {
            bind_addr: DEFAULT_BIND_ADDR.to_string(),
            session_config: SessionConfig::default(),
            node_id: 0,
        }
    }

    /// Sets the address to bind the server to.
    pub fn bind(mut self, addr: &str) -> Self {
        self.bind_addr = addr.to_string();
        self
    }

    /// Sets the session configuration.
    pub fn session_config(mut self, config: SessionConfig) -> Self {
        self.session_config = config;
        self
    }

    /// Sets the node id stamped into session ids. Nodes sharing an event
    /// channel must use distinct ids.
    pub fn node_id(mut self, node_id: u16) -> Self {
        self.node_id = node_id;
        self
    }

    /// Binds the listener and sets up the hub. Events are read from
    /// `source` once the server runs.
    ///
    /// # Errors
    /// [`EventgateError::Snowflake`] for an out-of-range node id, or
    /// [`EventgateError::Transport`] if binding fails.
    pub async fn build<S: EventSource + 'static>(
        self,
        source: S,
    ) -> Result<EventgateServer, EventgateError> {
        let ids = SnowflakeGenerator::new(self.node_id)?;
        let transport = WebSocketTransport::bind(&self.bind_addr).await?;
        let hub = Hub::new(self.session_config, ids);

        let ingestor = Ingestor::new(hub.clone());
        let ingestion = Box::pin(async move {
            match ingestor.run(source).await {
                Ok(()) => tracing::warn!("event source exhausted, no further events"),
                Err(e) => tracing::error!(error = %e, "event ingestion stopped"),
            }
        });

        Ok(EventgateServer {
            transport,
            hub,
            ingestion,
        })
    }
}

impl Default for EventgateServerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// A bound Eventgate server.
///
/// Call [`run()`](Self::run) to start ingesting and accepting connections.
pub struct EventgateServer {
    transport: WebSocketTransport,
    hub: Hub<WebSocketConnection>,
    ingestion: Ingestion,
}

impl EventgateServer {
    /// Creates a new builder.
    pub fn builder() -> EventgateServerBuilder {
        EventgateServerBuilder::new()
    }

    /// Returns the local address the server is bound to.
    pub fn local_addr(&self) -> std::io::Result<std::net::SocketAddr> {
        self.transport.local_addr()
    }

    /// The session hub, for inspection and in-process publishing.
    pub fn hub(&self) -> &Hub<WebSocketConnection> {
        &self.hub
    }

    /// Runs until the process is terminated.
    pub async fn run(self) -> Result<(), EventgateError> {
        self.run_until(std::future::pending()).await
    }

    /// Runs the ingestion task and the accept loop until `shutdown`
    /// completes, then ends every session.
    pub async fn run_until<F>(mut self, shutdown: F) -> Result<(), EventgateError>
    where
        F: Future<Output = ()> + Send,
    {
        let ingestion = tokio::spawn(self.ingestion);

        tracing::info!(addr = ?self.transport.local_addr().ok(), "Eventgate server running");

        tokio::pin!(shutdown);
        loop {
            tokio::select! {
                () = &mut shutdown => break,
                accepted = self.transport.accept() => match accepted {
                    Ok(pending) => {
                        let hub = self.hub.clone();
                        tokio::spawn(async move {
                            let peer = pending.peer_addr();
                            let upgraded = tokio::time::timeout(HANDSHAKE_TIMEOUT, pending.upgrade()).await;
                            let (conn, handshake) = match upgraded {
                                Ok(Ok(upgraded)) => upgraded,
                                Ok(Err(e)) => {
                                    tracing::debug!(%peer, error = %e, "handshake failed");
                                    return;
                                }
                                Err(_) => {
                                    tracing::debug!(%peer, "handshake timed out");
                                    return;
                                }
                            };
                            if let Err(e) = handle_connection(conn, handshake, hub).await {
                                tracing::debug!(error = %e, "connection ended with error");
                            }
                        });
                    }
                    Err(e) => {
                        tracing::error!(error = %e, "accept failed");
                    }
                },
            }
        }

        tracing::info!("Eventgate server shutting down");
        ingestion.abort();
        self.hub.shutdown().await;
        Ok(())
    }
}
