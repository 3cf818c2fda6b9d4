//! The ingestion loop: decode, translate, publish.

use eventgate_session::Hub;
use eventgate_transport::Connection;

use crate::source::EventSource;
use crate::translate::translate;
use crate::{DomainEvent, IngestError};

/// Feeds domain events from a source into a hub.
pub struct Ingestor<C: Connection> {
    hub: Hub<C>,
}

impl<C: Connection> Ingestor<C> {
    pub fn new(hub: Hub<C>) -> Self {
        Self { hub }
    }

    /// Handles one raw message. Returns the published packet's nonce, or
    /// `None` when the opcode is not broadcast.
    ///
    /// # Errors
    /// Any per-message [`IngestError`]; nothing is published in that case.
    pub async fn handle(&self, raw: &[u8]) -> Result<Option<i64>, IngestError> {
        let Some(event) = DomainEvent::decode(raw)? else {
            tracing::trace!(opcode = raw[0], "opcode not broadcast, skipping");
            return Ok(None);
        };
        let translation = translate(&event);
        let nonce = self
            .hub
            .publish(translation.legacy, translation.current, &translation.audience)
            .await?;
        tracing::debug!(opcode = ?event.opcode(), nonce, "event published");
        Ok(Some(nonce))
    }

    /// Runs until the source is exhausted or fails.
    ///
    /// Bad messages are logged and skipped.
    ///
    /// # Errors
    /// The source's error, if reading from it fails.
    pub async fn run<S: EventSource>(&self, mut source: S) -> Result<(), IngestError> {
        tracing::info!("ingestion started");
        while let Some(raw) = source.next().await? {
            if let Err(e) = self.handle(&raw).await {
                tracing::warn!(error = %e, len = raw.len(), "dropping event");
            }
        }
        tracing::info!("event source exhausted");
        Ok(())
    }
}
