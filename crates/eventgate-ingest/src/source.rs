//! Where raw event messages come from.
//!
//! [`RedisSource`] subscribes to the pub/sub channel the backing
//! application publishes on. [`ChannelSource`] is fed in-process, which
//! is what tests and embedded publishers use.

use std::future::Future;
use std::pin::Pin;

use futures_util::{Stream, StreamExt};
use tokio::sync::mpsc;

use crate::IngestError;

/// Channel the backing application publishes events on by default.
pub const DEFAULT_CHANNEL: &str = "events";

/// A stream of raw event messages.
pub trait EventSource: Send {
    /// Waits for the next message. `Ok(None)` means the source is
    /// exhausted and no more messages will arrive.
    fn next(&mut self) -> impl Future<Output = Result<Option<Vec<u8>>, IngestError>> + Send;
}

// ---------------------------------------------------------------------------
// Redis
// ---------------------------------------------------------------------------

/// Redis pub/sub subscription.
pub struct RedisSource {
    channel: String,
    messages: Pin<Box<dyn Stream<Item = redis::Msg> + Send>>,
}

impl RedisSource {
    /// Connects to `url` and subscribes to `channel`.
    ///
    /// # Errors
    /// [`IngestError::Source`] if the URL is invalid or the connection or
    /// subscription fails.
    pub async fn connect(url: &str, channel: &str) -> Result<Self, IngestError> {
        let client = redis::Client::open(url)?;
        let mut pubsub = client.get_async_pubsub().await?;
        pubsub.subscribe(channel).await?;
        tracing::info!(channel, "subscribed to event channel");
        Ok(Self {
            channel: channel.to_owned(),
            messages: Box::pin(pubsub.into_on_message()),
        })
    }

    pub fn channel(&self) -> &str {
        &self.channel
    }
}

impl EventSource for RedisSource {
    async fn next(&mut self) -> Result<Option<Vec<u8>>, IngestError> {
        match self.messages.next().await {
            Some(msg) => Ok(Some(msg.get_payload_bytes().to_vec())),
            None => {
                tracing::debug!(channel = %self.channel, "subscription stream ended");
                Ok(None)
            }
        }
    }
}

// ---------------------------------------------------------------------------
// In-process
// ---------------------------------------------------------------------------

/// Receiving end of an in-process message channel.
///
/// The source is exhausted once every sender is dropped.
pub struct ChannelSource {
    rx: mpsc::Receiver<Vec<u8>>,
}

impl ChannelSource {
    /// Creates a source and the sender that feeds it.
    pub fn new(capacity: usize) -> (mpsc::Sender<Vec<u8>>, Self) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (tx, Self { rx })
    }
}

impl EventSource for ChannelSource {
    async fn next(&mut self) -> Result<Option<Vec<u8>>, IngestError> {
        Ok(self.rx.recv().await)
    }
}
