//! Bounded outbound queue with drop-oldest overflow.
//!
//! Producers never wait: the hub pushes from the ingestion task, and one
//! slow client must not hold up everyone else. A single consumer (the
//! session's delivery task) drains it.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, PoisonError};

use eventgate_protocol::Packet;
use tokio::sync::Notify;

/// What happened to a pushed packet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Push {
    Queued,
    /// The queue was full; the returned packet's nonce was evicted.
    DroppedOldest(i64),
    Closed,
}

#[derive(Debug)]
struct QueueState {
    items: VecDeque<Arc<Packet>>,
    closed: bool,
}

#[derive(Debug)]
pub(crate) struct OutboundQueue {
    state: Mutex<QueueState>,
    notify: Notify,
    capacity: usize,
}

impl OutboundQueue {
    pub(crate) fn new(capacity: usize) -> Self {
        Self {
            state: Mutex::new(QueueState {
                items: VecDeque::with_capacity(capacity.min(64)),
                closed: false,
            }),
            notify: Notify::new(),
            capacity: capacity.max(1),
        }
    }

    pub(crate) fn push(&self, packet: Arc<Packet>) -> Push {
        let outcome = {
            let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
            if state.closed {
                return Push::Closed;
            }
            let evicted = if state.items.len() >= self.capacity {
                state.items.pop_front().map(|p| p.nonce())
            } else {
                None
            };
            state.items.push_back(packet);
            evicted.map_or(Push::Queued, Push::DroppedOldest)
        };
        self.notify.notify_one();
        outcome
    }

    /// Waits for the next packet. Returns `None` once the queue is closed
    /// and drained.
    pub(crate) async fn pop(&self) -> Option<Arc<Packet>> {
        loop {
            {
                let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
                if let Some(packet) = state.items.pop_front() {
                    return Some(packet);
                }
                if state.closed {
                    return None;
                }
            }
            self.notify.notified().await;
        }
    }

    /// Rejects further pushes and discards anything still queued.
    pub(crate) fn close(&self) {
        {
            let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
            state.closed = true;
            state.items.clear();
        }
        self.notify.notify_one();
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .items
            .len()
    }
}

#[cfg(test)]
mod tests {
    use eventgate_protocol::{
        ChatRef, CurrentDeletePost, CurrentEnvelope, CurrentEvent, NonceSource,
    };

    use super::*;

    struct Fixed(i64);

    impl NonceSource for Fixed {
        fn next_nonce(&self) -> i64 {
            self.0
        }
    }

    fn packet(nonce: i64) -> Arc<Packet> {
        let current = CurrentEnvelope::new(CurrentEvent::DeletePost(CurrentDeletePost {
            chat_id: ChatRef::Home,
            post_id: "1".into(),
        }));
        Arc::new(Packet::build(&Fixed(nonce), None, current).unwrap())
    }

    #[tokio::test]
    async fn test_push_full_drops_oldest() {
        let queue = OutboundQueue::new(2);
        assert_eq!(queue.push(packet(0)), Push::Queued);
        assert_eq!(queue.push(packet(1)), Push::Queued);
        assert_eq!(queue.push(packet(2)), Push::DroppedOldest(0));
        assert_eq!(queue.len(), 2);

        assert_eq!(queue.pop().await.unwrap().nonce(), 1);
        assert_eq!(queue.pop().await.unwrap().nonce(), 2);
    }

    #[tokio::test]
    async fn test_pop_waits_for_push() {
        let queue = Arc::new(OutboundQueue::new(4));
        let consumer = {
            let queue = Arc::clone(&queue);
            tokio::spawn(async move { queue.pop().await.map(|p| p.nonce()) })
        };
        tokio::task::yield_now().await;
        queue.push(packet(7));
        assert_eq!(consumer.await.unwrap(), Some(7));
    }

    #[tokio::test]
    async fn test_close_wakes_consumer_and_rejects_pushes() {
        let queue = Arc::new(OutboundQueue::new(4));
        let consumer = {
            let queue = Arc::clone(&queue);
            tokio::spawn(async move { queue.pop().await })
        };
        tokio::task::yield_now().await;
        queue.close();
        assert!(consumer.await.unwrap().is_none());
        assert_eq!(queue.push(packet(1)), Push::Closed);
    }
}
