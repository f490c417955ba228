//! services/api/src/web/broadcast.rs
//!
//! Process-wide publish/subscribe bus for real-time listeners.
//!
//! Built on a tokio broadcast channel: each subscriber gets its own bounded
//! receiver, delivery is best-effort, and a slow listener that overflows its
//! buffer silently misses events instead of back-pressuring the publisher.
//! There is no broker-side filtering; listeners discard events they do not
//! care about.

use tokio::sync::broadcast;

use crate::web::protocol::BroadcastEvent;

/// The process-wide event broadcaster. Cloning shares the same channel.
#[derive(Clone)]
pub struct EventBroadcaster {
    sender: broadcast::Sender<BroadcastEvent>,
}

impl EventBroadcaster {
    /// `capacity` bounds each subscriber's buffer of undelivered events.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Fire-and-forget publish to every current subscriber. Publishing with
    /// no subscribers is not an error; nobody was listening.
    pub fn publish(&self, event: BroadcastEvent) {
        let _ = self.sender.send(event);
    }

    /// Subscribes a listener. Dropping the receiver unsubscribes it.
    pub fn subscribe(&self) -> broadcast::Receiver<BroadcastEvent> {
        self.sender.subscribe()
    }

    /// Number of currently connected listeners.
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}
