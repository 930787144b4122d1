//! In-process event bus backed by a tokio broadcast channel.

use tokio::sync::broadcast;

use wothub_domain::event::ServientEvent;

/// In-process event bus using a tokio [`broadcast`] channel.
///
/// Publishing succeeds even when there are no active subscribers
/// (the event is simply dropped).
#[derive(Debug, Clone)]
pub struct InProcessEventBus {
    sender: broadcast::Sender<ServientEvent>,
}

impl InProcessEventBus {
    /// Create a new event bus with the given channel capacity.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Subscribe to events on this bus.
    ///
    /// Returns a receiver that will get all events published *after*
    /// the subscription is created.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<ServientEvent> {
        self.sender.subscribe()
    }

    /// Broadcast `event` to every current receiver.
    pub fn publish(&self, event: ServientEvent) {
        tracing::debug!(kind = ?event.kind, "servient event");
        // broadcast::send fails only when there are zero receivers.
        let _ = self.sender.send(event);
    }
}
