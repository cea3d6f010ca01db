//! Event bus backed by a tokio broadcast channel.

use ello_core::environment::{EventBus, ProviderEvent};
use tokio::sync::broadcast;

/// Default number of events buffered per subscriber.
pub const DEFAULT_EVENT_CAPACITY: usize = 64;

/// Publishes [`ProviderEvent`]s to every subscriber.
///
/// Slow subscribers lag and skip events rather than blocking the provider.
#[derive(Debug, Clone)]
pub struct BroadcastEventBus {
    sender: broadcast::Sender<ProviderEvent>,
}

impl BroadcastEventBus {
    /// Bus buffering up to `capacity` events per subscriber.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// New subscription; receives events published from now on.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<ProviderEvent> {
        self.sender.subscribe()
    }

    /// Number of live subscribers.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for BroadcastEventBus {
    fn default() -> Self {
        Self::new(DEFAULT_EVENT_CAPACITY)
    }
}

impl EventBus for BroadcastEventBus {
    fn publish(&self, event: ProviderEvent) {
        // No subscribers is not an error.
        if self.sender.send(event).is_err() {
            tracing::trace!("Event published without subscribers");
        }
    }
}

/// Next event on `receiver`, skipping over lag.
///
/// Returns `None` once the bus is gone.
pub async fn next_event(receiver: &mut broadcast::Receiver<ProviderEvent>) -> Option<ProviderEvent> {
    loop {
        match receiver.recv().await {
            Ok(event) => return Some(event),
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                tracing::warn!(skipped, "Event subscriber lagged");
            },
            Err(broadcast::error::RecvError::Closed) => return None,
        }
    }
}
