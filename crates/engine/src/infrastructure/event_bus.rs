//! Broadcast bus for instance lifecycle events.

use tokio::sync::broadcast;

use mapshard_domain::InstanceEvent;

/// Fan-out of [`InstanceEvent`]s to any number of subscribers.
///
/// Publishing never blocks. Subscribers that fall behind by more than the
/// configured capacity observe `RecvError::Lagged` and skip ahead.
#[derive(Debug, Clone)]
pub struct InstanceEventBus {
    sender: broadcast::Sender<InstanceEvent>,
}

impl InstanceEventBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    pub fn publish(&self, event: InstanceEvent) {
        tracing::trace!(instance_id = %event.instance_id(), event = ?event, "Instance event");
        // No subscribers is not an error
        let _ = self.sender.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<InstanceEvent> {
        self.sender.subscribe()
    }
}
