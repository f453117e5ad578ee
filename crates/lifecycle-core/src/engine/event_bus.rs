//! Broadcast channel for lifecycle events.

use lifecycle_types::LifecycleEvent;
use tokio::sync::broadcast;

/// Fan-out of [`LifecycleEvent`]s to any number of subscribers.
///
/// Publishing never waits. Slow subscribers lose the oldest events once the
/// channel capacity is exceeded.
#[derive(Clone)]
pub struct EventBus {
	sender: broadcast::Sender<LifecycleEvent>,
}

impl EventBus {
	pub fn new(capacity: usize) -> Self {
		let (sender, _) = broadcast::channel(capacity.max(1));
		Self { sender }
	}

	pub fn subscribe(&self) -> broadcast::Receiver<LifecycleEvent> {
		self.sender.subscribe()
	}

	/// Publishes an event. Fails only when nobody is subscribed.
	pub fn publish(
		&self,
		event: LifecycleEvent,
	) -> Result<(), broadcast::error::SendError<LifecycleEvent>> {
		self.sender.send(event).map(|_| ())
	}
}
