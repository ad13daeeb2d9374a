//! Event Bus
//!
//! Broadcasts upgrade and manifest events to any number of listeners without
//! the producer knowing who is listening.

use tokio::sync::broadcast;

/// Broadcast channel wrapper shared by the upgrade monitor and the manifest
/// runtime
///
/// Slow subscribers lose the oldest events once their buffer is full; the
/// producer never blocks.
pub struct EventBus<E> {
    tx: broadcast::Sender<E>,
}

impl<E: Clone> EventBus<E> {
    /// Create a bus buffering up to `capacity` events per subscriber
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    /// Publish an event, returning how many subscribers received it
    pub fn publish(&self, event: E) -> usize {
        self.tx.send(event).unwrap_or(0)
    }

    /// Receive all events published from now on
    pub fn subscribe(&self) -> broadcast::Receiver<E> {
        self.tx.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl<E: Clone> Clone for EventBus<E> {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
        }
    }
}

impl<E: Clone> Default for EventBus<E> {
    fn default() -> Self {
        Self::new(100)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Clone, Debug, PartialEq)]
    enum TestEvent {
        Published { version: u64 },
        Failed { reason: String },
    }

    #[tokio::test]
    async fn test_every_subscriber_receives_event() {
        let bus = EventBus::new(10);
        let mut rx1 = bus.subscribe();
        let mut rx2 = bus.subscribe();

        let event = TestEvent::Published { version: 3 };
        assert_eq!(bus.publish(event.clone()), 2);

        assert_eq!(rx1.recv().await.unwrap(), event);
        assert_eq!(rx2.recv().await.unwrap(), event);
    }

    #[tokio::test]
    async fn test_publish_without_subscribers() {
        let bus: EventBus<TestEvent> = EventBus::new(4);
        assert_eq!(bus.publish(TestEvent::Failed { reason: "timeout".into() }), 0);
        assert_eq!(bus.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn test_clone_shares_channel() {
        let bus = EventBus::new(4);
        let producer = bus.clone();
        let mut rx = bus.subscribe();

        producer.publish(TestEvent::Published { version: 1 });
        assert_eq!(rx.recv().await.unwrap(), TestEvent::Published { version: 1 });
    }
}
