use tokio::sync::broadcast;

/// Broadcast fan-out for lifecycle events
///
/// Publishing never fails: an event with no subscribers is dropped.
#[derive(Debug, Clone)]
pub struct EventPublisher<E: Clone> {
    sender: broadcast::Sender<E>,
}

impl<E: Clone> EventPublisher<E> {
    /// Create a new event publisher with the specified channel capacity
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Publish an event to every current subscriber
    pub fn publish(&self, event: E) {
        // SendError only means nobody is listening
        let _ = self.sender.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<E> {
        self.sender.subscribe()
    }

    /// Get the number of active subscribers
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl<E: Clone> Default for EventPublisher<E> {
    fn default() -> Self {
        Self::new(256)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_publish_without_subscribers_is_ok() {
        let publisher: EventPublisher<u32> = EventPublisher::new(4);
        publisher.publish(1);
        assert_eq!(publisher.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn test_subscribers_receive_in_order() {
        let publisher = EventPublisher::new(8);
        let mut rx = publisher.subscribe();
        publisher.publish("a");
        publisher.publish("b");
        assert_eq!(rx.recv().await.unwrap(), "a");
        assert_eq!(rx.recv().await.unwrap(), "b");
    }
}
