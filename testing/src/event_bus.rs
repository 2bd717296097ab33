//! In-memory event bus.
//!
//! Topics are append-only logs. Each consumer group keeps one committed offset
//! per topic; a delivery advances it only when acked, so a nack (or a dropped
//! delivery) hands the same message out again, as a broker would. New groups
//! start from the beginning of every topic.
//!
//! One subscription per group is supported at a time. Closing the bus ends
//! every subscription stream.

use homestay_core::event_bus::{
    Acknowledgement, BusMessage, Delivery, DeliveryStream, EventBus, EventBusError,
};
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::{Notify, oneshot};

#[derive(Default)]
struct Log {
    topics: HashMap<String, Vec<BusMessage>>,
    offsets: HashMap<(String, String), usize>,
}

#[derive(Default)]
struct Shared {
    log: Mutex<Log>,
    appended: Notify,
    fail_publishes: AtomicBool,
    closed: AtomicBool,
}

impl Shared {
    fn next_for(&self, group: &str, topics: &[String]) -> Option<(String, usize, BusMessage)> {
        let log = self.log.lock().unwrap_or_else(PoisonError::into_inner);
        topics.iter().find_map(|topic| {
            let offset = log
                .offsets
                .get(&(group.to_string(), topic.clone()))
                .copied()
                .unwrap_or(0);
            log.topics
                .get(topic)
                .and_then(|messages| messages.get(offset))
                .map(|message| (topic.clone(), offset, message.clone()))
        })
    }

    /// Wait for the next uncommitted message, or `None` once the bus is closed.
    async fn next_delivery(&self, group: &str, topics: &[String]) -> Option<(String, usize, BusMessage)> {
        loop {
            // Registered before the checks so a concurrent publish or close is not missed.
            let appended = self.appended.notified();
            if self.closed.load(Ordering::SeqCst) {
                return None;
            }
            if let Some(next) = self.next_for(group, topics) {
                return Some(next);
            }
            appended.await;
        }
    }

    fn commit(&self, group: &str, topic: &str, offset: usize) {
        let mut log = self.log.lock().unwrap_or_else(PoisonError::into_inner);
        log.offsets
            .insert((group.to_string(), topic.to_string()), offset + 1);
    }
}

/// Broker stand-in for tests.
#[derive(Clone, Default)]
pub struct InMemoryEventBus {
    shared: Arc<Shared>,
}

impl InMemoryEventBus {
    /// Create an empty bus.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Every message ever published to `topic`, in order.
    #[must_use]
    pub fn published(&self, topic: &str) -> Vec<BusMessage> {
        let log = self.shared.log.lock().unwrap_or_else(PoisonError::into_inner);
        log.topics.get(topic).cloned().unwrap_or_default()
    }

    /// Make every following publish fail (or succeed again).
    pub fn fail_publishes(&self, fail: bool) {
        self.shared.fail_publishes.store(fail, Ordering::SeqCst);
    }

    /// End every subscription stream. Pending deliveries stay uncommitted.
    pub fn close(&self) {
        self.shared.closed.store(true, Ordering::SeqCst);
        self.shared.appended.notify_waiters();
    }

    /// Offset `group` has committed on `topic`.
    #[must_use]
    pub fn committed(&self, group: &str, topic: &str) -> usize {
        let log = self.shared.log.lock().unwrap_or_else(PoisonError::into_inner);
        log.offsets
            .get(&(group.to_string(), topic.to_string()))
            .copied()
            .unwrap_or(0)
    }
}

impl EventBus for InMemoryEventBus {
    fn publish<'a>(
        &'a self,
        topic: &'a str,
        message: &'a BusMessage,
    ) -> Pin<Box<dyn Future<Output = Result<(), EventBusError>> + Send + 'a>> {
        Box::pin(async move {
            if self.shared.fail_publishes.load(Ordering::SeqCst) {
                return Err(EventBusError::PublishFailed {
                    topic: topic.to_string(),
                    reason: "publishing disabled".to_string(),
                });
            }
            {
                let mut log = self.shared.log.lock().unwrap_or_else(PoisonError::into_inner);
                log.topics
                    .entry(topic.to_string())
                    .or_default()
                    .push(message.clone());
            }
            self.shared.appended.notify_waiters();
            Ok(())
        })
    }

    fn subscribe<'a>(
        &'a self,
        group: &'a str,
        topics: &'a [&'a str],
    ) -> Pin<Box<dyn Future<Output = Result<DeliveryStream, EventBusError>> + Send + 'a>> {
        let shared = Arc::clone(&self.shared);
        let group = group.to_string();
        let topics: Vec<String> = topics.iter().map(ToString::to_string).collect();

        Box::pin(async move {
            let stream = async_stream::stream! {
                while let Some((topic, offset, message)) = shared.next_delivery(&group, &topics).await {
                    let (reply, answer) = oneshot::channel();
                    let partition_offset = i64::try_from(offset).unwrap_or(i64::MAX);
                    yield Ok(Delivery::new(topic.clone(), 0, partition_offset, message, reply));

                    if answer.await == Ok(Acknowledgement::Ack) {
                        shared.commit(&group, &topic, offset);
                    }
                }
            };
            Ok(Box::pin(stream) as DeliveryStream)
        })
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;
    use futures::StreamExt;

    #[tokio::test]
    async fn acked_messages_advance_the_group_offset() {
        let bus = InMemoryEventBus::new();
        bus.publish("t", &BusMessage::new("one")).await.unwrap();
        bus.publish("t", &BusMessage::new("two")).await.unwrap();

        let mut stream = bus.subscribe("g", &["t"]).await.unwrap();
        let first = stream.next().await.unwrap().unwrap();
        assert_eq!(first.message.payload_text(), "one");
        first.ack();

        let second = stream.next().await.unwrap().unwrap();
        assert_eq!(second.message.payload_text(), "two");
        assert_eq!(bus.committed("g", "t"), 1);
    }

    #[tokio::test]
    async fn nacked_message_is_redelivered() {
        let bus = InMemoryEventBus::new();
        bus.publish("t", &BusMessage::new("once")).await.unwrap();

        let mut stream = bus.subscribe("g", &["t"]).await.unwrap();
        stream.next().await.unwrap().unwrap().nack();
        let again = stream.next().await.unwrap().unwrap();

        assert_eq!(again.message.payload_text(), "once");
        assert_eq!(again.offset, 0);
    }

    #[tokio::test]
    async fn groups_consume_independently() {
        let bus = InMemoryEventBus::new();
        bus.publish("t", &BusMessage::new("shared")).await.unwrap();

        let mut a = bus.subscribe("a", &["t"]).await.unwrap();
        let mut b = bus.subscribe("b", &["t"]).await.unwrap();

        a.next().await.unwrap().unwrap().ack();
        let seen_by_b = b.next().await.unwrap().unwrap();
        assert_eq!(seen_by_b.message.payload_text(), "shared");
    }

    #[tokio::test]
    async fn close_ends_idle_subscription() {
        let bus = InMemoryEventBus::new();
        let mut stream = bus.subscribe("g", &["t"]).await.unwrap();

        let closer = bus.clone();
        let waiter = tokio::spawn(async move { stream.next().await.is_none() });
        tokio::task::yield_now().await;
        closer.close();

        assert!(waiter.await.unwrap());
    }

    #[tokio::test]
    async fn subscription_after_close_is_empty() {
        let bus = InMemoryEventBus::new();
        bus.publish("t", &BusMessage::new("late")).await.unwrap();
        bus.close();

        let mut stream = bus.subscribe("g", &["t"]).await.unwrap();
        assert!(stream.next().await.is_none());
        assert_eq!(bus.committed("g", "t"), 0);
    }

    #[tokio::test]
    async fn failing_publish_is_reported() {
        let bus = InMemoryEventBus::new();
        bus.fail_publishes(true);
        assert!(bus.publish("t", &BusMessage::new("x")).await.is_err());
        assert!(bus.published("t").is_empty());
    }
}
