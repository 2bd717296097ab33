//! Generic event bus consumer with acknowledgement policy and reconnection.
//!
//! Each saga participant implements [`MessageHandler`] and is wrapped in an
//! [`EventConsumer`], which owns everything around the handler:
//!
//! ```text
//! loop {
//!     subscribe(group, topics)
//!     for delivery in stream {
//!         handle (retried in place for Retryable errors)
//!           Ok                  -> ack
//!           Poison              -> log, ack (never retried)
//!           Retryable exhausted -> publish to dead-letter topic, ack
//!                                  (nack if that publish fails)
//!     }
//!     stream ended -> wait, resubscribe
//! }
//! ```
//!
//! # Example
//!
//! ```rust,ignore
//! let consumer = EventConsumer::new(
//!     "reservation-events",
//!     "reservation-consumer-group",
//!     vec!["reservation-events".to_string()],
//!     event_bus,
//!     handler,
//!     shutdown_rx,
//! )
//! .with_retry_policy(RetryPolicy::builder().max_elapsed(Duration::from_secs(60)).build())
//! .with_dead_letter_topic("homestay-dlq");
//!
//! let handle = consumer.spawn();
//! ```

use crate::retry::{RetryPolicy, retry_with_predicate};
use async_trait::async_trait;
use chrono::Utc;
use futures::StreamExt;
use homestay_core::event_bus::{BusMessage, Delivery, EventBus};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::broadcast;
use tracing::{error, info, warn};

/// Header naming the topic a dead-lettered message was read from.
pub const DLQ_ORIGINAL_TOPIC: &str = "dlq-original-topic";
/// Header naming the consumer that gave up on a message.
pub const DLQ_CONSUMER: &str = "dlq-consumer";
/// Header carrying the last handler error.
pub const DLQ_EXCEPTION_MESSAGE: &str = "dlq-exception-message";
/// Header carrying the RFC 3339 time the message was dead-lettered.
pub const DLQ_FAILED_AT: &str = "dlq-failed-at";

/// How a handler failed, which decides what happens to the delivery.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum HandlerError {
    /// The message can never be processed (unparseable, wrong shape).
    /// It is acknowledged and dropped.
    #[error("poison message: {0}")]
    Poison(String),

    /// Processing failed for a reason that may go away (database, network).
    /// The delivery is retried and eventually dead-lettered.
    #[error("retryable failure: {0}")]
    Retryable(String),
}

impl HandlerError {
    /// Whether the consumer should try the message again.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::Retryable(_))
    }
}

/// Processes one broker message.
#[async_trait]
pub trait MessageHandler: Send + Sync + 'static {
    /// Handle a single message. Must be idempotent: the same message can be
    /// delivered more than once.
    async fn handle(&self, message: &BusMessage) -> Result<(), HandlerError>;
}

/// What the consumer did with a delivery.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Disposition {
    /// Handled successfully and acknowledged.
    Handled,
    /// Poison message; acknowledged without processing.
    Dropped,
    /// Retries exhausted; copied to the dead-letter topic and acknowledged.
    DeadLettered,
    /// Not acknowledged; the broker will deliver it again.
    Redeliver,
}

/// Event bus consumer for one consumer group.
pub struct EventConsumer {
    name: String,
    group: String,
    topics: Vec<String>,
    event_bus: Arc<dyn EventBus>,
    handler: Arc<dyn MessageHandler>,
    shutdown: broadcast::Receiver<()>,
    retry_policy: RetryPolicy,
    dead_letter_topic: Option<String>,
    reconnect_delay: Duration,
}

impl EventConsumer {
    /// Create a consumer that does not retry and has no dead-letter topic.
    ///
    /// Retryable failures are nacked until [`Self::with_dead_letter_topic`]
    /// is configured.
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        group: impl Into<String>,
        topics: Vec<String>,
        event_bus: Arc<dyn EventBus>,
        handler: Arc<dyn MessageHandler>,
        shutdown: broadcast::Receiver<()>,
    ) -> Self {
        Self {
            name: name.into(),
            group: group.into(),
            topics,
            event_bus,
            handler,
            shutdown,
            retry_policy: RetryPolicy::none(),
            dead_letter_topic: None,
            reconnect_delay: Duration::from_secs(5),
        }
    }

    /// Retry retryable handler failures in place with `policy`.
    #[must_use]
    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry_policy = policy;
        self
    }

    /// Publish messages whose retries are exhausted to `topic`.
    #[must_use]
    pub fn with_dead_letter_topic(mut self, topic: impl Into<String>) -> Self {
        self.dead_letter_topic = Some(topic.into());
        self
    }

    /// Wait `delay` before resubscribing after the stream ends (default 5s).
    #[must_use]
    pub const fn with_reconnect_delay(mut self, delay: Duration) -> Self {
        self.reconnect_delay = delay;
        self
    }

    /// Spawn the consumer as a background task.
    #[must_use]
    pub fn spawn(mut self) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            self.run().await;
        })
    }

    async fn run(&mut self) {
        info!(consumer = %self.name, group = %self.group, "Event consumer started");

        loop {
            let topics: Vec<&str> = self.topics.iter().map(String::as_str).collect();

            tokio::select! {
                _ = self.shutdown.recv() => {
                    info!(consumer = %self.name, "Event consumer received shutdown signal");
                    break;
                }
                subscribe_result = self.event_bus.subscribe(&self.group, &topics) => {
                    match subscribe_result {
                        Ok(stream) => {
                            info!(consumer = %self.name, topics = ?self.topics, "Subscribed to event bus");
                            if self.drain(stream).await {
                                break;
                            }
                            warn!(consumer = %self.name, "Event stream ended, reconnecting in {:?}", self.reconnect_delay);
                        }
                        Err(e) => {
                            error!(
                                consumer = %self.name,
                                error = %e,
                                "Failed to subscribe to event bus, retrying in {:?}",
                                self.reconnect_delay
                            );
                        }
                    }
                    tokio::time::sleep(self.reconnect_delay).await;
                }
            }
        }

        info!(consumer = %self.name, "Event consumer stopped");
    }

    /// Returns `true` when shutdown was requested.
    async fn drain(&mut self, mut stream: homestay_core::event_bus::DeliveryStream) -> bool {
        loop {
            tokio::select! {
                _ = self.shutdown.recv() => {
                    info!(consumer = %self.name, "Event consumer received shutdown signal during processing");
                    return true;
                }
                next = stream.next() => match next {
                    Some(Ok(delivery)) => {
                        self.process(delivery).await;
                    }
                    Some(Err(e)) => {
                        error!(consumer = %self.name, error = %e, "Error receiving message from stream");
                    }
                    None => return false,
                }
            }
        }
    }

    /// Run the handler for one delivery and answer the broker.
    pub async fn process(&self, delivery: Delivery) -> Disposition {
        let handler = &self.handler;
        let message = &delivery.message;
        let outcome = retry_with_predicate(
            &self.retry_policy,
            || handler.handle(message),
            HandlerError::is_retryable,
        )
        .await;

        match outcome {
            Ok(()) => {
                delivery.ack();
                Disposition::Handled
            }
            Err(HandlerError::Poison(reason)) => {
                error!(
                    consumer = %self.name,
                    topic = %delivery.topic,
                    offset = delivery.offset,
                    reason = %reason,
                    "Dropping poison message"
                );
                metrics::counter!("consumer.messages.poison", "consumer" => self.name.clone())
                    .increment(1);
                delivery.ack();
                Disposition::Dropped
            }
            Err(HandlerError::Retryable(reason)) => self.dead_letter(delivery, &reason).await,
        }
    }

    async fn dead_letter(&self, delivery: Delivery, reason: &str) -> Disposition {
        let Some(dlq) = &self.dead_letter_topic else {
            warn!(consumer = %self.name, reason = %reason, "Handler failed, leaving message for redelivery");
            delivery.nack();
            return Disposition::Redeliver;
        };

        let mut message = delivery
            .message
            .clone()
            .with_header(DLQ_ORIGINAL_TOPIC, delivery.topic.clone())
            .with_header(DLQ_CONSUMER, self.name.clone())
            .with_header(DLQ_EXCEPTION_MESSAGE, reason)
            .with_header(DLQ_FAILED_AT, Utc::now().to_rfc3339());
        if message.key.is_none() {
            message.key = Some(format!("{}-{}", delivery.partition, delivery.offset));
        }

        match self.event_bus.publish(dlq, &message).await {
            Ok(()) => {
                error!(
                    consumer = %self.name,
                    topic = %delivery.topic,
                    dead_letter_topic = %dlq,
                    reason = %reason,
                    "Retries exhausted, message moved to dead-letter topic"
                );
                metrics::counter!("consumer.messages.dead_lettered", "consumer" => self.name.clone())
                    .increment(1);
                delivery.ack();
                Disposition::DeadLettered
            }
            Err(e) => {
                error!(consumer = %self.name, error = %e, "Failed to publish to dead-letter topic");
                delivery.nack();
                Disposition::Redeliver
            }
        }
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;
    use homestay_core::event_bus::Acknowledgement;
    use homestay_testing::InMemoryEventBus;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::sync::oneshot;

    struct Scripted {
        calls: AtomicUsize,
        fail_first: usize,
        error: HandlerError,
    }

    impl Scripted {
        fn new(fail_first: usize, error: HandlerError) -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicUsize::new(0),
                fail_first,
                error,
            })
        }
    }

    #[async_trait]
    impl MessageHandler for Scripted {
        async fn handle(&self, _message: &BusMessage) -> Result<(), HandlerError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if call < self.fail_first {
                Err(self.error.clone())
            } else {
                Ok(())
            }
        }
    }

    fn consumer(bus: Arc<InMemoryEventBus>, handler: Arc<Scripted>) -> EventConsumer {
        let (_tx, rx) = broadcast::channel(1);
        EventConsumer::new("test", "test-group", vec!["in".to_string()], bus, handler, rx)
            .with_retry_policy(RetryPolicy::fixed(3, Duration::from_millis(1)))
    }

    fn delivery(payload: &str) -> (Delivery, oneshot::Receiver<Acknowledgement>) {
        let (tx, rx) = oneshot::channel();
        (Delivery::new("in", 0, 42, BusMessage::new(payload), tx), rx)
    }

    #[tokio::test]
    async fn success_is_acked() {
        let bus = Arc::new(InMemoryEventBus::new());
        let handler = Scripted::new(0, HandlerError::Retryable(String::new()));
        let (d, rx) = delivery("ok");

        let outcome = consumer(bus, Arc::clone(&handler)).process(d).await;

        assert_eq!(outcome, Disposition::Handled);
        assert_eq!(rx.await.unwrap(), Acknowledgement::Ack);
        assert_eq!(handler.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn poison_is_acked_without_retry() {
        let bus = Arc::new(InMemoryEventBus::new());
        let handler = Scripted::new(usize::MAX, HandlerError::Poison("bad json".into()));
        let (d, rx) = delivery("garbage");

        let outcome = consumer(Arc::clone(&bus), Arc::clone(&handler))
            .with_dead_letter_topic("dlq")
            .process(d)
            .await;

        assert_eq!(outcome, Disposition::Dropped);
        assert_eq!(rx.await.unwrap(), Acknowledgement::Ack);
        assert_eq!(handler.calls.load(Ordering::SeqCst), 1);
        assert!(bus.published("dlq").is_empty());
    }

    #[tokio::test]
    async fn transient_failure_recovers_in_place() {
        let bus = Arc::new(InMemoryEventBus::new());
        let handler = Scripted::new(2, HandlerError::Retryable("db down".into()));
        let (d, rx) = delivery("ok");

        let outcome = consumer(bus, Arc::clone(&handler)).process(d).await;

        assert_eq!(outcome, Disposition::Handled);
        assert_eq!(rx.await.unwrap(), Acknowledgement::Ack);
        assert_eq!(handler.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn exhausted_retries_go_to_dead_letter_topic() {
        let bus = Arc::new(InMemoryEventBus::new());
        let handler = Scripted::new(usize::MAX, HandlerError::Retryable("db down".into()));
        let (d, rx) = delivery("payload");

        let outcome = consumer(Arc::clone(&bus), handler)
            .with_dead_letter_topic("dlq")
            .process(d)
            .await;

        assert_eq!(outcome, Disposition::DeadLettered);
        assert_eq!(rx.await.unwrap(), Acknowledgement::Ack);

        let dead = bus.published("dlq");
        assert_eq!(dead.len(), 1);
        assert_eq!(dead[0].payload_text(), "payload");
        assert_eq!(dead[0].header(DLQ_ORIGINAL_TOPIC), Some("in"));
        assert_eq!(dead[0].header(DLQ_CONSUMER), Some("test"));
        assert!(dead[0].header(DLQ_EXCEPTION_MESSAGE).unwrap().contains("db down"));
        assert!(dead[0].header(DLQ_FAILED_AT).is_some());
    }

    #[tokio::test]
    async fn exhausted_retries_without_dead_letter_topic_are_redelivered() {
        let bus = Arc::new(InMemoryEventBus::new());
        let handler = Scripted::new(usize::MAX, HandlerError::Retryable("db down".into()));
        let (d, rx) = delivery("payload");

        let outcome = consumer(bus, handler).process(d).await;

        assert_eq!(outcome, Disposition::Redeliver);
        assert_eq!(rx.await.unwrap(), Acknowledgement::Nack);
    }

    #[tokio::test]
    async fn spawned_consumer_drains_topic_and_stops_on_shutdown() {
        let bus = Arc::new(InMemoryEventBus::new());
        bus.publish("in", &BusMessage::new("a")).await.unwrap();
        bus.publish("in", &BusMessage::new("b")).await.unwrap();

        let handler = Scripted::new(0, HandlerError::Retryable(String::new()));
        let (tx, rx) = broadcast::channel(1);
        let handle = EventConsumer::new(
            "test",
            "g",
            vec!["in".to_string()],
            Arc::clone(&bus) as Arc<dyn EventBus>,
            Arc::clone(&handler) as Arc<dyn MessageHandler>,
            rx,
        )
        .spawn();

        for _ in 0..100 {
            if handler.calls.load(Ordering::SeqCst) == 2 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        tx.send(()).unwrap();
        handle.await.unwrap();

        assert_eq!(handler.calls.load(Ordering::SeqCst), 2);
    }
}
