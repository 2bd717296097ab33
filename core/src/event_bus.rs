//! Event bus abstraction with explicit acknowledgement.
//!
//! Events leave a service through the outbox and arrive at the other side of
//! the saga through a broker. This module describes that broker from the
//! consumer's point of view.
//!
//! ```text
//!   outbox row ──CDC──▶ outbox topic ──router──▶ reservation-events
//!                                          └───▶ payment-events
//!                                                      │
//!                                       consumer group ▼
//!                                    Delivery ─▶ handler ─▶ ack / nack
//! ```
//!
//! # Key Principles
//!
//! - **At-least-once delivery**: a message may be delivered more than once.
//! - **Manual acknowledgement**: each [`Delivery`] is acknowledged after its
//!   handler finished. A nack, or a delivery dropped without an answer, makes
//!   the broker redeliver it.
//! - **Consumer groups**: each group receives its own copy of every message;
//!   members of one group share the partitions.
//! - **Ordered within a key**: messages with the same key stay in order.
//!
//! # Dyn Compatibility
//!
//! The trait returns `Pin<Box<dyn Future>>` instead of using `async fn` so it
//! can be shared as `Arc<dyn EventBus>` between consumers.

use futures::Stream;
use std::collections::BTreeMap;
use std::future::Future;
use std::pin::Pin;
use thiserror::Error;
use tokio::sync::oneshot;

/// Errors that can occur during event bus operations.
#[derive(Error, Debug, Clone)]
pub enum EventBusError {
    /// Failed to connect to the event bus
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// Failed to publish a message to a topic
    #[error("Publish failed for topic '{topic}': {reason}")]
    PublishFailed {
        /// The topic that failed
        topic: String,
        /// The reason for failure
        reason: String,
    },

    /// Failed to subscribe to topics
    #[error("Subscription failed for topics {topics:?}: {reason}")]
    SubscriptionFailed {
        /// The topics that failed to subscribe
        topics: Vec<String>,
        /// The reason for failure
        reason: String,
    },

    /// Network or transport error
    #[error("Transport error: {0}")]
    TransportError(String),
}

/// A message as it travels over the broker.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct BusMessage {
    /// Partition key; messages with the same key keep their order.
    pub key: Option<String>,
    /// Raw message body.
    pub payload: Vec<u8>,
    /// String headers (dead-letter metadata and the like).
    pub headers: BTreeMap<String, String>,
}

impl BusMessage {
    /// Create a message without key or headers.
    #[must_use]
    pub fn new(payload: impl Into<Vec<u8>>) -> Self {
        Self {
            key: None,
            payload: payload.into(),
            headers: BTreeMap::new(),
        }
    }

    /// Set the partition key.
    #[must_use]
    pub fn with_key(mut self, key: impl Into<String>) -> Self {
        self.key = Some(key.into());
        self
    }

    /// Add a header.
    #[must_use]
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    /// Look up a header value.
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).map(String::as_str)
    }

    /// The payload as UTF-8 text, lossily decoded. Used for logs and alerts.
    #[must_use]
    pub fn payload_text(&self) -> String {
        String::from_utf8_lossy(&self.payload).into_owned()
    }
}

/// Outcome reported back to the broker for a single delivery.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Acknowledgement {
    /// Processing finished; commit the offset.
    Ack,
    /// Processing did not finish; deliver the message again.
    Nack,
}

/// One message handed to a consumer group member.
///
/// Exactly one of [`Delivery::ack`] or [`Delivery::nack`] should be called.
/// Dropping a delivery without answering counts as a nack.
#[derive(Debug)]
pub struct Delivery {
    /// Topic the message was read from.
    pub topic: String,
    /// Partition the message was read from.
    pub partition: i32,
    /// Offset of the message within its partition.
    pub offset: i64,
    /// The message itself.
    pub message: BusMessage,
    reply: Option<oneshot::Sender<Acknowledgement>>,
}

impl Delivery {
    /// Create a delivery whose answer is sent on `reply`.
    #[must_use]
    pub fn new(
        topic: impl Into<String>,
        partition: i32,
        offset: i64,
        message: BusMessage,
        reply: oneshot::Sender<Acknowledgement>,
    ) -> Self {
        Self {
            topic: topic.into(),
            partition,
            offset,
            message,
            reply: Some(reply),
        }
    }

    /// Commit this delivery.
    pub fn ack(mut self) {
        self.answer(Acknowledgement::Ack);
    }

    /// Ask the broker to deliver this message again.
    pub fn nack(mut self) {
        self.answer(Acknowledgement::Nack);
    }

    fn answer(&mut self, ack: Acknowledgement) {
        if let Some(reply) = self.reply.take() {
            // The subscription may already be gone during shutdown.
            let _ = reply.send(ack);
        }
    }
}

/// Stream of deliveries from a subscription.
pub type DeliveryStream = Pin<Box<dyn Stream<Item = Result<Delivery, EventBusError>> + Send>>;

/// Trait for event bus implementations.
///
/// # Examples
///
/// ```rust,ignore
/// use futures::StreamExt;
///
/// let mut stream = bus.subscribe("reservation-consumer", &["reservation-events"]).await?;
/// while let Some(Ok(delivery)) = stream.next().await {
///     match handle(&delivery.message).await {
///         Ok(()) => delivery.ack(),
///         Err(_) => delivery.nack(),
///     }
/// }
/// ```
pub trait EventBus: Send + Sync {
    /// Publish a message to a topic.
    ///
    /// # Errors
    ///
    /// Returns [`EventBusError::PublishFailed`] if the broker rejects the message
    /// or does not confirm it in time.
    fn publish<'a>(
        &'a self,
        topic: &'a str,
        message: &'a BusMessage,
    ) -> Pin<Box<dyn Future<Output = Result<(), EventBusError>> + Send + 'a>>;

    /// Join consumer group `group` and receive deliveries from `topics`.
    ///
    /// # Errors
    ///
    /// Returns [`EventBusError::SubscriptionFailed`] if the subscription cannot
    /// be created.
    fn subscribe<'a>(
        &'a self,
        group: &'a str,
        topics: &'a [&'a str],
    ) -> Pin<Box<dyn Future<Output = Result<DeliveryStream, EventBusError>> + Send + 'a>>;
}
