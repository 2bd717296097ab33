//! Redpanda event bus for the homestay booking core.
//!
//! Implements [`EventBus`] over `rdkafka`, so it works against Redpanda,
//! Apache Kafka or any other Kafka-compatible broker the CDC relay writes to.
//!
//! # Delivery Semantics
//!
//! **At-least-once delivery** with manual offset commits:
//! - Each message is handed to the subscriber as a [`Delivery`].
//! - The offset is committed only when the delivery is acked.
//! - A nack (or a dropped delivery) seeks the partition back to the message,
//!   so the broker hands it out again.
//! - Ordering is guaranteed within a partition; messages are keyed by
//!   aggregate id, so all events of one reservation stay in order.
//!
//! # Example
//!
//! ```no_run
//! use homestay_redpanda::RedpandaEventBus;
//! use homestay_core::event_bus::{BusMessage, EventBus};
//! use futures::StreamExt;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let event_bus = RedpandaEventBus::new("localhost:9092")?;
//!
//! let message = BusMessage::new(br#"{"payload":"..."}"#.to_vec()).with_key("7d1c5e1a");
//! event_bus.publish("reservation-events", &message).await?;
//!
//! let mut stream = event_bus.subscribe("reservation-consumer", &["reservation-events"]).await?;
//! while let Some(Ok(delivery)) = stream.next().await {
//!     println!("{}", delivery.message.payload_text());
//!     delivery.ack();
//! }
//! # Ok(())
//! # }
//! ```

use homestay_core::event_bus::{
    Acknowledgement, BusMessage, Delivery, DeliveryStream, EventBus, EventBusError,
};
use rdkafka::config::ClientConfig;
use rdkafka::consumer::{CommitMode, Consumer, StreamConsumer};
use rdkafka::message::{BorrowedMessage, Header, Headers, Message, OwnedHeaders};
use rdkafka::producer::{FutureProducer, FutureRecord};
use rdkafka::util::Timeout;
use rdkafka::Offset;
use std::collections::BTreeMap;
use std::future::Future;
use std::pin::Pin;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};

/// Redpanda event bus implementation.
///
/// # Configuration
///
/// - **Broker addresses**: bootstrap servers (required)
/// - **Producer settings**: acks, compression, timeout
/// - **Offset reset**: where new consumer groups start (default: "earliest",
///   so a freshly deployed consumer does not skip saga events already in
///   the topic)
///
/// # Example
///
/// ```no_run
/// use homestay_redpanda::RedpandaEventBus;
///
/// # fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let event_bus = RedpandaEventBus::builder()
///     .brokers("localhost:9092,localhost:9093")
///     .producer_acks("all")
///     .compression("lz4")
///     .build()?;
/// # Ok(())
/// # }
/// ```
pub struct RedpandaEventBus {
    producer: FutureProducer,
    brokers: String,
    timeout: Duration,
    auto_offset_reset: String,
}

impl RedpandaEventBus {
    /// Create an event bus with default settings.
    ///
    /// # Errors
    ///
    /// Returns [`EventBusError::ConnectionFailed`] if the producer cannot be created.
    pub fn new(brokers: &str) -> Result<Self, EventBusError> {
        Self::builder().brokers(brokers).build()
    }

    /// Create a builder for configuring the event bus.
    #[must_use]
    pub fn builder() -> RedpandaEventBusBuilder {
        RedpandaEventBusBuilder::default()
    }

    /// Broker addresses this bus connects to.
    #[must_use]
    pub fn brokers(&self) -> &str {
        &self.brokers
    }

    fn consumer_for(&self, group: &str) -> Result<StreamConsumer, rdkafka::error::KafkaError> {
        ClientConfig::new()
            .set("bootstrap.servers", &self.brokers)
            .set("group.id", group)
            .set("enable.auto.commit", "false")
            .set("auto.offset.reset", &self.auto_offset_reset)
            .set("session.timeout.ms", "6000")
            .set("enable.partition.eof", "false")
            .create()
    }
}

/// Builder for [`RedpandaEventBus`].
#[derive(Default)]
pub struct RedpandaEventBusBuilder {
    brokers: Option<String>,
    producer_acks: Option<String>,
    compression: Option<String>,
    timeout: Option<Duration>,
    auto_offset_reset: Option<String>,
}

impl RedpandaEventBusBuilder {
    /// Set broker addresses (comma-separated).
    #[must_use]
    pub fn brokers(mut self, brokers: impl Into<String>) -> Self {
        self.brokers = Some(brokers.into());
        self
    }

    /// Set producer acknowledgement mode ("0", "1" or "all"; default "all").
    #[must_use]
    pub fn producer_acks(mut self, acks: impl Into<String>) -> Self {
        self.producer_acks = Some(acks.into());
        self
    }

    /// Set compression type (default "none").
    #[must_use]
    pub fn compression(mut self, compression: impl Into<String>) -> Self {
        self.compression = Some(compression.into());
        self
    }

    /// Set the publish timeout (default 5s).
    #[must_use]
    pub const fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Set where new consumer groups start reading (default "earliest").
    #[must_use]
    pub fn auto_offset_reset(mut self, policy: impl Into<String>) -> Self {
        self.auto_offset_reset = Some(policy.into());
        self
    }

    /// Build the [`RedpandaEventBus`].
    ///
    /// # Errors
    ///
    /// Returns [`EventBusError::ConnectionFailed`] if brokers are not set or
    /// the producer cannot be created.
    pub fn build(self) -> Result<RedpandaEventBus, EventBusError> {
        let brokers = self
            .brokers
            .ok_or_else(|| EventBusError::ConnectionFailed("Brokers not configured".to_string()))?;
        let acks = self.producer_acks.unwrap_or_else(|| "all".to_string());
        let compression = self.compression.unwrap_or_else(|| "none".to_string());
        let auto_offset_reset = self
            .auto_offset_reset
            .unwrap_or_else(|| "earliest".to_string());

        let producer: FutureProducer = ClientConfig::new()
            .set("bootstrap.servers", &brokers)
            .set("message.timeout.ms", "5000")
            .set("acks", &acks)
            .set("compression.type", &compression)
            .create()
            .map_err(|e| EventBusError::ConnectionFailed(format!("Failed to create producer: {e}")))?;

        tracing::info!(
            brokers = %brokers,
            acks = %acks,
            compression = %compression,
            auto_offset_reset = %auto_offset_reset,
            "RedpandaEventBus created successfully"
        );

        Ok(RedpandaEventBus {
            producer,
            brokers,
            timeout: self.timeout.unwrap_or(Duration::from_secs(5)),
            auto_offset_reset,
        })
    }
}

fn to_bus_message(message: &BorrowedMessage<'_>) -> BusMessage {
    let mut headers = BTreeMap::new();
    if let Some(borrowed) = message.headers() {
        for header in borrowed.iter() {
            let value = header
                .value
                .map(|v| String::from_utf8_lossy(v).into_owned())
                .unwrap_or_default();
            headers.insert(header.key.to_string(), value);
        }
    }

    BusMessage {
        key: message.key().map(|k| String::from_utf8_lossy(k).into_owned()),
        payload: message.payload().map(<[u8]>::to_vec).unwrap_or_default(),
        headers,
    }
}

impl EventBus for RedpandaEventBus {
    fn publish<'a>(
        &'a self,
        topic: &'a str,
        message: &'a BusMessage,
    ) -> Pin<Box<dyn Future<Output = Result<(), EventBusError>> + Send + 'a>> {
        Box::pin(async move {
            let headers = message
                .headers
                .iter()
                .fold(OwnedHeaders::new(), |headers, (key, value)| {
                    headers.insert(Header {
                        key: key.as_str(),
                        value: Some(value.as_str()),
                    })
                });

            let mut record = FutureRecord::to(topic)
                .payload(&message.payload)
                .headers(headers);
            if let Some(key) = &message.key {
                record = record.key(key.as_str());
            }

            match self.producer.send(record, Timeout::After(self.timeout)).await {
                Ok((partition, offset)) => {
                    tracing::debug!(
                        topic = %topic,
                        partition = partition,
                        offset = offset,
                        "Message published"
                    );
                    Ok(())
                }
                Err((kafka_error, _)) => {
                    tracing::error!(topic = %topic, error = %kafka_error, "Failed to publish message");
                    Err(EventBusError::PublishFailed {
                        topic: topic.to_string(),
                        reason: kafka_error.to_string(),
                    })
                }
            }
        })
    }

    fn subscribe<'a>(
        &'a self,
        group: &'a str,
        topics: &'a [&'a str],
    ) -> Pin<Box<dyn Future<Output = Result<DeliveryStream, EventBusError>> + Send + 'a>> {
        Box::pin(async move {
            let owned_topics: Vec<String> = topics.iter().map(ToString::to_string).collect();

            let consumer = self
                .consumer_for(group)
                .map_err(|e| EventBusError::SubscriptionFailed {
                    topics: owned_topics.clone(),
                    reason: format!("Failed to create consumer: {e}"),
                })?;
            consumer
                .subscribe(topics)
                .map_err(|e| EventBusError::SubscriptionFailed {
                    topics: owned_topics.clone(),
                    reason: format!("Failed to subscribe to topics: {e}"),
                })?;

            tracing::info!(
                topics = ?owned_topics,
                consumer_group = %group,
                manual_commit = true,
                "Subscribed to topics"
            );

            // One delivery in flight at a time: the next message is read only
            // after the previous one was answered.
            let (tx, mut rx) = mpsc::channel(1);
            tokio::spawn(pump(consumer, tx));

            let stream = async_stream::stream! {
                while let Some(item) = rx.recv().await {
                    yield item;
                }
            };
            Ok(Box::pin(stream) as DeliveryStream)
        })
    }
}

async fn pump(consumer: StreamConsumer, tx: mpsc::Sender<Result<Delivery, EventBusError>>) {
    use futures::StreamExt;

    let mut stream = consumer.stream();
    while let Some(next) = stream.next().await {
        let message = match next {
            Ok(message) => message,
            Err(e) => {
                let err = EventBusError::TransportError(format!("Failed to receive message: {e}"));
                if tx.send(Err(err)).await.is_err() {
                    break;
                }
                continue;
            }
        };

        let (reply, answer) = oneshot::channel();
        let delivery = Delivery::new(
            message.topic(),
            message.partition(),
            message.offset(),
            to_bus_message(&message),
            reply,
        );
        if tx.send(Ok(delivery)).await.is_err() {
            tracing::debug!("Subscriber dropped, exiting consumer task");
            break;
        }

        if answer.await == Ok(Acknowledgement::Ack) {
            if let Err(e) = consumer.commit_message(&message, CommitMode::Async) {
                tracing::warn!(
                    topic = message.topic(),
                    partition = message.partition(),
                    offset = message.offset(),
                    error = %e,
                    "Failed to commit offset (message may be redelivered)"
                );
            }
        } else {
            tracing::warn!(
                topic = message.topic(),
                partition = message.partition(),
                offset = message.offset(),
                "Delivery not acknowledged, rewinding partition"
            );
            if let Err(e) = consumer.seek(
                message.topic(),
                message.partition(),
                Offset::Offset(message.offset()),
                Duration::from_secs(5),
            ) {
                tracing::error!(error = %e, "Failed to rewind partition, restarting subscription");
                break;
            }
        }
    }

    tracing::debug!("Consumer task exiting");
}
