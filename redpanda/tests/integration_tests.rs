//! Integration tests for [`RedpandaEventBus`] against a real Kafka broker.
//!
//! Marked `#[ignore]`: they need Docker and take a while to start Kafka.
//!
//! ```bash
//! cargo test -p homestay-redpanda --test integration_tests -- --ignored
//! ```

#![allow(clippy::expect_used)]
#![allow(clippy::panic)]

use futures::StreamExt;
use homestay_core::event_bus::{BusMessage, EventBus};
use homestay_redpanda::RedpandaEventBus;
use std::time::Duration;
use testcontainers::ImageExt;
use testcontainers::runners::AsyncRunner;
use testcontainers_modules::kafka::{KAFKA_PORT, Kafka};

async fn wait_for_kafka_ready(brokers: &str) -> RedpandaEventBus {
    for _ in 0..60 {
        if let Ok(bus) = RedpandaEventBus::new(brokers) {
            if bus.publish("warmup-topic", &BusMessage::new("warmup")).await.is_ok() {
                tokio::time::sleep(Duration::from_millis(500)).await;
                return bus;
            }
        }
        tokio::time::sleep(Duration::from_millis(200)).await;
    }
    panic!("Kafka failed to become ready");
}

#[tokio::test]
#[ignore = "requires Docker"]
async fn keyed_message_with_headers_round_trips() {
    let kafka = Kafka::default()
        .with_env_var("KAFKA_AUTO_CREATE_TOPICS_ENABLE", "true")
        .start()
        .await
        .expect("Failed to start Kafka container");
    let host = kafka.get_host().await.expect("Failed to get host");
    let port = kafka
        .get_host_port_ipv4(KAFKA_PORT)
        .await
        .expect("Failed to get port");
    let bus = wait_for_kafka_ready(&format!("{host}:{port}")).await;

    let sent = BusMessage::new(br#"{"payload":"{}"}"#.to_vec())
        .with_key("reservation-1")
        .with_header("dlq-original-topic", "reservation-events");
    bus.publish("round-trip", &sent).await.expect("publish");

    let mut stream = bus
        .subscribe("round-trip-group", &["round-trip"])
        .await
        .expect("subscribe");
    let delivery = tokio::time::timeout(Duration::from_secs(30), stream.next())
        .await
        .expect("timeout")
        .expect("stream ended")
        .expect("delivery");

    assert_eq!(delivery.message, sent);
    delivery.ack();
}

#[tokio::test]
#[ignore = "requires Docker"]
async fn nacked_message_is_delivered_again() {
    let kafka = Kafka::default()
        .with_env_var("KAFKA_AUTO_CREATE_TOPICS_ENABLE", "true")
        .start()
        .await
        .expect("Failed to start Kafka container");
    let host = kafka.get_host().await.expect("Failed to get host");
    let port = kafka
        .get_host_port_ipv4(KAFKA_PORT)
        .await
        .expect("Failed to get port");
    let bus = wait_for_kafka_ready(&format!("{host}:{port}")).await;

    bus.publish("redelivery", &BusMessage::new("again"))
        .await
        .expect("publish");

    let mut stream = bus
        .subscribe("redelivery-group", &["redelivery"])
        .await
        .expect("subscribe");

    let first = tokio::time::timeout(Duration::from_secs(30), stream.next())
        .await
        .expect("timeout")
        .expect("stream ended")
        .expect("delivery");
    let offset = first.offset;
    first.nack();

    let second = tokio::time::timeout(Duration::from_secs(30), stream.next())
        .await
        .expect("timeout")
        .expect("stream ended")
        .expect("delivery");
    assert_eq!(second.offset, offset);
    assert_eq!(second.message.payload_text(), "again");
    second.ack();
}
