//! Fan-out of relayed outbox rows to their aggregate topics.

use crate::events::EventType;
use async_trait::async_trait;
use homestay_core::event::parse_cdc_message;
use homestay_core::event_bus::{BusMessage, EventBus};
use homestay_runtime::{HandlerError, MessageHandler};
use std::sync::Arc;
use tracing::{debug, warn};

/// Consumes the CDC outbox topic and republishes each message, unchanged,
/// to the topic of its event type, keyed by the aggregate id so that every
/// event of one reservation lands on the same partition.
pub struct EventRouter {
    event_bus: Arc<dyn EventBus>,
}

impl EventRouter {
    /// Router publishing to `event_bus`.
    #[must_use]
    pub fn new(event_bus: Arc<dyn EventBus>) -> Self {
        Self { event_bus }
    }
}

#[async_trait]
impl MessageHandler for EventRouter {
    async fn handle(&self, message: &BusMessage) -> Result<(), HandlerError> {
        let envelope =
            parse_cdc_message(&message.payload).map_err(|e| HandlerError::Poison(e.to_string()))?;

        let event_type = EventType::from_name(&envelope.event_type);
        let Some(topic) = event_type.topic() else {
            warn!(event_type = %envelope.event_type, trace_id = %envelope.trace_id, "Unknown event type, dropping");
            return Ok(());
        };

        let routed = BusMessage::new(message.payload.clone()).with_key(envelope.trace_id.clone());
        self.event_bus
            .publish(topic, &routed)
            .await
            .map_err(|e| HandlerError::Retryable(e.to_string()))?;

        debug!(event_type = %event_type, topic = %topic, trace_id = %envelope.trace_id, "Event routed");
        Ok(())
    }
}
