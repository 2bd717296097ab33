//! Last line of defence for messages every other consumer gave up on.
//!
//! A dead-lettered payment success means money was taken for a reservation
//! that may never be confirmed, so those are refunded. Everything else is
//! left to an operator. This consumer always acknowledges: a message that
//! reaches it has nowhere left to go.

use super::decode;
use crate::compensation::PaymentCompensationService;
use crate::error::Result;
use crate::events::DomainEvent;
use crate::notifier::Notifier;
use async_trait::async_trait;
use homestay_core::event::parse_cdc_message;
use homestay_core::event_bus::BusMessage;
use homestay_runtime::consumer::{DLQ_CONSUMER, DLQ_ORIGINAL_TOPIC};
use homestay_runtime::{HandlerError, MessageHandler};
use std::sync::Arc;
use tracing::{error, info, warn};

/// Consumer of the dead-letter topic.
pub struct DlqConsumer {
    compensation: Arc<PaymentCompensationService>,
    notifier: Arc<dyn Notifier>,
}

impl DlqConsumer {
    /// Consumer refunding through `compensation` and alerting via `notifier`.
    #[must_use]
    pub fn new(compensation: Arc<PaymentCompensationService>, notifier: Arc<dyn Notifier>) -> Self {
        Self {
            compensation,
            notifier,
        }
    }

    async fn process(&self, message: &BusMessage) -> Result<()> {
        match decode(message)? {
            DomainEvent::PaymentCompleted(r)
            | DomainEvent::PaymentSucceeded(r)
            | DomainEvent::ReservationConfirmRequested(r) => {
                let outcome = self.compensation.compensate(r.reservation_uid).await?;
                info!(reservation_uid = %r.reservation_uid, outcome = ?outcome, "Dead-lettered payment compensated");
                Ok(())
            }
            other => {
                warn!(
                    event_type = %other.event_type(),
                    original_topic = message.header(DLQ_ORIGINAL_TOPIC).unwrap_or("unknown"),
                    "Dead-lettered event needs no compensation, ignoring"
                );
                Ok(())
            }
        }
    }

    async fn alert(&self, message: &BusMessage, err: &crate::error::BookingError) {
        let event_type = parse_cdc_message(&message.payload)
            .map_or_else(|_| "UNPARSEABLE".to_string(), |envelope| envelope.event_type);
        error!(
            event_type = %event_type,
            consumer = message.header(DLQ_CONSUMER).unwrap_or("unknown"),
            error = %err,
            "Dead-letter processing failed"
        );
        let alert = format!(
            "[FATAL] dead-letter processing failed, manual intervention required. event_type={event_type}, error={err}, message={}",
            message.payload_text()
        );
        self.notifier.send_alert(&alert).await;
    }
}

#[async_trait]
impl MessageHandler for DlqConsumer {
    async fn handle(&self, message: &BusMessage) -> std::result::Result<(), HandlerError> {
        if let Err(e) = self.process(message).await {
            self.alert(message, &e).await;
        }
        Ok(())
    }
}
