//! Dispatch of `PG_*` gateway outcomes to the processors.

use super::decode;
use crate::error::Result;
use crate::events::DomainEvent;
use crate::payment_processor::{PaymentCancellationProcessor, PaymentConfirmationProcessor};
use async_trait::async_trait;
use homestay_core::event_bus::BusMessage;
use homestay_runtime::{HandlerError, MessageHandler};
use std::sync::Arc;
use tracing::{debug, warn};

/// Records gateway outcomes reported by the gateway worker.
pub struct PaymentResultConsumer {
    confirmation: Arc<PaymentConfirmationProcessor>,
    cancellation: Arc<PaymentCancellationProcessor>,
}

impl PaymentResultConsumer {
    /// Consumer feeding both processors.
    #[must_use]
    pub fn new(
        confirmation: Arc<PaymentConfirmationProcessor>,
        cancellation: Arc<PaymentCancellationProcessor>,
    ) -> Self {
        Self {
            confirmation,
            cancellation,
        }
    }

    async fn process(&self, message: &BusMessage) -> Result<()> {
        match decode(message)? {
            DomainEvent::PgCallSucceeded(event) => self.confirmation.on_call_succeeded(&event).await,
            DomainEvent::PgCallFailed(event) => self.confirmation.on_call_failed(&event).await,
            DomainEvent::PgCancelCallSucceeded(event) => self.cancellation.on_cancel_succeeded(&event).await,
            DomainEvent::PgCancelCallFailed(event) => self.cancellation.on_cancel_failed(&event).await,
            DomainEvent::Unknown(name) => {
                warn!(event_type = %name, "Unknown event type, ignoring");
                Ok(())
            }
            other => {
                debug!(event_type = %other.event_type(), "Not a gateway outcome");
                Ok(())
            }
        }
    }
}

#[async_trait]
impl MessageHandler for PaymentResultConsumer {
    async fn handle(&self, message: &BusMessage) -> std::result::Result<(), HandlerError> {
        Ok(self.process(message).await?)
    }
}
