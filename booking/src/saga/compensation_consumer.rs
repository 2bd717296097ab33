//! Refunds for paid reservations that could not be confirmed.

use super::decode;
use crate::compensation::PaymentCompensationService;
use crate::error::Result;
use crate::events::DomainEvent;
use async_trait::async_trait;
use homestay_core::event_bus::BusMessage;
use homestay_runtime::{HandlerError, MessageHandler};
use std::sync::Arc;
use tracing::{debug, warn};

/// Runs compensation for `RESERVATION_CONFIRMATION_FAILED`.
pub struct CompensationConsumer {
    compensation: Arc<PaymentCompensationService>,
}

impl CompensationConsumer {
    /// Consumer refunding through `compensation`.
    #[must_use]
    pub fn new(compensation: Arc<PaymentCompensationService>) -> Self {
        Self { compensation }
    }

    async fn process(&self, message: &BusMessage) -> Result<()> {
        match decode(message)? {
            DomainEvent::ReservationConfirmationFailed(r) => {
                self.compensation.compensate(r.reservation_uid).await.map(|_| ())
            }
            DomainEvent::Unknown(name) => {
                warn!(event_type = %name, "Unknown event type, ignoring");
                Ok(())
            }
            other => {
                debug!(event_type = %other.event_type(), "Not handled by the compensation consumer");
                Ok(())
            }
        }
    }
}

#[async_trait]
impl MessageHandler for CompensationConsumer {
    async fn handle(&self, message: &BusMessage) -> std::result::Result<(), HandlerError> {
        Ok(self.process(message).await?)
    }
}
