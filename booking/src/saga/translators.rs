//! Cross-aggregate translation.
//!
//! The reservation and payment sides never read each other's topic
//! directly for commands. A translator listens to one side's results and
//! writes the matching request for the other side to the outbox.

use super::{decode, emit};
use crate::error::Result;
use crate::events::DomainEvent;
use crate::store::BookingStore;
use async_trait::async_trait;
use homestay_core::environment::Clock;
use homestay_core::event_bus::BusMessage;
use homestay_runtime::{HandlerError, MessageHandler};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Payment results → reservation requests.
///
/// | Payment event | Reservation request |
/// |---------------|---------------------|
/// | `PAYMENT_COMPLETED`, `PAYMENT_SUCCEEDED` | `RESERVATION_CONFIRM_REQUESTED` |
/// | `PAYMENT_FAILED` | `RESERVATION_EXPIRE_REQUESTED` |
/// | `PAYMENT_CANCELLATION_FAILED` | `RESERVATION_CANCELLATION_REVERT_REQUESTED` |
pub struct PaymentEventTranslator {
    store: Arc<dyn BookingStore>,
    clock: Arc<dyn Clock>,
}

impl PaymentEventTranslator {
    /// Translator writing to `store`'s outbox.
    #[must_use]
    pub fn new(store: Arc<dyn BookingStore>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    /// The reservation request for `event`, if it needs one.
    #[must_use]
    pub fn translate(event: &DomainEvent) -> Option<DomainEvent> {
        match event {
            DomainEvent::PaymentCompleted(r) | DomainEvent::PaymentSucceeded(r) => {
                Some(DomainEvent::ReservationConfirmRequested(r.clone()))
            }
            DomainEvent::PaymentFailed(r) => Some(DomainEvent::ReservationExpireRequested(r.clone())),
            DomainEvent::PaymentCancellationFailed(r) => {
                Some(DomainEvent::ReservationCancellationRevertRequested(r.clone()))
            }
            _ => None,
        }
    }

    async fn process(&self, message: &BusMessage) -> Result<()> {
        forward(self.store.as_ref(), self.clock.as_ref(), &decode(message)?, Self::translate).await
    }
}

#[async_trait]
impl MessageHandler for PaymentEventTranslator {
    async fn handle(&self, message: &BusMessage) -> std::result::Result<(), HandlerError> {
        Ok(self.process(message).await?)
    }
}

/// Reservation results → payment requests: `RESERVATION_CANCELLED` becomes
/// `PAYMENT_CANCELLATION_REQUESTED`.
pub struct ReservationEventTranslator {
    store: Arc<dyn BookingStore>,
    clock: Arc<dyn Clock>,
}

impl ReservationEventTranslator {
    /// Translator writing to `store`'s outbox.
    #[must_use]
    pub fn new(store: Arc<dyn BookingStore>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    /// The payment request for `event`, if it needs one.
    #[must_use]
    pub fn translate(event: &DomainEvent) -> Option<DomainEvent> {
        match event {
            DomainEvent::ReservationCancelled(c) => Some(DomainEvent::PaymentCancellationRequested(c.clone())),
            _ => None,
        }
    }

    async fn process(&self, message: &BusMessage) -> Result<()> {
        forward(self.store.as_ref(), self.clock.as_ref(), &decode(message)?, Self::translate).await
    }
}

#[async_trait]
impl MessageHandler for ReservationEventTranslator {
    async fn handle(&self, message: &BusMessage) -> std::result::Result<(), HandlerError> {
        Ok(self.process(message).await?)
    }
}

async fn forward(
    store: &dyn BookingStore,
    clock: &dyn Clock,
    event: &DomainEvent,
    translate: fn(&DomainEvent) -> Option<DomainEvent>,
) -> Result<()> {
    if let DomainEvent::Unknown(name) = event {
        warn!(event_type = %name, "Unknown event type, ignoring");
        return Ok(());
    }
    let Some(request) = translate(event) else {
        debug!(event_type = %event.event_type(), "Not translated");
        return Ok(());
    };

    emit(store, &request, clock.now()).await?;
    info!(
        from = %event.event_type(),
        to = %request.event_type(),
        aggregate_id = %event.aggregate_id(),
        "Event translated"
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::{CancellationPayload, ReasonPayload, ReservationRef};
    use crate::ids::ReservationUid;

    #[test]
    fn payment_results_map_to_reservation_requests() {
        let uid = ReservationUid::new_v4();
        let r = ReservationRef { reservation_uid: uid };
        let reason = ReasonPayload {
            reservation_uid: uid,
            reason: "declined".into(),
        };

        assert_eq!(
            PaymentEventTranslator::translate(&DomainEvent::PaymentSucceeded(r.clone())),
            Some(DomainEvent::ReservationConfirmRequested(r.clone()))
        );
        assert_eq!(
            PaymentEventTranslator::translate(&DomainEvent::PaymentFailed(reason.clone())),
            Some(DomainEvent::ReservationExpireRequested(reason.clone()))
        );
        assert_eq!(
            PaymentEventTranslator::translate(&DomainEvent::PaymentCancellationFailed(reason.clone())),
            Some(DomainEvent::ReservationCancellationRevertRequested(reason))
        );
        assert_eq!(PaymentEventTranslator::translate(&DomainEvent::ReservationConfirmRequested(r)), None);
    }

    #[test]
    fn cancellation_becomes_payment_cancellation_request() {
        let cancel = CancellationPayload {
            reservation_uid: ReservationUid::new_v4(),
            cancel_reason: "change of plans".into(),
            cancel_amount: None,
        };
        assert_eq!(
            ReservationEventTranslator::translate(&DomainEvent::ReservationCancelled(cancel.clone())),
            Some(DomainEvent::PaymentCancellationRequested(cancel))
        );
    }
}
