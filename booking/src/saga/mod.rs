//! Saga choreography: the broker-facing half of the booking core.
//!
//! Every participant is a [`MessageHandler`](homestay_runtime::MessageHandler)
//! wrapped in an [`EventConsumer`](homestay_runtime::EventConsumer). None of
//! them calls another directly; each reacts to events and answers by writing
//! new events to the outbox.
//!
//! ```text
//! outbox ─CDC─► EventRouter ─► reservation-events / payment-events
//!
//! RESERVATION_CANCELLED ─────► ReservationEventTranslator ─► PAYMENT_CANCELLATION_REQUESTED
//! PAYMENT_CONFIRM_REQUESTED ─► PaymentGatewayWorker ──────► PG_CALL_SUCCEEDED | PG_CALL_FAILED
//! PG_CALL_* / PG_CANCEL_* ───► PaymentResultConsumer ─────► PAYMENT_COMPLETED | PAYMENT_FAILED | ...
//! PAYMENT_* results ─────────► PaymentEventTranslator ────► RESERVATION_*_REQUESTED
//! RESERVATION_*_REQUESTED ───► ReservationEventsConsumer ─► state change (+ hold cleanup)
//! CONFIRMATION_FAILED ───────► CompensationConsumer ──────► refund
//! dead-letter topic ─────────► DlqConsumer ───────────────► refund or operator alert
//! ```
//!
//! Delivery is at-least-once, so every handler tolerates duplicates.

pub mod compensation_consumer;
pub mod dlq;
pub mod payment_results;
pub mod payment_worker;
pub mod reservation_consumer;
pub mod router;
pub mod translators;

pub use compensation_consumer::CompensationConsumer;
pub use dlq::DlqConsumer;
pub use payment_results::PaymentResultConsumer;
pub use payment_worker::PaymentGatewayWorker;
pub use reservation_consumer::ReservationEventsConsumer;
pub use router::EventRouter;
pub use translators::{PaymentEventTranslator, ReservationEventTranslator};

use crate::error::Result;
use crate::events::DomainEvent;
use crate::outbox;
use crate::store::{BookingStore, finish};
use chrono::{DateTime, Utc};
use homestay_core::event::parse_cdc_message;
use homestay_core::event_bus::BusMessage;

/// Decode a CDC broker message into a typed event.
///
/// # Errors
///
/// Returns [`crate::error::BookingError::MalformedEvent`] when the message
/// or its payload cannot be decoded.
pub fn decode(message: &BusMessage) -> Result<DomainEvent> {
    let envelope = parse_cdc_message(&message.payload)?;
    Ok(DomainEvent::from_envelope(&envelope)?)
}

/// Append `event` to the outbox in its own unit of work.
async fn emit(store: &dyn BookingStore, event: &DomainEvent, now: DateTime<Utc>) -> Result<()> {
    let mut uow = store.begin().await?;
    let result = outbox::append(uow.as_mut(), event, now).await;
    finish(uow, result).await
}
