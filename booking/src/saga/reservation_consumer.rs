//! Reservation-side reactions on `reservation-events`.

use super::decode;
use crate::error::{BookingError, Result};
use crate::events::{DomainEvent, StayPayload};
use crate::hold::ReservationHolds;
use crate::ids::ReservationUid;
use crate::reservation::{ReservationStatus, StayDates, Transition};
use crate::reservation_tx::ReservationTransactionService;
use async_trait::async_trait;
use homestay_core::event_bus::BusMessage;
use homestay_runtime::{HandlerError, MessageHandler};
use tracing::{debug, info, warn};

/// Applies saga requests to the reservation state machine and clears holds
/// once a reservation has left `PAYMENT_PENDING`.
pub struct ReservationEventsConsumer {
    reservations: ReservationTransactionService,
    holds: ReservationHolds,
}

impl ReservationEventsConsumer {
    /// Consumer driving `reservations`.
    #[must_use]
    pub const fn new(reservations: ReservationTransactionService, holds: ReservationHolds) -> Self {
        Self { reservations, holds }
    }

    async fn process(&self, message: &BusMessage) -> Result<()> {
        match decode(message)? {
            DomainEvent::ReservationConfirmRequested(r) => self.confirm(r.reservation_uid).await,
            DomainEvent::ReservationExpireRequested(r) => {
                let result = self.reservations.expire(r.reservation_uid, &r.reason).await;
                settle(r.reservation_uid, "expire", result)
            }
            DomainEvent::ReservationCancellationRevertRequested(r) => {
                let result = self.reservations.revert_cancellation(r.reservation_uid, &r.reason).await;
                settle(r.reservation_uid, "revert cancellation", result)
            }
            DomainEvent::ReservationConfirmed(stay) | DomainEvent::ReservationExpired(stay) => {
                self.release_hold(&stay).await
            }
            DomainEvent::Unknown(name) => {
                warn!(event_type = %name, "Unknown event type, ignoring");
                Ok(())
            }
            other => {
                debug!(event_type = %other.event_type(), "Not handled by the reservation consumer");
                Ok(())
            }
        }
    }

    /// A confirmation that cannot be applied means the guest paid for a
    /// reservation that will never be confirmed: hand it to compensation.
    ///
    /// Cancellation is only reachable from `CONFIRMED`, so a redelivered
    /// request finding the reservation cancelled was already applied; the
    /// cancellation flow owns the refund from there.
    async fn confirm(&self, uid: ReservationUid) -> Result<()> {
        match self.reservations.confirm(uid).await {
            Ok(_) => Ok(()),
            Err(BookingError::InvalidStatusTransition {
                from: from @ (ReservationStatus::Cancelled | ReservationStatus::CancellationFailed),
                ..
            }) => {
                info!(reservation_uid = %uid, status = %from, "Reservation was confirmed before, skipping redelivered confirm");
                Ok(())
            }
            Err(e) if e.is_precondition() => {
                warn!(reservation_uid = %uid, error = %e, "Paid reservation cannot be confirmed");
                self.reservations
                    .record_confirmation_failure(uid, &e.to_string())
                    .await
            }
            Err(e) => Err(e),
        }
    }

    async fn release_hold(&self, stay: &StayPayload) -> Result<()> {
        let dates = StayDates::new(stay.check_in_date, stay.check_out_date)
            .map_err(|e| BookingError::MalformedEvent(e.to_string()))?;
        self.holds.remove_hold(stay.accommodation_id, &dates).await?;
        info!(reservation_uid = %stay.reservation_uid, "Reservation hold released");
        Ok(())
    }
}

/// Preconditions that no retry can fix are logged and acknowledged.
fn settle(uid: ReservationUid, action: &str, result: Result<Transition>) -> Result<()> {
    match result {
        Ok(_) => Ok(()),
        Err(e) if e.is_precondition() => {
            warn!(reservation_uid = %uid, action, error = %e, "Saga request not applicable, skipping");
            Ok(())
        }
        Err(e) => Err(e),
    }
}

#[async_trait]
impl MessageHandler for ReservationEventsConsumer {
    async fn handle(&self, message: &BusMessage) -> std::result::Result<(), HandlerError> {
        Ok(self.process(message).await?)
    }
}
