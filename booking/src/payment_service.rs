//! Guest-facing payment confirmation request.
//!
//! The guest returns from checkout with a payment key. Nothing is charged
//! here: the request is validated against the reservation and handed to the
//! gateway worker through a `PAYMENT_CONFIRM_REQUESTED` event.

use crate::context::RequestContext;
use crate::error::{BookingError, Result};
use crate::events::DomainEvent;
use crate::gateway::ConfirmRequest;
use crate::ids::ReservationUid;
use crate::outbox;
use crate::reservation::ReservationStatus;
use crate::store::{BookingStore, UnitOfWork, finish};
use homestay_core::environment::Clock;
use std::sync::Arc;

/// Accepts payment confirmations from guests.
#[derive(Clone)]
pub struct PaymentService {
    store: Arc<dyn BookingStore>,
    clock: Arc<dyn Clock>,
}

impl PaymentService {
    /// Service over `store`.
    #[must_use]
    pub fn new(store: Arc<dyn BookingStore>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    /// Queue `request` for the gateway worker.
    ///
    /// # Errors
    ///
    /// - [`BookingError::ReservationNotFound`] when the order id names no reservation.
    /// - [`BookingError::AccessDenied`] when the caller does not own it.
    /// - [`BookingError::InvalidStatusTransition`] unless it is `PAYMENT_PENDING`.
    /// - [`BookingError::AmountMismatch`] unless the amount equals the total price.
    pub async fn request_confirmation(&self, ctx: &RequestContext, request: ConfirmRequest) -> Result<()> {
        let uid: ReservationUid = request
            .order_id
            .parse()
            .map_err(|_| BookingError::ReservationNotFound(request.order_id.clone()))?;

        let mut uow = self.store.begin().await?;
        let result = self.request_in(uow.as_mut(), ctx, uid, &request).await;
        finish(uow, result).await?;

        tracing::info!(reservation_uid = %uid, payment_key = %request.payment_key, "Payment confirmation requested");
        Ok(())
    }

    async fn request_in(
        &self,
        uow: &mut dyn UnitOfWork,
        ctx: &RequestContext,
        uid: ReservationUid,
        request: &ConfirmRequest,
    ) -> Result<()> {
        let reservation = uow
            .find_reservation(uid)
            .await?
            .ok_or_else(|| BookingError::ReservationNotFound(uid.to_string()))?;

        if !reservation.is_owned_by(ctx.member_id) {
            return Err(BookingError::AccessDenied(uid.to_string()));
        }
        if reservation.status != ReservationStatus::PaymentPending {
            return Err(BookingError::InvalidStatusTransition {
                from: reservation.status,
                to: ReservationStatus::Confirmed,
            });
        }
        if request.amount != reservation.total_price {
            return Err(BookingError::AmountMismatch {
                expected: reservation.total_price,
                actual: request.amount,
            });
        }

        let event = DomainEvent::PaymentConfirmRequested(request.clone());
        outbox::append(uow, &event, self.clock.now()).await
    }
}
