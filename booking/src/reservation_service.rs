//! Guest-facing reservation creation.
//!
//! ```text
//! validate stay ─► hold pre-check ─► sorted multi-lock ─┬─► unit of work:
//!                                                       │     member, accommodation,
//!                                                       │     overlap check, code,
//!                                                       │     PENDING row + audit + outbox
//!                                                       ├─► hold dates
//!                                                       └─► release lock (always)
//! ```

use crate::catalog::{Accommodation, Member};
use crate::context::RequestContext;
use crate::error::{BookingError, Result};
use crate::events::{DomainEvent, ReservationPendingPayload};
use crate::hold::ReservationHolds;
use crate::lock::ReservationLockManager;
use crate::outbox;
use crate::reservation::{
    NewReservation, Reservation, ReservationRequest, StatusChange, StayDates, generate_reservation_code,
};
use crate::store::{BookingStore, UnitOfWork, finish};
use homestay_core::environment::Clock;
use std::sync::Arc;

const MAX_CODE_ATTEMPTS: usize = 10;
const CREATED_REASON: &str = "reservation created";

/// Creates `PAYMENT_PENDING` reservations.
#[derive(Clone)]
pub struct ReservationService {
    store: Arc<dyn BookingStore>,
    locks: ReservationLockManager,
    holds: ReservationHolds,
    clock: Arc<dyn Clock>,
    payment_window: chrono::Duration,
}

impl ReservationService {
    /// Service whose reservations must be paid within `payment_window`.
    #[must_use]
    pub fn new(
        store: Arc<dyn BookingStore>,
        locks: ReservationLockManager,
        holds: ReservationHolds,
        clock: Arc<dyn Clock>,
        payment_window: chrono::Duration,
    ) -> Self {
        Self {
            store,
            locks,
            holds,
            clock,
            payment_window,
        }
    }

    /// Book `request` for the caller.
    ///
    /// # Errors
    ///
    /// - [`BookingError::InvalidStayDates`] for fewer than one night.
    /// - [`BookingError::DatesOnHold`] when another booking is waiting for payment.
    /// - [`BookingError::LockContention`] when the dates are being booked right now.
    /// - [`BookingError::ReservationConflict`] when a reservation already covers a night.
    /// - [`BookingError::MemberNotFound`] / [`BookingError::AccommodationNotFound`].
    pub async fn create_reservation(
        &self,
        ctx: &RequestContext,
        request: ReservationRequest,
    ) -> Result<Reservation> {
        let stay = request.stay()?;
        let accommodation_id = request.accommodation_id;

        if self.holds.is_any_date_held(accommodation_id, &stay).await? {
            return Err(BookingError::DatesOnHold);
        }

        let reservation = self
            .locks
            .with_lock(accommodation_id, &stay, async {
                let mut uow = self.store.begin().await?;
                let result = self.create_in(uow.as_mut(), ctx, &request, stay).await;
                let reservation = finish(uow, result).await?;

                if let Err(e) = self.holds.hold(accommodation_id, &stay).await {
                    tracing::error!(
                        reservation_uid = %reservation.reservation_uid,
                        error = %e,
                        "Reservation committed but dates could not be held"
                    );
                }
                Ok(reservation)
            })
            .await?;

        tracing::info!(
            reservation_uid = %reservation.reservation_uid,
            accommodation_id = %accommodation_id,
            member_id = %ctx.member_id,
            total_price = reservation.total_price,
            "Reservation created, waiting for payment"
        );
        metrics::counter!("booking.reservations.created").increment(1);
        Ok(reservation)
    }

    async fn create_in(
        &self,
        uow: &mut dyn UnitOfWork,
        ctx: &RequestContext,
        request: &ReservationRequest,
        stay: StayDates,
    ) -> Result<Reservation> {
        let guest = active_member(uow, ctx).await?;
        let accommodation = published_accommodation(uow, request).await?;

        if uow.has_overlapping_reservation(accommodation.id, &stay).await? {
            return Err(BookingError::ReservationConflict);
        }

        let code = unique_code(uow).await?;
        let now = self.clock.now();
        let pending = NewReservation::pending(
            &accommodation,
            &guest,
            request,
            stay,
            code,
            now,
            self.payment_window,
        );
        let reservation = uow.insert_reservation(pending).await?;

        uow.insert_status_history(&StatusChange::new(
            reservation.id,
            None,
            reservation.status,
            ctx.actor(),
            CREATED_REASON,
            now,
        ))
        .await?;

        let event = DomainEvent::ReservationPending(ReservationPendingPayload {
            amount: reservation.total_price,
            payment_key: None,
            order_id: reservation.reservation_uid,
        });
        outbox::append(uow, &event, now).await?;

        Ok(reservation)
    }
}

async fn active_member(uow: &mut dyn UnitOfWork, ctx: &RequestContext) -> Result<Member> {
    uow.find_member(ctx.member_id)
        .await?
        .filter(Member::is_active)
        .ok_or(BookingError::MemberNotFound(ctx.member_id))
}

async fn published_accommodation(
    uow: &mut dyn UnitOfWork,
    request: &ReservationRequest,
) -> Result<Accommodation> {
    uow.find_accommodation(request.accommodation_id)
        .await?
        .filter(Accommodation::is_published)
        .ok_or(BookingError::AccommodationNotFound(request.accommodation_id))
}

async fn unique_code(uow: &mut dyn UnitOfWork) -> Result<String> {
    for _ in 0..MAX_CODE_ATTEMPTS {
        let code = generate_reservation_code(&mut rand::thread_rng());
        if !uow.reservation_code_exists(&code).await? {
            return Ok(code);
        }
        tracing::debug!(code = %code, "Reservation code collision, generating another");
    }
    Err(BookingError::Store(format!(
        "no unique reservation code after {MAX_CODE_ATTEMPTS} attempts"
    )))
}
