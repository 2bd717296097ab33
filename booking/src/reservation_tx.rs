//! Reservation state-machine operations.
//!
//! Each operation is one unit of work: lock the row, move the state machine,
//! write the audit row and exactly one outbox event, commit. Asking for the
//! state the reservation is already in changes nothing and emits nothing.

use crate::context::{Actor, RequestContext};
use crate::error::{BookingError, Result};
use crate::events::{CancellationPayload, DomainEvent, ReasonPayload, StayPayload};
use crate::gateway::CancelRequest;
use crate::ids::{MemberId, ReservationUid};
use crate::outbox;
use crate::reservation::{Reservation, ReservationStatus, StatusChange, Transition};
use crate::store::{BookingStore, UnitOfWork, finish};
use homestay_core::environment::Clock;
use std::sync::Arc;

/// Audit reason for confirmations.
pub const CONFIRM_REASON: &str = "payment succeeded";
/// Audit reason for sweeper expirations.
pub const OVERDUE_REASON: &str = "payment window elapsed";

impl From<&Reservation> for StayPayload {
    fn from(reservation: &Reservation) -> Self {
        let stay = reservation.stay();
        Self {
            reservation_uid: reservation.reservation_uid,
            accommodation_id: reservation.accommodation_id,
            check_in_date: stay.check_in(),
            check_out_date: stay.check_out(),
        }
    }
}

/// Transactional reservation transitions.
#[derive(Clone)]
pub struct ReservationTransactionService {
    store: Arc<dyn BookingStore>,
    clock: Arc<dyn Clock>,
}

impl ReservationTransactionService {
    /// Service over `store`.
    #[must_use]
    pub fn new(store: Arc<dyn BookingStore>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    /// `PAYMENT_PENDING → CONFIRMED` after payment.
    ///
    /// # Errors
    ///
    /// [`BookingError::ReservationNotFound`], [`BookingError::InvalidStatusTransition`],
    /// or a store error.
    pub async fn confirm(&self, uid: ReservationUid) -> Result<Transition> {
        let mut uow = self.store.begin().await?;
        let result = self
            .transition_in(
                uow.as_mut(),
                uid,
                ReservationStatus::Confirmed,
                Actor::KafkaConsumer,
                CONFIRM_REASON,
                None,
                |r| DomainEvent::ReservationConfirmed(r.into()),
            )
            .await;
        finish(uow, result).await
    }

    /// `PAYMENT_PENDING → EXPIRED` after a failed payment.
    ///
    /// # Errors
    ///
    /// [`BookingError::ReservationNotFound`], [`BookingError::InvalidStatusTransition`],
    /// or a store error.
    pub async fn expire(&self, uid: ReservationUid, reason: &str) -> Result<Transition> {
        let mut uow = self.store.begin().await?;
        let result = self
            .transition_in(
                uow.as_mut(),
                uid,
                ReservationStatus::Expired,
                Actor::KafkaConsumer,
                reason,
                None,
                |r| DomainEvent::ReservationExpired(r.into()),
            )
            .await;
        finish(uow, result).await
    }

    /// `CONFIRMED → CANCELLED` on the guest's request.
    ///
    /// # Errors
    ///
    /// [`BookingError::AccessDenied`] when the caller does not own the
    /// reservation, plus the errors of [`Self::confirm`].
    pub async fn cancel(
        &self,
        ctx: &RequestContext,
        uid: ReservationUid,
        request: CancelRequest,
    ) -> Result<Transition> {
        let mut uow = self.store.begin().await?;
        let result = self
            .transition_in(
                uow.as_mut(),
                uid,
                ReservationStatus::Cancelled,
                ctx.actor(),
                &request.cancel_reason,
                Some(ctx.member_id),
                |r| {
                    DomainEvent::ReservationCancelled(CancellationPayload {
                        reservation_uid: r.reservation_uid,
                        cancel_reason: request.cancel_reason.clone(),
                        cancel_amount: request.cancel_amount,
                    })
                },
            )
            .await;
        finish(uow, result).await
    }

    /// `CANCELLED → CANCELLATION_FAILED` after the refund failed.
    ///
    /// # Errors
    ///
    /// Same as [`Self::confirm`].
    pub async fn revert_cancellation(&self, uid: ReservationUid, reason: &str) -> Result<Transition> {
        let mut uow = self.store.begin().await?;
        let result = self
            .transition_in(
                uow.as_mut(),
                uid,
                ReservationStatus::CancellationFailed,
                Actor::KafkaConsumer,
                reason,
                None,
                |r| DomainEvent::ReservationCancellationReverted(r.into()),
            )
            .await;
        finish(uow, result).await
    }

    /// Announce that a paid reservation could not be confirmed, which starts
    /// compensation. No status change.
    ///
    /// # Errors
    ///
    /// Returns a store or serialization error.
    pub async fn record_confirmation_failure(&self, uid: ReservationUid, reason: &str) -> Result<()> {
        let mut uow = self.store.begin().await?;
        let event = DomainEvent::ReservationConfirmationFailed(ReasonPayload {
            reservation_uid: uid,
            reason: reason.to_string(),
        });
        let result = outbox::append(uow.as_mut(), &event, self.clock.now()).await;
        finish(uow, result).await?;

        tracing::warn!(reservation_uid = %uid, reason = %reason, "Reservation confirmation failed, compensation requested");
        Ok(())
    }

    /// Expire every `PAYMENT_PENDING` reservation whose payment window has
    /// elapsed. Returns them so the caller can clear their holds.
    ///
    /// # Errors
    ///
    /// Returns a store error; nothing is expired then.
    pub async fn expire_overdue(&self) -> Result<Vec<Reservation>> {
        let now = self.clock.now();
        let mut uow = self.store.begin().await?;
        let result = async {
            let mut overdue = uow.find_overdue_reservations(now).await?;
            for reservation in &mut overdue {
                self.apply_in(
                    uow.as_mut(),
                    reservation,
                    ReservationStatus::Expired,
                    Actor::Scheduler,
                    OVERDUE_REASON,
                    |r| DomainEvent::ReservationExpired(r.into()),
                )
                .await?;
            }
            Ok(overdue)
        }
        .await;
        finish(uow, result).await
    }

    /// Reservation by uid.
    ///
    /// # Errors
    ///
    /// [`BookingError::ReservationNotFound`] or a store error.
    pub async fn find_by_uid(&self, uid: ReservationUid) -> Result<Reservation> {
        let mut uow = self.store.begin().await?;
        let result = uow
            .find_reservation(uid)
            .await
            .and_then(|r| r.ok_or_else(|| BookingError::ReservationNotFound(uid.to_string())));
        finish(uow, result).await
    }

    #[allow(clippy::too_many_arguments)]
    async fn transition_in<F>(
        &self,
        uow: &mut dyn UnitOfWork,
        uid: ReservationUid,
        target: ReservationStatus,
        actor: Actor,
        reason: &str,
        owner: Option<MemberId>,
        event: F,
    ) -> Result<Transition>
    where
        F: FnOnce(&Reservation) -> DomainEvent + Send,
    {
        let mut reservation = uow
            .find_reservation_for_update(uid)
            .await?
            .ok_or_else(|| BookingError::ReservationNotFound(uid.to_string()))?;

        if owner.is_some_and(|member| !reservation.is_owned_by(member)) {
            return Err(BookingError::AccessDenied(uid.to_string()));
        }

        self.apply_in(uow, &mut reservation, target, actor, reason, event).await
    }

    async fn apply_in<F>(
        &self,
        uow: &mut dyn UnitOfWork,
        reservation: &mut Reservation,
        target: ReservationStatus,
        actor: Actor,
        reason: &str,
        event: F,
    ) -> Result<Transition>
    where
        F: FnOnce(&Reservation) -> DomainEvent + Send,
    {
        let transition = reservation.transition_to(target)?;
        let Transition::Applied { from } = transition else {
            tracing::info!(
                reservation_uid = %reservation.reservation_uid,
                status = %target,
                "Reservation already in target state, nothing to do"
            );
            return Ok(transition);
        };

        let now = self.clock.now();
        uow.update_reservation_status(reservation.id, target).await?;
        uow.insert_status_history(&StatusChange::new(
            reservation.id,
            Some(from),
            target,
            actor,
            reason,
            now,
        ))
        .await?;
        outbox::append(uow, &event(reservation), now).await?;

        tracing::info!(
            reservation_uid = %reservation.reservation_uid,
            from = %from,
            to = %target,
            actor = %actor,
            "Reservation status changed"
        );
        Ok(transition)
    }
}
