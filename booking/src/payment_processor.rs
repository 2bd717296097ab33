//! Recording gateway outcomes.
//!
//! The gateway worker calls the gateway outside any transaction and reports
//! the result as a `PG_*` event. The processors here turn those results into
//! payment rows, attempt log entries and the saga events the reservation side
//! listens to, each in one unit of work.

use crate::compensation::{PaymentCompensationService, record_refund};
use crate::error::Result;
use crate::events::{
    DomainEvent, PgCallFailedPayload, PgCallSucceededPayload, PgCancelCallFailedPayload, ReasonPayload,
    ReservationRef,
};
use crate::notifier::Notifier;
use crate::outbox;
use crate::payment::{NewPayment, PaymentAttempt, PaymentStatus};
use crate::reservation::{Reservation, ReservationStatus};
use crate::store::{BookingStore, UnitOfWork, finish};
use homestay_core::environment::Clock;
use std::sync::Arc;

/// Handles `PG_CALL_SUCCEEDED` and `PG_CALL_FAILED`.
pub struct PaymentConfirmationProcessor {
    store: Arc<dyn BookingStore>,
    compensation: Arc<PaymentCompensationService>,
    clock: Arc<dyn Clock>,
}

impl PaymentConfirmationProcessor {
    /// Processor over `store`; ghost payments go to `compensation`.
    #[must_use]
    pub fn new(
        store: Arc<dyn BookingStore>,
        compensation: Arc<PaymentCompensationService>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            store,
            compensation,
            clock,
        }
    }

    /// Record a confirm call that returned a payment.
    ///
    /// `DONE` creates the payment and emits `PAYMENT_COMPLETED`; any other
    /// status emits `PAYMENT_FAILED`. A response for an unknown reservation is
    /// a ghost payment and is refunded.
    ///
    /// # Errors
    ///
    /// Returns a store error.
    pub async fn on_call_succeeded(&self, event: &PgCallSucceededPayload) -> Result<()> {
        let uid = event.reservation_uid;
        let Some(reservation) = self.find_reservation(event).await? else {
            tracing::error!(reservation_uid = %uid, payment_key = %event.response.payment_key, "Payment approved for unknown reservation");
            self.compensation
                .compensate_ghost_payment(&event.response.payment_key)
                .await;
            return Ok(());
        };

        let mut uow = self.store.begin().await?;
        let result = self.record_success_in(uow.as_mut(), &reservation, event).await;
        finish(uow, result).await
    }

    /// Record a confirm call that failed.
    ///
    /// The attempt is always logged. `PAYMENT_FAILED` is only emitted while
    /// the reservation still waits for its payment: a rejected duplicate
    /// confirm (e.g. `ALREADY_PROCESSED_PAYMENT`) must not expire a
    /// reservation another call already paid for.
    ///
    /// # Errors
    ///
    /// Returns a store error.
    pub async fn on_call_failed(&self, event: &PgCallFailedPayload) -> Result<()> {
        let mut uow = self.store.begin().await?;
        let result = self.record_failure_in(uow.as_mut(), event).await;
        finish(uow, result).await
    }

    async fn record_failure_in(&self, uow: &mut dyn UnitOfWork, event: &PgCallFailedPayload) -> Result<()> {
        let uid = event.reservation_uid;
        let Some(reservation) = uow.find_reservation_for_update(uid).await? else {
            tracing::warn!(reservation_uid = %uid, code = %event.error_code, "Payment failure for unknown reservation, ignoring");
            return Ok(());
        };

        let now = self.clock.now();
        uow.insert_payment_attempt(&PaymentAttempt::failed(
            &event.request,
            reservation.id,
            &event.error_code,
            &event.error_message,
            now,
        ))
        .await?;

        if let Some(payment) = uow.find_payment_by_reservation_uid(uid).await? {
            tracing::info!(reservation_uid = %uid, payment_key = %payment.payment_key, code = %event.error_code, "Reservation already paid, failed call only logged");
            return Ok(());
        }
        if reservation.status != ReservationStatus::PaymentPending {
            tracing::info!(reservation_uid = %uid, status = %reservation.status, code = %event.error_code, "Reservation no longer awaits payment, failed call only logged");
            return Ok(());
        }

        let failed = DomainEvent::PaymentFailed(ReasonPayload {
            reservation_uid: uid,
            reason: event.error_message.clone(),
        });
        outbox::append(uow, &failed, now).await?;
        tracing::warn!(reservation_uid = %uid, code = %event.error_code, message = %event.error_message, "Payment failed");
        Ok(())
    }

    async fn find_reservation(&self, event: &PgCallSucceededPayload) -> Result<Option<Reservation>> {
        let mut uow = self.store.begin().await?;
        let found = uow.find_reservation(event.reservation_uid).await;
        finish(uow, found).await
    }

    async fn record_success_in(
        &self,
        uow: &mut dyn UnitOfWork,
        reservation: &Reservation,
        event: &PgCallSucceededPayload,
    ) -> Result<()> {
        let uid = event.reservation_uid;
        let response = &event.response;
        let now = self.clock.now();

        if let Some(existing) = uow.find_payment_by_reservation_uid(uid).await? {
            tracing::info!(reservation_uid = %uid, payment_key = %existing.payment_key, "Payment already recorded, skipping");
            return Ok(());
        }

        uow.insert_payment_attempt(&PaymentAttempt::from_response(response, reservation.id, now))
            .await?;

        if response.status == PaymentStatus::Done {
            let payment = uow
                .insert_payment(NewPayment::from_gateway(response, reservation.id, now)?)
                .await?;
            outbox::append(
                uow,
                &DomainEvent::PaymentCompleted(ReservationRef { reservation_uid: uid }),
                now,
            )
            .await?;
            tracing::info!(reservation_uid = %uid, payment_key = %payment.payment_key, amount = payment.amount, "Payment completed");
        } else {
            let reason = response.failure.as_ref().map_or_else(
                || format!("payment ended in status {}", response.status),
                |f| f.message.clone(),
            );
            tracing::warn!(reservation_uid = %uid, status = %response.status, reason = %reason, "Payment not approved");
            outbox::append(
                uow,
                &DomainEvent::PaymentFailed(ReasonPayload {
                    reservation_uid: uid,
                    reason,
                }),
                now,
            )
            .await?;
        }
        Ok(())
    }
}

/// Handles `PG_CANCEL_CALL_SUCCEEDED` and `PG_CANCEL_CALL_FAILED`.
pub struct PaymentCancellationProcessor {
    store: Arc<dyn BookingStore>,
    notifier: Arc<dyn Notifier>,
    clock: Arc<dyn Clock>,
}

impl PaymentCancellationProcessor {
    /// Processor over `store`; failed refunds are reported to `notifier`.
    #[must_use]
    pub fn new(store: Arc<dyn BookingStore>, notifier: Arc<dyn Notifier>, clock: Arc<dyn Clock>) -> Self {
        Self {
            store,
            notifier,
            clock,
        }
    }

    /// Apply a successful refund to the payment.
    ///
    /// # Errors
    ///
    /// [`crate::error::BookingError::PaymentNotFound`] or a store error.
    pub async fn on_cancel_succeeded(&self, event: &PgCallSucceededPayload) -> Result<()> {
        let mut uow = self.store.begin().await?;
        let result = record_refund(uow.as_mut(), event.reservation_uid, &event.response).await;
        finish(uow, result).await?;

        tracing::info!(
            reservation_uid = %event.reservation_uid,
            status = %event.response.status,
            balance = event.response.balance_amount,
            "Payment cancellation recorded"
        );
        Ok(())
    }

    /// Alert and emit `PAYMENT_CANCELLATION_FAILED`.
    ///
    /// # Errors
    ///
    /// Returns a store error.
    pub async fn on_cancel_failed(&self, event: &PgCancelCallFailedPayload) -> Result<()> {
        let uid = event.reservation_uid;
        let alert = format!(
            "[FATAL] payment cancellation failed, manual intervention required. reservation_uid={uid}, code={}, message={}",
            event.error_code, event.error_message
        );
        tracing::error!(reservation_uid = %uid, code = %event.error_code, "Payment cancellation failed");
        self.notifier.send_alert(&alert).await;

        let failed = DomainEvent::PaymentCancellationFailed(ReasonPayload {
            reservation_uid: uid,
            reason: event.error_message.clone(),
        });
        let mut uow = self.store.begin().await?;
        let result = outbox::append(uow.as_mut(), &failed, self.clock.now()).await;
        finish(uow, result).await
    }
}
