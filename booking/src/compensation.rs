//! Saga compensation: refunding money the reservation side cannot keep.
//!
//! Two entry points:
//!
//! - [`PaymentCompensationService::compensate`] refunds the recorded payment
//!   of a reservation that could not be confirmed. A payment that already has
//!   a refund is skipped, so redelivery never refunds twice. The refund is
//!   claimed on the payment row before the gateway call, so concurrent
//!   deliveries send one cancel between them. A claim left behind by a
//!   crashed worker lapses after [`REFUND_CLAIM_LEASE_MINUTES`].
//! - [`PaymentCompensationService::compensate_ghost_payment`] handles a
//!   gateway payment whose order id matches no reservation. It is alert-driven
//!   and never fails the caller.

use crate::error::{BookingError, Result};
use crate::gateway::PaymentGateway;
use crate::ids::ReservationUid;
use crate::notifier::Notifier;
use crate::payment::{Payment, PaymentStatus};
use crate::store::{BookingStore, UnitOfWork, finish};
use homestay_core::environment::Clock;
use std::sync::Arc;

/// Cancel reason sent with a compensation refund.
pub const COMPENSATION_REASON: &str = "reservation confirmation failed";
/// Cancel reason sent with a ghost-payment refund.
pub const GHOST_PAYMENT_REASON: &str = "no reservation matches the payment";
/// Minutes a refund claim blocks other compensations of the same payment.
pub const REFUND_CLAIM_LEASE_MINUTES: i64 = 5;

/// What [`PaymentCompensationService::compensate`] did.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CompensationOutcome {
    /// The payment was refunded in full.
    Refunded,
    /// A refund was already recorded; nothing was sent to the gateway.
    AlreadyCanceled,
    /// Another compensation holds the refund claim; nothing was sent.
    InProgress,
}

enum Claim {
    Claimed(Payment),
    AlreadyCanceled,
    Held,
}

/// Issues compensating refunds.
pub struct PaymentCompensationService {
    store: Arc<dyn BookingStore>,
    gateway: Arc<dyn PaymentGateway>,
    notifier: Arc<dyn Notifier>,
    clock: Arc<dyn Clock>,
}

impl PaymentCompensationService {
    /// Service refunding through `gateway`.
    #[must_use]
    pub fn new(
        store: Arc<dyn BookingStore>,
        gateway: Arc<dyn PaymentGateway>,
        notifier: Arc<dyn Notifier>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            store,
            gateway,
            notifier,
            clock,
        }
    }

    /// Refund the payment of `uid` in full.
    ///
    /// # Errors
    ///
    /// - [`BookingError::PaymentNotFound`] when no payment is recorded.
    /// - [`BookingError::Gateway`] when the refund call fails; the claim is
    ///   released so a retry can try again.
    /// - A store error while recording the refund.
    pub async fn compensate(&self, uid: ReservationUid) -> Result<CompensationOutcome> {
        tracing::warn!(reservation_uid = %uid, "Starting compensation");

        let mut uow = self.store.begin().await?;
        let claimed = self.claim_refund(uow.as_mut(), uid).await;
        let payment = match finish(uow, claimed).await? {
            Claim::Claimed(payment) => payment,
            Claim::AlreadyCanceled => return Ok(CompensationOutcome::AlreadyCanceled),
            Claim::Held => return Ok(CompensationOutcome::InProgress),
        };

        let response = match self.gateway.cancel(&payment.payment_key, COMPENSATION_REASON, None).await {
            Ok(response) => response,
            Err(e) => {
                tracing::error!(
                    reservation_uid = %uid,
                    code = %e.code(),
                    error = %e,
                    "[FATAL] compensation refund failed at the gateway; manual intervention required"
                );
                metrics::counter!("booking.compensations", "outcome" => "gateway_error").increment(1);
                self.release_refund(&payment).await;
                return Err(e.into());
            }
        };

        let mut uow = self.store.begin().await?;
        let result = async {
            record_refund(uow.as_mut(), uid, &response).await?;
            uow.release_payment_refund(payment.id).await
        }
        .await;
        finish(uow, result).await?;

        tracing::info!(reservation_uid = %uid, status = %response.status, "Compensation refund recorded");
        metrics::counter!("booking.compensations", "outcome" => "refunded").increment(1);
        Ok(CompensationOutcome::Refunded)
    }

    async fn claim_refund(&self, uow: &mut dyn UnitOfWork, uid: ReservationUid) -> Result<Claim> {
        let Some(payment) = uow.find_payment_by_reservation_uid(uid).await? else {
            tracing::error!(reservation_uid = %uid, "[FATAL] compensation impossible, no payment recorded; manual check required");
            metrics::counter!("booking.compensations", "outcome" => "payment_not_found").increment(1);
            return Err(BookingError::PaymentNotFound(uid.to_string()));
        };

        if payment.is_canceled() {
            tracing::warn!(payment_key = %payment.payment_key, "Payment already canceled, skipping compensation");
            metrics::counter!("booking.compensations", "outcome" => "skipped").increment(1);
            return Ok(Claim::AlreadyCanceled);
        }

        let now = self.clock.now();
        if !uow
            .claim_payment_refund(payment.id, now, now - chrono::Duration::minutes(REFUND_CLAIM_LEASE_MINUTES))
            .await?
        {
            tracing::warn!(payment_key = %payment.payment_key, "Refund already in flight, skipping compensation");
            metrics::counter!("booking.compensations", "outcome" => "in_progress").increment(1);
            return Ok(Claim::Held);
        }
        Ok(Claim::Claimed(payment))
    }

    /// A failed release leaves the claim to lapse with its lease.
    async fn release_refund(&self, payment: &Payment) {
        let released = async {
            let mut uow = self.store.begin().await?;
            let result = uow.release_payment_refund(payment.id).await;
            finish(uow, result).await
        }
        .await;
        if let Err(e) = released {
            tracing::warn!(payment_key = %payment.payment_key, error = %e, "Could not release refund claim");
        }
    }

    /// Refund a payment that has no reservation. Alerts on every branch;
    /// never returns an error.
    pub async fn compensate_ghost_payment(&self, payment_key: &str) {
        let detected =
            format!("[CRITICAL] ghost payment: no reservation for the order. Attempting refund. payment_key={payment_key}");
        tracing::error!(payment_key = %payment_key, "Ghost payment detected");
        self.notifier.send_alert(&detected).await;

        let payment = match self.gateway.find_by_payment_key(payment_key).await {
            Ok(payment) => payment,
            Err(e) => {
                self.manual_intervention(payment_key, &e.to_string()).await;
                return;
            }
        };

        if payment.status != PaymentStatus::Done {
            let message = format!(
                "[COMPENSATION] ghost payment not approved (status {}), no refund needed. payment_key={payment_key}",
                payment.status
            );
            tracing::warn!(payment_key = %payment_key, status = %payment.status, "Ghost payment not approved");
            self.notifier.send_alert(&message).await;
            return;
        }

        match self.gateway.cancel(payment_key, GHOST_PAYMENT_REASON, None).await {
            Ok(_) => {
                let message = format!("[COMPENSATION] ghost payment refunded. payment_key={payment_key}");
                tracing::info!(payment_key = %payment_key, "Ghost payment refunded");
                metrics::counter!("booking.compensations", "outcome" => "ghost_refunded").increment(1);
                self.notifier.send_alert(&message).await;
            }
            Err(e) => self.manual_intervention(payment_key, &e.to_string()).await,
        }
    }

    async fn manual_intervention(&self, payment_key: &str, error: &str) {
        let message = format!(
            "[FATAL] ghost payment refund failed, manual intervention required. payment_key={payment_key}, error={error}"
        );
        tracing::error!(payment_key = %payment_key, error = %error, "Ghost payment refund failed");
        metrics::counter!("booking.compensations", "outcome" => "ghost_failed").increment(1);
        self.notifier.send_alert(&message).await;
    }
}

/// Apply a cancel response to the stored payment of `uid`.
///
/// # Errors
///
/// [`BookingError::PaymentNotFound`] or a store error.
pub(crate) async fn record_refund(
    uow: &mut dyn UnitOfWork,
    uid: ReservationUid,
    response: &crate::gateway::GatewayPayment,
) -> Result<()> {
    let mut payment = uow
        .find_payment_by_reservation_uid(uid)
        .await?
        .ok_or_else(|| BookingError::PaymentNotFound(uid.to_string()))?;

    if let Some(cancel) = payment.apply_cancellation(response) {
        uow.insert_payment_cancel(payment.id, &cancel).await?;
    }
    uow.update_payment(&payment).await
}
