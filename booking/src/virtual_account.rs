//! Bank-transfer checkout: issuing a virtual account for a pending
//! reservation.
//!
//! The gateway opens an account the guest transfers the total price into.
//! Issuance is logged as a payment attempt in `WAITING_FOR_DEPOSIT`; no
//! payment row exists until the deposit is confirmed.

use crate::context::RequestContext;
use crate::error::{BookingError, Result};
use crate::gateway::{GatewayPayment, PaymentGateway, VirtualAccountRequest};
use crate::ids::ReservationUid;
use crate::payment::PaymentAttempt;
use crate::reservation::{Reservation, ReservationStatus};
use crate::store::{BookingStore, finish};
use homestay_core::environment::Clock;
use std::sync::Arc;

/// Hours an issued account accepts the deposit.
pub const VIRTUAL_ACCOUNT_VALID_HOURS: u32 = 24;

/// What the guest submits to pay by bank transfer.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct VirtualAccountApplication {
    /// Bank to open the account at.
    pub bank_code: String,
    /// Depositor name.
    pub customer_name: String,
}

/// Issues virtual accounts.
#[derive(Clone)]
pub struct VirtualAccountService {
    store: Arc<dyn BookingStore>,
    gateway: Arc<dyn PaymentGateway>,
    clock: Arc<dyn Clock>,
}

impl VirtualAccountService {
    /// Service issuing through `gateway`.
    #[must_use]
    pub fn new(store: Arc<dyn BookingStore>, gateway: Arc<dyn PaymentGateway>, clock: Arc<dyn Clock>) -> Self {
        Self { store, gateway, clock }
    }

    /// Open a deposit account for the caller's pending reservation `uid`.
    ///
    /// # Errors
    ///
    /// - [`BookingError::ReservationNotFound`] / [`BookingError::AccessDenied`].
    /// - [`BookingError::InvalidStatusTransition`] unless it is `PAYMENT_PENDING`.
    /// - [`BookingError::Gateway`] when the gateway refuses or cannot be reached;
    ///   nothing is recorded then.
    pub async fn issue(
        &self,
        ctx: &RequestContext,
        uid: ReservationUid,
        application: VirtualAccountApplication,
    ) -> Result<GatewayPayment> {
        tracing::info!(reservation_uid = %uid, "Issuing virtual account");
        let reservation = self.pending_reservation(ctx, uid).await?;

        let request = VirtualAccountRequest {
            order_id: uid.to_string(),
            amount: reservation.total_price,
            bank: application.bank_code,
            customer_name: application.customer_name,
            valid_hours: VIRTUAL_ACCOUNT_VALID_HOURS,
        };
        let response = self.gateway.issue_virtual_account(&request).await.inspect_err(|e| {
            if e.is_transient() {
                tracing::error!(reservation_uid = %uid, error = %e, "Virtual account issuance failed, gateway unavailable");
            } else {
                tracing::warn!(reservation_uid = %uid, code = %e.code(), "Virtual account issuance rejected");
            }
            metrics::counter!("booking.virtual_accounts", "outcome" => "failed").increment(1);
        })?;

        let attempt = PaymentAttempt::from_response(&response, reservation.id, self.clock.now());
        let mut uow = self.store.begin().await?;
        let recorded = uow.insert_payment_attempt(&attempt).await;
        finish(uow, recorded).await?;

        tracing::info!(reservation_uid = %uid, payment_key = %response.payment_key, status = %response.status, "Virtual account issued");
        metrics::counter!("booking.virtual_accounts", "outcome" => "issued").increment(1);
        Ok(response)
    }

    async fn pending_reservation(&self, ctx: &RequestContext, uid: ReservationUid) -> Result<Reservation> {
        let mut uow = self.store.begin().await?;
        let found = uow.find_reservation(uid).await;
        let reservation = finish(uow, found)
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
        Ok(reservation)
    }
}
