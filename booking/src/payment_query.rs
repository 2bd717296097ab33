//! Guest-facing payment lookups.
//!
//! The local payment row is the answer; the gateway is asked as well so a
//! guest never sees a payment the gateway has lost track of, and so drift
//! between the two shows up in the logs.

use crate::context::RequestContext;
use crate::error::{BookingError, Result};
use crate::gateway::{GatewayError, GatewayPayment, PaymentGateway};
use crate::ids::ReservationUid;
use crate::payment::{Payment, PaymentCancel, PaymentMethod, PaymentStatus};
use crate::store::{BookingStore, UnitOfWork, finish};
use chrono::{DateTime, Utc};
use std::sync::Arc;

/// A payment as shown to its guest.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PaymentView {
    /// Merchant order id; the reservation uid.
    pub order_id: String,
    /// Gateway payment key.
    pub payment_key: String,
    /// Payment method.
    pub method: PaymentMethod,
    /// Charged amount.
    pub total_amount: i64,
    /// Amount not yet refunded.
    pub balance_amount: i64,
    /// Recorded state.
    pub status: PaymentStatus,
    /// State the gateway reported just now.
    pub gateway_status: PaymentStatus,
    /// Approval time.
    pub approved_at: DateTime<Utc>,
    /// Refunds, oldest first.
    pub cancels: Vec<PaymentCancel>,
}

impl PaymentView {
    fn new(payment: Payment, gateway: &GatewayPayment) -> Self {
        Self {
            order_id: payment.order_id,
            payment_key: payment.payment_key,
            method: payment.method,
            total_amount: payment.amount,
            balance_amount: payment.balance_amount,
            status: payment.status,
            gateway_status: gateway.status,
            approved_at: payment.approved_at,
            cancels: payment.cancels,
        }
    }
}

enum Lookup<'a> {
    PaymentKey(&'a str),
    OrderId(&'a str),
}

/// Reads payments on behalf of their guest.
#[derive(Clone)]
pub struct PaymentQueryService {
    store: Arc<dyn BookingStore>,
    gateway: Arc<dyn PaymentGateway>,
}

impl PaymentQueryService {
    /// Service over `store`, cross-checking with `gateway`.
    #[must_use]
    pub fn new(store: Arc<dyn BookingStore>, gateway: Arc<dyn PaymentGateway>) -> Self {
        Self { store, gateway }
    }

    /// The caller's payment with gateway key `payment_key`.
    ///
    /// # Errors
    ///
    /// - [`BookingError::PaymentNotFound`] when no payment has that key.
    /// - [`BookingError::AccessDenied`] when the caller did not make it.
    /// - [`BookingError::Gateway`] when the gateway lookup fails.
    pub async fn find_by_payment_key(&self, ctx: &RequestContext, payment_key: &str) -> Result<PaymentView> {
        self.find(ctx, Lookup::PaymentKey(payment_key)).await
    }

    /// The caller's payment for order `order_id`.
    ///
    /// # Errors
    ///
    /// As [`Self::find_by_payment_key`].
    pub async fn find_by_order_id(&self, ctx: &RequestContext, order_id: &str) -> Result<PaymentView> {
        self.find(ctx, Lookup::OrderId(order_id)).await
    }

    async fn find(&self, ctx: &RequestContext, lookup: Lookup<'_>) -> Result<PaymentView> {
        let mut uow = self.store.begin().await?;
        let found = load_owned(uow.as_mut(), ctx, &lookup).await;
        let payment = finish(uow, found).await?;

        let reply = match lookup {
            Lookup::PaymentKey(key) => self.gateway.find_by_payment_key(key).await,
            Lookup::OrderId(order_id) => self.gateway.find_by_order_id(order_id).await,
        };
        let gateway = reply.inspect_err(|e| log_lookup_failure(&payment, e))?;

        if gateway.status != payment.status || gateway.balance_amount != payment.balance_amount {
            tracing::warn!(
                payment_key = %payment.payment_key,
                local_status = %payment.status,
                gateway_status = %gateway.status,
                local_balance = payment.balance_amount,
                gateway_balance = gateway.balance_amount,
                "Payment differs from the gateway's view"
            );
            metrics::counter!("booking.payment_lookups.drift").increment(1);
        }
        Ok(PaymentView::new(payment, &gateway))
    }
}

async fn load_owned(uow: &mut dyn UnitOfWork, ctx: &RequestContext, lookup: &Lookup<'_>) -> Result<Payment> {
    let (payment, reference) = match *lookup {
        Lookup::PaymentKey(key) => (uow.find_payment_by_payment_key(key).await?, key),
        Lookup::OrderId(order_id) => match order_id.parse::<ReservationUid>() {
            Ok(uid) => (uow.find_payment_by_reservation_uid(uid).await?, order_id),
            Err(_) => (None, order_id),
        },
    };
    let payment = payment.ok_or_else(|| BookingError::PaymentNotFound(reference.to_string()))?;

    // Order ids are reservation uids, so the owner is one lookup away.
    let reservation = match payment.order_id.parse::<ReservationUid>() {
        Ok(uid) => uow.find_reservation(uid).await?,
        Err(_) => None,
    }
    .ok_or_else(|| BookingError::Store(format!("payment {} has no reservation", payment.payment_key)))?;

    if !reservation.is_owned_by(ctx.member_id) {
        tracing::warn!(payment_key = %payment.payment_key, member_id = %ctx.member_id, "Payment lookup by non-owner");
        return Err(BookingError::AccessDenied(payment.payment_key));
    }
    Ok(payment)
}

fn log_lookup_failure(payment: &Payment, err: &GatewayError) {
    if err.is_transient() {
        tracing::error!(payment_key = %payment.payment_key, error = %err, "Payment lookup failed, gateway unavailable");
    } else {
        tracing::warn!(payment_key = %payment.payment_key, code = %err.code(), "Payment lookup rejected by the gateway");
    }
}
