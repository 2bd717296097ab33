//! Payment gateway boundary.
//!
//! [`PaymentGateway`] is the single external call contract the saga relies
//! on: confirm, cancel, the two lookups, and virtual-account issuance. Every call returns the gateway's
//! view of the payment ([`GatewayPayment`]) or a [`GatewayError`] that tells
//! the caller whether the outcome is final.

pub mod codes;
pub mod toss;

pub use codes::{CancelErrorCode, ConfirmErrorCode, InquiryErrorCode, VirtualAccountIssueErrorCode};
pub use toss::TossPaymentsClient;

use crate::payment::PaymentStatus;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Error code recorded when the gateway outcome is unknown.
pub const UNKNOWN_WORKER_ERROR: &str = "UNKNOWN_WORKER_ERROR";

/// A gateway call that did not produce a payment.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GatewayError {
    /// Definitive decline. `code` is the mapped vendor code.
    #[error("payment gateway rejected the call: {code} ({message})")]
    Rejected {
        /// Vendor error code, mapped to the local taxonomy.
        code: String,
        /// Vendor message.
        message: String,
    },

    /// Network failure or 5xx after the retry budget was spent.
    /// Money state is uncertain.
    #[error("payment gateway unavailable: {0}")]
    Transient(String),

    /// The gateway answered with something that is not a payment.
    #[error("unexpected payment gateway response: {0}")]
    InvalidResponse(String),
}

impl GatewayError {
    /// Whether calling again may succeed.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(self, Self::Transient(_))
    }

    /// Code written to the attempt log and to failure events.
    #[must_use]
    pub fn code(&self) -> &str {
        match self {
            Self::Rejected { code, .. } => code,
            Self::Transient(_) | Self::InvalidResponse(_) => UNKNOWN_WORKER_ERROR,
        }
    }

    /// Human-readable reason.
    #[must_use]
    pub fn message(&self) -> String {
        match self {
            Self::Rejected { message, .. } => message.clone(),
            other => other.to_string(),
        }
    }
}

/// Guest-submitted payment confirmation.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfirmRequest {
    /// Gateway payment key from the checkout widget.
    pub payment_key: String,
    /// Order id; the reservation uid.
    pub order_id: String,
    /// Amount the guest paid.
    pub amount: i64,
}

/// Guest-submitted cancellation.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CancelRequest {
    /// Why the guest cancels.
    pub cancel_reason: String,
    /// Amount to refund; `None` refunds everything.
    #[serde(default)]
    pub cancel_amount: Option<i64>,
}

/// Bank transfer account requested for a reservation.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VirtualAccountRequest {
    /// Order id; the reservation uid.
    pub order_id: String,
    /// Amount to deposit.
    pub amount: i64,
    /// Bank code the account is opened at.
    pub bank: String,
    /// Depositor name.
    pub customer_name: String,
    /// Hours the account accepts the deposit.
    pub valid_hours: u32,
}

/// An issued virtual account, as reported by the gateway.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VirtualAccount {
    /// Account the guest transfers to.
    pub account_number: String,
    /// Bank of the account.
    pub bank_code: String,
    /// Depositor name.
    pub customer_name: String,
    /// Deposit deadline.
    pub due_date: DateTime<Utc>,
}

/// One cancellation as reported by the gateway.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GatewayCancel {
    /// Refunded amount.
    pub cancel_amount: i64,
    /// Reason given with the cancel call.
    #[serde(default)]
    pub cancel_reason: Option<String>,
    /// Gateway transaction key of the refund.
    pub transaction_key: String,
    /// When the refund happened.
    pub canceled_at: DateTime<Utc>,
}

/// Failure detail attached to a payment.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct GatewayFailure {
    /// Vendor code.
    pub code: String,
    /// Vendor message.
    pub message: String,
}

/// The gateway's view of a payment.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GatewayPayment {
    /// Gateway payment key.
    pub payment_key: String,
    /// Merchant order id.
    pub order_id: String,
    /// Charged amount.
    pub total_amount: i64,
    /// Method label, e.g. `카드`.
    #[serde(default)]
    pub method: Option<String>,
    /// Payment state.
    pub status: PaymentStatus,
    /// When checkout started.
    #[serde(default)]
    pub requested_at: Option<DateTime<Utc>>,
    /// When the payment was approved.
    #[serde(default)]
    pub approved_at: Option<DateTime<Utc>>,
    /// Amount not yet refunded.
    #[serde(default)]
    pub balance_amount: i64,
    /// Refunds so far, oldest first.
    #[serde(default)]
    pub cancels: Vec<GatewayCancel>,
    /// Failure detail, if any.
    #[serde(default)]
    pub failure: Option<GatewayFailure>,
    /// Deposit account, for virtual-account payments.
    #[serde(default)]
    pub virtual_account: Option<VirtualAccount>,
}

/// External payment gateway.
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Approve a payment the guest authorised at checkout.
    async fn confirm(&self, request: &ConfirmRequest) -> Result<GatewayPayment, GatewayError>;

    /// Refund `amount`, or everything when `amount` is `None`.
    async fn cancel(
        &self,
        payment_key: &str,
        reason: &str,
        amount: Option<i64>,
    ) -> Result<GatewayPayment, GatewayError>;

    /// Look a payment up by its key.
    async fn find_by_payment_key(&self, payment_key: &str) -> Result<GatewayPayment, GatewayError>;

    /// Look a payment up by merchant order id.
    async fn find_by_order_id(&self, order_id: &str) -> Result<GatewayPayment, GatewayError>;

    /// Open a deposit account for an order. The payment starts in
    /// `WAITING_FOR_DEPOSIT`.
    async fn issue_virtual_account(&self, request: &VirtualAccountRequest) -> Result<GatewayPayment, GatewayError>;
}
