//! Payment entity, its cancellations, and the attempt log.
//!
//! A [`Payment`] exists only for a gateway response in `DONE` state and is
//! tied 1:1 to a reservation. Its balance only ever goes down. Every gateway
//! call, successful or not, leaves a [`PaymentAttempt`] that is never updated.

use crate::error::{BookingError, Result};
use crate::gateway::{ConfirmRequest, GatewayCancel, GatewayPayment, VirtualAccount};
use crate::ids::{PaymentId, ReservationId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Payment state as reported by the gateway.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentStatus {
    /// Checkout created, not yet authorised.
    Ready,
    /// Authorised, not yet approved.
    InProgress,
    /// Virtual account issued, waiting for the transfer.
    WaitingForDeposit,
    /// Approved.
    Done,
    /// Fully refunded.
    Canceled,
    /// Partly refunded.
    PartialCanceled,
    /// Approval failed.
    Aborted,
    /// Checkout timed out.
    Expired,
}

impl PaymentStatus {
    /// Database and wire representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Ready => "READY",
            Self::InProgress => "IN_PROGRESS",
            Self::WaitingForDeposit => "WAITING_FOR_DEPOSIT",
            Self::Done => "DONE",
            Self::Canceled => "CANCELED",
            Self::PartialCanceled => "PARTIAL_CANCELED",
            Self::Aborted => "ABORTED",
            Self::Expired => "EXPIRED",
        }
    }

    /// Parse the database representation.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "READY" => Some(Self::Ready),
            "IN_PROGRESS" => Some(Self::InProgress),
            "WAITING_FOR_DEPOSIT" => Some(Self::WaitingForDeposit),
            "DONE" => Some(Self::Done),
            "CANCELED" => Some(Self::Canceled),
            "PARTIAL_CANCELED" => Some(Self::PartialCanceled),
            "ABORTED" => Some(Self::Aborted),
            "EXPIRED" => Some(Self::Expired),
            _ => None,
        }
    }

    /// Whether any refund has been made.
    #[must_use]
    pub const fn is_canceled(self) -> bool {
        matches!(self, Self::Canceled | Self::PartialCanceled)
    }
}

impl fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How the guest paid.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentMethod {
    /// 카드
    Card,
    /// 가상계좌
    VirtualAccount,
    /// 간편결제
    EasyPay,
    /// 휴대폰
    MobilePhone,
    /// 계좌이체
    BankTransfer,
    /// 문화상품권
    CultureGiftCard,
    /// 도서문화상품권
    BookGiftCard,
    /// 게임문화상품권
    GameGiftCard,
    /// Anything else.
    Unknown,
}

impl PaymentMethod {
    const ALL: [Self; 9] = [
        Self::Card,
        Self::VirtualAccount,
        Self::EasyPay,
        Self::MobilePhone,
        Self::BankTransfer,
        Self::CultureGiftCard,
        Self::BookGiftCard,
        Self::GameGiftCard,
        Self::Unknown,
    ];

    /// Database representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Card => "CARD",
            Self::VirtualAccount => "VIRTUAL_ACCOUNT",
            Self::EasyPay => "EASY_PAY",
            Self::MobilePhone => "MOBILE_PHONE",
            Self::BankTransfer => "BANK_TRANSFER",
            Self::CultureGiftCard => "CULTURE_GIFT_CARD",
            Self::BookGiftCard => "BOOK_GIFT_CARD",
            Self::GameGiftCard => "GAME_GIFT_CARD",
            Self::Unknown => "UNKNOWN",
        }
    }

    /// Label the gateway uses.
    #[must_use]
    pub const fn description(self) -> &'static str {
        match self {
            Self::Card => "카드",
            Self::VirtualAccount => "가상계좌",
            Self::EasyPay => "간편결제",
            Self::MobilePhone => "휴대폰",
            Self::BankTransfer => "계좌이체",
            Self::CultureGiftCard => "문화상품권",
            Self::BookGiftCard => "도서문화상품권",
            Self::GameGiftCard => "게임문화상품권",
            Self::Unknown => "알수없음",
        }
    }

    /// Parse a gateway label or an enum name; anything else is `Unknown`.
    #[must_use]
    pub fn from_description(value: &str) -> Self {
        Self::ALL
            .into_iter()
            .find(|m| m.description() == value || m.as_str().eq_ignore_ascii_case(value))
            .unwrap_or(Self::Unknown)
    }
}

/// One refund of a payment.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PaymentCancel {
    /// Refunded amount.
    pub cancel_amount: i64,
    /// Reason given with the cancel call.
    pub cancel_reason: Option<String>,
    /// Gateway transaction key.
    pub transaction_key: String,
    /// When the refund happened.
    pub canceled_at: DateTime<Utc>,
}

impl From<&GatewayCancel> for PaymentCancel {
    fn from(cancel: &GatewayCancel) -> Self {
        Self {
            cancel_amount: cancel.cancel_amount,
            cancel_reason: cancel.cancel_reason.clone(),
            transaction_key: cancel.transaction_key.clone(),
            canceled_at: cancel.canceled_at,
        }
    }
}

/// An approved payment.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Payment {
    /// Surrogate key.
    pub id: PaymentId,
    /// Public reference.
    pub payment_uid: Uuid,
    /// Gateway payment key; unique.
    pub payment_key: String,
    /// Merchant order id (reservation uid).
    pub order_id: String,
    /// Charged amount.
    pub amount: i64,
    /// Amount not yet refunded.
    pub balance_amount: i64,
    /// Payment method.
    pub method: PaymentMethod,
    /// Current state.
    pub status: PaymentStatus,
    /// Approval time.
    pub approved_at: DateTime<Utc>,
    /// Paid reservation.
    pub reservation_id: ReservationId,
    /// Refunds, oldest first.
    pub cancels: Vec<PaymentCancel>,
}

impl Payment {
    /// Whether a refund was already made.
    #[must_use]
    pub const fn is_canceled(&self) -> bool {
        self.status.is_canceled()
    }

    /// Apply a successful cancel response.
    ///
    /// Status follows the gateway. The balance can only shrink. The newest
    /// refund in the response is appended unless it is already recorded, and
    /// returned so the caller can persist it.
    pub fn apply_cancellation(&mut self, response: &GatewayPayment) -> Option<PaymentCancel> {
        self.status = response.status;
        self.balance_amount = self.balance_amount.min(response.balance_amount);

        let latest = response.cancels.last().map(PaymentCancel::from)?;
        if self
            .cancels
            .iter()
            .any(|c| c.transaction_key == latest.transaction_key)
        {
            return None;
        }
        self.cancels.push(latest.clone());
        Some(latest)
    }
}

/// A payment about to be inserted.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NewPayment {
    /// Public reference.
    pub payment_uid: Uuid,
    /// Gateway payment key.
    pub payment_key: String,
    /// Merchant order id.
    pub order_id: String,
    /// Charged amount.
    pub amount: i64,
    /// Amount not yet refunded.
    pub balance_amount: i64,
    /// Payment method.
    pub method: PaymentMethod,
    /// Always `DONE`.
    pub status: PaymentStatus,
    /// Approval time.
    pub approved_at: DateTime<Utc>,
    /// Paid reservation.
    pub reservation_id: ReservationId,
}

impl NewPayment {
    /// Payment for an approved gateway response.
    ///
    /// # Errors
    ///
    /// Returns [`BookingError::Gateway`] wrapping an invalid response when the
    /// gateway did not report `DONE`.
    pub fn from_gateway(
        response: &GatewayPayment,
        reservation_id: ReservationId,
        now: DateTime<Utc>,
    ) -> Result<Self> {
        if response.status != PaymentStatus::Done {
            return Err(BookingError::Gateway(
                crate::gateway::GatewayError::InvalidResponse(format!(
                    "payment {} is {}, not DONE",
                    response.payment_key, response.status
                )),
            ));
        }
        Ok(Self {
            payment_uid: Uuid::new_v4(),
            payment_key: response.payment_key.clone(),
            order_id: response.order_id.clone(),
            amount: response.total_amount,
            balance_amount: response.balance_amount,
            method: response
                .method
                .as_deref()
                .map_or(PaymentMethod::Unknown, PaymentMethod::from_description),
            status: PaymentStatus::Done,
            approved_at: response.approved_at.unwrap_or(now),
            reservation_id,
        })
    }

    /// The row as stored, once the database assigned its id.
    #[must_use]
    pub fn into_payment(self, id: PaymentId) -> Payment {
        Payment {
            id,
            payment_uid: self.payment_uid,
            payment_key: self.payment_key,
            order_id: self.order_id,
            amount: self.amount,
            balance_amount: self.balance_amount,
            method: self.method,
            status: self.status,
            approved_at: self.approved_at,
            reservation_id: self.reservation_id,
            cancels: Vec::new(),
        }
    }
}

/// One gateway confirm call, as logged.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PaymentAttempt {
    /// Gateway payment key.
    pub payment_key: String,
    /// Merchant order id.
    pub order_id: String,
    /// Requested or charged amount.
    pub amount: i64,
    /// Payment method, `UNKNOWN` for failed calls.
    pub method: PaymentMethod,
    /// Reported state, `ABORTED` for failed calls.
    pub status: PaymentStatus,
    /// Vendor error code.
    pub failure_code: Option<String>,
    /// Vendor error message.
    pub failure_message: Option<String>,
    /// Reservation the payment was for.
    pub reservation_id: ReservationId,
    /// When the attempt was recorded.
    pub attempted_at: DateTime<Utc>,
    /// Deposit account of a virtual-account issuance.
    pub virtual_account: Option<VirtualAccount>,
}

impl PaymentAttempt {
    /// Attempt that produced a gateway response (approved or not).
    #[must_use]
    pub fn from_response(
        response: &GatewayPayment,
        reservation_id: ReservationId,
        attempted_at: DateTime<Utc>,
    ) -> Self {
        Self {
            payment_key: response.payment_key.clone(),
            order_id: response.order_id.clone(),
            amount: response.total_amount,
            method: response
                .method
                .as_deref()
                .map_or(PaymentMethod::Unknown, PaymentMethod::from_description),
            status: response.status,
            failure_code: response.failure.as_ref().map(|f| f.code.clone()),
            failure_message: response.failure.as_ref().map(|f| f.message.clone()),
            reservation_id,
            attempted_at,
            virtual_account: response.virtual_account.clone(),
        }
    }

    /// Attempt that the gateway rejected or never answered.
    #[must_use]
    pub fn failed(
        request: &ConfirmRequest,
        reservation_id: ReservationId,
        error_code: &str,
        error_message: &str,
        attempted_at: DateTime<Utc>,
    ) -> Self {
        Self {
            payment_key: request.payment_key.clone(),
            order_id: request.order_id.clone(),
            amount: request.amount,
            method: PaymentMethod::Unknown,
            status: PaymentStatus::Aborted,
            failure_code: Some(error_code.to_string()),
            failure_message: Some(error_message.to_string()),
            reservation_id,
            attempted_at,
            virtual_account: None,
        }
    }
}
