//! Error taxonomy for the booking core.
//!
//! Each variant belongs to one failure class, and the class decides how the
//! error travels:
//!
//! | Class | Variants | Handling |
//! |-------|----------|----------|
//! | contention | `LockContention` | caller retries ("try again") |
//! | conflict | `ReservationConflict`, `DatesOnHold` | surfaced as booking conflict |
//! | precondition | `InvalidStatusTransition`, `AccessDenied`, `InvalidStayDates`, `AmountMismatch`, not-found | surfaced, never retried |
//! | gateway | `Gateway` | terminal rejection or transient failure |
//! | poison | `MalformedEvent` | consumer acks and drops |
//! | infrastructure | `Store`, `Lock`, `Hold`, `Serialization` | consumer retries, then dead-letters |

use crate::gateway::GatewayError;
use crate::ids::{AccommodationId, MemberId};
use crate::reservation::ReservationStatus;
use homestay_core::event::EventError;
use homestay_runtime::HandlerError;
use thiserror::Error;

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, BookingError>;

/// Everything that can go wrong in the booking core.
#[derive(Error, Debug, Clone)]
pub enum BookingError {
    /// The date-range lock was not acquired within the wait window.
    #[error("reservation dates are being booked by someone else, try again")]
    LockContention,

    /// A PAYMENT_PENDING or CONFIRMED reservation overlaps the requested stay.
    #[error("the requested dates are already reserved")]
    ReservationConflict,

    /// Another booking for these dates is waiting for payment.
    #[error("the requested dates are on hold for another booking")]
    DatesOnHold,

    /// Check-out is not at least one night after check-in.
    #[error("check-out must be at least one night after check-in")]
    InvalidStayDates,

    /// No active member with this id.
    #[error("member {0} not found or inactive")]
    MemberNotFound(MemberId),

    /// No published accommodation with this id.
    #[error("accommodation {0} not found or not published")]
    AccommodationNotFound(AccommodationId),

    /// No reservation with this uid.
    #[error("reservation {0} not found")]
    ReservationNotFound(String),

    /// No payment for this reservation.
    #[error("payment for reservation {0} not found")]
    PaymentNotFound(String),

    /// The caller does not own the reservation.
    #[error("reservation {0} belongs to another guest")]
    AccessDenied(String),

    /// The reservation is in a state the operation does not start from.
    #[error("cannot move reservation from {from} to {to}")]
    InvalidStatusTransition {
        /// Current status.
        from: ReservationStatus,
        /// Requested status.
        to: ReservationStatus,
    },

    /// The amount the guest paid does not match the reservation price.
    #[error("payment amount {actual} does not match reservation total {expected}")]
    AmountMismatch {
        /// Reservation total price.
        expected: i64,
        /// Amount in the request.
        actual: i64,
    },

    /// The payment gateway rejected the call or could not be reached.
    #[error(transparent)]
    Gateway(#[from] GatewayError),

    /// A broker message could not be decoded.
    #[error("malformed event: {0}")]
    MalformedEvent(String),

    /// Relational store failure.
    #[error("store error: {0}")]
    Store(String),

    /// Lock backend failure (not contention).
    #[error("lock backend error: {0}")]
    Lock(String),

    /// Hold backend failure.
    #[error("hold backend error: {0}")]
    Hold(String),

    /// An event payload could not be serialized.
    #[error("serialization error: {0}")]
    Serialization(String),
}

impl BookingError {
    /// Whether repeating the same operation may succeed.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        match self {
            Self::LockContention | Self::Store(_) | Self::Lock(_) | Self::Hold(_) => true,
            Self::Gateway(e) => e.is_transient(),
            _ => false,
        }
    }

    /// Whether the error comes from an undecodable message.
    #[must_use]
    pub const fn is_poison(&self) -> bool {
        matches!(self, Self::MalformedEvent(_))
    }

    /// Whether the error is a state-machine precondition failure.
    #[must_use]
    pub const fn is_precondition(&self) -> bool {
        matches!(
            self,
            Self::InvalidStatusTransition { .. }
                | Self::ReservationNotFound(_)
                | Self::AccessDenied(_)
        )
    }
}

impl From<EventError> for BookingError {
    fn from(err: EventError) -> Self {
        match err {
            EventError::Malformed(reason) => Self::MalformedEvent(reason),
            EventError::Serialization(reason) => Self::Serialization(reason),
        }
    }
}

impl From<serde_json::Error> for BookingError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

impl From<BookingError> for HandlerError {
    fn from(err: BookingError) -> Self {
        if err.is_poison() {
            Self::Poison(err.to_string())
        } else {
            Self::Retryable(err.to_string())
        }
    }
}
