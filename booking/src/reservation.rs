//! Reservation entity and its lifecycle.
//!
//! # State machine
//!
//! ```text
//! PAYMENT_PENDING ──► CONFIRMED ──► CANCELLED ──► CANCELLATION_FAILED
//!        │
//!        └──────────► EXPIRED
//! ```
//!
//! Moving to the state a reservation is already in is a no-op, so redelivered
//! events are harmless. Any other move not drawn above is rejected with
//! [`BookingError::InvalidStatusTransition`].

use crate::catalog::{Accommodation, Member};
use crate::context::Actor;
use crate::error::{BookingError, Result};
use crate::ids::{AccommodationId, MemberId, ReservationId, ReservationUid};
use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime, Utc};
use rand::Rng;
use rand::distributions::{Alphanumeric, Distribution};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Currency every reservation is priced in.
pub const CURRENCY: &str = "KRW";

/// Length of the human-readable reservation code.
pub const RESERVATION_CODE_LENGTH: usize = 6;

/// Reservation status.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReservationStatus {
    /// Created, waiting for the guest to pay.
    PaymentPending,
    /// Paid.
    Confirmed,
    /// Never paid.
    Expired,
    /// Cancelled by the guest after confirmation.
    Cancelled,
    /// The refund for a cancellation failed at the gateway.
    CancellationFailed,
}

impl ReservationStatus {
    /// Database and wire representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::PaymentPending => "PAYMENT_PENDING",
            Self::Confirmed => "CONFIRMED",
            Self::Expired => "EXPIRED",
            Self::Cancelled => "CANCELLED",
            Self::CancellationFailed => "CANCELLATION_FAILED",
        }
    }

    /// Parse the database representation.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "PAYMENT_PENDING" => Some(Self::PaymentPending),
            "CONFIRMED" => Some(Self::Confirmed),
            "EXPIRED" => Some(Self::Expired),
            "CANCELLED" => Some(Self::Cancelled),
            "CANCELLATION_FAILED" => Some(Self::CancellationFailed),
            _ => None,
        }
    }

    /// Whether `self → target` is an edge of the state machine.
    #[must_use]
    pub const fn can_transition_to(self, target: Self) -> bool {
        matches!(
            (self, target),
            (Self::PaymentPending, Self::Confirmed | Self::Expired)
                | (Self::Confirmed, Self::Cancelled)
                | (Self::Cancelled, Self::CancellationFailed)
        )
    }

    /// Whether a reservation in this state keeps its dates off the market.
    #[must_use]
    pub const fn blocks_dates(self) -> bool {
        matches!(self, Self::PaymentPending | Self::Confirmed)
    }
}

impl fmt::Display for ReservationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of asking a reservation to change state.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Transition {
    /// The status changed from `from`.
    Applied {
        /// Status before the change.
        from: ReservationStatus,
    },
    /// Already in the target state; nothing changed.
    AlreadyApplied,
}

/// Check-in and check-out dates of a stay, at least one night apart.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct StayDates {
    check_in: NaiveDate,
    check_out: NaiveDate,
}

impl StayDates {
    /// Validate a stay.
    ///
    /// # Errors
    ///
    /// Returns [`BookingError::InvalidStayDates`] unless `check_out` is after
    /// `check_in`.
    pub fn new(check_in: NaiveDate, check_out: NaiveDate) -> Result<Self> {
        if check_out <= check_in {
            return Err(BookingError::InvalidStayDates);
        }
        Ok(Self {
            check_in,
            check_out,
        })
    }

    /// Arrival date.
    #[must_use]
    pub const fn check_in(&self) -> NaiveDate {
        self.check_in
    }

    /// Departure date.
    #[must_use]
    pub const fn check_out(&self) -> NaiveDate {
        self.check_out
    }

    /// Number of nights, always ≥ 1.
    #[must_use]
    pub fn nights(&self) -> i64 {
        (self.check_out - self.check_in).num_days()
    }

    /// Every night of the stay: check-in inclusive, check-out exclusive.
    pub fn nights_iter(&self) -> impl Iterator<Item = NaiveDate> + '_ {
        self.check_in.iter_days().take_while(move |d| *d < self.check_out)
    }

    /// Whether two stays share at least one night.
    #[must_use]
    pub fn overlaps(&self, other: &Self) -> bool {
        self.check_in < other.check_out && self.check_out > other.check_in
    }
}

/// Flat nightly rate times nights.
#[must_use]
pub fn total_price(base_price: i64, stay: &StayDates) -> i64 {
    base_price.saturating_mul(stay.nights())
}

/// Random upper-case alphanumeric reservation code.
pub fn generate_reservation_code<R: Rng + ?Sized>(rng: &mut R) -> String {
    Alphanumeric
        .sample_iter(rng)
        .take(RESERVATION_CODE_LENGTH)
        .map(|b| char::from(b).to_ascii_uppercase())
        .collect()
}

/// A guest's request to book a stay.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReservationRequest {
    /// Listing to book.
    pub accommodation_id: AccommodationId,
    /// Arrival date.
    pub check_in_date: NaiveDate,
    /// Departure date.
    pub check_out_date: NaiveDate,
    /// Number of guests.
    pub guest_count: i32,
    /// Free-text note to the host.
    #[serde(default)]
    pub message: Option<String>,
}

impl ReservationRequest {
    /// The requested stay, validated.
    ///
    /// # Errors
    ///
    /// Returns [`BookingError::InvalidStayDates`] for same-day or reversed dates.
    pub fn stay(&self) -> Result<StayDates> {
        StayDates::new(self.check_in_date, self.check_out_date)
    }
}

/// A reservation row.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Reservation {
    /// Surrogate key.
    pub id: ReservationId,
    /// Public reference.
    pub reservation_uid: ReservationUid,
    /// Short code shown to guests.
    pub reservation_code: String,
    /// Booked listing.
    pub accommodation_id: AccommodationId,
    /// Booking guest.
    pub guest_id: MemberId,
    /// Arrival timestamp.
    pub check_in: NaiveDateTime,
    /// Departure timestamp.
    pub check_out: NaiveDateTime,
    /// Number of guests.
    pub guest_count: i32,
    /// Price fixed at creation.
    pub total_price: i64,
    /// Price currency.
    pub currency: String,
    /// Current state.
    pub status: ReservationStatus,
    /// Note to the host.
    pub message: Option<String>,
    /// End of the payment window.
    pub expires_at: DateTime<Utc>,
    /// Creation time.
    pub created_at: DateTime<Utc>,
}

impl Reservation {
    /// The stay as calendar dates.
    #[must_use]
    pub fn stay(&self) -> StayDates {
        StayDates {
            check_in: self.check_in.date(),
            check_out: self.check_out.date(),
        }
    }

    /// Whether `member` booked this reservation.
    #[must_use]
    pub fn is_owned_by(&self, member: MemberId) -> bool {
        self.guest_id == member
    }

    /// Whether the payment window has elapsed without payment.
    #[must_use]
    pub fn is_overdue(&self, now: DateTime<Utc>) -> bool {
        self.status == ReservationStatus::PaymentPending && self.expires_at < now
    }

    /// Move to `target`.
    ///
    /// # Errors
    ///
    /// Returns [`BookingError::InvalidStatusTransition`] when `target` is
    /// neither the current state nor reachable from it.
    pub fn transition_to(&mut self, target: ReservationStatus) -> Result<Transition> {
        let from = self.status;
        if from == target {
            return Ok(Transition::AlreadyApplied);
        }
        if !from.can_transition_to(target) {
            return Err(BookingError::InvalidStatusTransition { from, to: target });
        }
        self.status = target;
        Ok(Transition::Applied { from })
    }
}

/// A reservation about to be inserted.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NewReservation {
    /// Public reference.
    pub reservation_uid: ReservationUid,
    /// Short code; must be unique.
    pub reservation_code: String,
    /// Booked listing.
    pub accommodation_id: AccommodationId,
    /// Booking guest.
    pub guest_id: MemberId,
    /// Arrival timestamp.
    pub check_in: NaiveDateTime,
    /// Departure timestamp.
    pub check_out: NaiveDateTime,
    /// Number of guests.
    pub guest_count: i32,
    /// Nights × nightly rate.
    pub total_price: i64,
    /// Price currency.
    pub currency: String,
    /// Always `PAYMENT_PENDING`.
    pub status: ReservationStatus,
    /// Note to the host.
    pub message: Option<String>,
    /// End of the payment window.
    pub expires_at: DateTime<Utc>,
    /// Creation time.
    pub created_at: DateTime<Utc>,
}

impl NewReservation {
    /// A `PAYMENT_PENDING` reservation for `request`.
    ///
    /// Arrival and departure take the listing's check-in and check-out time
    /// of day; the price is fixed here and never recomputed.
    #[must_use]
    pub fn pending(
        accommodation: &Accommodation,
        guest: &Member,
        request: &ReservationRequest,
        stay: StayDates,
        reservation_code: String,
        now: DateTime<Utc>,
        payment_window: Duration,
    ) -> Self {
        Self {
            reservation_uid: ReservationUid::new_v4(),
            reservation_code,
            accommodation_id: accommodation.id,
            guest_id: guest.id,
            check_in: stay.check_in().and_time(accommodation.check_in_time),
            check_out: stay.check_out().and_time(accommodation.check_out_time),
            guest_count: request.guest_count,
            total_price: total_price(accommodation.base_price, &stay),
            currency: CURRENCY.to_string(),
            status: ReservationStatus::PaymentPending,
            message: request.message.clone(),
            expires_at: now + payment_window,
            created_at: now,
        }
    }

    /// The row as stored, once the database assigned its id.
    #[must_use]
    pub fn into_reservation(self, id: ReservationId) -> Reservation {
        Reservation {
            id,
            reservation_uid: self.reservation_uid,
            reservation_code: self.reservation_code,
            accommodation_id: self.accommodation_id,
            guest_id: self.guest_id,
            check_in: self.check_in,
            check_out: self.check_out,
            guest_count: self.guest_count,
            total_price: self.total_price,
            currency: self.currency,
            status: self.status,
            message: self.message,
            expires_at: self.expires_at,
            created_at: self.created_at,
        }
    }
}

/// One row of the reservation audit trail.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StatusChange {
    /// Reservation that changed.
    pub reservation_id: ReservationId,
    /// Status before; `None` for creation.
    pub previous_status: Option<ReservationStatus>,
    /// Status after.
    pub new_status: ReservationStatus,
    /// Who made the change (`USER_ID:7`, `SYSTEM:SCHEDULER`, ...).
    pub changed_by: String,
    /// Why.
    pub reason: Option<String>,
    /// When.
    pub changed_at: DateTime<Utc>,
}

impl StatusChange {
    /// Audit row for a change made by `actor`.
    #[must_use]
    pub fn new(
        reservation_id: ReservationId,
        previous_status: Option<ReservationStatus>,
        new_status: ReservationStatus,
        actor: Actor,
        reason: impl Into<String>,
        changed_at: DateTime<Utc>,
    ) -> Self {
        Self {
            reservation_id,
            previous_status,
            new_status,
            changed_by: actor.to_string(),
            reason: Some(reason.into()),
            changed_at,
        }
    }
}
