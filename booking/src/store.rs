//! Transactional persistence boundary.
//!
//! Every state change runs inside one [`UnitOfWork`]: the service opens it,
//! performs reads and writes (including the outbox row), and hands the result
//! to [`finish`], which commits on `Ok` and rolls back on `Err`. The gateway
//! is never called while a unit of work is open.
//!
//! # Example
//!
//! ```rust,ignore
//! let mut uow = store.begin().await?;
//! let result = confirm_in(uow.as_mut(), uid).await;
//! finish(uow, result).await
//! ```

use crate::catalog::{Accommodation, Member};
use crate::error::Result;
use crate::ids::{AccommodationId, MemberId, PaymentId, ReservationId, ReservationUid};
use crate::outbox::OutboxRecord;
use crate::payment::{NewPayment, Payment, PaymentAttempt, PaymentCancel};
use crate::reservation::{NewReservation, Reservation, ReservationStatus, StatusChange, StayDates};
use async_trait::async_trait;
use chrono::{DateTime, Utc};

/// Opens units of work.
#[async_trait]
pub trait BookingStore: Send + Sync {
    /// Start a transaction.
    ///
    /// # Errors
    ///
    /// Returns [`crate::error::BookingError::Store`] if no connection is available.
    async fn begin(&self) -> Result<Box<dyn UnitOfWork>>;
}

/// One open transaction.
///
/// Dropping a unit of work without committing discards its writes.
#[async_trait]
pub trait UnitOfWork: Send {
    /// Member by id.
    async fn find_member(&mut self, id: MemberId) -> Result<Option<Member>>;

    /// Accommodation by id.
    async fn find_accommodation(&mut self, id: AccommodationId) -> Result<Option<Accommodation>>;

    /// Whether a reservation already uses `code`.
    async fn reservation_code_exists(&mut self, code: &str) -> Result<bool>;

    /// Whether a `PAYMENT_PENDING` or `CONFIRMED` reservation of the
    /// accommodation shares a night with `stay`.
    async fn has_overlapping_reservation(
        &mut self,
        accommodation_id: AccommodationId,
        stay: &StayDates,
    ) -> Result<bool>;

    /// Insert a reservation.
    async fn insert_reservation(&mut self, reservation: NewReservation) -> Result<Reservation>;

    /// Reservation by uid, without locking it.
    async fn find_reservation(&mut self, uid: ReservationUid) -> Result<Option<Reservation>>;

    /// Reservation by uid, locked until the unit of work ends.
    async fn find_reservation_for_update(&mut self, uid: ReservationUid) -> Result<Option<Reservation>>;

    /// Persist a new status.
    async fn update_reservation_status(&mut self, id: ReservationId, status: ReservationStatus) -> Result<()>;

    /// `PAYMENT_PENDING` reservations whose payment window ended before `now`,
    /// locked until the unit of work ends.
    async fn find_overdue_reservations(&mut self, now: DateTime<Utc>) -> Result<Vec<Reservation>>;

    /// Append to the audit trail.
    async fn insert_status_history(&mut self, change: &StatusChange) -> Result<()>;

    /// Append to the outbox.
    async fn append_outbox(&mut self, record: &OutboxRecord) -> Result<()>;

    /// Payment of a reservation, with its cancellations.
    async fn find_payment_by_reservation_uid(&mut self, uid: ReservationUid) -> Result<Option<Payment>>;

    /// Payment by its gateway key, with its cancellations.
    async fn find_payment_by_payment_key(&mut self, payment_key: &str) -> Result<Option<Payment>>;

    /// Insert a payment.
    async fn insert_payment(&mut self, payment: NewPayment) -> Result<Payment>;

    /// Persist status and balance.
    async fn update_payment(&mut self, payment: &Payment) -> Result<()>;

    /// Record a refund of `payment_id`.
    async fn insert_payment_cancel(&mut self, payment_id: PaymentId, cancel: &PaymentCancel) -> Result<()>;

    /// Mark a refund of `payment_id` as in flight.
    ///
    /// Returns `false` when another claim newer than `stale_before` holds it.
    async fn claim_payment_refund(
        &mut self,
        payment_id: PaymentId,
        now: DateTime<Utc>,
        stale_before: DateTime<Utc>,
    ) -> Result<bool>;

    /// Drop the refund claim of `payment_id`.
    async fn release_payment_refund(&mut self, payment_id: PaymentId) -> Result<()>;

    /// Append to the attempt log.
    async fn insert_payment_attempt(&mut self, attempt: &PaymentAttempt) -> Result<()>;

    /// Make every write durable.
    async fn commit(self: Box<Self>) -> Result<()>;

    /// Discard every write.
    async fn rollback(self: Box<Self>) -> Result<()>;
}

/// Commit when `result` is `Ok`, roll back otherwise, and pass `result` on.
///
/// A failed rollback is logged; the original error wins.
///
/// # Errors
///
/// Returns the error in `result`, or the commit error.
pub async fn finish<T>(uow: Box<dyn UnitOfWork>, result: Result<T>) -> Result<T> {
    match result {
        Ok(value) => {
            uow.commit().await?;
            Ok(value)
        }
        Err(err) => {
            if let Err(rollback) = uow.rollback().await {
                tracing::error!(error = %rollback, original = %err, "Rollback failed");
            }
            Err(err)
        }
    }
}
