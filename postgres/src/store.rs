//! [`BookingStore`] over a `sqlx` connection pool.

use crate::rows::{self, PAYMENT_COLUMNS, RESERVATION_COLUMNS, db};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use homestay_booking::catalog::{Accommodation, Member};
use homestay_booking::ids::{AccommodationId, MemberId, PaymentId, ReservationId, ReservationUid};
use homestay_booking::outbox::OutboxRecord;
use homestay_booking::payment::{NewPayment, Payment, PaymentAttempt, PaymentCancel};
use homestay_booking::reservation::{NewReservation, Reservation, ReservationStatus, StatusChange, StayDates};
use homestay_booking::{BookingStore, Result, UnitOfWork};
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Postgres, Transaction};

/// Booking store backed by `PostgreSQL`.
///
/// Cheap to clone; clones share the pool.
#[derive(Clone)]
pub struct PostgresBookingStore {
    pool: PgPool,
}

impl PostgresBookingStore {
    /// Store over an existing pool.
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// The underlying pool.
    #[must_use]
    pub const fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl BookingStore for PostgresBookingStore {
    async fn begin(&self) -> Result<Box<dyn UnitOfWork>> {
        let tx = self.pool.begin().await.map_err(|e| {
            tracing::error!(error = %e, "Failed to open transaction");
            metrics::counter!("booking.store.begin_failures").increment(1);
            db(e)
        })?;
        Ok(Box::new(PostgresUnitOfWork { tx }))
    }
}

/// One `PostgreSQL` transaction.
///
/// Dropping it without [`UnitOfWork::commit`] rolls the transaction back.
pub struct PostgresUnitOfWork {
    tx: Transaction<'static, Postgres>,
}

impl PostgresUnitOfWork {
    async fn payment_with_cancels(&mut self, row: Option<PgRow>) -> Result<Option<Payment>> {
        let Some(row) = row else {
            return Ok(None);
        };
        let mut payment = rows::payment(&row)?;
        payment.cancels = sqlx::query(
            r"
            SELECT cancel_amount, cancel_reason, transaction_key, canceled_at
            FROM payment_cancels
            WHERE payment_id = $1
            ORDER BY id
            ",
        )
        .bind(payment.id.get())
        .fetch_all(&mut *self.tx)
        .await
        .map_err(db)?
        .iter()
        .map(rows::payment_cancel)
        .collect::<Result<_>>()?;
        Ok(Some(payment))
    }
}

#[async_trait]
impl UnitOfWork for PostgresUnitOfWork {
    async fn find_member(&mut self, id: MemberId) -> Result<Option<Member>> {
        sqlx::query("SELECT id, status FROM members WHERE id = $1")
            .bind(id.get())
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(db)?
            .as_ref()
            .map(rows::member)
            .transpose()
    }

    async fn find_accommodation(&mut self, id: AccommodationId) -> Result<Option<Accommodation>> {
        sqlx::query(
            r"
            SELECT id, status, base_price, check_in_time, check_out_time
            FROM accommodations
            WHERE id = $1
            ",
        )
        .bind(id.get())
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(db)?
        .as_ref()
        .map(rows::accommodation)
        .transpose()
    }

    async fn reservation_code_exists(&mut self, code: &str) -> Result<bool> {
        let (exists,): (bool,) =
            sqlx::query_as("SELECT EXISTS (SELECT 1 FROM reservations WHERE reservation_code = $1)")
                .bind(code)
                .fetch_one(&mut *self.tx)
                .await
                .map_err(db)?;
        Ok(exists)
    }

    async fn has_overlapping_reservation(
        &mut self,
        accommodation_id: AccommodationId,
        stay: &StayDates,
    ) -> Result<bool> {
        // Half-open nights: a stay ending on another's check-in day does not overlap.
        let (exists,): (bool,) = sqlx::query_as(
            r"
            SELECT EXISTS (
                SELECT 1 FROM reservations
                WHERE accommodation_id = $1
                  AND status IN ('PAYMENT_PENDING', 'CONFIRMED')
                  AND check_in::date < $3
                  AND check_out::date > $2
            )
            ",
        )
        .bind(accommodation_id.get())
        .bind(stay.check_in())
        .bind(stay.check_out())
        .fetch_one(&mut *self.tx)
        .await
        .map_err(db)?;
        Ok(exists)
    }

    async fn insert_reservation(&mut self, reservation: NewReservation) -> Result<Reservation> {
        let (id,): (i64,) = sqlx::query_as(
            r"
            INSERT INTO reservations (
                reservation_uid, reservation_code, accommodation_id, guest_id,
                check_in, check_out, guest_count, total_price, currency,
                status, message, expires_at, created_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
            RETURNING id
            ",
        )
        .bind(reservation.reservation_uid.0)
        .bind(&reservation.reservation_code)
        .bind(reservation.accommodation_id.get())
        .bind(reservation.guest_id.get())
        .bind(reservation.check_in)
        .bind(reservation.check_out)
        .bind(reservation.guest_count)
        .bind(reservation.total_price)
        .bind(&reservation.currency)
        .bind(reservation.status.as_str())
        .bind(&reservation.message)
        .bind(reservation.expires_at)
        .bind(reservation.created_at)
        .fetch_one(&mut *self.tx)
        .await
        .map_err(db)?;

        Ok(reservation.into_reservation(ReservationId(id)))
    }

    async fn find_reservation(&mut self, uid: ReservationUid) -> Result<Option<Reservation>> {
        sqlx::query(&format!(
            "SELECT {RESERVATION_COLUMNS} FROM reservations WHERE reservation_uid = $1"
        ))
        .bind(uid.0)
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(db)?
        .as_ref()
        .map(rows::reservation)
        .transpose()
    }

    async fn find_reservation_for_update(&mut self, uid: ReservationUid) -> Result<Option<Reservation>> {
        sqlx::query(&format!(
            "SELECT {RESERVATION_COLUMNS} FROM reservations WHERE reservation_uid = $1 FOR UPDATE"
        ))
        .bind(uid.0)
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(db)?
        .as_ref()
        .map(rows::reservation)
        .transpose()
    }

    async fn update_reservation_status(&mut self, id: ReservationId, status: ReservationStatus) -> Result<()> {
        sqlx::query("UPDATE reservations SET status = $1 WHERE id = $2")
            .bind(status.as_str())
            .bind(id.get())
            .execute(&mut *self.tx)
            .await
            .map_err(db)?;
        Ok(())
    }

    async fn find_overdue_reservations(&mut self, now: DateTime<Utc>) -> Result<Vec<Reservation>> {
        // SKIP LOCKED lets concurrent sweepers split the batch.
        sqlx::query(&format!(
            r"
            SELECT {RESERVATION_COLUMNS} FROM reservations
            WHERE status = 'PAYMENT_PENDING' AND expires_at < $1
            ORDER BY id
            FOR UPDATE SKIP LOCKED
            "
        ))
        .bind(now)
        .fetch_all(&mut *self.tx)
        .await
        .map_err(db)?
        .iter()
        .map(rows::reservation)
        .collect()
    }

    async fn insert_status_history(&mut self, change: &StatusChange) -> Result<()> {
        sqlx::query(
            r"
            INSERT INTO reservation_status_history (
                reservation_id, previous_status, new_status, changed_by, reason, changed_at
            ) VALUES ($1, $2, $3, $4, $5, $6)
            ",
        )
        .bind(change.reservation_id.get())
        .bind(change.previous_status.map(ReservationStatus::as_str))
        .bind(change.new_status.as_str())
        .bind(&change.changed_by)
        .bind(&change.reason)
        .bind(change.changed_at)
        .execute(&mut *self.tx)
        .await
        .map_err(db)?;
        Ok(())
    }

    async fn append_outbox(&mut self, record: &OutboxRecord) -> Result<()> {
        sqlx::query(
            r"
            INSERT INTO outbox (aggregate_type, aggregate_id, event_type, payload, created_at)
            VALUES ($1, $2, $3, $4, $5)
            ",
        )
        .bind(&record.aggregate_type)
        .bind(&record.aggregate_id)
        .bind(&record.event_type)
        .bind(&record.payload)
        .bind(record.created_at)
        .execute(&mut *self.tx)
        .await
        .map_err(db)?;
        Ok(())
    }

    async fn find_payment_by_reservation_uid(&mut self, uid: ReservationUid) -> Result<Option<Payment>> {
        let row = sqlx::query(&format!(
            r"
            SELECT {PAYMENT_COLUMNS}
            FROM payments p
            JOIN reservations r ON r.id = p.reservation_id
            WHERE r.reservation_uid = $1
            "
        ))
        .bind(uid.0)
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(db)?;
        self.payment_with_cancels(row).await
    }

    async fn find_payment_by_payment_key(&mut self, payment_key: &str) -> Result<Option<Payment>> {
        let row = sqlx::query(&format!("SELECT {PAYMENT_COLUMNS} FROM payments p WHERE p.payment_key = $1"))
            .bind(payment_key)
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(db)?;
        self.payment_with_cancels(row).await
    }

    async fn insert_payment(&mut self, payment: NewPayment) -> Result<Payment> {
        let (id,): (i64,) = sqlx::query_as(
            r"
            INSERT INTO payments (
                payment_uid, payment_key, order_id, amount, balance_amount,
                method, status, approved_at, reservation_id
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            RETURNING id
            ",
        )
        .bind(payment.payment_uid)
        .bind(&payment.payment_key)
        .bind(&payment.order_id)
        .bind(payment.amount)
        .bind(payment.balance_amount)
        .bind(payment.method.as_str())
        .bind(payment.status.as_str())
        .bind(payment.approved_at)
        .bind(payment.reservation_id.get())
        .fetch_one(&mut *self.tx)
        .await
        .map_err(db)?;

        Ok(payment.into_payment(PaymentId(id)))
    }

    async fn update_payment(&mut self, payment: &Payment) -> Result<()> {
        sqlx::query("UPDATE payments SET status = $1, balance_amount = $2 WHERE id = $3")
            .bind(payment.status.as_str())
            .bind(payment.balance_amount)
            .bind(payment.id.get())
            .execute(&mut *self.tx)
            .await
            .map_err(db)?;
        Ok(())
    }

    async fn insert_payment_cancel(&mut self, payment_id: PaymentId, cancel: &PaymentCancel) -> Result<()> {
        sqlx::query(
            r"
            INSERT INTO payment_cancels (payment_id, cancel_amount, cancel_reason, transaction_key, canceled_at)
            VALUES ($1, $2, $3, $4, $5)
            ",
        )
        .bind(payment_id.get())
        .bind(cancel.cancel_amount)
        .bind(&cancel.cancel_reason)
        .bind(&cancel.transaction_key)
        .bind(cancel.canceled_at)
        .execute(&mut *self.tx)
        .await
        .map_err(db)?;
        Ok(())
    }

    async fn claim_payment_refund(
        &mut self,
        payment_id: PaymentId,
        now: DateTime<Utc>,
        stale_before: DateTime<Utc>,
    ) -> Result<bool> {
        // The row lock taken by UPDATE serializes concurrent claims.
        let claimed = sqlx::query(
            r"
            UPDATE payments SET refund_claimed_at = $2
            WHERE id = $1 AND (refund_claimed_at IS NULL OR refund_claimed_at < $3)
            ",
        )
        .bind(payment_id.get())
        .bind(now)
        .bind(stale_before)
        .execute(&mut *self.tx)
        .await
        .map_err(db)?
        .rows_affected();
        Ok(claimed == 1)
    }

    async fn release_payment_refund(&mut self, payment_id: PaymentId) -> Result<()> {
        sqlx::query("UPDATE payments SET refund_claimed_at = NULL WHERE id = $1")
            .bind(payment_id.get())
            .execute(&mut *self.tx)
            .await
            .map_err(db)?;
        Ok(())
    }

    async fn insert_payment_attempt(&mut self, attempt: &PaymentAttempt) -> Result<()> {
        sqlx::query(
            r"
            INSERT INTO payment_attempts (
                payment_key, order_id, amount, method, status,
                failure_code, failure_message, reservation_id, attempted_at,
                virtual_account_number, virtual_bank_code, virtual_customer_name, virtual_due_date
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
            ",
        )
        .bind(&attempt.payment_key)
        .bind(&attempt.order_id)
        .bind(attempt.amount)
        .bind(attempt.method.as_str())
        .bind(attempt.status.as_str())
        .bind(&attempt.failure_code)
        .bind(&attempt.failure_message)
        .bind(attempt.reservation_id.get())
        .bind(attempt.attempted_at)
        .bind(attempt.virtual_account.as_ref().map(|a| a.account_number.as_str()))
        .bind(attempt.virtual_account.as_ref().map(|a| a.bank_code.as_str()))
        .bind(attempt.virtual_account.as_ref().map(|a| a.customer_name.as_str()))
        .bind(attempt.virtual_account.as_ref().map(|a| a.due_date))
        .execute(&mut *self.tx)
        .await
        .map_err(db)?;
        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<()> {
        self.tx.commit().await.map_err(|e| {
            tracing::error!(error = %e, "Commit failed");
            db(e)
        })
    }

    async fn rollback(self: Box<Self>) -> Result<()> {
        self.tx.rollback().await.map_err(db)
    }
}
