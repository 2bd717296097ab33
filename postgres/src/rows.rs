//! Row decoding.

use homestay_booking::BookingError;
use homestay_booking::catalog::{Accommodation, AccommodationStatus, Member, MemberStatus};
use homestay_booking::ids::{AccommodationId, MemberId, PaymentId, ReservationId, ReservationUid};
use homestay_booking::payment::{Payment, PaymentCancel, PaymentMethod, PaymentStatus};
use homestay_booking::reservation::{Reservation, ReservationStatus};
use sqlx::Row;
use sqlx::postgres::PgRow;

pub(crate) const RESERVATION_COLUMNS: &str = "id, reservation_uid, reservation_code, accommodation_id, guest_id, \
     check_in, check_out, guest_count, total_price, currency, status, message, expires_at, created_at";

pub(crate) const PAYMENT_COLUMNS: &str = "p.id, p.payment_uid, p.payment_key, p.order_id, p.amount, \
     p.balance_amount, p.method, p.status, p.approved_at, p.reservation_id";

pub(crate) fn db(e: sqlx::Error) -> BookingError {
    BookingError::Store(e.to_string())
}

fn get<'r, T>(row: &'r PgRow, column: &str) -> Result<T, BookingError>
where
    T: sqlx::Decode<'r, sqlx::Postgres> + sqlx::Type<sqlx::Postgres>,
{
    row.try_get(column).map_err(db)
}

fn parse<T>(column: &str, value: &str, parse: impl FnOnce(&str) -> Option<T>) -> Result<T, BookingError> {
    parse(value).ok_or_else(|| BookingError::Store(format!("unknown {column} value {value:?}")))
}

pub(crate) fn member(row: &PgRow) -> Result<Member, BookingError> {
    let status: String = get(row, "status")?;
    Ok(Member {
        id: MemberId(get(row, "id")?),
        status: parse("member status", &status, MemberStatus::parse)?,
    })
}

pub(crate) fn accommodation(row: &PgRow) -> Result<Accommodation, BookingError> {
    let status: String = get(row, "status")?;
    Ok(Accommodation {
        id: AccommodationId(get(row, "id")?),
        status: parse("accommodation status", &status, AccommodationStatus::parse)?,
        base_price: get(row, "base_price")?,
        check_in_time: get(row, "check_in_time")?,
        check_out_time: get(row, "check_out_time")?,
    })
}

pub(crate) fn reservation(row: &PgRow) -> Result<Reservation, BookingError> {
    let status: String = get(row, "status")?;
    Ok(Reservation {
        id: ReservationId(get(row, "id")?),
        reservation_uid: ReservationUid(get(row, "reservation_uid")?),
        reservation_code: get(row, "reservation_code")?,
        accommodation_id: AccommodationId(get(row, "accommodation_id")?),
        guest_id: MemberId(get(row, "guest_id")?),
        check_in: get(row, "check_in")?,
        check_out: get(row, "check_out")?,
        guest_count: get(row, "guest_count")?,
        total_price: get(row, "total_price")?,
        currency: get(row, "currency")?,
        status: parse("reservation status", &status, ReservationStatus::parse)?,
        message: get(row, "message")?,
        expires_at: get(row, "expires_at")?,
        created_at: get(row, "created_at")?,
    })
}

/// Payment without its cancellations.
pub(crate) fn payment(row: &PgRow) -> Result<Payment, BookingError> {
    let method: String = get(row, "method")?;
    let status: String = get(row, "status")?;
    Ok(Payment {
        id: PaymentId(get(row, "id")?),
        payment_uid: get(row, "payment_uid")?,
        payment_key: get(row, "payment_key")?,
        order_id: get(row, "order_id")?,
        amount: get(row, "amount")?,
        balance_amount: get(row, "balance_amount")?,
        method: PaymentMethod::from_description(&method),
        status: parse("payment status", &status, PaymentStatus::parse)?,
        approved_at: get(row, "approved_at")?,
        reservation_id: ReservationId(get(row, "reservation_id")?),
        cancels: Vec::new(),
    })
}

pub(crate) fn payment_cancel(row: &PgRow) -> Result<PaymentCancel, BookingError> {
    Ok(PaymentCancel {
        cancel_amount: get(row, "cancel_amount")?,
        cancel_reason: get(row, "cancel_reason")?,
        transaction_key: get(row, "transaction_key")?,
        canceled_at: get(row, "canceled_at")?,
    })
}
