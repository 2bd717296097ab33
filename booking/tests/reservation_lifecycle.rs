//! Reservation creation, state-machine transitions and the expiry sweeper.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

mod common;

use common::{ACCOMMODATION, Harness, date, guest, other_guest, request};
use homestay_booking::catalog::{Member, MemberStatus};
use homestay_booking::events::DomainEvent;
use homestay_booking::gateway::{CancelRequest, ConfirmRequest};
use homestay_booking::reservation::Transition;
use homestay_booking::{AccommodationId, BookingError, MemberId, RequestContext, ReservationStatus};

#[tokio::test]
async fn creation_writes_pending_row_audit_event_and_hold() {
    let h = Harness::new().await;
    let reservation = h.book(date(12, 24), date(12, 26)).await;

    assert_eq!(reservation.status, ReservationStatus::PaymentPending);
    assert_eq!(reservation.total_price, 200_000);
    assert_eq!(reservation.reservation_code.len(), 6);
    assert_eq!(reservation.expires_at, reservation.created_at + chrono::Duration::minutes(15));
    assert_eq!(reservation.check_in.date(), date(12, 24));

    let history = h.store.status_history(reservation.id).await;
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].previous_status, None);
    assert_eq!(history[0].changed_by, "USER_ID:1");

    let events = h.store.outbox_events().await;
    let [DomainEvent::ReservationPending(pending)] = events.as_slice() else {
        panic!("expected one RESERVATION_PENDING, got {events:?}");
    };
    assert_eq!(pending.order_id, reservation.reservation_uid);
    assert_eq!(pending.amount, 200_000);
    assert_eq!(pending.payment_key, None);

    assert_eq!(
        h.hold_backend.held_keys(),
        vec![
            format!("HOLD:RESERVATION{ACCOMMODATION}:2025-12-24"),
            format!("HOLD:RESERVATION{ACCOMMODATION}:2025-12-25"),
        ]
    );
    assert_eq!(h.lock_backend.locked_keys(), 0);
}

#[tokio::test]
async fn zero_night_stay_is_rejected_before_anything_is_written() {
    let h = Harness::new().await;
    let err = h
        .reservations
        .create_reservation(&guest(), request(date(12, 24), date(12, 24)))
        .await
        .unwrap_err();

    assert!(matches!(err, BookingError::InvalidStayDates));
    assert!(h.store.reservations().await.is_empty());
    assert!(h.store.outbox().await.is_empty());
}

#[tokio::test]
async fn overlapping_booking_is_turned_away_by_hold_then_by_overlap_check() {
    let h = Harness::new().await;
    let first = h.book(date(12, 24), date(12, 27)).await;

    let err = h
        .reservations
        .create_reservation(&other_guest(), request(date(12, 26), date(12, 28)))
        .await
        .unwrap_err();
    assert!(matches!(err, BookingError::DatesOnHold));

    h.holds
        .remove_hold(AccommodationId(ACCOMMODATION), &first.stay())
        .await
        .unwrap();
    let err = h
        .reservations
        .create_reservation(&other_guest(), request(date(12, 26), date(12, 28)))
        .await
        .unwrap_err();
    assert!(matches!(err, BookingError::ReservationConflict));

    // Check-out day is free for the next guest.
    let next = h
        .reservations
        .create_reservation(&other_guest(), request(date(12, 27), date(12, 29)))
        .await
        .unwrap();
    assert_eq!(next.status, ReservationStatus::PaymentPending);
    assert_eq!(h.store.reservations().await.len(), 2);
}

#[tokio::test]
async fn withdrawn_member_cannot_book_and_lock_is_released() {
    let h = Harness::new().await;
    h.store
        .add_member(Member {
            id: MemberId(3),
            status: MemberStatus::Deleted,
        })
        .await;

    let err = h
        .reservations
        .create_reservation(&RequestContext::new(MemberId(3)), request(date(12, 24), date(12, 25)))
        .await
        .unwrap_err();

    assert!(matches!(err, BookingError::MemberNotFound(MemberId(3))));
    assert_eq!(h.lock_backend.locked_keys(), 0);
    assert!(h.hold_backend.held_keys().is_empty());
}

#[tokio::test]
async fn confirm_is_idempotent() {
    let h = Harness::new().await;
    let reservation = h.book(date(12, 24), date(12, 26)).await;
    let uid = reservation.reservation_uid;

    let first = h.transactions.confirm(uid).await.unwrap();
    assert_eq!(
        first,
        Transition::Applied {
            from: ReservationStatus::PaymentPending
        }
    );
    let second = h.transactions.confirm(uid).await.unwrap();
    assert_eq!(second, Transition::AlreadyApplied);

    assert_eq!(h.outbox_types().await, vec!["RESERVATION_PENDING", "RESERVATION_CONFIRMED"]);
    let history = h.store.status_history(reservation.id).await;
    assert_eq!(history.len(), 2);
    assert_eq!(history[1].changed_by, "SYSTEM:KAFKA_CONSUMER");
    assert_eq!(history[1].reason.as_deref(), Some("payment succeeded"));

    let events = h.store.outbox_events().await;
    let DomainEvent::ReservationConfirmed(stay) = &events[1] else {
        panic!("expected RESERVATION_CONFIRMED, got {:?}", events[1]);
    };
    assert_eq!(stay.accommodation_id, AccommodationId(ACCOMMODATION));
    assert_eq!((stay.check_in_date, stay.check_out_date), (date(12, 24), date(12, 26)));
}

#[tokio::test]
async fn illegal_transitions_are_rejected_without_side_effects() {
    let h = Harness::new().await;
    let uid = h.book(date(12, 24), date(12, 26)).await.reservation_uid;
    h.transactions.confirm(uid).await.unwrap();

    let err = h.transactions.expire(uid, "payment failed").await.unwrap_err();
    assert!(matches!(
        err,
        BookingError::InvalidStatusTransition {
            from: ReservationStatus::Confirmed,
            to: ReservationStatus::Expired,
        }
    ));
    assert_eq!(h.store.reservation(uid).await.unwrap().status, ReservationStatus::Confirmed);
    assert_eq!(h.store.outbox().await.len(), 2);

    let missing = homestay_booking::ReservationUid::new_v4();
    assert!(matches!(
        h.transactions.confirm(missing).await,
        Err(BookingError::ReservationNotFound(_))
    ));
}

#[tokio::test]
async fn only_the_owner_can_cancel_and_cancellation_can_be_reverted() {
    let h = Harness::new().await;
    let uid = h.book(date(12, 24), date(12, 26)).await.reservation_uid;
    h.transactions.confirm(uid).await.unwrap();

    let cancel = CancelRequest {
        cancel_reason: "change of plans".into(),
        cancel_amount: None,
    };
    let err = h
        .transactions
        .cancel(&other_guest(), uid, cancel.clone())
        .await
        .unwrap_err();
    assert!(matches!(err, BookingError::AccessDenied(_)));

    h.transactions.cancel(&guest(), uid, cancel).await.unwrap();
    let events = h.store.outbox_events().await;
    let Some(DomainEvent::ReservationCancelled(cancelled)) = events.last() else {
        panic!("expected RESERVATION_CANCELLED last, got {events:?}");
    };
    assert_eq!(cancelled.reservation_uid, uid);
    assert_eq!(cancelled.cancel_reason, "change of plans");

    h.transactions.revert_cancellation(uid, "refund failed").await.unwrap();
    assert_eq!(
        h.store.reservation(uid).await.unwrap().status,
        ReservationStatus::CancellationFailed
    );
    assert_eq!(
        h.outbox_types().await.last().map(String::as_str),
        Some("RESERVATION_CANCELLATION_REVERTED")
    );
}

#[tokio::test]
async fn payment_request_is_validated_against_the_reservation() {
    let h = Harness::new().await;
    let reservation = h.book(date(12, 24), date(12, 26)).await;
    let confirm = |amount| ConfirmRequest {
        payment_key: "pk_1".into(),
        order_id: reservation.reservation_uid.to_string(),
        amount,
    };

    assert!(matches!(
        h.payments.request_confirmation(&guest(), confirm(150_000)).await,
        Err(BookingError::AmountMismatch {
            expected: 200_000,
            actual: 150_000
        })
    ));
    assert!(matches!(
        h.payments.request_confirmation(&other_guest(), confirm(200_000)).await,
        Err(BookingError::AccessDenied(_))
    ));
    let unknown = ConfirmRequest {
        order_id: "not-a-uid".into(),
        ..confirm(200_000)
    };
    assert!(matches!(
        h.payments.request_confirmation(&guest(), unknown).await,
        Err(BookingError::ReservationNotFound(_))
    ));

    h.payments.request_confirmation(&guest(), confirm(200_000)).await.unwrap();
    assert_eq!(
        h.outbox_types().await,
        vec!["RESERVATION_PENDING", "PAYMENT_CONFIRM_REQUESTED"]
    );

    h.transactions.confirm(reservation.reservation_uid).await.unwrap();
    assert!(matches!(
        h.payments.request_confirmation(&guest(), confirm(200_000)).await,
        Err(BookingError::InvalidStatusTransition { .. })
    ));
}

#[tokio::test]
async fn sweeper_expires_only_overdue_pending_reservations() {
    let h = Harness::new().await;
    let stale = h.book(date(12, 1), date(12, 3)).await;
    h.clock.advance(chrono::Duration::minutes(10));
    let fresh = h.book(date(12, 10), date(12, 12)).await;
    let confirmed = h.book(date(12, 20), date(12, 21)).await;
    h.transactions.confirm(confirmed.reservation_uid).await.unwrap();
    h.clock.advance(chrono::Duration::minutes(6));

    assert_eq!(h.sweeper().sweep_once().await.unwrap(), 1);

    let expired = h.store.reservation(stale.reservation_uid).await.unwrap();
    assert_eq!(expired.status, ReservationStatus::Expired);
    let history = h.store.status_history(stale.id).await;
    assert_eq!(history.last().unwrap().changed_by, "SYSTEM:SCHEDULER");
    assert_eq!(
        h.store.reservation(fresh.reservation_uid).await.unwrap().status,
        ReservationStatus::PaymentPending
    );
    assert_eq!(
        h.store.reservation(confirmed.reservation_uid).await.unwrap().status,
        ReservationStatus::Confirmed
    );

    let accommodation = AccommodationId(ACCOMMODATION);
    assert!(!h.holds.is_any_date_held(accommodation, &stale.stay()).await.unwrap());
    assert!(h.holds.is_any_date_held(accommodation, &fresh.stay()).await.unwrap());

    assert_eq!(h.sweeper().sweep_once().await.unwrap(), 0);
    let rebooked = h
        .reservations
        .create_reservation(&other_guest(), request(date(12, 1), date(12, 3)))
        .await
        .unwrap();
    assert_eq!(rebooked.status, ReservationStatus::PaymentPending);
}
