//! Concurrent bookings of overlapping stays admit exactly one guest.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

mod common;

use common::{ACCOMMODATION, Harness, date, request};
use homestay_booking::catalog::Member;
use homestay_booking::mocks::active_member;
use homestay_booking::{AccommodationId, BookingError, MemberId, RequestContext, ReservationStatus};
use std::time::Duration;

const ATTEMPTS: i64 = 300;

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn overlapping_stays_admit_a_single_winner() {
    let h = Harness::with_lock_wait(Duration::from_millis(500)).await;
    for guest in 100..100 + ATTEMPTS {
        let member: Member = active_member(guest);
        h.store.add_member(member).await;
    }

    // Check-in on the 1st, 2nd or 3rd for three nights: every stay covers the 3rd.
    let mut tasks = Vec::new();
    for i in 0..ATTEMPTS {
        let service = h.reservations.clone();
        let check_in = date(12, 1 + u32::try_from(i % 3).unwrap());
        let check_out = check_in + chrono::Duration::days(3);
        tasks.push(tokio::spawn(async move {
            service
                .create_reservation(&RequestContext::new(MemberId(100 + i)), request(check_in, check_out))
                .await
        }));
    }

    let mut admitted = Vec::new();
    let mut rejected = 0;
    for task in tasks {
        match task.await.unwrap() {
            Ok(reservation) => admitted.push(reservation),
            Err(BookingError::LockContention | BookingError::ReservationConflict | BookingError::DatesOnHold) => {
                rejected += 1;
            }
            Err(other) => panic!("unexpected rejection: {other}"),
        }
    }

    assert_eq!(admitted.len(), 1, "exactly one booking must win");
    assert_eq!(rejected, ATTEMPTS - 1);

    let stored = h.store.reservations().await;
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0].reservation_uid, admitted[0].reservation_uid);
    assert_eq!(stored[0].status, ReservationStatus::PaymentPending);
    assert_eq!(h.outbox_types().await, vec!["RESERVATION_PENDING"]);
    assert_eq!(h.lock_backend.locked_keys(), 0, "every lock is released");
    assert!(
        h.holds
            .is_any_date_held(AccommodationId(ACCOMMODATION), &admitted[0].stay())
            .await
            .unwrap()
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn disjoint_stays_do_not_block_each_other() {
    let h = Harness::new().await;
    let mut tasks = Vec::new();
    for week in 0..4_u32 {
        let service = h.reservations.clone();
        let check_in = date(11, 1 + week * 7);
        tasks.push(tokio::spawn(async move {
            service
                .create_reservation(&common::guest(), request(check_in, check_in + chrono::Duration::days(2)))
                .await
        }));
    }

    for task in tasks {
        task.await.unwrap().unwrap();
    }
    assert_eq!(h.store.reservations().await.len(), 4);
    assert_eq!(h.hold_backend.held_keys().len(), 8);
}
