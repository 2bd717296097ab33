//! Guest payment lookups and bank-transfer account issuance.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

mod common;

use common::{Harness, date, guest, other_guest};
use homestay_booking::gateway::{ConfirmRequest, GatewayError, PaymentGateway};
use homestay_booking::payment::{PaymentMethod, PaymentStatus};
use homestay_booking::virtual_account::VIRTUAL_ACCOUNT_VALID_HOURS;
use homestay_booking::{BookingError, Reservation, ReservationStatus, VirtualAccountApplication};

const PAYMENT_KEY: &str = "tgen_20251224_q9r8s7";

async fn paid_reservation(h: &Harness) -> Reservation {
    let reservation = h.book(date(12, 24), date(12, 26)).await;
    h.payments
        .request_confirmation(
            &guest(),
            ConfirmRequest {
                payment_key: PAYMENT_KEY.into(),
                order_id: reservation.reservation_uid.to_string(),
                amount: reservation.total_price,
            },
        )
        .await
        .unwrap();
    h.saga().run().await.unwrap();
    reservation
}

fn transfer() -> VirtualAccountApplication {
    VirtualAccountApplication {
        bank_code: "20".into(),
        customer_name: "김게스트".into(),
    }
}

#[tokio::test]
async fn owner_reads_payment_by_key_and_order_id() {
    let h = Harness::new().await;
    let reservation = paid_reservation(&h).await;
    let queries = h.queries();
    let lookups_before = h.gateway.lookup_calls();

    let by_key = queries.find_by_payment_key(&guest(), PAYMENT_KEY).await.unwrap();
    assert_eq!(by_key.order_id, reservation.reservation_uid.to_string());
    assert_eq!(by_key.method, PaymentMethod::Card);
    assert_eq!(by_key.total_amount, 200_000);
    assert_eq!(by_key.balance_amount, 200_000);
    assert_eq!(by_key.status, PaymentStatus::Done);
    assert_eq!(by_key.gateway_status, PaymentStatus::Done);

    let by_order = queries
        .find_by_order_id(&guest(), &reservation.reservation_uid.to_string())
        .await
        .unwrap();
    assert_eq!(by_order, by_key);
    assert_eq!(h.gateway.lookup_calls(), lookups_before + 2);
}

#[tokio::test]
async fn other_guests_cannot_read_a_payment() {
    let h = Harness::new().await;
    let reservation = paid_reservation(&h).await;
    let lookups_before = h.gateway.lookup_calls();

    let err = h
        .queries()
        .find_by_order_id(&other_guest(), &reservation.reservation_uid.to_string())
        .await
        .unwrap_err();

    assert!(matches!(err, BookingError::AccessDenied(_)), "{err:?}");
    assert_eq!(h.gateway.lookup_calls(), lookups_before, "denied before asking the gateway");
}

#[tokio::test]
async fn unknown_payments_are_not_found() {
    let h = Harness::new().await;
    paid_reservation(&h).await;
    let queries = h.queries();

    for err in [
        queries.find_by_payment_key(&guest(), "pk_unknown").await.unwrap_err(),
        queries.find_by_order_id(&guest(), "not-a-reservation").await.unwrap_err(),
    ] {
        assert!(matches!(err, BookingError::PaymentNotFound(_)), "{err:?}");
    }
}

#[tokio::test]
async fn lookup_reports_gateway_state_next_to_the_local_one() {
    let h = Harness::new().await;
    paid_reservation(&h).await;
    // Refunded from the merchant dashboard, never seen by the booking side.
    h.gateway.cancel(PAYMENT_KEY, "dashboard refund", None).await.unwrap();

    let view = h.queries().find_by_payment_key(&guest(), PAYMENT_KEY).await.unwrap();

    assert_eq!(view.status, PaymentStatus::Done);
    assert_eq!(view.gateway_status, PaymentStatus::Canceled);
}

#[tokio::test]
async fn gateway_lookup_failure_is_surfaced() {
    let h = Harness::new().await;
    paid_reservation(&h).await;
    h.gateway
        .push_lookup_reply(Err(GatewayError::Transient("connection reset".into())));

    let err = h
        .queries()
        .find_by_payment_key(&guest(), PAYMENT_KEY)
        .await
        .unwrap_err();

    assert!(matches!(err, BookingError::Gateway(GatewayError::Transient(_))), "{err:?}");
}

#[tokio::test]
async fn virtual_account_is_issued_and_logged_as_attempt() {
    let h = Harness::new().await;
    let reservation = h.book(date(12, 24), date(12, 26)).await;
    let uid = reservation.reservation_uid;

    let issued = h.virtual_accounts().issue(&guest(), uid, transfer()).await.unwrap();

    assert_eq!(issued.status, PaymentStatus::WaitingForDeposit);
    let account = issued.virtual_account.clone().unwrap();
    assert_eq!(account.bank_code, "20");
    assert_eq!(account.customer_name, "김게스트");

    let [request] = h.gateway.issue_requests().try_into().unwrap();
    assert_eq!(request.order_id, uid.to_string());
    assert_eq!(request.amount, reservation.total_price);
    assert_eq!(request.valid_hours, VIRTUAL_ACCOUNT_VALID_HOURS);

    let attempts = h.store.payment_attempts().await;
    assert_eq!(attempts.len(), 1);
    assert_eq!(attempts[0].method, PaymentMethod::VirtualAccount);
    assert_eq!(attempts[0].status, PaymentStatus::WaitingForDeposit);
    assert_eq!(attempts[0].payment_key, issued.payment_key);
    assert_eq!(attempts[0].virtual_account, Some(account));

    assert!(h.store.payment(uid).await.is_none(), "no payment before the deposit");
    assert_eq!(
        h.store.reservation(uid).await.unwrap().status,
        ReservationStatus::PaymentPending
    );
}

#[tokio::test]
async fn virtual_account_needs_the_owner_and_a_pending_reservation() {
    let h = Harness::new().await;
    let pending = h.book(date(12, 20), date(12, 21)).await;
    let confirmed = paid_reservation(&h).await;
    let service = h.virtual_accounts();

    let denied = service
        .issue(&other_guest(), pending.reservation_uid, transfer())
        .await
        .unwrap_err();
    assert!(matches!(denied, BookingError::AccessDenied(_)), "{denied:?}");

    let settled = service
        .issue(&guest(), confirmed.reservation_uid, transfer())
        .await
        .unwrap_err();
    assert!(
        matches!(
            settled,
            BookingError::InvalidStatusTransition {
                from: ReservationStatus::Confirmed,
                ..
            }
        ),
        "{settled:?}"
    );

    assert!(h.gateway.issue_requests().is_empty());
}

#[tokio::test]
async fn rejected_issuance_records_nothing() {
    let h = Harness::new().await;
    let reservation = h.book(date(12, 24), date(12, 26)).await;
    h.gateway.push_issue_reply(Err(GatewayError::Rejected {
        code: "INVALID_BANK".into(),
        message: "unknown bank".into(),
    }));

    let err = h
        .virtual_accounts()
        .issue(&guest(), reservation.reservation_uid, transfer())
        .await
        .unwrap_err();

    assert!(matches!(err, BookingError::Gateway(GatewayError::Rejected { ref code, .. }) if code == "INVALID_BANK"));
    assert!(h.store.payment_attempts().await.is_empty());
}
