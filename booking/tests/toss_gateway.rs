//! Toss Payments client against a mock HTTP server.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

use homestay_booking::gateway::{
    ConfirmRequest, GatewayError, PaymentGateway, TossPaymentsClient, VirtualAccountRequest,
};
use homestay_booking::payment::PaymentStatus;
use homestay_runtime::RetryPolicy;
use serde_json::json;
use std::time::Duration;
use wiremock::matchers::{body_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const SECRET: &str = "test_sk_homestay";
/// `Basic base64("test_sk_homestay:")`
const AUTHORIZATION: &str = "Basic dGVzdF9za19ob21lc3RheTo=";
const PAYMENT_KEY: &str = "tgen_20251224_a1b2c3";
const ORDER_ID: &str = "0b6f6c2e-7c1d-4e53-9d1e-3f1c2a4b5d6e";

fn client(server: &MockServer) -> TossPaymentsClient {
    TossPaymentsClient::new(server.uri(), SECRET, Duration::from_secs(2))
        .unwrap()
        .with_retry_policy(RetryPolicy::fixed(3, Duration::from_millis(10)))
}

fn confirm_request() -> ConfirmRequest {
    ConfirmRequest {
        payment_key: PAYMENT_KEY.into(),
        order_id: ORDER_ID.into(),
        amount: 200_000,
    }
}

fn done_payment() -> serde_json::Value {
    json!({
        "paymentKey": PAYMENT_KEY,
        "orderId": ORDER_ID,
        "totalAmount": 200_000,
        "balanceAmount": 200_000,
        "method": "카드",
        "status": "DONE",
        "requestedAt": "2025-01-01T09:00:00+09:00",
        "approvedAt": "2025-01-01T09:00:05+09:00"
    })
}

#[tokio::test]
async fn confirm_posts_credentials_and_parses_the_payment() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/payments/confirm"))
        .and(header("authorization", AUTHORIZATION))
        .and(body_json(json!({
            "paymentKey": PAYMENT_KEY,
            "orderId": ORDER_ID,
            "amount": 200_000
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(done_payment()))
        .expect(1)
        .mount(&server)
        .await;

    let payment = client(&server).confirm(&confirm_request()).await.unwrap();

    assert_eq!(payment.payment_key, PAYMENT_KEY);
    assert_eq!(payment.order_id, ORDER_ID);
    assert_eq!(payment.total_amount, 200_000);
    assert_eq!(payment.status, PaymentStatus::Done);
    assert_eq!(payment.method.as_deref(), Some("카드"));
    assert!(payment.approved_at.is_some());
    assert!(payment.cancels.is_empty());
}

#[tokio::test]
async fn server_errors_are_retried_until_the_gateway_answers() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/payments/confirm"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(2)
        .expect(2)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/v1/payments/confirm"))
        .respond_with(ResponseTemplate::new(200).set_body_json(done_payment()))
        .expect(1)
        .mount(&server)
        .await;

    let payment = client(&server).confirm(&confirm_request()).await.unwrap();
    assert_eq!(payment.status, PaymentStatus::Done);
}

#[tokio::test]
async fn exhausted_retries_surface_as_transient() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(format!("/v1/payments/{PAYMENT_KEY}")))
        .respond_with(ResponseTemplate::new(500))
        .expect(3)
        .mount(&server)
        .await;

    let err = client(&server).find_by_payment_key(PAYMENT_KEY).await.unwrap_err();
    assert!(err.is_transient(), "{err:?}");
    assert_eq!(err.code(), "UNKNOWN_WORKER_ERROR");
}

#[tokio::test]
async fn client_errors_are_mapped_and_not_retried() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/payments/confirm"))
        .respond_with(ResponseTemplate::new(403).set_body_json(json!({
            "code": "REJECT_CARD_PAYMENT",
            "message": "한도초과 혹은 잔액부족으로 결제에 실패했습니다."
        })))
        .expect(1)
        .mount(&server)
        .await;

    let err = client(&server).confirm(&confirm_request()).await.unwrap_err();
    let GatewayError::Rejected { code, message } = &err else {
        panic!("expected a rejection, got {err:?}");
    };
    assert_eq!(code, "REJECT_CARD_PAYMENT");
    assert!(message.contains("잔액부족"));
}

#[tokio::test]
async fn unrecognised_vendor_code_falls_back_to_the_call_mismatch_code() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(format!("/v1/payments/orders/{ORDER_ID}")))
        .respond_with(ResponseTemplate::new(404).set_body_json(json!({
            "code": "SOMETHING_NEW",
            "message": "new failure"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let err = client(&server).find_by_order_id(ORDER_ID).await.unwrap_err();
    assert_eq!(err.code(), "PAYMENT_INQUIRY_ERROR_MISMATCH_ERROR");
    assert_eq!(err.message(), "new failure");
}

#[tokio::test]
async fn full_cancel_omits_the_amount() {
    let server = MockServer::start().await;
    let mut canceled = done_payment();
    canceled["status"] = json!("CANCELED");
    canceled["balanceAmount"] = json!(0);
    canceled["cancels"] = json!([{
        "cancelAmount": 200_000,
        "cancelReason": "change of plans",
        "transactionKey": "tx-1",
        "canceledAt": "2025-01-02T10:00:00+09:00"
    }]);

    Mock::given(method("POST"))
        .and(path(format!("/v1/payments/{PAYMENT_KEY}/cancel")))
        .and(body_json(json!({ "cancelReason": "change of plans" })))
        .respond_with(ResponseTemplate::new(200).set_body_json(canceled))
        .expect(1)
        .mount(&server)
        .await;

    let payment = client(&server)
        .cancel(PAYMENT_KEY, "change of plans", None)
        .await
        .unwrap();

    assert_eq!(payment.status, PaymentStatus::Canceled);
    assert_eq!(payment.balance_amount, 0);
    assert_eq!(payment.cancels.len(), 1);
    assert_eq!(payment.cancels[0].transaction_key, "tx-1");
}

#[tokio::test]
async fn partial_cancel_sends_the_amount() {
    let server = MockServer::start().await;
    let mut partial = done_payment();
    partial["status"] = json!("PARTIAL_CANCELED");
    partial["balanceAmount"] = json!(150_000);

    Mock::given(method("POST"))
        .and(path(format!("/v1/payments/{PAYMENT_KEY}/cancel")))
        .and(body_json(json!({ "cancelReason": "one night less", "cancelAmount": 50_000 })))
        .respond_with(ResponseTemplate::new(200).set_body_json(partial))
        .expect(1)
        .mount(&server)
        .await;

    let payment = client(&server)
        .cancel(PAYMENT_KEY, "one night less", Some(50_000))
        .await
        .unwrap();
    assert_eq!(payment.status, PaymentStatus::PartialCanceled);
    assert_eq!(payment.balance_amount, 150_000);
}

#[tokio::test]
async fn undecodable_success_body_is_an_invalid_response() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(format!("/v1/payments/{PAYMENT_KEY}")))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>maintenance</html>"))
        .expect(1)
        .mount(&server)
        .await;

    let err = client(&server).find_by_payment_key(PAYMENT_KEY).await.unwrap_err();
    assert!(matches!(err, GatewayError::InvalidResponse(_)));
}

#[tokio::test]
async fn malformed_payment_key_never_reaches_the_gateway() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(done_payment()))
        .expect(0)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_json(done_payment()))
        .expect(0)
        .mount(&server)
        .await;
    let toss = client(&server);

    let err = toss
        .cancel("../confirm", "change of plans", None)
        .await
        .unwrap_err();
    assert!(matches!(err, GatewayError::Rejected { ref code, .. } if code == "INVALID_REQUEST"));

    assert!(toss.find_by_payment_key("pk?status=DONE").await.is_err());
    assert!(toss.find_by_order_id("orders/../x").await.is_err());
}

#[tokio::test]
async fn virtual_account_issuance_posts_the_order_and_parses_the_account() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/virtual-accounts"))
        .and(header("authorization", AUTHORIZATION))
        .and(body_json(json!({
            "orderId": ORDER_ID,
            "amount": 200_000,
            "bank": "20",
            "customerName": "김게스트",
            "validHours": 24
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "paymentKey": "va_key_1",
            "orderId": ORDER_ID,
            "totalAmount": 200_000,
            "balanceAmount": 200_000,
            "method": "가상계좌",
            "status": "WAITING_FOR_DEPOSIT",
            "requestedAt": "2025-01-01T09:00:00+09:00",
            "virtualAccount": {
                "accountNumber": "X6516657813",
                "bankCode": "20",
                "customerName": "김게스트",
                "dueDate": "2025-01-02T09:00:00+09:00"
            }
        })))
        .expect(1)
        .mount(&server)
        .await;

    let request = VirtualAccountRequest {
        order_id: ORDER_ID.into(),
        amount: 200_000,
        bank: "20".into(),
        customer_name: "김게스트".into(),
        valid_hours: 24,
    };
    let payment = client(&server).issue_virtual_account(&request).await.unwrap();

    assert_eq!(payment.status, PaymentStatus::WaitingForDeposit);
    assert!(payment.approved_at.is_none());
    let account = payment.virtual_account.unwrap();
    assert_eq!(account.account_number, "X6516657813");
    assert_eq!(account.bank_code, "20");
}

#[tokio::test]
async fn virtual_account_rejection_maps_to_issue_codes() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/virtual-accounts"))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({
            "code": "INVALID_BANK",
            "message": "유효하지 않은 은행입니다."
        })))
        .expect(1)
        .mount(&server)
        .await;

    let request = VirtualAccountRequest {
        order_id: ORDER_ID.into(),
        amount: 200_000,
        bank: "99".into(),
        customer_name: "김게스트".into(),
        valid_hours: 24,
    };
    let err = client(&server).issue_virtual_account(&request).await.unwrap_err();

    assert_eq!(err.code(), "INVALID_BANK");
    assert!(!err.is_transient());
}
