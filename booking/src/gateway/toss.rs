//! Toss Payments REST adapter.
//!
//! # Failure handling
//!
//! | Gateway answer | Result |
//! |----------------|--------|
//! | 2xx | [`GatewayPayment`] |
//! | network error, timeout, 5xx | retried by the [`RetryPolicy`], then [`GatewayError::Transient`] |
//! | 4xx | [`GatewayError::Rejected`] with the vendor code mapped to the call's code table, never retried |
//! | undecodable body | [`GatewayError::InvalidResponse`] |
//!
//! Payment keys and order ids travel in URL paths. Values outside
//! `[A-Za-z0-9_-]` are rejected with `INVALID_REQUEST` before any request is
//! sent.

use super::codes::{CancelErrorCode, ConfirmErrorCode, InquiryErrorCode, VirtualAccountIssueErrorCode};
use super::{ConfirmRequest, GatewayError, GatewayPayment, PaymentGateway, VirtualAccountRequest};
use crate::config::GatewayConfig;
use async_trait::async_trait;
use homestay_runtime::retry::{RetryPolicy, retry_with_predicate};
use reqwest::{Client, Method};
use serde_json::{Value, json};
use std::time::Duration;

const CONFIRM_PATH: &str = "/v1/payments/confirm";
const VIRTUAL_ACCOUNTS_PATH: &str = "/v1/virtual-accounts";
const UNKNOWN_ERROR: &str = "UNKNOWN_ERROR";
const INVALID_REQUEST: &str = "INVALID_REQUEST";

#[derive(Clone, Copy, Debug)]
enum Call {
    Confirm,
    Cancel,
    Inquiry,
    VirtualAccount,
}

impl Call {
    const fn name(self) -> &'static str {
        match self {
            Self::Confirm => "confirm",
            Self::Cancel => "cancel",
            Self::Inquiry => "inquiry",
            Self::VirtualAccount => "virtual_account",
        }
    }

    fn map_code(self, raw: &str) -> String {
        match self {
            Self::Confirm => ConfirmErrorCode::from_code(raw).as_str(),
            Self::Cancel => CancelErrorCode::from_code(raw).as_str(),
            Self::Inquiry => InquiryErrorCode::from_code(raw).as_str(),
            Self::VirtualAccount => VirtualAccountIssueErrorCode::from_code(raw).as_str(),
        }
        .to_string()
    }
}

/// HTTP client for the Toss Payments API.
///
/// # Example
///
/// ```no_run
/// use homestay_booking::gateway::{ConfirmRequest, PaymentGateway, TossPaymentsClient};
/// use std::time::Duration;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let toss = TossPaymentsClient::new("https://api.tosspayments.com", "test_sk_xxx", Duration::from_secs(10))?;
/// let payment = toss
///     .confirm(&ConfirmRequest {
///         payment_key: "pk_123".into(),
///         order_id: "7d1c5e1a-0000-0000-0000-000000000000".into(),
///         amount: 200_000,
///     })
///     .await?;
/// println!("{:?}", payment.status);
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct TossPaymentsClient {
    client: Client,
    base_url: String,
    secret_key: String,
    retry_policy: RetryPolicy,
}

impl TossPaymentsClient {
    /// Create a client with the default retry policy (3 attempts, 2 s apart).
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::InvalidResponse`] if the HTTP client cannot be built.
    pub fn new(
        base_url: impl Into<String>,
        secret_key: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, GatewayError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| GatewayError::InvalidResponse(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            secret_key: secret_key.into(),
            retry_policy: RetryPolicy::fixed(3, Duration::from_secs(2)),
        })
    }

    /// Create a client from configuration.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::InvalidResponse`] if the HTTP client cannot be built.
    pub fn from_config(config: &GatewayConfig) -> Result<Self, GatewayError> {
        Ok(Self::new(&config.base_url, &config.secret_key, config.timeout())?
            .with_retry_policy(config.retry_policy()))
    }

    /// Replace the retry policy for transient failures.
    #[must_use]
    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry_policy = policy;
        self
    }

    async fn call(
        &self,
        call: Call,
        method: Method,
        path: &str,
        body: Option<&Value>,
    ) -> Result<GatewayPayment, GatewayError> {
        let outcome = retry_with_predicate(
            &self.retry_policy,
            || self.send_once(call, method.clone(), path, body),
            GatewayError::is_transient,
        )
        .await;

        let label = match &outcome {
            Ok(_) => "ok",
            Err(GatewayError::Rejected { .. }) => "rejected",
            Err(GatewayError::Transient(_)) => "transient",
            Err(GatewayError::InvalidResponse(_)) => "invalid",
        };
        metrics::counter!("gateway.calls", "call" => call.name(), "outcome" => label).increment(1);

        outcome
    }

    async fn send_once(
        &self,
        call: Call,
        method: Method,
        path: &str,
        body: Option<&Value>,
    ) -> Result<GatewayPayment, GatewayError> {
        let mut request = self
            .client
            .request(method, format!("{}{path}", self.base_url))
            .basic_auth(&self.secret_key, Some(""));
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request
            .send()
            .await
            .map_err(|e| GatewayError::Transient(format!("request failed: {e}")))?;

        let status = response.status();
        if status.is_server_error() {
            return Err(GatewayError::Transient(format!("gateway answered {status}")));
        }
        if status.is_client_error() {
            let text = response.text().await.unwrap_or_default();
            return Err(rejection(call, &text));
        }

        response
            .json::<GatewayPayment>()
            .await
            .map_err(|e| GatewayError::InvalidResponse(e.to_string()))
    }
}

/// `value` as one URL path segment.
fn path_segment(call: Call, value: &str) -> Result<&str, GatewayError> {
    if !value.is_empty() && value.bytes().all(|b| b.is_ascii_alphanumeric() || b == b'_' || b == b'-') {
        return Ok(value);
    }
    tracing::warn!(call = call.name(), value = %value, "Refusing to put malformed identifier in a gateway path");
    metrics::counter!("gateway.calls", "call" => call.name(), "outcome" => "rejected").increment(1);
    Err(GatewayError::Rejected {
        code: call.map_code(INVALID_REQUEST),
        message: format!("{value:?} is not a valid gateway identifier"),
    })
}

fn rejection(call: Call, body: &str) -> GatewayError {
    let Ok(value) = serde_json::from_str::<Value>(body) else {
        tracing::error!(call = call.name(), body = %body, "Failed to parse gateway error body");
        return GatewayError::InvalidResponse(format!("unparseable error body: {body}"));
    };

    let field = |name: &str| {
        value
            .get(name)
            .or_else(|| value.get("failure").and_then(|f| f.get(name)))
            .and_then(Value::as_str)
            .map(ToString::to_string)
    };
    let raw_code = field("code").unwrap_or_else(|| UNKNOWN_ERROR.to_string());
    let message = field("message").unwrap_or_default();

    tracing::warn!(call = call.name(), code = %raw_code, message = %message, "Gateway rejected the call");
    GatewayError::Rejected {
        code: call.map_code(&raw_code),
        message,
    }
}

#[async_trait]
impl PaymentGateway for TossPaymentsClient {
    async fn confirm(&self, request: &ConfirmRequest) -> Result<GatewayPayment, GatewayError> {
        let body = json!({
            "paymentKey": request.payment_key,
            "orderId": request.order_id,
            "amount": request.amount,
        });
        self.call(Call::Confirm, Method::POST, CONFIRM_PATH, Some(&body)).await
    }

    async fn cancel(
        &self,
        payment_key: &str,
        reason: &str,
        amount: Option<i64>,
    ) -> Result<GatewayPayment, GatewayError> {
        let mut body = json!({ "cancelReason": reason });
        if let (Some(amount), Some(map)) = (amount, body.as_object_mut()) {
            map.insert("cancelAmount".to_string(), json!(amount));
        }
        let path = format!("/v1/payments/{}/cancel", path_segment(Call::Cancel, payment_key)?);
        self.call(Call::Cancel, Method::POST, &path, Some(&body)).await
    }

    async fn find_by_payment_key(&self, payment_key: &str) -> Result<GatewayPayment, GatewayError> {
        let path = format!("/v1/payments/{}", path_segment(Call::Inquiry, payment_key)?);
        self.call(Call::Inquiry, Method::GET, &path, None).await
    }

    async fn find_by_order_id(&self, order_id: &str) -> Result<GatewayPayment, GatewayError> {
        let path = format!("/v1/payments/orders/{}", path_segment(Call::Inquiry, order_id)?);
        self.call(Call::Inquiry, Method::GET, &path, None).await
    }

    async fn issue_virtual_account(&self, request: &VirtualAccountRequest) -> Result<GatewayPayment, GatewayError> {
        let body = serde_json::to_value(request)
            .map_err(|e| GatewayError::InvalidResponse(format!("failed to encode request: {e}")))?;
        self.call(Call::VirtualAccount, Method::POST, VIRTUAL_ACCOUNTS_PATH, Some(&body))
            .await
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;

    #[test]
    fn rejection_reads_top_level_code() {
        let err = rejection(
            Call::Confirm,
            r#"{"code":"REJECT_CARD_PAYMENT","message":"한도초과 혹은 잔액부족으로 결제에 실패했습니다."}"#,
        );
        assert!(matches!(err, GatewayError::Rejected { ref code, .. } if code == "REJECT_CARD_PAYMENT"));
    }

    #[test]
    fn rejection_reads_nested_failure_code() {
        let err = rejection(
            Call::Cancel,
            r#"{"failure":{"code":"ALREADY_CANCELED_PAYMENT","message":"already canceled"}}"#,
        );
        assert_eq!(err.code(), "ALREADY_CANCELED_PAYMENT");
        assert_eq!(err.message(), "already canceled");
    }

    #[test]
    fn unknown_code_maps_to_call_specific_mismatch() {
        let err = rejection(Call::Inquiry, r#"{"message":"?"}"#);
        assert_eq!(err.code(), "PAYMENT_INQUIRY_ERROR_MISMATCH_ERROR");
    }

    #[test]
    fn path_segment_accepts_gateway_identifiers() {
        for value in ["tgen_20251224_a1b2c3", "7d1c5e1a-0000-4000-8000-000000000000"] {
            assert_eq!(path_segment(Call::Inquiry, value).unwrap(), value);
        }
    }

    #[test]
    fn path_segment_rejects_traversal_and_query() {
        for value in ["", "../confirm", "pk/cancel", "pk?x=1", "pk#f", "pk%2F", "키"] {
            let err = path_segment(Call::Cancel, value).unwrap_err();
            assert_eq!(err.code(), "INVALID_REQUEST", "{value:?}");
            assert!(!err.is_transient());
        }
    }

    #[test]
    fn virtual_account_rejection_uses_issue_codes() {
        let err = rejection(Call::VirtualAccount, r#"{"code":"INVALID_BANK","message":"bad bank"}"#);
        assert_eq!(err.code(), "INVALID_BANK");
        let unknown = rejection(Call::VirtualAccount, r#"{"code":"WHO_KNOWS","message":"?"}"#);
        assert_eq!(unknown.code(), "VIRTUAL_ACCOUNT_ISSUE_ERROR_CODE");
    }

    #[test]
    fn garbage_error_body_is_invalid_response() {
        assert!(matches!(
            rejection(Call::Confirm, "<html>"),
            GatewayError::InvalidResponse(_)
        ));
    }
}
