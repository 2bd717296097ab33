use crate::gateway::{
    CancelErrorCode, ConfirmRequest, GatewayCancel, GatewayError, GatewayPayment, InquiryErrorCode, PaymentGateway,
    VirtualAccount, VirtualAccountRequest,
};
use crate::payment::PaymentStatus;
use async_trait::async_trait;
use chrono::Utc;
use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

type Reply = Result<GatewayPayment, GatewayError>;

#[derive(Default)]
struct Ledger {
    payments: HashMap<String, GatewayPayment>,
    confirm_replies: VecDeque<Reply>,
    cancel_replies: VecDeque<Reply>,
    issue_replies: VecDeque<Reply>,
    lookup_replies: VecDeque<Reply>,
    issue_requests: Vec<VirtualAccountRequest>,
    confirm_calls: usize,
    cancel_calls: usize,
    lookup_calls: usize,
    cancel_delay: Option<Duration>,
}

/// Gateway stand-in.
///
/// Unless a reply is scripted, `confirm` approves the requested amount with
/// card, `cancel` refunds the remaining balance of a known payment and
/// `issue_virtual_account` opens an account waiting for the deposit. Every
/// payment it answered with stays known for lookups.
#[derive(Default)]
pub struct MockPaymentGateway {
    ledger: Mutex<Ledger>,
}

impl MockPaymentGateway {
    /// Gateway that approves everything.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A `DONE` card payment.
    #[must_use]
    pub fn approved(payment_key: &str, order_id: &str, amount: i64) -> GatewayPayment {
        let now = Utc::now();
        GatewayPayment {
            payment_key: payment_key.to_string(),
            order_id: order_id.to_string(),
            total_amount: amount,
            method: Some("카드".to_string()),
            status: PaymentStatus::Done,
            requested_at: Some(now),
            approved_at: Some(now),
            balance_amount: amount,
            cancels: Vec::new(),
            failure: None,
            virtual_account: None,
        }
    }

    /// Make `payment` known to the gateway, e.g. a payment the booking side
    /// never heard of.
    pub fn register(&self, payment: GatewayPayment) {
        self.with(|ledger| {
            ledger.payments.insert(payment.payment_key.clone(), payment);
        });
    }

    /// Answer the next confirm call with `reply`.
    pub fn push_confirm_reply(&self, reply: Reply) {
        self.with(|ledger| ledger.confirm_replies.push_back(reply));
    }

    /// Answer the next cancel call with `reply`.
    pub fn push_cancel_reply(&self, reply: Reply) {
        self.with(|ledger| ledger.cancel_replies.push_back(reply));
    }

    /// Answer the next lookup, by key or by order id, with `reply`.
    pub fn push_lookup_reply(&self, reply: Reply) {
        self.with(|ledger| ledger.lookup_replies.push_back(reply));
    }

    /// Answer the next virtual-account issuance with `reply`.
    pub fn push_issue_reply(&self, reply: Reply) {
        self.with(|ledger| ledger.issue_replies.push_back(reply));
    }

    /// Virtual-account issuance requests received, oldest first.
    #[must_use]
    pub fn issue_requests(&self) -> Vec<VirtualAccountRequest> {
        self.with(|ledger| ledger.issue_requests.clone())
    }

    /// Hold every following cancel call for `delay` before answering, as a
    /// slow gateway would.
    pub fn delay_cancels(&self, delay: Duration) {
        self.with(|ledger| ledger.cancel_delay = Some(delay));
    }

    /// Confirm calls received.
    #[must_use]
    pub fn confirm_calls(&self) -> usize {
        self.with(|ledger| ledger.confirm_calls)
    }

    /// Cancel calls received.
    #[must_use]
    pub fn cancel_calls(&self) -> usize {
        self.with(|ledger| ledger.cancel_calls)
    }

    /// Lookup calls received.
    #[must_use]
    pub fn lookup_calls(&self) -> usize {
        self.with(|ledger| ledger.lookup_calls)
    }

    /// The gateway's current view of a payment.
    #[must_use]
    pub fn payment(&self, payment_key: &str) -> Option<GatewayPayment> {
        self.with(|ledger| ledger.payments.get(payment_key).cloned())
    }

    fn with<T>(&self, f: impl FnOnce(&mut Ledger) -> T) -> T {
        f(&mut self.ledger.lock().unwrap_or_else(PoisonError::into_inner))
    }
}

fn not_found(code: &str, payment_key: &str) -> GatewayError {
    GatewayError::Rejected {
        code: code.to_string(),
        message: format!("payment {payment_key} does not exist"),
    }
}

#[async_trait]
impl PaymentGateway for MockPaymentGateway {
    async fn confirm(&self, request: &ConfirmRequest) -> Reply {
        self.with(|ledger| {
            ledger.confirm_calls += 1;
            let reply = ledger.confirm_replies.pop_front().unwrap_or_else(|| {
                Ok(Self::approved(&request.payment_key, &request.order_id, request.amount))
            });
            if let Ok(payment) = &reply {
                ledger.payments.insert(payment.payment_key.clone(), payment.clone());
            }
            reply
        })
    }

    async fn cancel(&self, payment_key: &str, reason: &str, amount: Option<i64>) -> Reply {
        let delay = self.with(|ledger| {
            ledger.cancel_calls += 1;
            ledger.cancel_delay
        });
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        self.with(|ledger| {
            if let Some(reply) = ledger.cancel_replies.pop_front() {
                return reply;
            }
            let transaction = ledger.cancel_calls;
            let Some(payment) = ledger.payments.get_mut(payment_key) else {
                return Err(not_found(CancelErrorCode::NotFoundPayment.as_str(), payment_key));
            };
            let refund = amount.unwrap_or(payment.balance_amount).min(payment.balance_amount);
            payment.balance_amount -= refund;
            payment.status = if payment.balance_amount == 0 {
                PaymentStatus::Canceled
            } else {
                PaymentStatus::PartialCanceled
            };
            payment.cancels.push(GatewayCancel {
                cancel_amount: refund,
                cancel_reason: Some(reason.to_string()),
                transaction_key: format!("tx-{payment_key}-{transaction}"),
                canceled_at: Utc::now(),
            });
            Ok(payment.clone())
        })
    }

    async fn find_by_payment_key(&self, payment_key: &str) -> Reply {
        self.with(|ledger| {
            ledger.lookup_calls += 1;
            if let Some(reply) = ledger.lookup_replies.pop_front() {
                return reply;
            }
            ledger
                .payments
                .get(payment_key)
                .cloned()
                .ok_or_else(|| not_found(InquiryErrorCode::NotFoundPayment.as_str(), payment_key))
        })
    }

    async fn find_by_order_id(&self, order_id: &str) -> Reply {
        self.with(|ledger| {
            ledger.lookup_calls += 1;
            if let Some(reply) = ledger.lookup_replies.pop_front() {
                return reply;
            }
            ledger
                .payments
                .values()
                .find(|p| p.order_id == order_id)
                .cloned()
                .ok_or_else(|| not_found(InquiryErrorCode::NotFoundPayment.as_str(), order_id))
        })
    }

    async fn issue_virtual_account(&self, request: &VirtualAccountRequest) -> Reply {
        self.with(|ledger| {
            ledger.issue_requests.push(request.clone());
            let reply = ledger.issue_replies.pop_front().unwrap_or_else(|| {
                let now = Utc::now();
                Ok(GatewayPayment {
                    payment_key: format!("va_{}", request.order_id),
                    order_id: request.order_id.clone(),
                    total_amount: request.amount,
                    method: Some("가상계좌".to_string()),
                    status: PaymentStatus::WaitingForDeposit,
                    requested_at: Some(now),
                    approved_at: None,
                    balance_amount: request.amount,
                    cancels: Vec::new(),
                    failure: None,
                    virtual_account: Some(VirtualAccount {
                        account_number: format!("X{:010}", ledger.issue_requests.len()),
                        bank_code: request.bank.clone(),
                        customer_name: request.customer_name.clone(),
                        due_date: now + chrono::Duration::hours(i64::from(request.valid_hours)),
                    }),
                })
            });
            if let Ok(payment) = &reply {
                ledger.payments.insert(payment.payment_key.clone(), payment.clone());
            }
            reply
        })
    }
}
