//! The only component that talks to the payment gateway on the saga's behalf.
//!
//! Gateway calls happen outside any unit of work. The outcome, success or
//! failure, is written back as a `PG_*` event so that recording it is a
//! separate, retryable step.

use super::{decode, emit};
use crate::error::{BookingError, Result};
use crate::events::{CancellationPayload, DomainEvent, PgCallFailedPayload, PgCallSucceededPayload, PgCancelCallFailedPayload};
use crate::gateway::{ConfirmRequest, GatewayError, PaymentGateway};
use crate::ids::ReservationUid;
use crate::notifier::Notifier;
use crate::store::{BookingStore, finish};
use async_trait::async_trait;
use homestay_core::environment::Clock;
use homestay_core::event_bus::BusMessage;
use homestay_runtime::{HandlerError, MessageHandler};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Error code reported when a cancellation names a reservation without a payment.
pub const PAYMENT_NOT_FOUND: &str = "PAYMENT_NOT_FOUND";

/// Calls the gateway for `PAYMENT_CONFIRM_REQUESTED` and
/// `PAYMENT_CANCELLATION_REQUESTED`.
pub struct PaymentGatewayWorker {
    store: Arc<dyn BookingStore>,
    gateway: Arc<dyn PaymentGateway>,
    notifier: Arc<dyn Notifier>,
    clock: Arc<dyn Clock>,
}

impl PaymentGatewayWorker {
    /// Worker calling `gateway`.
    #[must_use]
    pub fn new(
        store: Arc<dyn BookingStore>,
        gateway: Arc<dyn PaymentGateway>,
        notifier: Arc<dyn Notifier>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            store,
            gateway,
            notifier,
            clock,
        }
    }

    async fn process(&self, message: &BusMessage) -> Result<()> {
        match decode(message)? {
            DomainEvent::PaymentConfirmRequested(request) => self.confirm(request).await,
            DomainEvent::PaymentCancellationRequested(request) => self.cancel(request).await,
            DomainEvent::Unknown(name) => {
                warn!(event_type = %name, "Unknown event type, ignoring");
                Ok(())
            }
            other => {
                debug!(event_type = %other.event_type(), "Not handled by the gateway worker");
                Ok(())
            }
        }
    }

    async fn confirm(&self, request: ConfirmRequest) -> Result<()> {
        let uid: ReservationUid = request
            .order_id
            .parse()
            .map_err(|_| BookingError::MalformedEvent(format!("order id {} is not a reservation uid", request.order_id)))?;

        if self.payment_recorded(uid).await? {
            info!(reservation_uid = %uid, "Payment already recorded, skipping confirm call");
            return Ok(());
        }

        let event = match self.gateway.confirm(&request).await {
            Ok(response) => {
                info!(reservation_uid = %uid, status = %response.status, "Payment confirm call returned");
                DomainEvent::PgCallSucceeded(PgCallSucceededPayload {
                    response,
                    reservation_uid: uid,
                })
            }
            Err(e) => {
                self.report_failure(uid, "confirm", &e).await;
                DomainEvent::PgCallFailed(PgCallFailedPayload {
                    request,
                    reservation_uid: uid,
                    error_code: e.code().to_string(),
                    error_message: e.message(),
                })
            }
        };
        emit(self.store.as_ref(), &event, self.clock.now()).await
    }

    async fn cancel(&self, request: CancellationPayload) -> Result<()> {
        let uid = request.reservation_uid;
        let mut uow = self.store.begin().await?;
        let found = uow.find_payment_by_reservation_uid(uid).await;
        let payment = finish(uow, found).await?;

        let event = match payment {
            None => {
                error!(reservation_uid = %uid, "Cancellation requested for a reservation without payment");
                DomainEvent::PgCancelCallFailed(PgCancelCallFailedPayload {
                    request,
                    reservation_uid: uid,
                    error_code: PAYMENT_NOT_FOUND.to_string(),
                    error_message: format!("no payment recorded for reservation {uid}"),
                })
            }
            Some(payment) if payment.is_canceled() => {
                info!(reservation_uid = %uid, status = %payment.status, "Payment already canceled, skipping cancel call");
                return Ok(());
            }
            Some(payment) => match self
                .gateway
                .cancel(&payment.payment_key, &request.cancel_reason, request.cancel_amount)
                .await
            {
                Ok(response) => {
                    info!(reservation_uid = %uid, status = %response.status, "Payment cancel call returned");
                    DomainEvent::PgCancelCallSucceeded(PgCallSucceededPayload {
                        response,
                        reservation_uid: uid,
                    })
                }
                Err(e) => {
                    self.report_failure(uid, "cancel", &e).await;
                    DomainEvent::PgCancelCallFailed(PgCancelCallFailedPayload {
                        request,
                        reservation_uid: uid,
                        error_code: e.code().to_string(),
                        error_message: e.message(),
                    })
                }
            },
        };
        emit(self.store.as_ref(), &event, self.clock.now()).await
    }

    async fn payment_recorded(&self, uid: ReservationUid) -> Result<bool> {
        let mut uow = self.store.begin().await?;
        let found = uow.find_payment_by_reservation_uid(uid).await;
        Ok(finish(uow, found).await?.is_some())
    }

    /// A rejection is an answer. Anything else leaves the money state unknown.
    async fn report_failure(&self, uid: ReservationUid, call: &str, err: &GatewayError) {
        if let GatewayError::Rejected { code, message } = err {
            warn!(reservation_uid = %uid, call, code = %code, message = %message, "Gateway rejected the call");
            return;
        }
        error!(reservation_uid = %uid, call, error = %err, "Gateway outcome unknown");
        let alert = format!(
            "[CRITICAL] payment gateway {call} outcome unknown, check the payment manually. reservation_uid={uid}, error={err}"
        );
        self.notifier.send_alert(&alert).await;
    }
}

#[async_trait]
impl MessageHandler for PaymentGatewayWorker {
    async fn handle(&self, message: &BusMessage) -> std::result::Result<(), HandlerError> {
        Ok(self.process(message).await?)
    }
}
