//! Saga event catalogue.
//!
//! [`EventType`] names every event the saga exchanges and decides the topic it
//! is routed to. [`DomainEvent`] is the typed view of an envelope: consumers
//! decode once at the boundary and match exhaustively, with an `Unknown` arm
//! for event types they do not know.

use crate::error::Result;
use crate::gateway::{ConfirmRequest, GatewayPayment};
use crate::ids::{AccommodationId, ReservationUid};
use chrono::{DateTime, NaiveDate, Utc};
use homestay_core::event::{EventEnvelope, EventError};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Topic carrying reservation-side events.
pub const RESERVATION_EVENTS_TOPIC: &str = "reservation-events";
/// Topic carrying payment-side events.
pub const PAYMENT_EVENTS_TOPIC: &str = "payment-events";

/// Aggregate an event belongs to, as written to the outbox.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum AggregateType {
    /// Reservation events.
    Reservation,
    /// Payment events.
    Payment,
}

impl AggregateType {
    /// Outbox column value.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Reservation => "RESERVATION",
            Self::Payment => "PAYMENT",
        }
    }

    /// Topic the router forwards this aggregate's events to.
    #[must_use]
    pub const fn topic(self) -> &'static str {
        match self {
            Self::Reservation => RESERVATION_EVENTS_TOPIC,
            Self::Payment => PAYMENT_EVENTS_TOPIC,
        }
    }
}

macro_rules! event_types {
    ($($variant:ident = $name:literal => $aggregate:ident,)+) => {
        /// Routing tag of an event.
        #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
        pub enum EventType {
            $(
                #[doc = $name]
                $variant,
            )+
            /// Not in the catalogue; never routed.
            Unknown,
        }

        impl EventType {
            /// Every known type.
            pub const ALL: &'static [Self] = &[$(Self::$variant,)+];

            /// Wire name.
            #[must_use]
            pub const fn name(self) -> &'static str {
                match self {
                    $(Self::$variant => $name,)+
                    Self::Unknown => "UNKNOWN",
                }
            }

            /// Owning aggregate; `None` for [`EventType::Unknown`].
            #[must_use]
            pub const fn aggregate_type(self) -> Option<AggregateType> {
                match self {
                    $(Self::$variant => Some(AggregateType::$aggregate),)+
                    Self::Unknown => None,
                }
            }
        }
    };
}

event_types! {
    ReservationPending = "RESERVATION_PENDING" => Reservation,
    ReservationConfirmRequested = "RESERVATION_CONFIRM_REQUESTED" => Reservation,
    ReservationConfirmed = "RESERVATION_CONFIRMED" => Reservation,
    ReservationExpireRequested = "RESERVATION_EXPIRE_REQUESTED" => Reservation,
    ReservationExpired = "RESERVATION_EXPIRED" => Reservation,
    ReservationCancelled = "RESERVATION_CANCELLED" => Reservation,
    ReservationCancellationRevertRequested = "RESERVATION_CANCELLATION_REVERT_REQUESTED" => Reservation,
    ReservationCancellationReverted = "RESERVATION_CANCELLATION_REVERTED" => Reservation,
    ReservationConfirmationFailed = "RESERVATION_CONFIRMATION_FAILED" => Reservation,
    PaymentConfirmRequested = "PAYMENT_CONFIRM_REQUESTED" => Payment,
    PaymentCompleted = "PAYMENT_COMPLETED" => Payment,
    PaymentSucceeded = "PAYMENT_SUCCEEDED" => Payment,
    PaymentFailed = "PAYMENT_FAILED" => Payment,
    PaymentCancellationRequested = "PAYMENT_CANCELLATION_REQUESTED" => Payment,
    PaymentCancellationFailed = "PAYMENT_CANCELLATION_FAILED" => Payment,
    PgCallSucceeded = "PG_CALL_SUCCEEDED" => Payment,
    PgCallFailed = "PG_CALL_FAILED" => Payment,
    PgCancelCallSucceeded = "PG_CANCEL_CALL_SUCCEEDED" => Payment,
    PgCancelCallFailed = "PG_CANCEL_CALL_FAILED" => Payment,
}

impl EventType {
    /// Case-insensitive lookup; anything unrecognised is [`EventType::Unknown`].
    #[must_use]
    pub fn from_name(name: &str) -> Self {
        Self::ALL
            .iter()
            .copied()
            .find(|t| t.name().eq_ignore_ascii_case(name.trim()))
            .unwrap_or(Self::Unknown)
    }

    /// Destination topic; `None` for [`EventType::Unknown`].
    #[must_use]
    pub fn topic(self) -> Option<&'static str> {
        self.aggregate_type().map(AggregateType::topic)
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// `RESERVATION_PENDING`: a reservation is waiting for payment.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReservationPendingPayload {
    /// Amount the guest must pay.
    pub amount: i64,
    /// Gateway payment key; unknown until checkout.
    #[serde(default)]
    pub payment_key: Option<String>,
    /// Order id, the reservation uid.
    pub order_id: ReservationUid,
}

/// Reservation identity plus the stay, for consumers that manage holds.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StayPayload {
    /// Reservation uid.
    pub reservation_uid: ReservationUid,
    /// Booked listing.
    pub accommodation_id: AccommodationId,
    /// Arrival date.
    pub check_in_date: NaiveDate,
    /// Departure date.
    pub check_out_date: NaiveDate,
}

/// Events that only name the reservation.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReservationRef {
    /// Reservation uid.
    pub reservation_uid: ReservationUid,
}

/// Events that name the reservation and explain why.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReasonPayload {
    /// Reservation uid.
    pub reservation_uid: ReservationUid,
    /// Human-readable reason.
    pub reason: String,
}

/// `RESERVATION_CANCELLED` and `PAYMENT_CANCELLATION_REQUESTED`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CancellationPayload {
    /// Reservation uid.
    pub reservation_uid: ReservationUid,
    /// Guest's reason.
    pub cancel_reason: String,
    /// Refund amount; `None` refunds everything.
    #[serde(default)]
    pub cancel_amount: Option<i64>,
}

/// `PG_CALL_SUCCEEDED` and `PG_CANCEL_CALL_SUCCEEDED`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PgCallSucceededPayload {
    /// Gateway response.
    pub response: GatewayPayment,
    /// Reservation uid.
    pub reservation_uid: ReservationUid,
}

/// `PG_CALL_FAILED`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PgCallFailedPayload {
    /// Original confirm request.
    pub request: ConfirmRequest,
    /// Reservation uid.
    pub reservation_uid: ReservationUid,
    /// Mapped vendor code, or `UNKNOWN_WORKER_ERROR`.
    pub error_code: String,
    /// Vendor or transport message.
    pub error_message: String,
}

/// `PG_CANCEL_CALL_FAILED`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PgCancelCallFailedPayload {
    /// Original cancellation request.
    pub request: CancellationPayload,
    /// Reservation uid.
    pub reservation_uid: ReservationUid,
    /// Mapped vendor code.
    pub error_code: String,
    /// Vendor or transport message.
    pub error_message: String,
}

/// A decoded saga event.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DomainEvent {
    /// A reservation is waiting for payment.
    ReservationPending(ReservationPendingPayload),
    /// Payment went through; confirm the reservation.
    ReservationConfirmRequested(ReservationRef),
    /// The reservation is confirmed.
    ReservationConfirmed(StayPayload),
    /// Payment failed; expire the reservation.
    ReservationExpireRequested(ReasonPayload),
    /// The reservation expired.
    ReservationExpired(StayPayload),
    /// The guest cancelled.
    ReservationCancelled(CancellationPayload),
    /// The refund failed; mark the cancellation as failed.
    ReservationCancellationRevertRequested(ReasonPayload),
    /// The cancellation was marked as failed.
    ReservationCancellationReverted(StayPayload),
    /// The reservation could not be confirmed after payment.
    ReservationConfirmationFailed(ReasonPayload),
    /// The guest asked to confirm a payment.
    PaymentConfirmRequested(ConfirmRequest),
    /// The payment is recorded.
    PaymentCompleted(ReservationRef),
    /// The payment succeeded (legacy name of `PAYMENT_COMPLETED`).
    PaymentSucceeded(ReservationRef),
    /// The payment failed.
    PaymentFailed(ReasonPayload),
    /// Refund the payment.
    PaymentCancellationRequested(CancellationPayload),
    /// The refund failed.
    PaymentCancellationFailed(ReasonPayload),
    /// The confirm call returned a payment.
    PgCallSucceeded(PgCallSucceededPayload),
    /// The confirm call failed.
    PgCallFailed(PgCallFailedPayload),
    /// The cancel call returned a payment.
    PgCancelCallSucceeded(PgCallSucceededPayload),
    /// The cancel call failed.
    PgCancelCallFailed(PgCancelCallFailedPayload),
    /// Event type outside the catalogue; carries the raw name.
    Unknown(String),
}

macro_rules! domain_event_codec {
    ($($variant:ident),+ $(,)?) => {
        impl DomainEvent {
            /// Routing tag of this event.
            #[must_use]
            pub const fn event_type(&self) -> EventType {
                match self {
                    $(Self::$variant(_) => EventType::$variant,)+
                    Self::Unknown(_) => EventType::Unknown,
                }
            }

            fn payload_value(&self) -> std::result::Result<Value, serde_json::Error> {
                match self {
                    $(Self::$variant(p) => serde_json::to_value(p),)+
                    Self::Unknown(_) => Ok(Value::Null),
                }
            }

            /// Decode an envelope. Unknown event types decode to
            /// [`DomainEvent::Unknown`]; a known type with the wrong payload is
            /// malformed.
            ///
            /// # Errors
            ///
            /// Returns [`EventError::Malformed`] when the payload does not
            /// match the event type.
            pub fn from_envelope(envelope: &EventEnvelope) -> std::result::Result<Self, EventError> {
                Ok(match EventType::from_name(&envelope.event_type) {
                    $(EventType::$variant => Self::$variant(envelope.decode_payload()?),)+
                    EventType::Unknown => Self::Unknown(envelope.event_type.clone()),
                })
            }
        }
    };
}

domain_event_codec!(
    ReservationPending,
    ReservationConfirmRequested,
    ReservationConfirmed,
    ReservationExpireRequested,
    ReservationExpired,
    ReservationCancelled,
    ReservationCancellationRevertRequested,
    ReservationCancellationReverted,
    ReservationConfirmationFailed,
    PaymentConfirmRequested,
    PaymentCompleted,
    PaymentSucceeded,
    PaymentFailed,
    PaymentCancellationRequested,
    PaymentCancellationFailed,
    PgCallSucceeded,
    PgCallFailed,
    PgCancelCallSucceeded,
    PgCancelCallFailed,
);

impl DomainEvent {
    /// Aggregate id: the reservation uid the event is about.
    #[must_use]
    pub fn aggregate_id(&self) -> String {
        match self {
            Self::ReservationPending(p) => p.order_id.to_string(),
            Self::ReservationConfirmed(p)
            | Self::ReservationExpired(p)
            | Self::ReservationCancellationReverted(p) => p.reservation_uid.to_string(),
            Self::ReservationConfirmRequested(p)
            | Self::PaymentCompleted(p)
            | Self::PaymentSucceeded(p) => p.reservation_uid.to_string(),
            Self::ReservationExpireRequested(p)
            | Self::ReservationCancellationRevertRequested(p)
            | Self::ReservationConfirmationFailed(p)
            | Self::PaymentFailed(p)
            | Self::PaymentCancellationFailed(p) => p.reservation_uid.to_string(),
            Self::ReservationCancelled(p) | Self::PaymentCancellationRequested(p) => {
                p.reservation_uid.to_string()
            }
            Self::PaymentConfirmRequested(p) => p.order_id.clone(),
            Self::PgCallSucceeded(p) | Self::PgCancelCallSucceeded(p) => p.reservation_uid.to_string(),
            Self::PgCallFailed(p) => p.reservation_uid.to_string(),
            Self::PgCancelCallFailed(p) => p.reservation_uid.to_string(),
            Self::Unknown(_) => String::new(),
        }
    }

    /// Wrap the event in an envelope traced by its aggregate id.
    ///
    /// # Errors
    ///
    /// Returns [`crate::error::BookingError::Serialization`] if the payload
    /// cannot be serialized.
    pub fn to_envelope(&self, timestamp: DateTime<Utc>) -> Result<EventEnvelope> {
        let payload = self.payload_value()?;
        Ok(EventEnvelope::new(
            self.event_type().name(),
            self.aggregate_id(),
            payload,
            timestamp,
        ))
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;
    use homestay_core::event::{encode_cdc_message, parse_cdc_message};

    #[test]
    fn lookup_is_case_insensitive_with_unknown_fallback() {
        assert_eq!(EventType::from_name("payment_completed"), EventType::PaymentCompleted);
        assert_eq!(EventType::from_name("PG_CALL_FAILED"), EventType::PgCallFailed);
        assert_eq!(EventType::from_name("SOMETHING_ELSE"), EventType::Unknown);
        assert_eq!(EventType::Unknown.topic(), None);
    }

    #[test]
    fn every_known_type_has_a_topic() {
        for t in EventType::ALL {
            let topic = t.topic().unwrap();
            if t.name().starts_with("RESERVATION_") {
                assert_eq!(topic, RESERVATION_EVENTS_TOPIC);
            } else {
                assert_eq!(topic, PAYMENT_EVENTS_TOPIC);
            }
        }
    }

    #[test]
    fn envelope_is_traced_by_reservation_uid_with_camel_case_payload() {
        let uid = ReservationUid::new_v4();
        let event = DomainEvent::PaymentFailed(ReasonPayload {
            reservation_uid: uid,
            reason: "card declined".into(),
        });

        let envelope = event.to_envelope(Utc::now()).unwrap();
        assert_eq!(envelope.event_type, "PAYMENT_FAILED");
        assert_eq!(envelope.trace_id, uid.to_string());
        assert!(envelope.payload.get("reservationUid").is_some());

        let wire = encode_cdc_message(&envelope.to_json().unwrap()).unwrap();
        let decoded = DomainEvent::from_envelope(&parse_cdc_message(&wire).unwrap()).unwrap();
        assert_eq!(decoded, event);
    }

    #[test]
    fn unknown_type_decodes_to_unknown_arm() {
        let envelope = EventEnvelope::new("REVIEW_WRITTEN", "x", serde_json::json!({}), Utc::now());
        assert_eq!(
            DomainEvent::from_envelope(&envelope).unwrap(),
            DomainEvent::Unknown("REVIEW_WRITTEN".into())
        );
    }

    #[test]
    fn known_type_with_wrong_payload_is_malformed() {
        let envelope = EventEnvelope::new("PAYMENT_COMPLETED", "x", serde_json::json!({"foo": 1}), Utc::now());
        assert!(matches!(
            DomainEvent::from_envelope(&envelope),
            Err(EventError::Malformed(_))
        ));
    }

    #[test]
    fn full_cancellation_omits_amount() {
        let payload: CancellationPayload = serde_json::from_value(serde_json::json!({
            "reservationUid": ReservationUid::new_v4(),
            "cancelReason": "changed plans"
        }))
        .unwrap();
        assert_eq!(payload.cancel_amount, None);
    }
}
