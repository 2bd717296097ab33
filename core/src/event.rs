//! Event envelope and change-data-capture message codec.
//!
//! Every domain event leaves the system the same way: it is wrapped in an
//! [`EventEnvelope`], serialized to JSON and written to the outbox table in the
//! same transaction as the state change it describes. A CDC relay tails the
//! outbox and republishes each row as a broker message of the form
//!
//! ```text
//! { "payload": "<envelope json, as a string>" }
//! ```
//!
//! Consumers call [`parse_cdc_message`] to recover the envelope, route on
//! [`EventEnvelope::event_type`], and then decode the typed payload with
//! [`EventEnvelope::decode_payload`].
//!
//! # Example
//!
//! ```
//! use homestay_core::event::{EventEnvelope, encode_cdc_message, parse_cdc_message};
//! use homestay_core::Utc;
//!
//! let envelope = EventEnvelope::new(
//!     "RESERVATION_PENDING",
//!     "7d1c5e1a",
//!     serde_json::json!({ "amount": 200_000 }),
//!     Utc::now(),
//! );
//!
//! let json = envelope.to_json().unwrap();
//! let wire = encode_cdc_message(&json).unwrap();
//! let parsed = parse_cdc_message(&wire).unwrap();
//!
//! assert_eq!(parsed.event_type, "RESERVATION_PENDING");
//! assert_eq!(parsed.trace_id, "7d1c5e1a");
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use serde_json::Value;
use thiserror::Error;
use uuid::Uuid;

/// Schema version stamped on every envelope.
pub const EVENT_VERSION: &str = "1.0";

/// Error types for envelope operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EventError {
    /// Failed to serialize an envelope or payload.
    #[error("Failed to serialize event: {0}")]
    Serialization(String),

    /// The message is not a CDC envelope, or the payload does not match its type.
    ///
    /// Retrying cannot fix this, so consumers treat it as a poison message.
    #[error("Malformed event: {0}")]
    Malformed(String),
}

/// Versioned wrapper around a domain event payload.
///
/// `trace_id` is the aggregate id the event describes; it doubles as the
/// partition key when the event is routed to its topic.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventEnvelope<P = Value> {
    /// Unique id of this event instance.
    #[serde(alias = "event_id")]
    pub event_id: Uuid,

    /// Correlation id; the aggregate id of the event.
    #[serde(alias = "trace_id")]
    pub trace_id: String,

    /// Routing tag, e.g. `RESERVATION_CONFIRMED`.
    #[serde(alias = "event_type")]
    pub event_type: String,

    /// Payload schema version.
    #[serde(alias = "event_version")]
    pub event_version: String,

    /// When the event was created.
    pub timestamp: DateTime<Utc>,

    /// Type-specific payload.
    pub payload: P,
}

impl<P> EventEnvelope<P> {
    /// Wrap a payload in a fresh envelope with a random event id.
    #[must_use]
    pub fn new(
        event_type: impl Into<String>,
        trace_id: impl Into<String>,
        payload: P,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            event_id: Uuid::new_v4(),
            trace_id: trace_id.into(),
            event_type: event_type.into(),
            event_version: EVENT_VERSION.to_string(),
            timestamp,
            payload,
        }
    }
}

impl<P: Serialize> EventEnvelope<P> {
    /// Serialize the envelope to the JSON text stored in the outbox.
    ///
    /// # Errors
    ///
    /// Returns [`EventError::Serialization`] if the payload cannot be serialized.
    pub fn to_json(&self) -> Result<String, EventError> {
        serde_json::to_string(self).map_err(|e| EventError::Serialization(e.to_string()))
    }
}

impl EventEnvelope<Value> {
    /// Decode the untyped payload into a concrete payload type.
    ///
    /// # Errors
    ///
    /// Returns [`EventError::Malformed`] if the payload does not have the
    /// expected shape.
    pub fn decode_payload<T: DeserializeOwned>(&self) -> Result<T, EventError> {
        T::deserialize(&self.payload).map_err(|e| {
            EventError::Malformed(format!(
                "payload of {} does not match its type: {e}",
                self.event_type
            ))
        })
    }
}

/// Parse a CDC broker message into an untyped envelope.
///
/// # Errors
///
/// Returns [`EventError::Malformed`] when the message is not JSON, when the
/// `payload` field is missing or not a string, or when that string is not a
/// valid envelope.
pub fn parse_cdc_message(bytes: &[u8]) -> Result<EventEnvelope, EventError> {
    let root: Value = serde_json::from_slice(bytes)
        .map_err(|e| EventError::Malformed(format!("message is not JSON: {e}")))?;

    let Some(envelope_json) = root.get("payload").and_then(Value::as_str) else {
        return Err(EventError::Malformed(
            "'payload' field is missing or not a string".to_string(),
        ));
    };

    serde_json::from_str(envelope_json)
        .map_err(|e| EventError::Malformed(format!("payload is not an envelope: {e}")))
}

/// Wrap envelope JSON the way the CDC relay does.
///
/// # Errors
///
/// Returns [`EventError::Serialization`] if the wrapper cannot be serialized.
pub fn encode_cdc_message(envelope_json: &str) -> Result<Vec<u8>, EventError> {
    serde_json::to_vec(&serde_json::json!({ "payload": envelope_json }))
        .map_err(|e| EventError::Serialization(e.to_string()))
}
