//! Transactional outbox.
//!
//! Events are never published directly. [`append`] serializes the event into
//! its envelope and writes it through the caller's unit of work, so the outbox
//! row commits or rolls back together with the state change it describes. A
//! CDC relay ships committed rows to the broker.

use crate::error::{BookingError, Result};
use crate::events::DomainEvent;
use crate::store::UnitOfWork;
use chrono::{DateTime, Utc};

/// One outbox row.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OutboxRecord {
    /// `RESERVATION` or `PAYMENT`.
    pub aggregate_type: String,
    /// Reservation uid.
    pub aggregate_id: String,
    /// Event name.
    pub event_type: String,
    /// Envelope JSON.
    pub payload: String,
    /// Creation time.
    pub created_at: DateTime<Utc>,
}

impl OutboxRecord {
    /// Outbox row for `event`.
    ///
    /// # Errors
    ///
    /// Returns [`BookingError::Serialization`] for an `Unknown` event or a
    /// payload that cannot be serialized.
    pub fn for_event(event: &DomainEvent, now: DateTime<Utc>) -> Result<Self> {
        let event_type = event.event_type();
        let Some(aggregate) = event_type.aggregate_type() else {
            return Err(BookingError::Serialization(format!(
                "refusing to store event of unknown type {event_type}"
            )));
        };
        let envelope = event.to_envelope(now)?;

        Ok(Self {
            aggregate_type: aggregate.as_str().to_string(),
            aggregate_id: envelope.trace_id.clone(),
            event_type: event_type.name().to_string(),
            payload: envelope.to_json()?,
            created_at: now,
        })
    }
}

/// Append `event` to the outbox of `uow`.
///
/// # Errors
///
/// Returns [`BookingError::Serialization`] or the store error; either way the
/// caller's unit of work must be rolled back.
pub async fn append(uow: &mut dyn UnitOfWork, event: &DomainEvent, now: DateTime<Utc>) -> Result<()> {
    let record = OutboxRecord::for_event(event, now).inspect_err(|e| {
        tracing::error!(event_type = %event.event_type(), error = %e, "Failed to serialize outbox event");
    })?;
    uow.append_outbox(&record).await?;

    tracing::debug!(
        event_type = %record.event_type,
        aggregate_id = %record.aggregate_id,
        "Outbox event appended"
    );
    metrics::counter!("booking.outbox.appended", "event_type" => record.event_type.clone()).increment(1);
    Ok(())
}
