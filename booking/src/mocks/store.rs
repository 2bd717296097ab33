use crate::catalog::{Accommodation, Member};
use crate::error::{BookingError, Result};
use crate::events::DomainEvent;
use crate::ids::{AccommodationId, MemberId, PaymentId, ReservationId, ReservationUid};
use crate::outbox::OutboxRecord;
use crate::payment::{NewPayment, Payment, PaymentAttempt, PaymentCancel};
use crate::reservation::{NewReservation, Reservation, ReservationStatus, StatusChange, StayDates};
use crate::store::{BookingStore, UnitOfWork};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use homestay_core::event::{EventEnvelope, encode_cdc_message};
use homestay_core::event_bus::{BusMessage, EventBus, EventBusError};
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use tokio::sync::{Mutex, OwnedMutexGuard};

#[derive(Clone, Default)]
struct State {
    members: HashMap<MemberId, Member>,
    accommodations: HashMap<AccommodationId, Accommodation>,
    reservations: Vec<Reservation>,
    history: Vec<StatusChange>,
    outbox: Vec<OutboxRecord>,
    payments: Vec<Payment>,
    attempts: Vec<PaymentAttempt>,
    refund_claims: HashMap<PaymentId, DateTime<Utc>>,
}

impl State {
    fn reservation_index(&self, uid: ReservationUid) -> Option<usize> {
        self.reservations.iter().position(|r| r.reservation_uid == uid)
    }

    fn payment_index(&self, uid: ReservationUid) -> Option<usize> {
        let reservation_id = self.reservations.iter().find(|r| r.reservation_uid == uid)?.id;
        self.payments.iter().position(|p| p.reservation_id == reservation_id)
    }
}

/// Relational store stand-in.
///
/// Clones share the same data.
#[derive(Clone, Default)]
pub struct InMemoryBookingStore {
    state: Arc<Mutex<State>>,
    fail_begin: Arc<AtomicBool>,
    relayed: Arc<AtomicUsize>,
}

impl InMemoryBookingStore {
    /// Empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a member.
    pub async fn add_member(&self, member: Member) {
        self.state.lock().await.members.insert(member.id, member);
    }

    /// Seed an accommodation.
    pub async fn add_accommodation(&self, accommodation: Accommodation) {
        self.state
            .lock()
            .await
            .accommodations
            .insert(accommodation.id, accommodation);
    }

    /// Make every following `begin` fail (or succeed again).
    pub fn fail_begin(&self, fail: bool) {
        self.fail_begin.store(fail, Ordering::SeqCst);
    }

    /// Committed reservations.
    pub async fn reservations(&self) -> Vec<Reservation> {
        self.state.lock().await.reservations.clone()
    }

    /// Committed reservation by uid.
    pub async fn reservation(&self, uid: ReservationUid) -> Option<Reservation> {
        let state = self.state.lock().await;
        state.reservation_index(uid).map(|i| state.reservations[i].clone())
    }

    /// Audit trail of one reservation, oldest first.
    pub async fn status_history(&self, id: ReservationId) -> Vec<StatusChange> {
        self.state
            .lock()
            .await
            .history
            .iter()
            .filter(|h| h.reservation_id == id)
            .cloned()
            .collect()
    }

    /// Committed outbox rows, oldest first.
    pub async fn outbox(&self) -> Vec<OutboxRecord> {
        self.state.lock().await.outbox.clone()
    }

    /// Committed outbox rows, decoded. Rows that do not decode are skipped.
    pub async fn outbox_events(&self) -> Vec<DomainEvent> {
        self.outbox()
            .await
            .iter()
            .filter_map(|record| serde_json::from_str::<EventEnvelope>(&record.payload).ok())
            .filter_map(|envelope| DomainEvent::from_envelope(&envelope).ok())
            .collect()
    }

    /// Committed payment of a reservation.
    pub async fn payment(&self, uid: ReservationUid) -> Option<Payment> {
        let state = self.state.lock().await;
        state.payment_index(uid).map(|i| state.payments[i].clone())
    }

    /// Committed payments.
    pub async fn payments(&self) -> Vec<Payment> {
        self.state.lock().await.payments.clone()
    }

    /// Committed attempt log.
    pub async fn payment_attempts(&self) -> Vec<PaymentAttempt> {
        self.state.lock().await.attempts.clone()
    }

    /// Play the CDC relay: publish every outbox row not relayed yet to
    /// `topic` as a CDC message. Returns how many were published.
    ///
    /// # Errors
    ///
    /// Returns the publish error; the failed row and the ones after it are
    /// relayed by the next call.
    pub async fn relay_outbox(&self, bus: &dyn EventBus, topic: &str) -> std::result::Result<usize, EventBusError> {
        let pending: Vec<OutboxRecord> = {
            let state = self.state.lock().await;
            state.outbox.iter().skip(self.relayed.load(Ordering::SeqCst)).cloned().collect()
        };

        for record in &pending {
            let payload = encode_cdc_message(&record.payload).map_err(|e| EventBusError::PublishFailed {
                topic: topic.to_string(),
                reason: e.to_string(),
            })?;
            let message = BusMessage::new(payload).with_key(record.aggregate_id.clone());
            bus.publish(topic, &message).await?;
            self.relayed.fetch_add(1, Ordering::SeqCst);
        }
        Ok(pending.len())
    }
}

#[async_trait]
impl BookingStore for InMemoryBookingStore {
    async fn begin(&self) -> Result<Box<dyn UnitOfWork>> {
        if self.fail_begin.load(Ordering::SeqCst) {
            return Err(BookingError::Store("connection refused".into()));
        }
        let committed = Arc::clone(&self.state).lock_owned().await;
        let working = committed.clone();
        Ok(Box::new(InMemoryUnitOfWork { committed, working }))
    }
}

struct InMemoryUnitOfWork {
    committed: OwnedMutexGuard<State>,
    working: State,
}

#[async_trait]
impl UnitOfWork for InMemoryUnitOfWork {
    async fn find_member(&mut self, id: MemberId) -> Result<Option<Member>> {
        Ok(self.working.members.get(&id).cloned())
    }

    async fn find_accommodation(&mut self, id: AccommodationId) -> Result<Option<Accommodation>> {
        Ok(self.working.accommodations.get(&id).cloned())
    }

    async fn reservation_code_exists(&mut self, code: &str) -> Result<bool> {
        Ok(self.working.reservations.iter().any(|r| r.reservation_code == code))
    }

    async fn has_overlapping_reservation(
        &mut self,
        accommodation_id: AccommodationId,
        stay: &StayDates,
    ) -> Result<bool> {
        Ok(self.working.reservations.iter().any(|r| {
            r.accommodation_id == accommodation_id && r.status.blocks_dates() && r.stay().overlaps(stay)
        }))
    }

    async fn insert_reservation(&mut self, reservation: NewReservation) -> Result<Reservation> {
        if self
            .working
            .reservations
            .iter()
            .any(|r| r.reservation_code == reservation.reservation_code || r.reservation_uid == reservation.reservation_uid)
        {
            return Err(BookingError::Store("duplicate reservation code or uid".into()));
        }
        let id = ReservationId(i64::try_from(self.working.reservations.len()).unwrap_or(i64::MAX) + 1);
        let stored = reservation.into_reservation(id);
        self.working.reservations.push(stored.clone());
        Ok(stored)
    }

    async fn find_reservation(&mut self, uid: ReservationUid) -> Result<Option<Reservation>> {
        Ok(self
            .working
            .reservation_index(uid)
            .map(|i| self.working.reservations[i].clone()))
    }

    async fn find_reservation_for_update(&mut self, uid: ReservationUid) -> Result<Option<Reservation>> {
        self.find_reservation(uid).await
    }

    async fn update_reservation_status(&mut self, id: ReservationId, status: ReservationStatus) -> Result<()> {
        let reservation = self
            .working
            .reservations
            .iter_mut()
            .find(|r| r.id == id)
            .ok_or_else(|| BookingError::Store(format!("no reservation row {id}")))?;
        reservation.status = status;
        Ok(())
    }

    async fn find_overdue_reservations(&mut self, now: DateTime<Utc>) -> Result<Vec<Reservation>> {
        Ok(self
            .working
            .reservations
            .iter()
            .filter(|r| r.is_overdue(now))
            .cloned()
            .collect())
    }

    async fn insert_status_history(&mut self, change: &StatusChange) -> Result<()> {
        self.working.history.push(change.clone());
        Ok(())
    }

    async fn append_outbox(&mut self, record: &OutboxRecord) -> Result<()> {
        self.working.outbox.push(record.clone());
        Ok(())
    }

    async fn find_payment_by_reservation_uid(&mut self, uid: ReservationUid) -> Result<Option<Payment>> {
        Ok(self
            .working
            .payment_index(uid)
            .map(|i| self.working.payments[i].clone()))
    }

    async fn find_payment_by_payment_key(&mut self, payment_key: &str) -> Result<Option<Payment>> {
        Ok(self
            .working
            .payments
            .iter()
            .find(|p| p.payment_key == payment_key)
            .cloned())
    }

    async fn insert_payment(&mut self, payment: NewPayment) -> Result<Payment> {
        if self
            .working
            .payments
            .iter()
            .any(|p| p.payment_key == payment.payment_key || p.reservation_id == payment.reservation_id)
        {
            return Err(BookingError::Store("duplicate payment key or reservation".into()));
        }
        let id = PaymentId(i64::try_from(self.working.payments.len()).unwrap_or(i64::MAX) + 1);
        let stored = payment.into_payment(id);
        self.working.payments.push(stored.clone());
        Ok(stored)
    }

    async fn update_payment(&mut self, payment: &Payment) -> Result<()> {
        let stored = self
            .working
            .payments
            .iter_mut()
            .find(|p| p.id == payment.id)
            .ok_or_else(|| BookingError::Store(format!("no payment row {}", payment.id)))?;
        stored.status = payment.status;
        stored.balance_amount = payment.balance_amount;
        Ok(())
    }

    async fn insert_payment_cancel(&mut self, payment_id: PaymentId, cancel: &PaymentCancel) -> Result<()> {
        let stored = self
            .working
            .payments
            .iter_mut()
            .find(|p| p.id == payment_id)
            .ok_or_else(|| BookingError::Store(format!("no payment row {payment_id}")))?;
        stored.cancels.push(cancel.clone());
        Ok(())
    }

    async fn claim_payment_refund(
        &mut self,
        payment_id: PaymentId,
        now: DateTime<Utc>,
        stale_before: DateTime<Utc>,
    ) -> Result<bool> {
        if !self.working.payments.iter().any(|p| p.id == payment_id) {
            return Err(BookingError::Store(format!("no payment row {payment_id}")));
        }
        if self
            .working
            .refund_claims
            .get(&payment_id)
            .is_some_and(|claimed_at| *claimed_at >= stale_before)
        {
            return Ok(false);
        }
        self.working.refund_claims.insert(payment_id, now);
        Ok(true)
    }

    async fn release_payment_refund(&mut self, payment_id: PaymentId) -> Result<()> {
        self.working.refund_claims.remove(&payment_id);
        Ok(())
    }

    async fn insert_payment_attempt(&mut self, attempt: &PaymentAttempt) -> Result<()> {
        self.working.attempts.push(attempt.clone());
        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<()> {
        let Self {
            mut committed,
            working,
        } = *self;
        *committed = working;
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<()> {
        Ok(())
    }
}
