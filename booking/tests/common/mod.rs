//! Shared wiring for the booking integration tests.

#![allow(dead_code, clippy::unwrap_used, clippy::expect_used)]

use chrono::NaiveDate;
use homestay_booking::compensation::PaymentCompensationService;
use homestay_booking::events::{DomainEvent, EventType};
use homestay_booking::hold::ReservationHolds;
use homestay_booking::lock::ReservationLockManager;
use homestay_booking::mocks::{
    InMemoryBookingStore, InMemoryHoldStore, InMemoryLockCoordinator, MockPaymentGateway, RecordingNotifier,
    active_member, published_accommodation,
};
use homestay_booking::payment_processor::{PaymentCancellationProcessor, PaymentConfirmationProcessor};
use homestay_booking::saga::{
    CompensationConsumer, PaymentEventTranslator, PaymentGatewayWorker, PaymentResultConsumer,
    ReservationEventTranslator, ReservationEventsConsumer,
};
use homestay_booking::{
    AccommodationId, BookingStore, PaymentQueryService, PaymentService, RequestContext, Reservation,
    ReservationExpirySweeper, ReservationRequest, ReservationService, ReservationTransactionService,
    VirtualAccountService,
};
use homestay_core::environment::Clock;
use homestay_core::event::encode_cdc_message;
use homestay_core::event_bus::BusMessage;
use homestay_runtime::{HandlerError, MessageHandler};
use homestay_testing::{FixedClock, test_clock};
use std::sync::Arc;
use std::time::Duration;

pub const GUEST: i64 = 1;
pub const OTHER_GUEST: i64 = 2;
pub const ACCOMMODATION: i64 = 10;
pub const NIGHTLY_RATE: i64 = 100_000;

pub fn date(month: u32, day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2025, month, day).unwrap()
}

pub fn request(check_in: NaiveDate, check_out: NaiveDate) -> ReservationRequest {
    ReservationRequest {
        accommodation_id: AccommodationId(ACCOMMODATION),
        check_in_date: check_in,
        check_out_date: check_out,
        guest_count: 2,
        message: None,
    }
}

pub fn guest() -> RequestContext {
    RequestContext::new(homestay_booking::MemberId(GUEST))
}

pub fn other_guest() -> RequestContext {
    RequestContext::new(homestay_booking::MemberId(OTHER_GUEST))
}

/// A CDC message carrying `event`, as the relay would publish it.
pub fn cdc(event: &DomainEvent, clock: &dyn Clock) -> BusMessage {
    let envelope = event.to_envelope(clock.now()).unwrap();
    BusMessage::new(encode_cdc_message(&envelope.to_json().unwrap()).unwrap()).with_key(envelope.trace_id)
}

/// Every service of the booking core over in-memory collaborators.
pub struct Harness {
    pub store: InMemoryBookingStore,
    pub lock_backend: Arc<InMemoryLockCoordinator>,
    pub hold_backend: Arc<InMemoryHoldStore>,
    pub gateway: Arc<MockPaymentGateway>,
    pub notifier: Arc<RecordingNotifier>,
    pub clock: FixedClock,
    pub holds: ReservationHolds,
    pub reservations: ReservationService,
    pub transactions: ReservationTransactionService,
    pub payments: PaymentService,
    pub compensation: Arc<PaymentCompensationService>,
}

impl Harness {
    pub async fn new() -> Self {
        Self::with_lock_wait(Duration::from_secs(5)).await
    }

    pub async fn with_lock_wait(lock_wait: Duration) -> Self {
        let store = InMemoryBookingStore::new();
        store.add_member(active_member(GUEST)).await;
        store.add_member(active_member(OTHER_GUEST)).await;
        store
            .add_accommodation(published_accommodation(ACCOMMODATION, NIGHTLY_RATE))
            .await;

        let lock_backend = Arc::new(InMemoryLockCoordinator::new());
        let hold_backend = Arc::new(InMemoryHoldStore::new());
        let gateway = Arc::new(MockPaymentGateway::new());
        let notifier = Arc::new(RecordingNotifier::new());
        let clock = test_clock();

        let shared: Arc<dyn BookingStore> = Arc::new(store.clone());
        let time: Arc<dyn Clock> = Arc::new(clock.clone());
        let holds = ReservationHolds::new(hold_backend.clone(), Duration::from_secs(900));
        let locks = ReservationLockManager::new(lock_backend.clone(), lock_wait, Duration::from_secs(10));

        Self {
            reservations: ReservationService::new(
                shared.clone(),
                locks,
                holds.clone(),
                time.clone(),
                chrono::Duration::minutes(15),
            ),
            transactions: ReservationTransactionService::new(shared.clone(), time.clone()),
            payments: PaymentService::new(shared.clone(), time.clone()),
            compensation: Arc::new(PaymentCompensationService::new(
                shared,
                gateway.clone(),
                notifier.clone(),
                time,
            )),
            store,
            lock_backend,
            hold_backend,
            gateway,
            notifier,
            clock,
            holds,
        }
    }

    pub fn shared_store(&self) -> Arc<dyn BookingStore> {
        Arc::new(self.store.clone())
    }

    pub fn time(&self) -> Arc<dyn Clock> {
        Arc::new(self.clock.clone())
    }

    pub fn queries(&self) -> PaymentQueryService {
        PaymentQueryService::new(self.shared_store(), self.gateway.clone())
    }

    pub fn virtual_accounts(&self) -> VirtualAccountService {
        VirtualAccountService::new(self.shared_store(), self.gateway.clone(), self.time())
    }

    pub fn sweeper(&self) -> ReservationExpirySweeper {
        ReservationExpirySweeper::new(self.transactions.clone(), self.holds.clone(), Duration::from_secs(300))
    }

    /// Book `check_in..check_out` for [`GUEST`].
    pub async fn book(&self, check_in: NaiveDate, check_out: NaiveDate) -> Reservation {
        self.reservations
            .create_reservation(&guest(), request(check_in, check_out))
            .await
            .unwrap()
    }

    /// Event names in the outbox, oldest first.
    pub async fn outbox_types(&self) -> Vec<String> {
        self.store.outbox().await.into_iter().map(|r| r.event_type).collect()
    }

    /// Every saga participant, grouped by the topic it consumes.
    pub fn saga(&self) -> SagaPump {
        let store = self.shared_store();
        let clock = self.time();
        let confirmation = Arc::new(PaymentConfirmationProcessor::new(
            store.clone(),
            self.compensation.clone(),
            clock.clone(),
        ));
        let cancellation = Arc::new(PaymentCancellationProcessor::new(
            store.clone(),
            self.notifier.clone(),
            clock.clone(),
        ));

        SagaPump {
            store: self.store.clone(),
            cursor: 0,
            reservation_handlers: vec![
                Arc::new(ReservationEventsConsumer::new(self.transactions.clone(), self.holds.clone()))
                    as Arc<dyn MessageHandler>,
                Arc::new(ReservationEventTranslator::new(store.clone(), clock.clone())),
                Arc::new(CompensationConsumer::new(self.compensation.clone())),
            ],
            payment_handlers: vec![
                Arc::new(PaymentGatewayWorker::new(
                    store.clone(),
                    self.gateway.clone(),
                    self.notifier.clone(),
                    clock.clone(),
                )) as Arc<dyn MessageHandler>,
                Arc::new(PaymentResultConsumer::new(confirmation, cancellation)),
                Arc::new(PaymentEventTranslator::new(store, clock)),
            ],
        }
    }
}

/// Deterministic stand-in for relay, router and broker: feeds every new
/// outbox row to the handlers of its topic until nothing new is written.
pub struct SagaPump {
    store: InMemoryBookingStore,
    cursor: usize,
    reservation_handlers: Vec<Arc<dyn MessageHandler>>,
    payment_handlers: Vec<Arc<dyn MessageHandler>>,
}

impl SagaPump {
    pub async fn run(&mut self) -> Result<usize, HandlerError> {
        let mut delivered = 0;
        loop {
            let records = self.store.outbox().await;
            if self.cursor >= records.len() {
                return Ok(delivered);
            }
            for record in &records[self.cursor..] {
                let message = BusMessage::new(encode_cdc_message(&record.payload).unwrap())
                    .with_key(record.aggregate_id.clone());
                let handlers = match EventType::from_name(&record.event_type).topic() {
                    Some(homestay_booking::events::RESERVATION_EVENTS_TOPIC) => &self.reservation_handlers,
                    Some(_) => &self.payment_handlers,
                    None => continue,
                };
                for handler in handlers {
                    handler.handle(&message).await?;
                }
                delivered += 1;
            }
            self.cursor = records.len();
        }
    }

    /// Deliver `message` to every handler of `topic`, as a redelivery would.
    pub async fn deliver(&self, topic: &str, message: &BusMessage) -> Result<(), HandlerError> {
        let handlers = if topic == homestay_booking::events::RESERVATION_EVENTS_TOPIC {
            &self.reservation_handlers
        } else {
            &self.payment_handlers
        };
        for handler in handlers {
            handler.handle(message).await?;
        }
        Ok(())
    }
}
