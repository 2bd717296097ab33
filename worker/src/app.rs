//! Wiring of backends and saga participants.

use anyhow::Context;
use homestay_booking::compensation::PaymentCompensationService;
use homestay_booking::events::{PAYMENT_EVENTS_TOPIC, RESERVATION_EVENTS_TOPIC};
use homestay_booking::gateway::{PaymentGateway, TossPaymentsClient};
use homestay_booking::hold::ReservationHolds;
use homestay_booking::notifier::{Notifier, SlackNotifier};
use homestay_booking::redis_hold::RedisHoldStore;
use homestay_booking::saga::{
    CompensationConsumer, DlqConsumer, EventRouter, PaymentEventTranslator, PaymentGatewayWorker,
    PaymentResultConsumer, ReservationEventTranslator, ReservationEventsConsumer,
};
use homestay_booking::{
    BookingStore, Config, PaymentCancellationProcessor, PaymentConfirmationProcessor, ReservationExpirySweeper,
    ReservationTransactionService,
};
use homestay_core::environment::{Clock, SystemClock};
use homestay_core::event_bus::EventBus;
use homestay_postgres::PostgresBookingStore;
use homestay_redpanda::RedpandaEventBus;
use homestay_runtime::metrics::MetricsServer;
use homestay_runtime::{EventConsumer, MessageHandler};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{info, warn};

/// One consumer group.
struct Participant {
    name: &'static str,
    topic: String,
    handler: Arc<dyn MessageHandler>,
    /// Failures are parked on the dead-letter topic.
    dead_letter: bool,
}

/// Every component, connected but not yet consuming.
pub struct Worker {
    bus: Arc<dyn EventBus>,
    participants: Vec<Participant>,
    sweeper: ReservationExpirySweeper,
}

impl Worker {
    /// Connect to every backend and assemble the saga participants.
    pub async fn build(config: &Config) -> anyhow::Result<Self> {
        let pool = homestay_postgres::connect(&config.postgres.url, config.postgres.max_connections).await?;
        homestay_postgres::migrate(&pool).await?;
        let store: Arc<dyn BookingStore> = Arc::new(PostgresBookingStore::new(pool));
        info!("PostgreSQL ready");

        let hold_store = RedisHoldStore::new(&config.redis.url)
            .await
            .context("failed to connect to redis")?;
        let holds = ReservationHolds::new(Arc::new(hold_store), config.reservation.hold_ttl());
        info!("Redis ready");

        let bus: Arc<dyn EventBus> = Arc::new(
            RedpandaEventBus::builder()
                .brokers(config.kafka.brokers.clone())
                .producer_acks("all")
                .auto_offset_reset("earliest")
                .build()?,
        );
        info!(brokers = %config.kafka.brokers, "Event bus ready");

        let gateway: Arc<dyn PaymentGateway> = Arc::new(TossPaymentsClient::from_config(&config.gateway)?);
        let notifier: Arc<dyn Notifier> = Arc::new(SlackNotifier::new(&config.slack));
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);

        let transactions = ReservationTransactionService::new(store.clone(), clock.clone());
        let compensation = Arc::new(PaymentCompensationService::new(
            store.clone(),
            gateway.clone(),
            notifier.clone(),
            clock.clone(),
        ));
        let confirmation = Arc::new(PaymentConfirmationProcessor::new(
            store.clone(),
            compensation.clone(),
            clock.clone(),
        ));
        let cancellation = Arc::new(PaymentCancellationProcessor::new(
            store.clone(),
            notifier.clone(),
            clock.clone(),
        ));

        let reservation_topic = RESERVATION_EVENTS_TOPIC.to_string();
        let payment_topic = PAYMENT_EVENTS_TOPIC.to_string();
        let participants = vec![
            Participant {
                name: "event-router",
                topic: config.kafka.outbox_topic.clone(),
                handler: Arc::new(EventRouter::new(bus.clone())),
                dead_letter: true,
            },
            Participant {
                name: "reservation-consumer",
                topic: reservation_topic.clone(),
                handler: Arc::new(ReservationEventsConsumer::new(transactions.clone(), holds.clone())),
                dead_letter: true,
            },
            Participant {
                name: "reservation-translator",
                topic: reservation_topic.clone(),
                handler: Arc::new(ReservationEventTranslator::new(store.clone(), clock.clone())),
                dead_letter: true,
            },
            Participant {
                name: "compensation-consumer",
                topic: reservation_topic,
                handler: Arc::new(CompensationConsumer::new(compensation.clone())),
                dead_letter: true,
            },
            Participant {
                name: "payment-gateway-worker",
                topic: payment_topic.clone(),
                handler: Arc::new(PaymentGatewayWorker::new(
                    store.clone(),
                    gateway,
                    notifier.clone(),
                    clock.clone(),
                )),
                dead_letter: true,
            },
            Participant {
                name: "payment-result-consumer",
                topic: payment_topic.clone(),
                handler: Arc::new(PaymentResultConsumer::new(confirmation, cancellation)),
                dead_letter: true,
            },
            Participant {
                name: "payment-translator",
                topic: payment_topic,
                handler: Arc::new(PaymentEventTranslator::new(store, clock)),
                dead_letter: true,
            },
            Participant {
                name: "dlq-consumer",
                topic: config.kafka.dlq_topic.clone(),
                handler: Arc::new(DlqConsumer::new(compensation, notifier)),
                dead_letter: false,
            },
        ];

        let sweeper =
            ReservationExpirySweeper::new(transactions, holds, config.reservation.sweep_interval());

        Ok(Self {
            bus,
            participants,
            sweeper,
        })
    }

    /// Start the metrics exporter, every consumer and the sweeper.
    pub fn start(self, config: &Config) -> Running {
        if let Some(addr) = config.metrics.listen_addr.as_deref() {
            match addr.parse::<SocketAddr>() {
                Ok(addr) => {
                    let mut server = MetricsServer::new(addr);
                    if let Err(e) = server.start() {
                        warn!(error = %e, "Metrics exporter not started");
                    }
                }
                Err(e) => warn!(addr, error = %e, "Invalid metrics listen address"),
            }
        }

        let (shutdown, _) = broadcast::channel(1);
        let retry_policy = config.consumer_retry.retry_policy();

        let mut handles: Vec<(&'static str, JoinHandle<()>)> = self
            .participants
            .into_iter()
            .map(|participant| {
                let mut consumer = EventConsumer::new(
                    participant.name,
                    config.kafka.group(participant.name),
                    vec![participant.topic],
                    self.bus.clone(),
                    participant.handler,
                    shutdown.subscribe(),
                );
                if participant.dead_letter {
                    consumer = consumer
                        .with_retry_policy(retry_policy.clone())
                        .with_dead_letter_topic(config.kafka.dlq_topic.clone());
                }
                (participant.name, consumer.spawn())
            })
            .collect();

        handles.push(("expiry-sweeper", self.sweeper.spawn(shutdown.subscribe())));
        info!(tasks = handles.len(), "Saga participants started");

        Running { shutdown, handles }
    }
}

/// Handle on the started worker.
pub struct Running {
    shutdown: broadcast::Sender<()>,
    handles: Vec<(&'static str, JoinHandle<()>)>,
}

impl Running {
    /// Signal every task to stop and wait up to `timeout` for each.
    pub async fn stop(self, timeout: Duration) {
        info!("Shutting down saga worker");
        let _ = self.shutdown.send(());

        for (name, handle) in self.handles {
            match tokio::time::timeout(timeout, handle).await {
                Ok(Ok(())) => info!(task = name, "Stopped"),
                Ok(Err(e)) => warn!(task = name, error = %e, "Task failed"),
                Err(_) => warn!(task = name, "Shutdown timed out"),
            }
        }
        info!("Saga worker stopped");
    }
}
