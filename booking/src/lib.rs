//! # Homestay Booking
//!
//! The reservation-payment consistency core: admitting a booking without
//! double-booking, holding the dates while the guest pays, and keeping the
//! reservation and the payment gateway consistent through a choreographed
//! saga with compensating refunds.
//!
//! ## Layers
//!
//! - **Admission**: [`lock::ReservationLockManager`] (sorted multi-key lock
//!   over the nights of a stay) and [`hold::ReservationHolds`] (per-night
//!   hold while payment is pending).
//! - **State machine**: [`reservation`] types and
//!   [`reservation_tx::ReservationTransactionService`]; every transition
//!   writes an audit row and exactly one [`outbox`] event in the same
//!   [`store::UnitOfWork`].
//! - **Payment**: [`payment_service::PaymentService`] accepts confirmations,
//!   [`virtual_account`] issues bank-transfer accounts, [`payment_query`]
//!   answers guest lookups, [`gateway`] talks to the gateway,
//!   [`payment_processor`] records outcomes.
//! - **Saga**: the [`saga`] consumers react to events; [`compensation`]
//!   refunds what cannot be kept; [`sweeper`] expires abandoned bookings.
//!
//! ## Reservation lifecycle
//!
//! ```text
//! PAYMENT_PENDING ──► CONFIRMED ──► CANCELLED ──► CANCELLATION_FAILED
//!        │
//!        └──────────► EXPIRED
//! ```
//!
//! Backends are traits ([`store::BookingStore`], [`lock::LockCoordinator`],
//! [`hold::HoldStore`], [`gateway::PaymentGateway`], [`notifier::Notifier`]).
//! Production implementations live in `homestay-postgres`, [`redis_lock`],
//! [`redis_hold`], [`gateway::toss`] and [`notifier::SlackNotifier`]; the
//! [`mocks`] module provides in-memory ones.

pub mod catalog;
pub mod compensation;
pub mod config;
pub mod context;
pub mod error;
pub mod events;
pub mod gateway;
pub mod hold;
pub mod ids;
pub mod lock;
pub mod mocks;
pub mod notifier;
pub mod outbox;
pub mod payment;
pub mod payment_processor;
pub mod payment_query;
pub mod payment_service;
pub mod redis_hold;
pub mod redis_lock;
pub mod reservation;
pub mod reservation_service;
pub mod reservation_tx;
pub mod saga;
pub mod store;
pub mod sweeper;
pub mod virtual_account;

pub use compensation::{CompensationOutcome, PaymentCompensationService};
pub use config::Config;
pub use context::{Actor, RequestContext};
pub use error::{BookingError, Result};
pub use events::{DomainEvent, EventType};
pub use ids::{AccommodationId, MemberId, PaymentId, ReservationId, ReservationUid};
pub use payment_processor::{PaymentCancellationProcessor, PaymentConfirmationProcessor};
pub use payment_query::{PaymentQueryService, PaymentView};
pub use payment_service::PaymentService;
pub use reservation::{Reservation, ReservationRequest, ReservationStatus, StayDates};
pub use reservation_service::ReservationService;
pub use reservation_tx::ReservationTransactionService;
pub use store::{BookingStore, UnitOfWork};
pub use sweeper::ReservationExpirySweeper;
pub use virtual_account::{VirtualAccountApplication, VirtualAccountService};
