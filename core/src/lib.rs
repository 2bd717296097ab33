//! # Homestay Core
//!
//! Shared building blocks for the homestay reservation-payment core.
//!
//! This crate carries no business rules. It defines the pieces every other
//! crate speaks:
//!
//! - [`event::EventEnvelope`]: the versioned wrapper around every domain event
//!   written to the outbox, plus the codec for the change-data-capture message
//!   that carries it over the broker.
//! - [`event_bus::EventBus`]: publish/subscribe with explicit per-delivery
//!   acknowledgement, implemented by `homestay-redpanda` in production and by
//!   `homestay-testing` in tests.
//! - [`environment::Clock`]: injected time source.
//!
//! ## Delivery model
//!
//! Delivery is at-least-once. A [`event_bus::Delivery`] is acknowledged only
//! after its handler finished; a negative acknowledgement (or dropping the
//! delivery) makes the broker hand the same message out again. Handlers are
//! therefore written to be idempotent.

// Re-export commonly used types
pub use chrono::{DateTime, Utc};
pub use serde::{Deserialize, Serialize};

pub mod event;
pub mod event_bus;

/// Environment module - injected dependencies shared by every crate
pub mod environment {
    use chrono::{DateTime, Utc};

    /// Clock trait - abstracts time operations for testability
    ///
    /// # Example
    ///
    /// ```
    /// use homestay_core::environment::{Clock, SystemClock};
    ///
    /// let clock = SystemClock;
    /// let _now = clock.now();
    /// ```
    pub trait Clock: Send + Sync {
        /// Get the current time
        fn now(&self) -> DateTime<Utc>;
    }

    /// Wall-clock time.
    #[derive(Clone, Copy, Debug, Default)]
    pub struct SystemClock;

    impl Clock for SystemClock {
        fn now(&self) -> DateTime<Utc> {
            Utc::now()
        }
    }
}
