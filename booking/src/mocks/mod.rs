//! In-memory collaborators.
//!
//! Stand-ins for Postgres, Redis, the payment gateway and Slack with the same
//! observable semantics, so the saga can be exercised end to end without
//! infrastructure:
//!
//! - [`InMemoryBookingStore`]: units of work are serialized and see a
//!   snapshot; commit publishes it, rollback or drop discards it.
//! - [`InMemoryLockCoordinator`] / [`InMemoryHoldStore`]: keys with
//!   wall-clock expiry.
//! - [`MockPaymentGateway`]: approves and refunds by default; responses can
//!   be scripted per call.
//! - [`RecordingNotifier`]: keeps every alert.

mod gateway;
mod keys;
mod notifier;
mod store;

pub use gateway::MockPaymentGateway;
pub use keys::{InMemoryHoldStore, InMemoryLockCoordinator};
pub use notifier::RecordingNotifier;
pub use store::InMemoryBookingStore;

use crate::catalog::{Accommodation, AccommodationStatus, Member, MemberStatus};
use crate::ids::{AccommodationId, MemberId};
use chrono::NaiveTime;

/// An `ACTIVE` member.
#[must_use]
pub const fn active_member(id: i64) -> Member {
    Member {
        id: MemberId(id),
        status: MemberStatus::Active,
    }
}

/// A `PUBLISHED` accommodation with 15:00 check-in and 11:00 check-out.
#[must_use]
pub fn published_accommodation(id: i64, base_price: i64) -> Accommodation {
    Accommodation {
        id: AccommodationId(id),
        status: AccommodationStatus::Published,
        base_price,
        check_in_time: NaiveTime::from_hms_opt(15, 0, 0).unwrap_or(NaiveTime::MIN),
        check_out_time: NaiveTime::from_hms_opt(11, 0, 0).unwrap_or(NaiveTime::MIN),
    }
}
