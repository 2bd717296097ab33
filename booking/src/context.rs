//! Caller identity, threaded explicitly from the HTTP boundary inward.

use crate::ids::MemberId;
use std::fmt;

/// The authenticated guest on whose behalf an operation runs.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RequestContext {
    /// Logged-in member.
    pub member_id: MemberId,
}

impl RequestContext {
    /// Context for `member_id`.
    #[must_use]
    pub const fn new(member_id: MemberId) -> Self {
        Self { member_id }
    }

    /// Audit actor for changes made by this caller.
    #[must_use]
    pub const fn actor(&self) -> Actor {
        Actor::User(self.member_id)
    }
}

/// Who changed a reservation, as written to the status history.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Actor {
    /// A guest through the HTTP API.
    User(MemberId),
    /// A saga consumer reacting to an event.
    KafkaConsumer,
    /// The expiry sweeper.
    Scheduler,
}

impl fmt::Display for Actor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::User(id) => write!(f, "USER_ID:{id}"),
            Self::KafkaConsumer => f.write_str("SYSTEM:KAFKA_CONSUMER"),
            Self::Scheduler => f.write_str("SYSTEM:SCHEDULER"),
        }
    }
}
