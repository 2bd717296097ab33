//! Identifier newtypes.
//!
//! Entities refer to each other through these ids and are fetched explicitly
//! where needed; nothing is loaded behind the caller's back.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

macro_rules! surrogate_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub i64);

        impl $name {
            /// Raw database value.
            #[must_use]
            pub const fn get(self) -> i64 {
                self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

surrogate_id!(
    /// Guest (member) id, owned by the member service.
    MemberId
);
surrogate_id!(
    /// Accommodation id, owned by the listing service.
    AccommodationId
);
surrogate_id!(
    /// Surrogate key of a reservation row.
    ReservationId
);
surrogate_id!(
    /// Surrogate key of a payment row.
    PaymentId
);

/// Public, opaque reservation reference.
///
/// Doubles as the gateway order id and as the aggregate id of every saga event
/// about the reservation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ReservationUid(pub Uuid);

impl ReservationUid {
    /// A fresh random uid.
    #[must_use]
    pub fn new_v4() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for ReservationUid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl FromStr for ReservationUid {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uid_parses_its_own_display() {
        let uid = ReservationUid::new_v4();
        assert_eq!(uid.to_string().parse::<ReservationUid>().ok(), Some(uid));
    }

    #[test]
    fn ids_serialize_as_plain_values() {
        let json = serde_json::to_string(&AccommodationId(7)).unwrap_or_default();
        assert_eq!(json, "7");
    }
}
