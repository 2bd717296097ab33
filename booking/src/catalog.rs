//! Read-only views of members and accommodations.
//!
//! Both are owned by other services; the booking core only needs to know
//! whether they may take part in a reservation and how a stay is priced.

use crate::ids::{AccommodationId, MemberId};
use chrono::NaiveTime;
use serde::{Deserialize, Serialize};

/// Member account state.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MemberStatus {
    /// May book.
    Active,
    /// Withdrawn account.
    Deleted,
}

impl MemberStatus {
    /// Database representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Active => "ACTIVE",
            Self::Deleted => "DELETED",
        }
    }

    /// Parse the database representation.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "ACTIVE" => Some(Self::Active),
            "DELETED" => Some(Self::Deleted),
            _ => None,
        }
    }
}

/// A guest.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Member {
    /// Member id.
    pub id: MemberId,
    /// Account state.
    pub status: MemberStatus,
}

impl Member {
    /// Whether the member may create reservations.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.status == MemberStatus::Active
    }
}

/// Listing state.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AccommodationStatus {
    /// Being edited by the host.
    Draft,
    /// Bookable.
    Published,
    /// Hidden by the host.
    Unpublished,
    /// Removed.
    Deleted,
}

impl AccommodationStatus {
    /// Database representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Draft => "DRAFT",
            Self::Published => "PUBLISHED",
            Self::Unpublished => "UNPUBLISHED",
            Self::Deleted => "DELETED",
        }
    }

    /// Parse the database representation.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "DRAFT" => Some(Self::Draft),
            "PUBLISHED" => Some(Self::Published),
            "UNPUBLISHED" => Some(Self::Unpublished),
            "DELETED" => Some(Self::Deleted),
            _ => None,
        }
    }
}

/// A bookable listing.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Accommodation {
    /// Accommodation id.
    pub id: AccommodationId,
    /// Listing state.
    pub status: AccommodationStatus,
    /// Flat nightly rate.
    pub base_price: i64,
    /// Time of day guests may arrive.
    pub check_in_time: NaiveTime,
    /// Time of day guests must leave.
    pub check_out_time: NaiveTime,
}

impl Accommodation {
    /// Whether the listing accepts reservations.
    #[must_use]
    pub fn is_published(&self) -> bool {
        self.status == AccommodationStatus::Published
    }
}
