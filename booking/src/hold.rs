//! Reservation holds.
//!
//! A hold marks every night of a stay (`HOLD:RESERVATION<accommodationId>:<date>`)
//! for a fixed TTL once the `PAYMENT_PENDING` row is committed. It outlives the
//! lock and keeps other guests away until the saga resolves; the confirm and
//! expire paths remove it.

use crate::error::Result;
use crate::ids::AccommodationId;
use crate::reservation::StayDates;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

/// Prefix of every hold key. No separator before the accommodation id.
pub const HOLD_KEY_PREFIX: &str = "HOLD:RESERVATION";

/// Value stored under a hold key.
pub const HOLD_VALUE: &str = "held";

/// Hold keys, one per night (check-out day excluded).
#[must_use]
pub fn hold_keys(accommodation_id: AccommodationId, stay: &StayDates) -> Vec<String> {
    stay.nights_iter()
        .map(|night| format!("{HOLD_KEY_PREFIX}{accommodation_id}:{night}"))
        .collect()
}

/// Short-lived key store backing the holds.
#[async_trait]
pub trait HoldStore: Send + Sync {
    /// Set every key with `ttl`.
    async fn set_all(&self, keys: &[String], ttl: Duration) -> Result<()>;

    /// Whether any key is set.
    async fn any_exists(&self, keys: &[String]) -> Result<bool>;

    /// Delete every key. Missing keys are fine.
    async fn delete_all(&self, keys: &[String]) -> Result<()>;
}

/// Hold operations keyed by accommodation and stay.
#[derive(Clone)]
pub struct ReservationHolds {
    store: Arc<dyn HoldStore>,
    ttl: Duration,
}

impl ReservationHolds {
    /// Holds that expire after `ttl`.
    #[must_use]
    pub fn new(store: Arc<dyn HoldStore>, ttl: Duration) -> Self {
        Self { store, ttl }
    }

    /// Hold every night of `stay`.
    ///
    /// # Errors
    ///
    /// Returns [`crate::error::BookingError::Hold`] on backend failure.
    pub async fn hold(&self, accommodation_id: AccommodationId, stay: &StayDates) -> Result<()> {
        let keys = hold_keys(accommodation_id, stay);
        self.store.set_all(&keys, self.ttl).await?;
        tracing::debug!(accommodation_id = %accommodation_id, nights = keys.len(), "Dates held");
        Ok(())
    }

    /// Whether any night of `stay` is held.
    ///
    /// # Errors
    ///
    /// Returns [`crate::error::BookingError::Hold`] on backend failure.
    pub async fn is_any_date_held(&self, accommodation_id: AccommodationId, stay: &StayDates) -> Result<bool> {
        self.store.any_exists(&hold_keys(accommodation_id, stay)).await
    }

    /// Clear the hold on `stay`.
    ///
    /// # Errors
    ///
    /// Returns [`crate::error::BookingError::Hold`] on backend failure.
    pub async fn remove_hold(&self, accommodation_id: AccommodationId, stay: &StayDates) -> Result<()> {
        self.store.delete_all(&hold_keys(accommodation_id, stay)).await?;
        tracing::debug!(accommodation_id = %accommodation_id, "Hold removed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;
    use crate::mocks::InMemoryHoldStore;
    use chrono::NaiveDate;

    fn stay(d1: u32, d2: u32) -> StayDates {
        StayDates::new(
            NaiveDate::from_ymd_opt(2025, 12, d1).unwrap(),
            NaiveDate::from_ymd_opt(2025, 12, d2).unwrap(),
        )
        .unwrap()
    }

    #[test]
    fn key_format_has_no_separator_after_prefix() {
        assert_eq!(
            hold_keys(AccommodationId(12), &stay(24, 26)),
            vec!["HOLD:RESERVATION12:2025-12-24", "HOLD:RESERVATION12:2025-12-25"]
        );
    }

    #[tokio::test]
    async fn hold_covers_every_night_until_removed() {
        let holds = ReservationHolds::new(Arc::new(InMemoryHoldStore::new()), Duration::from_secs(900));
        let id = AccommodationId(1);
        holds.hold(id, &stay(24, 27)).await.unwrap();

        assert!(holds.is_any_date_held(id, &stay(24, 25)).await.unwrap());
        assert!(holds.is_any_date_held(id, &stay(26, 28)).await.unwrap());
        assert!(!holds.is_any_date_held(id, &stay(27, 29)).await.unwrap());
        assert!(!holds.is_any_date_held(AccommodationId(2), &stay(24, 25)).await.unwrap());

        holds.remove_hold(id, &stay(24, 27)).await.unwrap();
        assert!(!holds.is_any_date_held(id, &stay(24, 27)).await.unwrap());
        holds.remove_hold(id, &stay(24, 27)).await.unwrap();
    }

    #[tokio::test]
    async fn hold_expires_after_ttl() {
        let holds = ReservationHolds::new(Arc::new(InMemoryHoldStore::new()), Duration::from_millis(20));
        holds.hold(AccommodationId(1), &stay(24, 25)).await.unwrap();
        tokio::time::sleep(Duration::from_millis(40)).await;
        assert!(!holds.is_any_date_held(AccommodationId(1), &stay(24, 25)).await.unwrap());
    }
}
