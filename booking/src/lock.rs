//! Distributed multi-key lock over the nights of a stay.
//!
//! One key per night (`LOCK:RESERVATION:<accommodationId>:<date>`), sorted so
//! that any two overlapping booking attempts contend for their shared keys in
//! the same global order. Backends acquire all keys or none, with a lease that
//! expires on its own if the holder dies; [`ReservationLockManager`] adds the
//! bounded wait and the unconditional release.

use crate::error::{BookingError, Result};
use crate::ids::AccommodationId;
use crate::reservation::StayDates;
use async_trait::async_trait;
use rand::Rng;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use uuid::Uuid;

/// Prefix of every lock key.
pub const LOCK_KEY_PREFIX: &str = "LOCK:RESERVATION:";

const MIN_BACKOFF_MILLIS: u64 = 10;
const MAX_BACKOFF_MILLIS: u64 = 50;

/// Sorted lock keys, one per night (check-out day excluded).
#[must_use]
pub fn lock_keys(accommodation_id: AccommodationId, stay: &StayDates) -> Vec<String> {
    let mut keys: Vec<String> = stay
        .nights_iter()
        .map(|night| format!("{LOCK_KEY_PREFIX}{accommodation_id}:{night}"))
        .collect();
    keys.sort();
    keys
}

/// Atomic all-or-none lock primitive over a shared store.
#[async_trait]
pub trait LockCoordinator: Send + Sync {
    /// Take every key for `token` if none is taken. Keys expire after `lease`.
    ///
    /// Returns `false` when at least one key is held by someone else.
    async fn try_acquire(&self, keys: &[String], token: &str, lease: Duration) -> Result<bool>;

    /// Drop the keys still owned by `token`. Keys that expired or belong to
    /// another token are left alone.
    async fn release(&self, keys: &[String], token: &str) -> Result<()>;
}

/// An acquired lock.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LockLease {
    /// Locked keys, sorted.
    pub keys: Vec<String>,
    /// Owner token.
    pub token: String,
}

/// Bounded-wait lock acquisition for booking attempts.
#[derive(Clone)]
pub struct ReservationLockManager {
    coordinator: Arc<dyn LockCoordinator>,
    wait: Duration,
    lease: Duration,
}

impl ReservationLockManager {
    /// Wait at most `wait` for the lock; hold it for at most `lease`.
    #[must_use]
    pub fn new(coordinator: Arc<dyn LockCoordinator>, wait: Duration, lease: Duration) -> Self {
        Self {
            coordinator,
            wait,
            lease,
        }
    }

    /// Lock every night of `stay`.
    ///
    /// # Errors
    ///
    /// Returns [`BookingError::LockContention`] when the keys are still taken
    /// after the wait window, or the backend error.
    pub async fn acquire(&self, accommodation_id: AccommodationId, stay: &StayDates) -> Result<LockLease> {
        let keys = lock_keys(accommodation_id, stay);
        let token = Uuid::new_v4().to_string();
        let deadline = Instant::now() + self.wait;

        loop {
            if self.coordinator.try_acquire(&keys, &token, self.lease).await? {
                tracing::debug!(keys = ?keys, "Reservation lock acquired");
                return Ok(LockLease { keys, token });
            }

            let now = Instant::now();
            if now >= deadline {
                tracing::info!(accommodation_id = %accommodation_id, "Reservation lock contended");
                return Err(BookingError::LockContention);
            }
            let backoff =
                Duration::from_millis(rand::thread_rng().gen_range(MIN_BACKOFF_MILLIS..=MAX_BACKOFF_MILLIS));
            tokio::time::sleep(backoff.min(deadline - now)).await;
        }
    }

    /// Release `lease`. Idempotent; failures are logged, the lease expires anyway.
    pub async fn release(&self, lease: &LockLease) {
        if let Err(e) = self.coordinator.release(&lease.keys, &lease.token).await {
            tracing::warn!(keys = ?lease.keys, error = %e, "Failed to release reservation lock");
        }
    }

    /// Run `work` while holding the lock for `stay`; the lock is released
    /// whatever `work` returns.
    ///
    /// # Errors
    ///
    /// Returns the acquisition error or the error of `work`.
    pub async fn with_lock<T, Fut>(
        &self,
        accommodation_id: AccommodationId,
        stay: &StayDates,
        work: Fut,
    ) -> Result<T>
    where
        Fut: Future<Output = Result<T>> + Send,
    {
        let lease = self.acquire(accommodation_id, stay).await?;
        let result = work.await;
        self.release(&lease).await;
        result
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;
    use crate::mocks::InMemoryLockCoordinator;
    use chrono::{Duration as Days, NaiveDate};
    use proptest::prelude::*;

    fn stay(from: (i32, u32, u32), nights: i64) -> StayDates {
        let check_in = NaiveDate::from_ymd_opt(from.0, from.1, from.2).unwrap();
        StayDates::new(check_in, check_in + Days::days(nights)).unwrap()
    }

    #[test]
    fn keys_are_one_per_night_without_check_out() {
        let keys = lock_keys(AccommodationId(7), &stay((2025, 12, 24), 2));
        assert_eq!(
            keys,
            vec![
                "LOCK:RESERVATION:7:2025-12-24".to_string(),
                "LOCK:RESERVATION:7:2025-12-25".to_string(),
            ]
        );
    }

    #[tokio::test]
    async fn second_attempt_times_out_while_first_holds() {
        let manager = ReservationLockManager::new(
            Arc::new(InMemoryLockCoordinator::new()),
            Duration::from_millis(100),
            Duration::from_secs(10),
        );
        let first = manager.acquire(AccommodationId(1), &stay((2025, 12, 24), 2)).await.unwrap();

        let second = manager.acquire(AccommodationId(1), &stay((2025, 12, 25), 2)).await;
        assert!(matches!(second, Err(BookingError::LockContention)));

        manager.release(&first).await;
        manager.release(&first).await;
        assert!(manager.acquire(AccommodationId(1), &stay((2025, 12, 25), 2)).await.is_ok());
    }

    #[tokio::test]
    async fn lock_is_released_when_work_fails() {
        let manager = ReservationLockManager::new(
            Arc::new(InMemoryLockCoordinator::new()),
            Duration::from_millis(50),
            Duration::from_secs(10),
        );
        let dates = stay((2025, 12, 24), 1);

        let failed: Result<()> = manager
            .with_lock(AccommodationId(1), &dates, async { Err(BookingError::ReservationConflict) })
            .await;
        assert!(matches!(failed, Err(BookingError::ReservationConflict)));

        let ok = manager.with_lock(AccommodationId(1), &dates, async { Ok(1) }).await;
        assert_eq!(ok.unwrap(), 1);
    }

    proptest! {
        #[test]
        fn keys_are_sorted_and_count_nights(offset in 0_i64..2_000, nights in 1_i64..40) {
            let check_in = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap() + Days::days(offset);
            let stay = StayDates::new(check_in, check_in + Days::days(nights)).unwrap();
            let keys = lock_keys(AccommodationId(3), &stay);

            prop_assert_eq!(keys.len() as i64, nights);
            prop_assert!(keys.windows(2).all(|w| w[0] < w[1]));
        }
    }
}
