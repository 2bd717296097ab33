//! Periodic expiry of unpaid reservations.
//!
//! A guest who abandons checkout leaves a `PAYMENT_PENDING` row behind. The
//! sweeper expires those rows once their payment window has elapsed and
//! clears their holds, so the nights become bookable again without waiting
//! for the hold TTL.

use crate::error::Result;
use crate::hold::ReservationHolds;
use crate::reservation_tx::ReservationTransactionService;
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::{error, info, warn};

/// Expires overdue reservations on a fixed interval.
pub struct ReservationExpirySweeper {
    reservations: ReservationTransactionService,
    holds: ReservationHolds,
    interval: Duration,
}

impl ReservationExpirySweeper {
    /// Sweeper running every `interval`.
    #[must_use]
    pub const fn new(
        reservations: ReservationTransactionService,
        holds: ReservationHolds,
        interval: Duration,
    ) -> Self {
        Self {
            reservations,
            holds,
            interval,
        }
    }

    /// Expire every overdue reservation once. Returns how many were expired.
    ///
    /// A hold that cannot be removed is logged; it still runs out with its TTL.
    ///
    /// # Errors
    ///
    /// Returns the store error when the overdue batch could not be expired.
    pub async fn sweep_once(&self) -> Result<usize> {
        let expired = self.reservations.expire_overdue().await?;

        for reservation in &expired {
            if let Err(e) = self
                .holds
                .remove_hold(reservation.accommodation_id, &reservation.stay())
                .await
            {
                warn!(reservation_uid = %reservation.reservation_uid, error = %e, "Failed to clear hold of expired reservation");
            }
        }

        if !expired.is_empty() {
            info!(count = expired.len(), "Expired overdue reservations");
            metrics::counter!("booking.reservations.expired_overdue").increment(expired.len() as u64);
        }
        Ok(expired.len())
    }

    /// Spawn the sweep loop; it stops on `shutdown`.
    #[must_use]
    pub fn spawn(self, mut shutdown: broadcast::Receiver<()>) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            info!(interval = ?self.interval, "Reservation expiry sweeper started");
            let mut ticker = tokio::time::interval(self.interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = shutdown.recv() => break,
                    _ = ticker.tick() => {
                        if let Err(e) = self.sweep_once().await {
                            error!(error = %e, "Reservation expiry sweep failed");
                        }
                    }
                }
            }
            info!("Reservation expiry sweeper stopped");
        })
    }
}
