//! Redis backend for [`HoldStore`].

use crate::error::{BookingError, Result};
use crate::hold::{HOLD_VALUE, HoldStore};
use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Client};
use std::time::Duration;

/// Holds as plain Redis keys with a TTL.
#[derive(Clone)]
pub struct RedisHoldStore {
    conn_manager: ConnectionManager,
}

impl RedisHoldStore {
    /// Connect to `redis_url`.
    ///
    /// # Errors
    ///
    /// Returns [`BookingError::Hold`] if the connection cannot be established.
    pub async fn new(redis_url: &str) -> Result<Self> {
        let client = Client::open(redis_url)
            .map_err(|e| BookingError::Hold(format!("Failed to create Redis client: {e}")))?;
        let conn_manager = ConnectionManager::new(client)
            .await
            .map_err(|e| BookingError::Hold(format!("Failed to create Redis connection manager: {e}")))?;
        Ok(Self { conn_manager })
    }

    /// Use an existing connection.
    #[must_use]
    pub const fn with_connection(conn_manager: ConnectionManager) -> Self {
        Self { conn_manager }
    }
}

#[async_trait]
impl HoldStore for RedisHoldStore {
    async fn set_all(&self, keys: &[String], ttl: Duration) -> Result<()> {
        if keys.is_empty() {
            return Ok(());
        }
        let mut conn = self.conn_manager.clone();
        let ttl_ms = u64::try_from(ttl.as_millis()).unwrap_or(u64::MAX).max(1);

        let mut pipe = redis::pipe();
        pipe.atomic();
        for key in keys {
            pipe.pset_ex(key, HOLD_VALUE, ttl_ms).ignore();
        }
        let (): () = pipe
            .query_async(&mut conn)
            .await
            .map_err(|e| BookingError::Hold(format!("Failed to set hold: {e}")))?;
        Ok(())
    }

    async fn any_exists(&self, keys: &[String]) -> Result<bool> {
        if keys.is_empty() {
            return Ok(false);
        }
        let mut conn = self.conn_manager.clone();
        let count: usize = conn
            .exists(keys)
            .await
            .map_err(|e| BookingError::Hold(format!("Failed to check hold: {e}")))?;
        Ok(count > 0)
    }

    async fn delete_all(&self, keys: &[String]) -> Result<()> {
        if keys.is_empty() {
            return Ok(());
        }
        let mut conn = self.conn_manager.clone();
        let _: usize = conn
            .del(keys)
            .await
            .map_err(|e| BookingError::Hold(format!("Failed to delete hold: {e}")))?;
        Ok(())
    }
}
