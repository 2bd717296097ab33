//! Redis backend for [`LockCoordinator`].
//!
//! Both operations are single Lua scripts, so a partially acquired or
//! partially released lock is never visible to another client.

use crate::error::{BookingError, Result};
use crate::lock::LockCoordinator;
use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::{Client, Script};
use std::time::Duration;

/// `SET NX PX` every key, but only when none of them exists.
const ACQUIRE_SCRIPT: &str = r"
for i, key in ipairs(KEYS) do
    if redis.call('EXISTS', key) == 1 then
        return 0
    end
end
for i, key in ipairs(KEYS) do
    redis.call('SET', key, ARGV[1], 'NX', 'PX', ARGV[2])
end
return 1
";

/// Delete the keys whose value is still our token.
const RELEASE_SCRIPT: &str = r"
local released = 0
for i, key in ipairs(KEYS) do
    if redis.call('GET', key) == ARGV[1] then
        released = released + redis.call('DEL', key)
    end
end
return released
";

/// Multi-key lock on a shared Redis.
#[derive(Clone)]
pub struct RedisLockCoordinator {
    conn_manager: ConnectionManager,
    acquire: Script,
    release: Script,
}

impl RedisLockCoordinator {
    /// Connect to `redis_url`.
    ///
    /// # Errors
    ///
    /// Returns [`BookingError::Lock`] if the connection cannot be established.
    pub async fn new(redis_url: &str) -> Result<Self> {
        let client = Client::open(redis_url)
            .map_err(|e| BookingError::Lock(format!("Failed to create Redis client: {e}")))?;
        let conn_manager = ConnectionManager::new(client)
            .await
            .map_err(|e| BookingError::Lock(format!("Failed to create Redis connection manager: {e}")))?;
        Ok(Self::with_connection(conn_manager))
    }

    /// Use an existing connection.
    #[must_use]
    pub fn with_connection(conn_manager: ConnectionManager) -> Self {
        Self {
            conn_manager,
            acquire: Script::new(ACQUIRE_SCRIPT),
            release: Script::new(RELEASE_SCRIPT),
        }
    }
}

#[async_trait]
impl LockCoordinator for RedisLockCoordinator {
    async fn try_acquire(&self, keys: &[String], token: &str, lease: Duration) -> Result<bool> {
        let mut conn = self.conn_manager.clone();
        let lease_ms = u64::try_from(lease.as_millis()).unwrap_or(u64::MAX).max(1);

        let mut invocation = self.acquire.prepare_invoke();
        for key in keys {
            invocation.key(key);
        }
        let acquired: i64 = invocation
            .arg(token)
            .arg(lease_ms)
            .invoke_async(&mut conn)
            .await
            .map_err(|e| BookingError::Lock(format!("Failed to acquire lock: {e}")))?;

        Ok(acquired == 1)
    }

    async fn release(&self, keys: &[String], token: &str) -> Result<()> {
        let mut conn = self.conn_manager.clone();

        let mut invocation = self.release.prepare_invoke();
        for key in keys {
            invocation.key(key);
        }
        let released: i64 = invocation
            .arg(token)
            .invoke_async(&mut conn)
            .await
            .map_err(|e| BookingError::Lock(format!("Failed to release lock: {e}")))?;

        tracing::debug!(keys = keys.len(), released, "Lock keys released");
        Ok(())
    }
}
