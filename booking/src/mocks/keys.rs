use crate::error::Result;
use crate::hold::HoldStore;
use crate::lock::LockCoordinator;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};
use std::time::{Duration, Instant};

#[derive(Debug)]
struct Entry {
    value: String,
    expires_at: Instant,
}

impl Entry {
    fn is_live(&self, now: Instant) -> bool {
        self.expires_at > now
    }
}

/// Expiring key space shared by the lock and hold stand-ins.
#[derive(Debug, Default)]
struct KeySpace {
    entries: Mutex<HashMap<String, Entry>>,
}

impl KeySpace {
    fn with<T>(&self, f: impl FnOnce(&mut HashMap<String, Entry>, Instant) -> T) -> T {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        let now = Instant::now();
        entries.retain(|_, entry| entry.is_live(now));
        f(&mut entries, now)
    }
}

/// Lock coordinator over process memory with the all-or-none semantics of
/// the Redis script.
#[derive(Debug, Default)]
pub struct InMemoryLockCoordinator {
    keys: KeySpace,
}

impl InMemoryLockCoordinator {
    /// No keys locked.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Keys currently locked.
    #[must_use]
    pub fn locked_keys(&self) -> usize {
        self.keys.with(|entries, _| entries.len())
    }
}

#[async_trait]
impl LockCoordinator for InMemoryLockCoordinator {
    async fn try_acquire(&self, keys: &[String], token: &str, lease: Duration) -> Result<bool> {
        Ok(self.keys.with(|entries, now| {
            if keys.iter().any(|key| entries.contains_key(key)) {
                return false;
            }
            for key in keys {
                entries.insert(
                    key.clone(),
                    Entry {
                        value: token.to_string(),
                        expires_at: now + lease,
                    },
                );
            }
            true
        }))
    }

    async fn release(&self, keys: &[String], token: &str) -> Result<()> {
        self.keys.with(|entries, _| {
            for key in keys {
                if entries.get(key).is_some_and(|entry| entry.value == token) {
                    entries.remove(key);
                }
            }
        });
        Ok(())
    }
}

/// Hold store over process memory; keys expire with their TTL.
#[derive(Debug, Default)]
pub struct InMemoryHoldStore {
    keys: KeySpace,
}

impl InMemoryHoldStore {
    /// No holds.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Keys currently held.
    #[must_use]
    pub fn held_keys(&self) -> Vec<String> {
        self.keys.with(|entries, _| {
            let mut keys: Vec<String> = entries.keys().cloned().collect();
            keys.sort();
            keys
        })
    }
}

#[async_trait]
impl HoldStore for InMemoryHoldStore {
    async fn set_all(&self, keys: &[String], ttl: Duration) -> Result<()> {
        self.keys.with(|entries, now| {
            for key in keys {
                entries.insert(
                    key.clone(),
                    Entry {
                        value: crate::hold::HOLD_VALUE.to_string(),
                        expires_at: now + ttl,
                    },
                );
            }
        });
        Ok(())
    }

    async fn any_exists(&self, keys: &[String]) -> Result<bool> {
        Ok(self.keys.with(|entries, _| keys.iter().any(|key| entries.contains_key(key))))
    }

    async fn delete_all(&self, keys: &[String]) -> Result<()> {
        self.keys.with(|entries, _| {
            for key in keys {
                entries.remove(key);
            }
        });
        Ok(())
    }
}
