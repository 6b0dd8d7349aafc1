use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::time::{Duration, Instant};
use tracing::debug;
use uuid::Uuid;

use super::{LockError, LockHandle, LockManager, LockName, LockReleaseOutcome};

#[derive(Debug, Clone)]
struct LockEntry {
    token: Uuid,
    expires_at: Instant,
}

impl LockEntry {
    fn is_expired(&self, now: Instant) -> bool {
        now >= self.expires_at
    }
}

/// Process-local lock backend with TTL expiry
#[derive(Debug, Default)]
pub struct InMemoryLockManager {
    locks: DashMap<String, LockEntry>,
}

impl InMemoryLockManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether a live (unexpired) lock exists under `name`
    pub fn is_locked(&self, name: &LockName) -> bool {
        let now = Instant::now();
        self.locks
            .get(name.as_str())
            .is_some_and(|entry| !entry.is_expired(now))
    }

    /// Number of live locks
    pub fn held_count(&self) -> usize {
        let now = Instant::now();
        self.locks
            .iter()
            .filter(|entry| !entry.value().is_expired(now))
            .count()
    }
}

#[async_trait]
impl LockManager for InMemoryLockManager {
    async fn acquire(&self, name: &LockName, timeout: Duration) -> Result<LockHandle, LockError> {
        let now = Instant::now();
        let handle = LockHandle::new(name.clone(), timeout);
        let fresh = LockEntry {
            token: handle.token,
            expires_at: now + timeout,
        };

        match self.locks.entry(name.as_str().to_string()) {
            Entry::Occupied(mut occupied) => {
                if !occupied.get().is_expired(now) {
                    return Err(LockError::Held {
                        name: name.to_string(),
                    });
                }
                debug!(lock_name = %name, "Reclaiming expired lock");
                occupied.insert(fresh);
            }
            Entry::Vacant(vacant) => {
                vacant.insert(fresh);
            }
        }

        Ok(handle)
    }

    async fn release(&self, handle: &LockHandle) -> Result<LockReleaseOutcome, LockError> {
        let removed = self
            .locks
            .remove_if(handle.name.as_str(), |_, entry| entry.token == handle.token);

        Ok(match removed {
            Some(_) => LockReleaseOutcome::Released,
            None => LockReleaseOutcome::AlreadyExpired,
        })
    }

    fn supports_release_by_name(&self) -> bool {
        true
    }

    async fn release_by_name(&self, name: &LockName) -> Result<LockReleaseOutcome, LockError> {
        let now = Instant::now();
        Ok(match self.locks.remove(name.as_str()) {
            Some((_, entry)) if !entry.is_expired(now) => LockReleaseOutcome::Released,
            _ => LockReleaseOutcome::AlreadyExpired,
        })
    }

    fn backend_name(&self) -> &'static str {
        "in_memory"
    }
}
