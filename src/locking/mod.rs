//! # Lock Manager Adapter
//!
//! Named, TTL-bounded mutual exclusion used by the coordinator and the event
//! handler. Two tiers share the same backend but use independent name
//! prefixes:
//!
//! - **Scheduling locks** (seconds): held while deciding whether to schedule.
//! - **Execution locks** (minutes): held until an indexing chain finishes and
//!   released by the chain's continuation.
//!
//! A backend that cannot release by name reports it through
//! [`LockManager::supports_release_by_name`]; callers then rely on TTL expiry
//! and record [`LockReleaseOutcome::SkippedBackendLimitation`].

pub mod in_memory;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use uuid::Uuid;

use crate::models::WorkItemId;

pub use in_memory::InMemoryLockManager;

/// Deterministic lock name derived from a purpose prefix and an item id
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LockName(String);

impl LockName {
    pub fn for_item(prefix: &str, item_id: WorkItemId) -> Self {
        Self(format!("{prefix}_{item_id}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for LockName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Proof of acquisition; the token prevents a stale holder from releasing
/// a lock that expired and was re-acquired by someone else
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockHandle {
    pub name: LockName,
    pub token: Uuid,
    pub acquired_at: DateTime<Utc>,
    pub timeout: Duration,
}

impl LockHandle {
    pub fn new(name: LockName, timeout: Duration) -> Self {
        Self {
            name,
            token: Uuid::new_v4(),
            acquired_at: Utc::now(),
            timeout,
        }
    }
}

/// How a release attempt ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LockReleaseOutcome {
    Released,
    /// Lock had already expired or was taken over by another holder
    AlreadyExpired,
    /// Backend cannot release by name, TTL expiry will free the lock
    SkippedBackendLimitation,
    Failed,
}

impl LockReleaseOutcome {
    pub const ALL: [LockReleaseOutcome; 4] = [
        LockReleaseOutcome::Released,
        LockReleaseOutcome::AlreadyExpired,
        LockReleaseOutcome::SkippedBackendLimitation,
        LockReleaseOutcome::Failed,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            LockReleaseOutcome::Released => "released",
            LockReleaseOutcome::AlreadyExpired => "already_expired",
            LockReleaseOutcome::SkippedBackendLimitation => "skipped_backend_limitation",
            LockReleaseOutcome::Failed => "failed",
        }
    }
}

/// Errors reported by lock backends
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum LockError {
    #[error("lock '{name}' is already held")]
    Held { name: String },

    #[error("lock backend unavailable: {0}")]
    BackendUnavailable(String),

    #[error("lock backend does not support release by name")]
    ReleaseUnsupported,
}

/// Named lock backend
#[async_trait]
pub trait LockManager: Send + Sync {
    /// Acquire without waiting; `LockError::Held` when another holder exists
    async fn acquire(&self, name: &LockName, timeout: Duration) -> Result<LockHandle, LockError>;

    /// Release a lock this caller acquired
    async fn release(&self, handle: &LockHandle) -> Result<LockReleaseOutcome, LockError>;

    /// Whether [`LockManager::release_by_name`] is implemented
    fn supports_release_by_name(&self) -> bool {
        false
    }

    /// Release whoever holds `name`, used by continuations that only carry the name
    async fn release_by_name(&self, _name: &LockName) -> Result<LockReleaseOutcome, LockError> {
        Err(LockError::ReleaseUnsupported)
    }

    fn backend_name(&self) -> &'static str;
}
