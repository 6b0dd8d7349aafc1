//! Short-lived handler between upstream item events and the task layer.
//!
//! Create and change events take the scheduling lock for the item so a burst
//! of saves produces one coordination pass. The lock is held until the
//! coordinator returns and then released; its TTL bounds it if the spawned
//! task dies first. Delete events skip the lock, since deindexing is
//! idempotent.

use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::config::LocksConfig;
use crate::locking::{LockError, LockHandle, LockManager, LockName};
use crate::logging::log_lock_operation;
use crate::models::WorkItemId;

use super::coordinator::{DeindexResult, IndexResult};
use super::retry::{IndexingTasks, TaskOutcome};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItemEvent {
    Created(WorkItemId),
    Changed(WorkItemId),
    Deleted(WorkItemId),
}

impl ItemEvent {
    pub fn item_id(&self) -> WorkItemId {
        match self {
            ItemEvent::Created(id) | ItemEvent::Changed(id) | ItemEvent::Deleted(id) => *id,
        }
    }
}

/// Result of the spawned hand-off
#[derive(Debug)]
pub enum DispatchedWork {
    Indexed(TaskOutcome<IndexResult>),
    Deindexed(TaskOutcome<DeindexResult>),
}

#[derive(Debug)]
pub enum HandlerDecision {
    Dispatched(JoinHandle<DispatchedWork>),
    /// Another event for the same item holds the scheduling lock
    Duplicate,
}

impl HandlerDecision {
    pub fn is_duplicate(&self) -> bool {
        matches!(self, HandlerDecision::Duplicate)
    }

    pub fn into_handle(self) -> Option<JoinHandle<DispatchedWork>> {
        match self {
            HandlerDecision::Dispatched(handle) => Some(handle),
            HandlerDecision::Duplicate => None,
        }
    }
}

enum SchedulingLock {
    Acquired(LockHandle),
    /// No backend, or backend down
    Unavailable,
    HeldElsewhere,
}

#[derive(Clone)]
pub struct IndexingEventHandler {
    tasks: IndexingTasks,
    lock_manager: Option<Arc<dyn LockManager>>,
    lock_prefix: String,
    lock_timeout: Duration,
}

impl std::fmt::Debug for IndexingEventHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IndexingEventHandler")
            .field("lock_prefix", &self.lock_prefix)
            .field("lock_timeout", &self.lock_timeout)
            .finish()
    }
}

impl IndexingEventHandler {
    pub fn new(
        tasks: IndexingTasks,
        lock_manager: Option<Arc<dyn LockManager>>,
        locks: &LocksConfig,
    ) -> Self {
        Self {
            tasks,
            lock_manager,
            lock_prefix: locks.scheduling_lock_prefix.clone(),
            lock_timeout: locks.scheduling_lock_timeout(),
        }
    }

    pub async fn handle(&self, event: ItemEvent) -> HandlerDecision {
        let item_id = event.item_id();

        if let ItemEvent::Deleted(_) = event {
            let tasks = self.tasks.clone();
            return HandlerDecision::Dispatched(tokio::spawn(async move {
                DispatchedWork::Deindexed(tasks.deindex_item(item_id).await)
            }));
        }

        let lock_name = LockName::for_item(&self.lock_prefix, item_id);
        let handle = match self.acquire(&lock_name).await {
            SchedulingLock::Acquired(handle) => Some(handle),
            SchedulingLock::Unavailable => None,
            SchedulingLock::HeldElsewhere => {
                debug!(item_id = %item_id, "Duplicate event while scheduling lock held, dropping");
                return HandlerDecision::Duplicate;
            }
        };

        let tasks = self.tasks.clone();
        let lock_manager = self.lock_manager.clone();
        let is_creation_event = matches!(event, ItemEvent::Created(_));

        HandlerDecision::Dispatched(tokio::spawn(async move {
            let outcome = tasks.index_item(item_id, is_creation_event, None).await;
            if let (Some(manager), Some(handle)) = (lock_manager, handle) {
                release_scheduling_lock(manager.as_ref(), &handle).await;
            }
            DispatchedWork::Indexed(outcome)
        }))
    }

    async fn acquire(&self, lock_name: &LockName) -> SchedulingLock {
        let Some(manager) = &self.lock_manager else {
            return SchedulingLock::Unavailable;
        };

        match manager.acquire(lock_name, self.lock_timeout).await {
            Ok(handle) => {
                log_lock_operation("acquire_scheduling_lock", lock_name, "acquired");
                SchedulingLock::Acquired(handle)
            }
            Err(LockError::Held { .. }) => SchedulingLock::HeldElsewhere,
            Err(err) => {
                warn!(lock_name = %lock_name, error = %err, "Scheduling lock unavailable, continuing without it");
                SchedulingLock::Unavailable
            }
        }
    }
}

async fn release_scheduling_lock(manager: &dyn LockManager, handle: &LockHandle) {
    match manager.release(handle).await {
        Ok(outcome) => log_lock_operation("release_scheduling_lock", &handle.name, outcome.as_str()),
        Err(err) => warn!(lock_name = %handle.name, error = %err, "Failed to release scheduling lock"),
    }
}
