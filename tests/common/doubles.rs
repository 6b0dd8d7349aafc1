//! Test doubles for the coordinator's collaborators

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use indexing_coordinator::locking::{
    InMemoryLockManager, LockError, LockHandle, LockManager, LockName, LockReleaseOutcome,
};
use indexing_coordinator::models::{ActingUser, WorkItemId};
use indexing_coordinator::orchestration::AccessChecker;
use indexing_coordinator::pipelines::PipelineKind;
use indexing_coordinator::queue::{
    ChainHandle, IndexingChain, QueueError, TaskHandle, TaskQueue, TaskSignature,
};

/// One accepted `schedule` call
#[derive(Debug, Clone)]
pub struct ScheduledTask {
    pub task: TaskSignature,
    pub queue: String,
    pub countdown: Option<Duration>,
}

/// Refusal that applies to the next `remaining` calls, `None` meaning forever
#[derive(Debug, Clone)]
struct Refusal {
    error: QueueError,
    remaining: Option<u32>,
}

impl Refusal {
    /// Whether this call should be refused, consuming one use
    fn consume(&mut self) -> Option<QueueError> {
        match &mut self.remaining {
            None => Some(self.error.clone()),
            Some(0) => None,
            Some(n) => {
                *n -= 1;
                Some(self.error.clone())
            }
        }
    }
}

/// Task queue spy: records every call and refuses on demand
#[derive(Debug, Default)]
pub struct SpyTaskQueue {
    chains: Mutex<Vec<IndexingChain>>,
    tasks: Mutex<Vec<ScheduledTask>>,
    chain_calls: AtomicUsize,
    task_calls: AtomicUsize,
    chain_refusal: Mutex<Option<Refusal>>,
    task_refusals: Mutex<HashMap<PipelineKind, Refusal>>,
}

impl SpyTaskQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn refuse_chains(&self, error: QueueError) {
        *self.chain_refusal.lock() = Some(Refusal {
            error,
            remaining: None,
        });
    }

    pub fn refuse_chains_times(&self, error: QueueError, times: u32) {
        *self.chain_refusal.lock() = Some(Refusal {
            error,
            remaining: Some(times),
        });
    }

    pub fn refuse_tasks(&self, pipeline: PipelineKind, error: QueueError) {
        self.task_refusals.lock().insert(
            pipeline,
            Refusal {
                error,
                remaining: None,
            },
        );
    }

    pub fn refuse_tasks_times(&self, pipeline: PipelineKind, error: QueueError, times: u32) {
        self.task_refusals.lock().insert(
            pipeline,
            Refusal {
                error,
                remaining: Some(times),
            },
        );
    }

    /// Refuse everything, as a dead broker would
    pub fn refuse_everything(&self, error: QueueError) {
        self.refuse_chains(error.clone());
        for pipeline in PipelineKind::ALL {
            self.refuse_tasks(pipeline, error.clone());
        }
    }

    pub fn chains(&self) -> Vec<IndexingChain> {
        self.chains.lock().clone()
    }

    pub fn tasks(&self) -> Vec<ScheduledTask> {
        self.tasks.lock().clone()
    }

    /// Calls to `schedule_chain`, accepted or not
    pub fn chain_calls(&self) -> usize {
        self.chain_calls.load(Ordering::SeqCst)
    }

    /// Calls to `schedule`, accepted or not
    pub fn task_calls(&self) -> usize {
        self.task_calls.load(Ordering::SeqCst)
    }

    pub fn total_calls(&self) -> usize {
        self.chain_calls() + self.task_calls()
    }
}

#[async_trait]
impl TaskQueue for SpyTaskQueue {
    async fn schedule(
        &self,
        task: TaskSignature,
        queue: &str,
        countdown: Option<Duration>,
    ) -> Result<TaskHandle, QueueError> {
        self.task_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(refusal) = self.task_refusals.lock().get_mut(&task.pipeline()) {
            if let Some(error) = refusal.consume() {
                return Err(error);
            }
        }

        let mut tasks = self.tasks.lock();
        tasks.push(ScheduledTask {
            task,
            queue: queue.to_string(),
            countdown,
        });
        Ok(TaskHandle {
            task_id: format!("spy-task-{}", tasks.len()),
            task_name: task.task_name().to_string(),
            countdown,
            scheduled_at: Utc::now(),
        })
    }

    async fn schedule_chain(
        &self,
        chain: IndexingChain,
        _queue: &str,
    ) -> Result<ChainHandle, QueueError> {
        self.chain_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(refusal) = self.chain_refusal.lock().as_mut() {
            if let Some(error) = refusal.consume() {
                return Err(error);
            }
        }

        let step_count = chain.steps().len();
        let mut chains = self.chains.lock();
        chains.push(chain);
        Ok(ChainHandle {
            id: format!("spy-chain-{}", chains.len()),
            step_count,
            scheduled_at: Utc::now(),
        })
    }

    fn backend_name(&self) -> &'static str {
        "spy"
    }
}

/// Lock backend wrapper that counts calls and can hide release-by-name
#[derive(Debug)]
pub struct CountingLockManager {
    inner: InMemoryLockManager,
    by_name: bool,
    acquires: AtomicUsize,
    releases: AtomicUsize,
    releases_by_name: AtomicUsize,
}

impl CountingLockManager {
    pub fn new() -> Self {
        Self::with_release_by_name(true)
    }

    /// A backend that can only release with the original handle
    pub fn without_release_by_name() -> Self {
        Self::with_release_by_name(false)
    }

    fn with_release_by_name(by_name: bool) -> Self {
        Self {
            inner: InMemoryLockManager::new(),
            by_name,
            acquires: AtomicUsize::new(0),
            releases: AtomicUsize::new(0),
            releases_by_name: AtomicUsize::new(0),
        }
    }

    pub fn acquires(&self) -> usize {
        self.acquires.load(Ordering::SeqCst)
    }

    pub fn releases(&self) -> usize {
        self.releases.load(Ordering::SeqCst)
    }

    pub fn releases_by_name(&self) -> usize {
        self.releases_by_name.load(Ordering::SeqCst)
    }

    pub fn is_locked(&self, name: &LockName) -> bool {
        self.inner.is_locked(name)
    }

    pub fn held_count(&self) -> usize {
        self.inner.held_count()
    }
}

#[async_trait]
impl LockManager for CountingLockManager {
    async fn acquire(&self, name: &LockName, timeout: Duration) -> Result<LockHandle, LockError> {
        self.acquires.fetch_add(1, Ordering::SeqCst);
        self.inner.acquire(name, timeout).await
    }

    async fn release(&self, handle: &LockHandle) -> Result<LockReleaseOutcome, LockError> {
        self.releases.fetch_add(1, Ordering::SeqCst);
        self.inner.release(handle).await
    }

    fn supports_release_by_name(&self) -> bool {
        self.by_name
    }

    async fn release_by_name(&self, name: &LockName) -> Result<LockReleaseOutcome, LockError> {
        self.releases_by_name.fetch_add(1, Ordering::SeqCst);
        if !self.by_name {
            return Err(LockError::ReleaseUnsupported);
        }
        self.inner.release_by_name(name).await
    }

    fn backend_name(&self) -> &'static str {
        "counting"
    }
}

/// Lock backend that is always unreachable
#[derive(Debug, Default)]
pub struct UnavailableLockManager {
    acquires: AtomicUsize,
}

impl UnavailableLockManager {
    pub fn acquires(&self) -> usize {
        self.acquires.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl LockManager for UnavailableLockManager {
    async fn acquire(&self, _name: &LockName, _timeout: Duration) -> Result<LockHandle, LockError> {
        self.acquires.fetch_add(1, Ordering::SeqCst);
        Err(LockError::BackendUnavailable("connection refused".to_string()))
    }

    async fn release(&self, _handle: &LockHandle) -> Result<LockReleaseOutcome, LockError> {
        Err(LockError::BackendUnavailable("connection refused".to_string()))
    }

    fn backend_name(&self) -> &'static str {
        "unavailable"
    }
}

/// Access checker with a fixed answer that counts how often it was asked
#[derive(Debug)]
pub struct FixedAccessChecker {
    allow: AtomicBool,
    checks: AtomicUsize,
}

impl FixedAccessChecker {
    pub fn denying() -> Self {
        Self {
            allow: AtomicBool::new(false),
            checks: AtomicUsize::new(0),
        }
    }

    pub fn allowing() -> Self {
        Self {
            allow: AtomicBool::new(true),
            checks: AtomicUsize::new(0),
        }
    }

    pub fn checks(&self) -> usize {
        self.checks.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl AccessChecker for FixedAccessChecker {
    async fn check_access(&self, _item_id: WorkItemId, _user: &ActingUser) -> bool {
        self.checks.fetch_add(1, Ordering::SeqCst);
        self.allow.load(Ordering::SeqCst)
    }
}
