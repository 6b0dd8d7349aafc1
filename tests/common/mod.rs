// Shared fixtures for the integration suites
#![allow(dead_code)]

pub mod doubles;
pub mod strategies;

pub use doubles::*;

use std::sync::Arc;
use std::time::Duration;

use indexing_coordinator::locking::{LockManager, LockName};
use indexing_coordinator::metrics::IndexingMetrics;
use indexing_coordinator::models::{InMemoryWorkItemStore, WorkItem, WorkItemId};
use indexing_coordinator::orchestration::{
    AccessChecker, BackoffPolicy, CoordinatorConfig, IndexingCoordinator, IndexingTasks,
};
use indexing_coordinator::pipelines::{InMemoryPipeline, PipelineKind, PipelineRegistry};
use indexing_coordinator::queue::{ChainExecutor, ContinuationHandler, LocalTaskQueue, TaskQueue};
use indexing_coordinator::validation::Validator;

pub const EXECUTION_LOCK_PREFIX: &str = "index_item_lock";

pub fn execution_lock(item_id: i64) -> LockName {
    LockName::for_item(EXECUTION_LOCK_PREFIX, WorkItemId(item_id))
}

pub fn valid_items(ids: impl IntoIterator<Item = i64>) -> Vec<WorkItem> {
    ids.into_iter()
        .map(|id| WorkItem::new(id, format!("item {id}")))
        .collect()
}

/// Backoff that retries immediately
pub fn fast_backoff(max_attempts: u32) -> BackoffPolicy {
    BackoffPolicy {
        max_attempts,
        base_delay: Duration::from_millis(1),
        max_delay: Duration::from_millis(5),
        backoff_multiplier: 2.0,
        jitter: false,
    }
}

/// Coordinator wired to a spy queue, so scheduling is observed but never run
pub struct SpyFixture {
    pub store: Arc<InMemoryWorkItemStore>,
    pub queue: Arc<SpyTaskQueue>,
    pub locks: Arc<CountingLockManager>,
    pub metrics: Arc<IndexingMetrics>,
    pub coordinator: Arc<IndexingCoordinator>,
}

impl SpyFixture {
    /// Default production settings, including the 5s fallback countdown
    pub fn new(items: impl IntoIterator<Item = WorkItem>) -> Self {
        Self::build(items, None, CoordinatorConfig::default())
    }

    pub fn with_access_checker(
        items: impl IntoIterator<Item = WorkItem>,
        checker: Arc<dyn AccessChecker>,
    ) -> Self {
        Self::build(items, Some(checker), CoordinatorConfig::default())
    }

    pub fn with_config(items: impl IntoIterator<Item = WorkItem>, config: CoordinatorConfig) -> Self {
        Self::build(items, None, config)
    }

    fn build(
        items: impl IntoIterator<Item = WorkItem>,
        checker: Option<Arc<dyn AccessChecker>>,
        config: CoordinatorConfig,
    ) -> Self {
        let store = Arc::new(InMemoryWorkItemStore::with_items(items));
        let queue = Arc::new(SpyTaskQueue::new());
        let locks = Arc::new(CountingLockManager::new());
        let metrics = Arc::new(IndexingMetrics::new(Duration::from_secs(3600)));

        let mut builder = IndexingCoordinator::builder()
            .store(store.clone())
            .task_queue(queue.clone() as Arc<dyn TaskQueue>)
            .lock_manager(locks.clone() as Arc<dyn LockManager>)
            .metrics(metrics.clone())
            .config(config);
        if let Some(checker) = checker {
            builder = builder.access_checker(checker);
        }

        Self {
            store,
            queue,
            locks,
            metrics,
            coordinator: Arc::new(builder.build().expect("coordinator builds")),
        }
    }

    pub fn tasks(&self, max_attempts: u32) -> IndexingTasks {
        IndexingTasks::new(self.coordinator.clone(), fast_backoff(max_attempts))
    }
}

/// Coordinator wired to the local queue and in-memory pipelines, so chains
/// actually execute
pub struct LocalFixture {
    pub store: Arc<InMemoryWorkItemStore>,
    pub search: Arc<InMemoryPipeline>,
    pub hierarchy: Arc<InMemoryPipeline>,
    pub locks: Arc<CountingLockManager>,
    pub metrics: Arc<IndexingMetrics>,
    pub queue: Arc<LocalTaskQueue>,
    pub coordinator: Arc<IndexingCoordinator>,
}

impl LocalFixture {
    pub fn new(items: impl IntoIterator<Item = WorkItem>) -> Self {
        Self::with_lock_manager(items, Arc::new(CountingLockManager::new()))
    }

    pub fn with_lock_manager(
        items: impl IntoIterator<Item = WorkItem>,
        locks: Arc<CountingLockManager>,
    ) -> Self {
        let store = Arc::new(InMemoryWorkItemStore::with_items(items));
        let search = Arc::new(InMemoryPipeline::new(PipelineKind::Search));
        let hierarchy = Arc::new(InMemoryPipeline::new(PipelineKind::Hierarchy));
        let metrics = Arc::new(IndexingMetrics::new(Duration::from_secs(3600)));

        let pipelines = PipelineRegistry::new()
            .register(search.clone())
            .register(hierarchy.clone());
        let executor = ChainExecutor::new(
            Validator::new(store.clone()),
            pipelines,
            ContinuationHandler::new(Some(locks.clone() as Arc<dyn LockManager>), metrics.clone()),
        );
        let queue = Arc::new(LocalTaskQueue::new(Arc::new(executor)));

        let coordinator = IndexingCoordinator::builder()
            .store(store.clone())
            .task_queue(queue.clone() as Arc<dyn TaskQueue>)
            .lock_manager(locks.clone() as Arc<dyn LockManager>)
            .metrics(metrics.clone())
            .config(CoordinatorConfig::for_testing())
            .build()
            .expect("coordinator builds");

        Self {
            store,
            search,
            hierarchy,
            locks,
            metrics,
            queue,
            coordinator: Arc::new(coordinator),
        }
    }
}
