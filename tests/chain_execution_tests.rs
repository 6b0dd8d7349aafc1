//! Chains running on the local queue against in-memory pipelines

mod common;

use async_trait::async_trait;
use std::sync::Arc;

use common::*;
use indexing_coordinator::error::Result;
use indexing_coordinator::locking::{LockManager, LockReleaseOutcome};
use indexing_coordinator::metrics::IndexingMetrics;
use indexing_coordinator::models::{InMemoryWorkItemStore, WorkItem, WorkItemId};
use indexing_coordinator::orchestration::{CoordinatorConfig, IndexingCoordinator, SchedulingPath};
use indexing_coordinator::pipelines::{IndexPipeline, InMemoryPipeline, PipelineKind, PipelineRegistry};
use indexing_coordinator::queue::{
    ChainExecutor, ContinuationHandler, ContinuationPath, LocalTaskQueue, TaskQueue,
};
use indexing_coordinator::validation::Validator;

#[tokio::test]
async fn test_chain_indexes_both_pipelines_and_releases_lock() {
    let fixture = LocalFixture::new(valid_items([42]));

    let result = fixture
        .coordinator
        .index_item(WorkItemId(42), true, None)
        .await
        .unwrap();
    fixture.queue.drain().await;

    assert_eq!(result.scheduling, SchedulingPath::Chain);
    assert!(fixture.search.contains(WorkItemId(42)));
    assert!(fixture.hierarchy.contains(WorkItemId(42)));
    assert!(!fixture.locks.is_locked(&execution_lock(42)));
    assert_eq!(fixture.locks.releases_by_name(), 1);

    let reports = fixture.queue.chain_reports();
    assert_eq!(reports.len(), 1);
    assert_eq!(reports[0].path, ContinuationPath::Success);
    assert_eq!(
        reports[0].dispatched,
        vec![PipelineKind::Search, PipelineKind::Hierarchy]
    );
    assert_eq!(reports[0].release_outcome, Some(LockReleaseOutcome::Released));
}

#[tokio::test]
async fn test_item_can_be_reindexed_once_chain_finishes() {
    let fixture = LocalFixture::new(valid_items([42]));

    fixture
        .coordinator
        .index_item(WorkItemId(42), true, None)
        .await
        .unwrap();
    fixture.queue.drain().await;
    let again = fixture
        .coordinator
        .index_item(WorkItemId(42), false, None)
        .await
        .unwrap();
    fixture.queue.drain().await;

    assert!(again.is_success());
    assert_eq!(fixture.search.index_calls().len(), 2);
    assert_eq!(fixture.hierarchy.index_calls().len(), 2);
}

#[tokio::test]
async fn test_failing_final_step_releases_lock_exactly_once() {
    let fixture = LocalFixture::new(valid_items([42]));
    fixture.hierarchy.set_failing(true);

    fixture
        .coordinator
        .index_item(WorkItemId(42), false, None)
        .await
        .unwrap();
    fixture.queue.drain().await;

    assert!(fixture.search.contains(WorkItemId(42)));
    assert!(!fixture.hierarchy.contains(WorkItemId(42)));

    let reports = fixture.queue.chain_reports();
    assert_eq!(reports[0].path, ContinuationPath::Error);
    assert!(reports[0].error.is_some());
    assert_eq!(reports[0].release_outcome, Some(LockReleaseOutcome::Released));

    assert_eq!(fixture.locks.releases_by_name(), 1);
    assert_eq!(fixture.locks.releases(), 0);
    assert!(!fixture.locks.is_locked(&execution_lock(42)));
    assert_eq!(fixture.metrics.snapshot().lock_releases.get("released"), Some(&1));
}

#[tokio::test]
async fn test_failing_first_step_stops_the_chain() {
    let fixture = LocalFixture::new(valid_items([42]));
    fixture.search.set_failing(true);

    fixture
        .coordinator
        .index_item(WorkItemId(42), false, None)
        .await
        .unwrap();
    fixture.queue.drain().await;

    assert_eq!(fixture.search.index_calls(), vec![WorkItemId(42)]);
    assert!(fixture.hierarchy.index_calls().is_empty());
    assert_eq!(fixture.locks.releases_by_name(), 1);
    assert!(!fixture.locks.is_locked(&execution_lock(42)));
}

#[tokio::test]
async fn test_backend_without_release_by_name_leaves_lock_to_ttl() {
    let locks = Arc::new(CountingLockManager::without_release_by_name());
    let fixture = LocalFixture::with_lock_manager(valid_items([42]), locks);

    fixture
        .coordinator
        .index_item(WorkItemId(42), false, None)
        .await
        .unwrap();
    fixture.queue.drain().await;

    let reports = fixture.queue.chain_reports();
    assert_eq!(reports[0].path, ContinuationPath::Success);
    assert_eq!(
        reports[0].release_outcome,
        Some(LockReleaseOutcome::SkippedBackendLimitation)
    );
    assert_eq!(fixture.locks.releases_by_name(), 0);
    assert!(fixture.locks.is_locked(&execution_lock(42)));
    assert_eq!(
        fixture
            .metrics
            .snapshot()
            .lock_releases
            .get("skipped_backend_limitation"),
        Some(&1)
    );
}

#[tokio::test]
async fn test_closed_queue_blocks_chain_and_fallback() {
    let fixture = LocalFixture::new(valid_items([42]));
    fixture.queue.close();

    let result = fixture
        .coordinator
        .index_item(WorkItemId(42), false, None)
        .await
        .unwrap();
    fixture.queue.drain().await;

    assert_eq!(result.errors.len(), 3);
    assert!(!result.is_scheduled());
    assert!(fixture.search.index_calls().is_empty());
    assert!(!fixture.locks.is_locked(&execution_lock(42)));
}

/// Search pipeline that trashes the item as a side effect, simulating a user
/// deleting it between the two legs of a chain
struct TrashingSearchPipeline {
    store: Arc<InMemoryWorkItemStore>,
    inner: InMemoryPipeline,
}

#[async_trait]
impl IndexPipeline for TrashingSearchPipeline {
    fn kind(&self) -> PipelineKind {
        PipelineKind::Search
    }

    async fn index_item(&self, item: &WorkItem) -> Result<()> {
        self.inner.index_item(item).await?;
        self.store.trash(item.id);
        Ok(())
    }

    async fn remove_item(&self, id: WorkItemId) -> Result<()> {
        self.inner.remove_item(id).await
    }
}

#[tokio::test]
async fn test_item_trashed_between_legs_skips_hierarchy() {
    let store = Arc::new(InMemoryWorkItemStore::with_items(valid_items([42])));
    let hierarchy = Arc::new(InMemoryPipeline::new(PipelineKind::Hierarchy));
    let locks = Arc::new(CountingLockManager::new());
    let metrics = Arc::new(IndexingMetrics::default());

    let pipelines = PipelineRegistry::new()
        .register(Arc::new(TrashingSearchPipeline {
            store: store.clone(),
            inner: InMemoryPipeline::new(PipelineKind::Search),
        }))
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
        .metrics(metrics)
        .config(CoordinatorConfig::for_testing())
        .build()
        .unwrap();

    coordinator.index_item(WorkItemId(42), false, None).await.unwrap();
    queue.drain().await;

    let reports = queue.chain_reports();
    assert_eq!(reports[0].dispatched, vec![PipelineKind::Search]);
    assert_eq!(reports[0].skipped, vec![PipelineKind::Hierarchy]);
    assert_eq!(reports[0].path, ContinuationPath::Success);
    assert!(hierarchy.index_calls().is_empty());
    assert!(!locks.is_locked(&execution_lock(42)));
}

#[tokio::test]
async fn test_deindex_tasks_remove_from_both_pipelines() {
    let fixture = LocalFixture::new(valid_items([42]));
    fixture
        .coordinator
        .index_item(WorkItemId(42), true, None)
        .await
        .unwrap();
    fixture.queue.drain().await;

    let result = fixture.coordinator.deindex_item(WorkItemId(42)).await;
    fixture.queue.drain().await;

    assert!(result.is_success());
    assert!(!fixture.search.contains(WorkItemId(42)));
    assert!(!fixture.hierarchy.contains(WorkItemId(42)));
    assert_eq!(fixture.queue.completed_tasks().len(), 2);
}
