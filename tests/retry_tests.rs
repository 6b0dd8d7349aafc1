//! Task layer: bounded retries over the coordinator

mod common;

use std::time::Duration;

use common::*;
use indexing_coordinator::error::ErrorType;
use indexing_coordinator::locking::LockManager;
use indexing_coordinator::models::{WorkItem, WorkItemId};
use indexing_coordinator::orchestration::{BatchRequest, SchedulingPath, TaskDisposition};
use indexing_coordinator::pipelines::PipelineKind;
use indexing_coordinator::queue::QueueError;

fn broker_down() -> QueueError {
    QueueError::BrokerUnavailable("connection refused".to_string())
}

#[tokio::test]
async fn test_transient_outage_is_retried_until_it_clears() {
    let fixture = SpyFixture::new(valid_items([42]));
    fixture.queue.refuse_chains_times(broker_down(), 1);
    fixture
        .queue
        .refuse_tasks_times(PipelineKind::Search, broker_down(), 1);
    fixture
        .queue
        .refuse_tasks_times(PipelineKind::Hierarchy, broker_down(), 1);

    let outcome = fixture.tasks(3).index_item(WorkItemId(42), false, None).await;

    assert_eq!(outcome.disposition, TaskDisposition::Completed);
    assert_eq!(outcome.attempts, 2);
    assert!(outcome.retried);
    assert!(!outcome.gave_up);
    let result = outcome.result.unwrap();
    assert_eq!(result.scheduling, SchedulingPath::Chain);
    assert!(result.chain_task_id.is_some());
    assert_eq!(fixture.queue.chain_calls(), 2);

    let snapshot = fixture.metrics.snapshot();
    assert_eq!(snapshot.retry_count, 1);
    assert_eq!(snapshot.retries_by_attempt.get(&1), Some(&1));
}

#[tokio::test]
async fn test_persistent_outage_gives_up_after_max_attempts() {
    let fixture = SpyFixture::new(valid_items([42]));
    fixture.queue.refuse_everything(broker_down());

    let outcome = fixture.tasks(3).index_item(WorkItemId(42), false, None).await;

    assert_eq!(outcome.disposition, TaskDisposition::RetriesExhausted);
    assert_eq!(outcome.attempts, 3);
    assert!(outcome.gave_up);
    let result = outcome.result.unwrap();
    assert_eq!(result.errors.len(), 3);
    assert_eq!(fixture.queue.chain_calls(), 3);
    // Every attempt released its own lock
    assert!(!fixture.locks.is_locked(&execution_lock(42)));
    assert_eq!(fixture.metrics.snapshot().retry_count, 2);
}

#[tokio::test]
async fn test_invalid_item_is_not_retried() {
    let fixture = SpyFixture::new([WorkItem::new(1, "binned").trashed()]);

    let outcome = fixture.tasks(5).index_item(WorkItemId(1), false, None).await;

    assert_eq!(outcome.disposition, TaskDisposition::NotRetryable);
    assert_eq!(outcome.attempts, 1);
    assert!(!outcome.retried);
    assert_eq!(outcome.result.unwrap().error_type, Some(ErrorType::Trashed));
}

#[tokio::test]
async fn test_in_progress_item_is_not_retried() {
    let fixture = SpyFixture::new(valid_items([7]));
    fixture
        .locks
        .acquire(&execution_lock(7), Duration::from_secs(60))
        .await
        .unwrap();

    let outcome = fixture.tasks(5).index_item(WorkItemId(7), false, None).await;

    assert_eq!(outcome.disposition, TaskDisposition::NotRetryable);
    assert_eq!(outcome.attempts, 1);
    assert_eq!(outcome.result.unwrap().error_type, Some(ErrorType::LockHeld));
}

#[tokio::test]
async fn test_partial_fallback_is_marked_and_not_retried() {
    let fixture = SpyFixture::new(valid_items([42]));
    fixture.queue.refuse_chains(broker_down());
    fixture
        .queue
        .refuse_tasks(PipelineKind::Hierarchy, broker_down());

    let outcome = fixture.tasks(3).index_item(WorkItemId(42), false, None).await;

    assert_eq!(outcome.disposition, TaskDisposition::PartialSuccess);
    assert_eq!(outcome.attempts, 1);
    let result = outcome.result.unwrap();
    assert!(result.partial_success);
    assert!(result.search_indexed);
    assert!(!result.hierarchy_indexed);
    // Only the first pass reached the queue
    assert_eq!(fixture.queue.chain_calls(), 1);
    assert_eq!(fixture.queue.tasks().len(), 1);
}

#[tokio::test]
async fn test_non_transient_scheduling_failure_is_not_retried() {
    let fixture = SpyFixture::new(valid_items([42]));
    fixture
        .queue
        .refuse_everything(QueueError::Rejected("invalid routing key".to_string()));

    let outcome = fixture.tasks(3).index_item(WorkItemId(42), false, None).await;

    assert_eq!(outcome.disposition, TaskDisposition::NotRetryable);
    assert_eq!(outcome.attempts, 1);
    assert_eq!(fixture.queue.chain_calls(), 1);
}

#[tokio::test]
async fn test_store_read_failure_is_retried() {
    let fixture = SpyFixture::new(valid_items([9]));
    fixture.store.fail_next_reads(1);

    let outcome = fixture.tasks(3).index_item(WorkItemId(9), false, None).await;

    assert_eq!(outcome.disposition, TaskDisposition::Completed);
    assert_eq!(outcome.attempts, 2);
    assert!(outcome.result.is_ok());
}

#[tokio::test]
async fn test_deindex_retries_only_the_failed_leg() {
    let fixture = SpyFixture::new(Vec::new());
    fixture
        .queue
        .refuse_tasks_times(PipelineKind::Hierarchy, broker_down(), 1);

    let outcome = fixture.tasks(3).deindex_item(WorkItemId(42)).await;

    assert_eq!(outcome.disposition, TaskDisposition::Completed);
    assert_eq!(outcome.attempts, 2);
    let result = outcome.result.unwrap();
    assert!(result.is_success());
    assert!(result.search_removed);
    assert!(result.hierarchy_removed);
    assert_eq!(result.task_ids.len(), 2);

    // search once, hierarchy twice (refused then accepted)
    assert_eq!(fixture.queue.task_calls(), 3);
    let accepted: Vec<PipelineKind> = fixture
        .queue
        .tasks()
        .iter()
        .map(|scheduled| scheduled.task.pipeline())
        .collect();
    assert_eq!(accepted, vec![PipelineKind::Search, PipelineKind::Hierarchy]);
}

#[tokio::test]
async fn test_deindex_with_non_transient_failure_stops() {
    let fixture = SpyFixture::new(Vec::new());
    fixture.queue.refuse_tasks(
        PipelineKind::Search,
        QueueError::InvalidChain("unknown task name".to_string()),
    );

    let outcome = fixture.tasks(3).deindex_item(WorkItemId(42)).await;

    assert_eq!(outcome.disposition, TaskDisposition::NotRetryable);
    assert_eq!(outcome.attempts, 1);
    let result = outcome.result.unwrap();
    assert_eq!(result.failed_pipelines(), vec![PipelineKind::Search]);
    assert!(result.hierarchy_removed);
}

#[tokio::test]
async fn test_batch_task_passes_through() {
    let fixture = SpyFixture::new(valid_items(1..=3));

    let outcome = fixture
        .tasks(3)
        .index_batch(BatchRequest::new((1..=3).map(WorkItemId)))
        .await;

    assert_eq!(outcome.disposition, TaskDisposition::Completed);
    assert_eq!(outcome.result.unwrap().success_count, 3);
}
