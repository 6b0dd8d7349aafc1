//! # Indexing System Bootstrap
//!
//! Wires the in-process deployment: configuration, metrics, the chain
//! executor behind a [`LocalTaskQueue`], the coordinator, the retrying task
//! layer and the event handler. Storage, pipelines, locking and access
//! checks are supplied by the embedding application.

use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::config::ConfigManager;
use crate::error::{IndexingError, Result};
use crate::locking::LockManager;
use crate::metrics::{spawn_summary_reporter, IndexingMetrics};
use crate::models::WorkItemStore;
use crate::orchestration::{
    AccessChecker, BackoffPolicy, CoordinatorConfig, IndexingCoordinator, IndexingEventHandler,
    IndexingTasks,
};
use crate::pipelines::PipelineRegistry;
use crate::queue::{ChainExecutor, ContinuationHandler, LocalTaskQueue, TaskQueue};
use crate::validation::Validator;

/// Collaborators owned by the embedding application
pub struct SystemComponents {
    pub store: Arc<dyn WorkItemStore>,
    pub pipelines: PipelineRegistry,
    pub lock_manager: Option<Arc<dyn LockManager>>,
    pub access_checker: Option<Arc<dyn AccessChecker>>,
}

impl SystemComponents {
    pub fn new(store: Arc<dyn WorkItemStore>, pipelines: PipelineRegistry) -> Self {
        Self {
            store,
            pipelines,
            lock_manager: None,
            access_checker: None,
        }
    }

    pub fn with_lock_manager(mut self, lock_manager: Arc<dyn LockManager>) -> Self {
        self.lock_manager = Some(lock_manager);
        self
    }

    pub fn with_access_checker(mut self, access_checker: Arc<dyn AccessChecker>) -> Self {
        self.access_checker = Some(access_checker);
        self
    }
}

/// Handle to a running in-process indexing system
pub struct IndexingSystem {
    config_manager: Arc<ConfigManager>,
    metrics: Arc<IndexingMetrics>,
    task_queue: Arc<LocalTaskQueue>,
    coordinator: Arc<IndexingCoordinator>,
    tasks: IndexingTasks,
    event_handler: IndexingEventHandler,
    reporter: Option<JoinHandle<()>>,
}

impl std::fmt::Debug for IndexingSystem {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IndexingSystem")
            .field("environment", &self.config_manager.environment())
            .field("coordinator", &self.coordinator)
            .field("reporter_running", &self.reporter.is_some())
            .finish()
    }
}

impl IndexingSystem {
    pub fn bootstrap(config_manager: Arc<ConfigManager>, components: SystemComponents) -> Result<Self> {
        if !components.pipelines.is_complete() {
            return Err(IndexingError::Configuration(format!(
                "pipeline registry incomplete, registered: {:?}",
                components.pipelines.kinds()
            )));
        }

        let config = config_manager.config();
        let metrics = Arc::new(IndexingMetrics::from_config(&config.metrics));

        let executor = ChainExecutor::new(
            Validator::new(components.store.clone()),
            components.pipelines,
            ContinuationHandler::new(components.lock_manager.clone(), metrics.clone()),
        );
        let task_queue = Arc::new(LocalTaskQueue::new(Arc::new(executor)));

        let mut builder = IndexingCoordinator::builder()
            .store(components.store)
            .task_queue(task_queue.clone() as Arc<dyn TaskQueue>)
            .metrics(metrics.clone())
            .config(CoordinatorConfig::from(config));
        if let Some(lock_manager) = &components.lock_manager {
            builder = builder.lock_manager(lock_manager.clone());
        }
        if let Some(access_checker) = components.access_checker {
            builder = builder.access_checker(access_checker);
        }
        let coordinator = Arc::new(builder.build()?);

        let tasks = IndexingTasks::new(coordinator.clone(), BackoffPolicy::from(&config.retry));
        let event_handler =
            IndexingEventHandler::new(tasks.clone(), components.lock_manager, &config.locks);

        info!(
            environment = config_manager.environment(),
            queue = %config.queues.indexing_queue,
            "🚀 Indexing system bootstrapped"
        );

        Ok(Self {
            config_manager,
            metrics,
            task_queue,
            coordinator,
            tasks,
            event_handler,
            reporter: None,
        })
    }

    /// Start periodic metrics summaries at the configured interval
    pub fn start_metrics_reporter(&mut self) {
        if self.reporter.is_some() {
            warn!("Metrics reporter already running");
            return;
        }
        let interval = self.config_manager.config().metrics.summary_interval();
        self.reporter = Some(spawn_summary_reporter(self.metrics.clone(), interval));
    }

    pub fn config_manager(&self) -> &Arc<ConfigManager> {
        &self.config_manager
    }

    pub fn metrics(&self) -> &Arc<IndexingMetrics> {
        &self.metrics
    }

    pub fn task_queue(&self) -> &Arc<LocalTaskQueue> {
        &self.task_queue
    }

    pub fn coordinator(&self) -> &Arc<IndexingCoordinator> {
        &self.coordinator
    }

    pub fn tasks(&self) -> &IndexingTasks {
        &self.tasks
    }

    pub fn event_handler(&self) -> &IndexingEventHandler {
        &self.event_handler
    }

    /// Stop the reporter and wait for scheduled work to finish
    pub async fn shutdown(mut self) {
        if let Some(reporter) = self.reporter.take() {
            reporter.abort();
        }
        self.task_queue.drain().await;
        info!(summary = %self.metrics.snapshot().summary_line(), "🛑 Indexing system stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::IndexingConfig;
    use crate::locking::InMemoryLockManager;
    use crate::models::{InMemoryWorkItemStore, WorkItem, WorkItemId};
    use crate::pipelines::{InMemoryPipeline, PipelineKind};

    #[tokio::test]
    async fn test_incomplete_registry_is_rejected() {
        let config = ConfigManager::from_config(IndexingConfig::for_testing(), "test").unwrap();
        let components = SystemComponents::new(
            Arc::new(InMemoryWorkItemStore::new()),
            PipelineRegistry::new().register(Arc::new(InMemoryPipeline::new(PipelineKind::Search))),
        );

        let err = IndexingSystem::bootstrap(config, components).unwrap_err();
        assert!(matches!(err, IndexingError::Configuration(_)));
    }

    #[tokio::test]
    async fn test_end_to_end_indexing_releases_lock() {
        let config = ConfigManager::from_config(IndexingConfig::for_testing(), "test").unwrap();
        let search = Arc::new(InMemoryPipeline::new(PipelineKind::Search));
        let hierarchy = Arc::new(InMemoryPipeline::new(PipelineKind::Hierarchy));
        let locks = Arc::new(InMemoryLockManager::new());
        let components = SystemComponents::new(
            Arc::new(InMemoryWorkItemStore::with_items([WorkItem::new(9, "Data sheet")])),
            PipelineRegistry::new()
                .register(search.clone())
                .register(hierarchy.clone()),
        )
        .with_lock_manager(locks.clone());

        let mut system = IndexingSystem::bootstrap(config, components).unwrap();
        system.start_metrics_reporter();

        let outcome = system.tasks().index_item(WorkItemId(9), true, None).await;
        assert!(outcome.result.unwrap().is_success());

        system.task_queue().drain().await;
        assert!(search.contains(WorkItemId(9)));
        assert!(hierarchy.contains(WorkItemId(9)));
        assert_eq!(locks.held_count(), 0);

        system.shutdown().await;
    }
}
