//! # Indexing Coordinator
//!
//! Owns the per-item lifecycle of an indexing request. The coordinator only
//! decides and schedules; downstream index writes happen on the task queue's
//! workers.
//!
//! ## Single-item flow
//!
//! ```text
//! permission ──▶ validate ──▶ execution lock ──▶ schedule chain
//!     │              │              │                  │
//!   denied        invalid         held            broker error
//!     ▼              ▼              ▼                  ▼
//!  result         result         result        fallback tasks
//!                                                    │
//!                                    none accepted ──┴── some accepted
//!                                          ▼                  ▼
//!                                   release lock now    lock expires by TTL
//! ```
//!
//! When the chain is accepted the lock stays held; the chain's continuation
//! releases it after the last step, on success and on error alike. Directly
//! scheduled fallback tasks carry no continuation, so after a fallback that
//! accepted at least one task the lock is left to expire. It is released
//! before returning only when nothing was scheduled at all.
//!
//! `search_indexed` and `hierarchy_indexed` mean *accepted for scheduling*.
//! [`IndexResult::scheduling`] says which path accepted the work.

use serde::Serialize;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, instrument, warn};

use crate::config::IndexingConfig;
use crate::constants;
use crate::error::{ErrorType, IndexingError, Result};
use crate::locking::{LockError, LockHandle, LockManager, LockName, LockReleaseOutcome};
use crate::logging::{log_index_operation, log_lock_operation};
use crate::metrics::IndexingMetrics;
use crate::models::{ActingUser, WorkItemId, WorkItemStore};
use crate::pipelines::PipelineKind;
use crate::queue::{Continuation, IndexTrigger, IndexingChain, TaskQueue, TaskSignature};
use crate::validation::{Validation, Validator};

use super::access::AccessChecker;

/// Settings the coordinator reads on every call
#[derive(Debug, Clone, PartialEq)]
pub struct CoordinatorConfig {
    pub execution_lock_prefix: String,
    pub execution_lock_timeout: Duration,
    pub indexing_queue: String,
    pub fallback_hierarchy_countdown: Duration,
    pub chunk_size: usize,
    pub max_batch_size: usize,
    pub fail_fast: bool,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self::from(&IndexingConfig::default())
    }
}

impl From<&IndexingConfig> for CoordinatorConfig {
    fn from(config: &IndexingConfig) -> Self {
        Self {
            execution_lock_prefix: config.locks.execution_lock_prefix.clone(),
            execution_lock_timeout: config.locks.execution_lock_timeout(),
            indexing_queue: config.queues.indexing_queue.clone(),
            fallback_hierarchy_countdown: config.queues.fallback_hierarchy_countdown(),
            chunk_size: config.batch.chunk_size,
            max_batch_size: config.batch.max_batch_size,
            fail_fast: config.batch.fail_fast,
        }
    }
}

impl CoordinatorConfig {
    pub fn for_testing() -> Self {
        Self::from(&IndexingConfig::for_testing())
    }
}

/// Which mechanism accepted the work
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SchedulingPath {
    /// The conditional chain was accepted
    Chain,
    /// The chain was refused and at least one direct task was accepted
    Fallback,
    /// Nothing was scheduled
    None,
}

/// What happened to the execution lock during one call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "state", content = "outcome", rename_all = "snake_case")]
pub enum LockDisposition {
    /// The call returned before reaching the lock
    NotAttempted,
    /// No lock manager configured
    NotConfigured,
    /// Lock backend unreachable, proceeded without deduplication
    BackendUnavailable,
    Acquired,
    AlreadyHeld,
    /// Held until the chain's continuation releases it
    DeferredToContinuation,
    /// Fallback tasks were scheduled; the lock frees itself by TTL
    HeldUntilTtl,
    ReleasedImmediately(LockReleaseOutcome),
}

/// Outcome of [`IndexingCoordinator::index_item`]
#[derive(Debug, Clone, Serialize)]
pub struct IndexResult {
    pub item_id: WorkItemId,
    /// Search dispatch accepted for scheduling
    pub search_indexed: bool,
    /// Hierarchy dispatch accepted for scheduling
    pub hierarchy_indexed: bool,
    pub scheduling: SchedulingPath,
    pub chain_task_id: Option<String>,
    pub fallback_task_ids: Vec<String>,
    pub error: Option<String>,
    pub error_type: Option<ErrorType>,
    /// Every scheduling failure seen during the call
    pub errors: Vec<String>,
    pub lock: LockDisposition,
    /// Set by the task layer when a fallback left one pipeline unscheduled
    pub partial_success: bool,
    #[serde(skip)]
    pub cause: Option<IndexingError>,
}

impl IndexResult {
    /// Empty result: nothing scheduled, no error
    pub fn new(item_id: WorkItemId) -> Self {
        Self {
            item_id,
            search_indexed: false,
            hierarchy_indexed: false,
            scheduling: SchedulingPath::None,
            chain_task_id: None,
            fallback_task_ids: Vec::new(),
            error: None,
            error_type: None,
            errors: Vec::new(),
            lock: LockDisposition::NotAttempted,
            partial_success: false,
            cause: None,
        }
    }

    fn rejected(item_id: WorkItemId, cause: IndexingError, lock: LockDisposition) -> Self {
        Self {
            error: Some(cause.to_string()),
            error_type: Some(cause.error_type()),
            lock,
            cause: Some(cause),
            ..Self::new(item_id)
        }
    }

    fn rejected_with_message(
        item_id: WorkItemId,
        message: &str,
        cause: IndexingError,
        lock: LockDisposition,
    ) -> Self {
        Self {
            error: Some(message.to_string()),
            ..Self::rejected(item_id, cause, lock)
        }
    }

    /// At least one pipeline was accepted for scheduling
    pub fn is_scheduled(&self) -> bool {
        self.search_indexed || self.hierarchy_indexed
    }

    /// Work accepted in full with nothing to report
    pub fn is_success(&self) -> bool {
        self.is_scheduled() && self.error.is_none() && self.error_type.is_none()
    }

    /// Fallback scheduled exactly one of the two pipelines
    pub fn is_partial_fallback(&self) -> bool {
        self.scheduling == SchedulingPath::Fallback && self.search_indexed != self.hierarchy_indexed
    }

    fn mark_scheduled(&mut self, pipeline: PipelineKind) {
        match pipeline {
            PipelineKind::Search => self.search_indexed = true,
            PipelineKind::Hierarchy => self.hierarchy_indexed = true,
        }
    }

    fn record_scheduling_error(&mut self, context: &str, err: IndexingError) {
        self.errors.push(format!("{context}: {err}"));
        self.cause = Some(err);
    }
}

/// Failure of one deindex leg
#[derive(Debug, Clone, Serialize)]
pub struct DeindexFailure {
    pub pipeline: PipelineKind,
    pub error: String,
    #[serde(skip)]
    pub cause: IndexingError,
}

/// Outcome of [`IndexingCoordinator::deindex_item`]
#[derive(Debug, Clone, Serialize)]
pub struct DeindexResult {
    pub item_id: WorkItemId,
    pub search_removed: bool,
    pub hierarchy_removed: bool,
    pub task_ids: Vec<String>,
    pub failures: Vec<DeindexFailure>,
}

impl DeindexResult {
    pub fn is_success(&self) -> bool {
        self.failures.is_empty()
    }

    pub fn failed_pipelines(&self) -> Vec<PipelineKind> {
        self.failures.iter().map(|failure| failure.pipeline).collect()
    }

    pub fn errors(&self) -> Vec<String> {
        self.failures.iter().map(|failure| failure.error.clone()).collect()
    }

    /// Fold the outcome of a retry of the failed legs into this result
    pub fn merge_retry(&mut self, retry: DeindexResult) {
        self.search_removed |= retry.search_removed;
        self.hierarchy_removed |= retry.hierarchy_removed;
        self.task_ids.extend(retry.task_ids);
        self.failures = retry.failures;
    }
}

/// Coordinates indexing and deindexing of work items
#[derive(Clone)]
pub struct IndexingCoordinator {
    validator: Validator,
    task_queue: Arc<dyn TaskQueue>,
    lock_manager: Option<Arc<dyn LockManager>>,
    access_checker: Option<Arc<dyn AccessChecker>>,
    metrics: Arc<IndexingMetrics>,
    config: CoordinatorConfig,
}

impl std::fmt::Debug for IndexingCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IndexingCoordinator")
            .field("task_queue", &self.task_queue.backend_name())
            .field(
                "lock_manager",
                &self.lock_manager.as_ref().map(|m| m.backend_name()),
            )
            .field("access_checker", &self.access_checker.is_some())
            .field("config", &self.config)
            .finish()
    }
}

impl IndexingCoordinator {
    pub fn builder() -> IndexingCoordinatorBuilder {
        IndexingCoordinatorBuilder::default()
    }

    pub fn config(&self) -> &CoordinatorConfig {
        &self.config
    }

    pub fn metrics(&self) -> &Arc<IndexingMetrics> {
        &self.metrics
    }

    /// Schedule indexing of one item into both pipelines.
    ///
    /// Structured outcomes (denied, invalid, already in progress, scheduling
    /// failures) are returned in the [`IndexResult`]. `Err` is reserved for
    /// failures reading the item itself.
    #[instrument(skip_all, fields(item_id = %item_id, creation = is_creation_event))]
    pub async fn index_item(
        &self,
        item_id: WorkItemId,
        is_creation_event: bool,
        acting_user: Option<&ActingUser>,
    ) -> Result<IndexResult> {
        let started = Instant::now();
        let outcome = self
            .run_index(item_id, IndexTrigger::from_creation_flag(is_creation_event), acting_user)
            .await;
        let elapsed = started.elapsed();

        match &outcome {
            Ok(result) if result.is_scheduled() && result.error_type.is_none() => {
                self.metrics.record_index_success(elapsed);
                log_index_operation(
                    "index",
                    item_id,
                    "scheduled",
                    result.error.as_deref(),
                );
            }
            Ok(result) => {
                let error_type = result
                    .error_type
                    .or_else(|| result.cause.as_ref().map(IndexingError::error_type))
                    .unwrap_or(ErrorType::SchedulingError);
                self.metrics.record_index_failure(error_type, elapsed);
                log_index_operation("index", item_id, error_type.as_str(), result.error.as_deref());
            }
            Err(e) => {
                self.metrics.record_index_failure(e.error_type(), elapsed);
                warn!(item_id = %item_id, error = %e, "Indexing coordination raised");
            }
        }

        outcome
    }

    async fn run_index(
        &self,
        item_id: WorkItemId,
        trigger: IndexTrigger,
        acting_user: Option<&ActingUser>,
    ) -> Result<IndexResult> {
        if let Some(user) = acting_user {
            if !self.check_access(item_id, user).await {
                info!(item_id = %item_id, user = %user.username, "Permission denied, not indexing");
                return Ok(IndexResult::rejected_with_message(
                    item_id,
                    constants::PERMISSION_DENIED,
                    IndexingError::PermissionDenied(item_id),
                    LockDisposition::NotAttempted,
                ));
            }
        }

        if let Validation::Invalid(reason) = self.validator.validate(item_id).await? {
            debug!(item_id = %item_id, reason = %reason, "Work item not eligible for indexing");
            return Ok(IndexResult::rejected(
                item_id,
                reason.into_error(item_id),
                LockDisposition::NotAttempted,
            ));
        }

        let lock_name = LockName::for_item(&self.config.execution_lock_prefix, item_id);
        let (handle, disposition) = match self.acquire_execution_lock(&lock_name).await {
            Ok(acquired) => acquired,
            Err(held) => {
                info!(item_id = %item_id, lock_name = %lock_name, "Indexing already in progress, dropping request");
                return Ok(IndexResult::rejected_with_message(
                    item_id,
                    constants::ALREADY_IN_PROGRESS,
                    held,
                    LockDisposition::AlreadyHeld,
                ));
            }
        };

        let mut result = IndexResult::new(item_id);
        result.lock = disposition;

        let release = match &handle {
            Some(_) => Continuation::release_execution_lock(lock_name.clone()),
            None => Continuation::NoOp,
        };

        match self.schedule_chain(item_id, trigger, release).await {
            Ok(chain_id) => {
                debug!(item_id = %item_id, chain_id = %chain_id, trigger = ?trigger, "Indexing chain scheduled");
                result.search_indexed = true;
                result.hierarchy_indexed = true;
                result.scheduling = SchedulingPath::Chain;
                result.chain_task_id = Some(chain_id);
                if handle.is_some() {
                    result.lock = LockDisposition::DeferredToContinuation;
                }
                return Ok(result);
            }
            Err(err) => {
                self.log_scheduling_failure(item_id, "chain", &err);
                result.record_scheduling_error("chain scheduling failed", err);
            }
        }

        self.schedule_fallback(&mut result).await;

        if let Some(handle) = &handle {
            if result.fallback_task_ids.is_empty() {
                let outcome = self.release_now(handle).await;
                result.lock = LockDisposition::ReleasedImmediately(outcome);
            } else {
                // Direct tasks carry no continuation
                debug!(item_id = %item_id, lock_name = %lock_name, "Fallback scheduled, execution lock left to expire");
                result.lock = LockDisposition::HeldUntilTtl;
            }
        }

        let all_scheduled = result.search_indexed && result.hierarchy_indexed;
        if !all_scheduled {
            result.error = result.errors.last().cloned();
        }

        Ok(result)
    }

    async fn check_access(&self, item_id: WorkItemId, user: &ActingUser) -> bool {
        match &self.access_checker {
            Some(checker) => checker.check_access(item_id, user).await,
            None => {
                debug!(item_id = %item_id, "No access checker configured, allowing");
                true
            }
        }
    }

    /// `Err` only when the lock is held elsewhere
    async fn acquire_execution_lock(
        &self,
        lock_name: &LockName,
    ) -> std::result::Result<(Option<LockHandle>, LockDisposition), IndexingError> {
        let Some(manager) = &self.lock_manager else {
            return Ok((None, LockDisposition::NotConfigured));
        };

        match manager
            .acquire(lock_name, self.config.execution_lock_timeout)
            .await
        {
            Ok(handle) => {
                log_lock_operation("acquire_execution_lock", lock_name, "acquired");
                Ok((Some(handle), LockDisposition::Acquired))
            }
            Err(err @ LockError::Held { .. }) => Err(err.into()),
            Err(err) => {
                warn!(
                    lock_name = %lock_name,
                    backend = manager.backend_name(),
                    error = %err,
                    "Lock backend unavailable, continuing without deduplication"
                );
                Ok((None, LockDisposition::BackendUnavailable))
            }
        }
    }

    async fn schedule_chain(
        &self,
        item_id: WorkItemId,
        trigger: IndexTrigger,
        release: Continuation,
    ) -> Result<String> {
        let chain = IndexingChain::for_item(item_id, trigger, &PipelineKind::ALL, release)?;
        let handle = self
            .task_queue
            .schedule_chain(chain, &self.config.indexing_queue)
            .await?;
        Ok(handle.id)
    }

    /// Schedule each pipeline directly; later pipelines get the countdown
    async fn schedule_fallback(&self, result: &mut IndexResult) {
        let mut scheduled_any = false;

        for (position, pipeline) in PipelineKind::ALL.iter().enumerate() {
            let countdown = (position > 0 && !self.config.fallback_hierarchy_countdown.is_zero())
                .then_some(self.config.fallback_hierarchy_countdown);
            let task = TaskSignature::index(*pipeline, result.item_id);

            match self
                .task_queue
                .schedule(task, &self.config.indexing_queue, countdown)
                .await
            {
                Ok(handle) => {
                    debug!(
                        item_id = %result.item_id,
                        pipeline = %pipeline,
                        task_id = %handle.task_id,
                        countdown = ?countdown,
                        "Fallback task scheduled"
                    );
                    result.mark_scheduled(*pipeline);
                    result.fallback_task_ids.push(handle.task_id);
                    scheduled_any = true;
                }
                Err(err) => {
                    let err = IndexingError::from(err);
                    self.log_scheduling_failure(result.item_id, pipeline.as_str(), &err);
                    result.record_scheduling_error(
                        &format!("fallback {pipeline} scheduling failed"),
                        err,
                    );
                }
            }
        }

        if scheduled_any {
            result.scheduling = SchedulingPath::Fallback;
        }
    }

    async fn release_now(&self, handle: &LockHandle) -> LockReleaseOutcome {
        let Some(manager) = &self.lock_manager else {
            return LockReleaseOutcome::SkippedBackendLimitation;
        };

        let outcome = match manager.release(handle).await {
            Ok(outcome) => outcome,
            Err(err) => {
                warn!(lock_name = %handle.name, error = %err, "Failed to release execution lock");
                LockReleaseOutcome::Failed
            }
        };
        log_lock_operation("release_execution_lock", &handle.name, outcome.as_str());
        self.metrics.record_lock_release(outcome);
        outcome
    }

    fn log_scheduling_failure(&self, item_id: WorkItemId, what: &str, err: &IndexingError) {
        if matches!(err, IndexingError::BrokerUnavailable(_)) {
            error!(
                item_id = %item_id,
                scheduling = what,
                backend = self.task_queue.backend_name(),
                critical = true,
                error = %err,
                "🚨 Task broker unavailable, all scheduling is blocked"
            );
        } else {
            warn!(item_id = %item_id, scheduling = what, error = %err, "Scheduling failed");
        }
    }

    /// Schedule removal from both pipelines
    #[instrument(skip_all, fields(item_id = %item_id))]
    pub async fn deindex_item(&self, item_id: WorkItemId) -> DeindexResult {
        self.deindex_pipelines(item_id, &PipelineKind::ALL).await
    }

    /// Schedule removal from the given pipelines. Legs are independent.
    pub async fn deindex_pipelines(
        &self,
        item_id: WorkItemId,
        pipelines: &[PipelineKind],
    ) -> DeindexResult {
        let started = Instant::now();
        let mut result = DeindexResult {
            item_id,
            search_removed: false,
            hierarchy_removed: false,
            task_ids: Vec::new(),
            failures: Vec::new(),
        };

        for pipeline in pipelines {
            let task = TaskSignature::remove(*pipeline, item_id);
            match self
                .task_queue
                .schedule(task, &self.config.indexing_queue, None)
                .await
            {
                Ok(handle) => {
                    match pipeline {
                        PipelineKind::Search => result.search_removed = true,
                        PipelineKind::Hierarchy => result.hierarchy_removed = true,
                    }
                    result.task_ids.push(handle.task_id);
                }
                Err(err) => {
                    let cause = IndexingError::from(err);
                    self.log_scheduling_failure(item_id, pipeline.remove_task_name(), &cause);
                    result.failures.push(DeindexFailure {
                        pipeline: *pipeline,
                        error: format!("{pipeline} removal scheduling failed: {cause}"),
                        cause,
                    });
                }
            }
        }

        let elapsed = started.elapsed();
        if result.is_success() {
            self.metrics.record_deindex_success(elapsed);
            log_index_operation("deindex", item_id, "scheduled", None);
        } else {
            self.metrics.record_deindex_failure(elapsed);
            let errors = result.errors().join("; ");
            log_index_operation("deindex", item_id, "failed", Some(&errors));
        }

        result
    }
}

/// Builder for [`IndexingCoordinator`]
#[derive(Default)]
pub struct IndexingCoordinatorBuilder {
    store: Option<Arc<dyn WorkItemStore>>,
    task_queue: Option<Arc<dyn TaskQueue>>,
    lock_manager: Option<Arc<dyn LockManager>>,
    access_checker: Option<Arc<dyn AccessChecker>>,
    metrics: Option<Arc<IndexingMetrics>>,
    config: Option<CoordinatorConfig>,
}

impl IndexingCoordinatorBuilder {
    pub fn store(mut self, store: Arc<dyn WorkItemStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn task_queue(mut self, task_queue: Arc<dyn TaskQueue>) -> Self {
        self.task_queue = Some(task_queue);
        self
    }

    pub fn lock_manager(mut self, lock_manager: Arc<dyn LockManager>) -> Self {
        self.lock_manager = Some(lock_manager);
        self
    }

    pub fn access_checker(mut self, access_checker: Arc<dyn AccessChecker>) -> Self {
        self.access_checker = Some(access_checker);
        self
    }

    pub fn metrics(mut self, metrics: Arc<IndexingMetrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn config(mut self, config: CoordinatorConfig) -> Self {
        self.config = Some(config);
        self
    }

    pub fn build(self) -> Result<IndexingCoordinator> {
        let store = self.store.ok_or_else(|| {
            IndexingError::Configuration("IndexingCoordinator requires a work item store".into())
        })?;
        let task_queue = self.task_queue.ok_or_else(|| {
            IndexingError::Configuration("IndexingCoordinator requires a task queue".into())
        })?;

        Ok(IndexingCoordinator {
            validator: Validator::new(store),
            task_queue,
            lock_manager: self.lock_manager,
            access_checker: self.access_checker,
            metrics: self.metrics.unwrap_or_default(),
            config: self.config.unwrap_or_default(),
        })
    }
}
