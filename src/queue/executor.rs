//! Worker-side execution of chains and direct tasks.
//!
//! Exactly one continuation fires per chain: the success continuation when
//! every step completed, the error continuation when any step failed or
//! panicked.

use futures::FutureExt;
use serde::{Deserialize, Serialize};
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, warn};

use super::chain::{ChainStep, Continuation, IndexingChain};
use super::TaskSignature;
use crate::error::{IndexingError, Result};
use crate::locking::{LockManager, LockName, LockReleaseOutcome};
use crate::logging::log_lock_operation;
use crate::metrics::IndexingMetrics;
use crate::models::WorkItem;
use crate::pipelines::{PipelineKind, PipelineRegistry};
use crate::validation::Validator;

/// Which continuation a chain run ended with
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContinuationPath {
    Success,
    Error,
}

#[derive(Debug, Clone)]
pub struct ChainRunReport {
    pub item_id: crate::models::WorkItemId,
    /// Pipelines whose index operation ran
    pub dispatched: Vec<PipelineKind>,
    /// Pipelines skipped because validation returned the invalid sentinel
    pub skipped: Vec<PipelineKind>,
    pub error: Option<IndexingError>,
    pub path: ContinuationPath,
    /// `None` when the continuation had no lock to release
    pub release_outcome: Option<LockReleaseOutcome>,
}

/// Outcome of a direct (non-chain) task
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskRunOutcome {
    Executed,
    SkippedInvalid,
}

/// Runs chain continuations
#[derive(Clone)]
pub struct ContinuationHandler {
    lock_manager: Option<Arc<dyn LockManager>>,
    metrics: Arc<IndexingMetrics>,
}

impl std::fmt::Debug for ContinuationHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContinuationHandler")
            .field(
                "lock_backend",
                &self.lock_manager.as_ref().map(|m| m.backend_name()),
            )
            .finish()
    }
}

impl ContinuationHandler {
    pub fn new(lock_manager: Option<Arc<dyn LockManager>>, metrics: Arc<IndexingMetrics>) -> Self {
        Self {
            lock_manager,
            metrics,
        }
    }

    pub async fn fire(&self, continuation: &Continuation) -> Option<LockReleaseOutcome> {
        match continuation {
            Continuation::ReleaseExecutionLock { lock_name } => {
                let outcome = self.release_execution_lock(lock_name).await;
                self.metrics.record_lock_release(outcome);
                Some(outcome)
            }
            Continuation::NoOp => None,
        }
    }

    async fn release_execution_lock(&self, lock_name: &LockName) -> LockReleaseOutcome {
        let Some(manager) = &self.lock_manager else {
            debug!(lock_name = %lock_name, "No lock backend configured, nothing to release");
            return LockReleaseOutcome::SkippedBackendLimitation;
        };

        if !manager.supports_release_by_name() {
            info!(
                lock_name = %lock_name,
                backend = manager.backend_name(),
                "Lock backend cannot release by name, relying on TTL expiry"
            );
            return LockReleaseOutcome::SkippedBackendLimitation;
        }

        match manager.release_by_name(lock_name).await {
            Ok(outcome) => {
                log_lock_operation("release_execution_lock", lock_name, outcome.as_str());
                outcome
            }
            Err(e) => {
                warn!(lock_name = %lock_name, error = %e, "Failed to release execution lock");
                LockReleaseOutcome::Failed
            }
        }
    }
}

struct StepsOutcome {
    dispatched: Vec<PipelineKind>,
    skipped: Vec<PipelineKind>,
    error: Option<IndexingError>,
}

/// Executes chains and tasks against the registered pipelines
#[derive(Debug, Clone)]
pub struct ChainExecutor {
    validator: Validator,
    pipelines: PipelineRegistry,
    continuations: ContinuationHandler,
}

impl ChainExecutor {
    pub fn new(
        validator: Validator,
        pipelines: PipelineRegistry,
        continuations: ContinuationHandler,
    ) -> Self {
        Self {
            validator,
            pipelines,
            continuations,
        }
    }

    pub async fn run_chain(&self, chain: &IndexingChain) -> ChainRunReport {
        let started = Instant::now();
        let steps = AssertUnwindSafe(self.run_steps(chain)).catch_unwind().await;

        let StepsOutcome {
            dispatched,
            skipped,
            error,
        } = steps.unwrap_or_else(|_| StepsOutcome {
            dispatched: Vec::new(),
            skipped: Vec::new(),
            error: Some(IndexingError::Internal(format!(
                "chain step panicked for item {}",
                chain.item_id()
            ))),
        });

        let (path, continuation) = match &error {
            None => (ContinuationPath::Success, chain.on_success()),
            Some(_) => (ContinuationPath::Error, chain.on_error()),
        };
        let release_outcome = self.continuations.fire(continuation).await;

        debug!(
            item_id = %chain.item_id(),
            trigger = ?chain.trigger(),
            dispatched = ?dispatched,
            skipped = ?skipped,
            path = ?path,
            release = release_outcome.map(|outcome| outcome.as_str()),
            duration_ms = started.elapsed().as_millis() as u64,
            "Indexing chain finished"
        );

        ChainRunReport {
            item_id: chain.item_id(),
            dispatched,
            skipped,
            error,
            path,
            release_outcome,
        }
    }

    async fn run_steps(&self, chain: &IndexingChain) -> StepsOutcome {
        let mut outcome = StepsOutcome {
            dispatched: Vec::new(),
            skipped: Vec::new(),
            error: None,
        };
        // Value produced by the last validation step, `None` is the invalid sentinel
        let mut validated: Option<WorkItem> = None;

        for step in chain.steps() {
            let result = match step {
                ChainStep::Validate { item_id } => self
                    .validator
                    .validate(*item_id)
                    .await
                    .map(|validation| validated = validation.into_item()),
                ChainStep::Dispatch { pipeline, item_id } => match validated.take() {
                    Some(item) => self
                        .dispatch(*pipeline, &item)
                        .await
                        .map(|()| outcome.dispatched.push(*pipeline)),
                    None => {
                        debug!(
                            item_id = %item_id,
                            pipeline = %pipeline,
                            "Skipping dispatch for invalid work item"
                        );
                        outcome.skipped.push(*pipeline);
                        Ok(())
                    }
                },
            };

            if let Err(e) = result {
                error!(item_id = %chain.item_id(), step = ?step, error = %e, "Indexing chain step failed");
                outcome.error = Some(e);
                break;
            }
        }

        outcome
    }

    /// Run a task scheduled outside a chain. Index tasks re-validate first.
    pub async fn run_task(&self, task: &TaskSignature) -> Result<TaskRunOutcome> {
        match task {
            TaskSignature::IndexItem { pipeline, item_id } => {
                match self.validator.validate(*item_id).await?.into_item() {
                    Some(item) => {
                        self.dispatch(*pipeline, &item).await?;
                        Ok(TaskRunOutcome::Executed)
                    }
                    None => Ok(TaskRunOutcome::SkippedInvalid),
                }
            }
            TaskSignature::RemoveItem { pipeline, item_id } => {
                self.pipelines.get(*pipeline)?.remove_item(*item_id).await?;
                Ok(TaskRunOutcome::Executed)
            }
        }
    }

    async fn dispatch(&self, pipeline: PipelineKind, item: &WorkItem) -> Result<()> {
        self.pipelines.get(pipeline)?.index_item(item).await
    }
}
