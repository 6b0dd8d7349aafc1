//! # Indexing Task Layer
//!
//! Entry points invoked by event handlers and workers. Wraps the coordinator
//! with a bounded retry policy:
//!
//! 1. A result carrying an error type (invalid item, permission denied,
//!    already in progress) is returned as-is.
//! 2. A fallback that scheduled only one pipeline is marked
//!    `partial_success` and returned, since retrying would re-dispatch the
//!    leg that already went through.
//! 3. Anything else is classified; transient failures are retried with
//!    exponential backoff until `max_attempts`.

use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, instrument, warn};

use crate::config::RetryConfig;
use crate::error::{IndexingError, Result};
use crate::metrics::IndexingMetrics;
use crate::models::{ActingUser, WorkItemId};

use super::batch::{BatchRequest, BatchResult};
use super::coordinator::{DeindexResult, IndexResult, IndexingCoordinator};
use super::error_classifier::{ErrorClassification, ErrorClassifier, IndexingErrorClassifier};

/// Exponential backoff with optional jitter
#[derive(Debug, Clone, PartialEq)]
pub struct BackoffPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub backoff_multiplier: f64,
    pub jitter: bool,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self::from(&RetryConfig::default())
    }
}

impl From<&RetryConfig> for BackoffPolicy {
    fn from(config: &RetryConfig) -> Self {
        Self {
            max_attempts: config.max_attempts,
            base_delay: Duration::from_millis(config.base_delay_ms),
            max_delay: Duration::from_millis(config.max_delay_ms),
            backoff_multiplier: config.backoff_multiplier,
            jitter: config.jitter,
        }
    }
}

impl BackoffPolicy {
    /// Delay after the `attempt`-th failure (1-based)
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(i32::MAX as u32) as i32;
        let nanos = self.base_delay.as_nanos() as f64 * self.backoff_multiplier.powi(exponent);
        let delay = if nanos.is_finite() && nanos < self.max_delay.as_nanos() as f64 {
            Duration::from_nanos(nanos as u64)
        } else {
            self.max_delay
        };

        if self.jitter {
            let jitter = fastrand::f64() * 0.1; // 10% jitter
            let jittered = Duration::from_nanos((delay.as_nanos() as f64 * (1.0 + jitter)) as u64);
            jittered.min(self.max_delay)
        } else {
            delay
        }
    }

    pub fn can_retry(&self, attempt: u32) -> bool {
        attempt < self.max_attempts
    }
}

/// How a task ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskDisposition {
    Completed,
    /// A structured, permanent outcome such as an invalid item
    NotRetryable,
    /// Fallback scheduled one pipeline only
    PartialSuccess,
    RetriesExhausted,
}

/// Final result of a task plus its retry history
#[derive(Debug, Clone)]
pub struct TaskOutcome<T> {
    pub result: Result<T>,
    pub attempts: u32,
    pub retried: bool,
    pub gave_up: bool,
    pub disposition: TaskDisposition,
}

impl<T> TaskOutcome<T> {
    fn finish(result: Result<T>, attempts: u32, disposition: TaskDisposition) -> Self {
        Self {
            result,
            attempts,
            retried: attempts > 1,
            gave_up: disposition == TaskDisposition::RetriesExhausted,
            disposition,
        }
    }
}

enum Decision {
    Done(TaskDisposition),
    Retry(ErrorClassification),
}

/// Retrying entry points over a shared coordinator
#[derive(Clone)]
pub struct IndexingTasks {
    coordinator: Arc<IndexingCoordinator>,
    policy: BackoffPolicy,
    classifier: Arc<dyn ErrorClassifier>,
    metrics: Arc<IndexingMetrics>,
}

impl std::fmt::Debug for IndexingTasks {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IndexingTasks")
            .field("policy", &self.policy)
            .field("classifier", &self.classifier.classifier_name())
            .finish()
    }
}

impl IndexingTasks {
    pub fn new(coordinator: Arc<IndexingCoordinator>, policy: BackoffPolicy) -> Self {
        let metrics = coordinator.metrics().clone();
        Self {
            coordinator,
            policy,
            classifier: Arc::new(IndexingErrorClassifier::new()),
            metrics,
        }
    }

    pub fn with_classifier(mut self, classifier: Arc<dyn ErrorClassifier>) -> Self {
        self.classifier = classifier;
        self
    }

    pub fn coordinator(&self) -> &Arc<IndexingCoordinator> {
        &self.coordinator
    }

    pub fn policy(&self) -> &BackoffPolicy {
        &self.policy
    }

    #[instrument(skip_all, fields(item_id = %item_id))]
    pub async fn index_item(
        &self,
        item_id: WorkItemId,
        is_creation_event: bool,
        acting_user: Option<ActingUser>,
    ) -> TaskOutcome<IndexResult> {
        let mut attempt = 0;
        loop {
            attempt += 1;
            let mut outcome = self
                .coordinator
                .index_item(item_id, is_creation_event, acting_user.as_ref())
                .await;

            let decision = match &outcome {
                Ok(result) => self.decide_index(result),
                Err(err) => self.decide_error(err),
            };

            match decision {
                Decision::Done(disposition) => {
                    if disposition == TaskDisposition::PartialSuccess {
                        if let Ok(result) = &mut outcome {
                            result.partial_success = true;
                        }
                        warn!(item_id = %item_id, "Fallback scheduled one pipeline only, not retrying");
                    }
                    return TaskOutcome::finish(outcome, attempt, disposition);
                }
                Decision::Retry(classification) => {
                    if !self.policy.can_retry(attempt) {
                        warn!(
                            item_id = %item_id,
                            attempts = attempt,
                            "Giving up on indexing after transient failures"
                        );
                        return TaskOutcome::finish(outcome, attempt, TaskDisposition::RetriesExhausted);
                    }
                    self.back_off(item_id, attempt, &classification).await;
                }
            }
        }
    }

    /// Deindex both pipelines, retrying only the legs that failed transiently
    #[instrument(skip_all, fields(item_id = %item_id))]
    pub async fn deindex_item(&self, item_id: WorkItemId) -> TaskOutcome<DeindexResult> {
        let mut attempt = 1;
        let mut result = self.coordinator.deindex_item(item_id).await;

        loop {
            if result.is_success() {
                return TaskOutcome::finish(Ok(result), attempt, TaskDisposition::Completed);
            }

            let classifications: Vec<ErrorClassification> = result
                .failures
                .iter()
                .map(|failure| self.classifier.classify_error(&failure.cause))
                .collect();
            let Some(first) = classifications.first().cloned() else {
                return TaskOutcome::finish(Ok(result), attempt, TaskDisposition::Completed);
            };

            if !classifications.iter().all(ErrorClassification::is_retryable) {
                return TaskOutcome::finish(Ok(result), attempt, TaskDisposition::NotRetryable);
            }
            if !self.policy.can_retry(attempt) {
                warn!(item_id = %item_id, attempts = attempt, "Giving up on deindexing");
                return TaskOutcome::finish(Ok(result), attempt, TaskDisposition::RetriesExhausted);
            }

            self.back_off(item_id, attempt, &first).await;
            attempt += 1;
            let retry = self
                .coordinator
                .deindex_pipelines(item_id, &result.failed_pipelines())
                .await;
            result.merge_retry(retry);
        }
    }

    /// Batch failures are captured per item, so the batch itself is not retried
    pub async fn index_batch(&self, request: BatchRequest) -> TaskOutcome<BatchResult> {
        let result = self.coordinator.index_batch(request).await;
        info!(
            total = result.total,
            success = result.success_count,
            failed = result.failed_count,
            skipped = result.skipped_count,
            "📋 Batch indexing task finished"
        );
        TaskOutcome::finish(Ok(result), 1, TaskDisposition::Completed)
    }

    fn decide_index(&self, result: &IndexResult) -> Decision {
        if let Some(error_type) = result.error_type {
            if error_type.is_invalid_item() {
                debug!(item_id = %result.item_id, error_type = %error_type, "Item not indexable, not retrying");
            }
            // Lock held and permission denied are skipped the same way
            return Decision::Done(TaskDisposition::NotRetryable);
        }
        if result.is_partial_fallback() {
            return Decision::Done(TaskDisposition::PartialSuccess);
        }
        if result.is_scheduled() && result.error.is_none() {
            return Decision::Done(TaskDisposition::Completed);
        }

        let classification = match (&result.cause, &result.error) {
            (Some(cause), _) => self.classifier.classify_error(cause),
            (None, Some(message)) => self.classifier.classify_message(message),
            (None, None) => self.classifier.classify_message(""),
        };
        if classification.is_retryable() {
            Decision::Retry(classification)
        } else {
            Decision::Done(TaskDisposition::NotRetryable)
        }
    }

    fn decide_error(&self, err: &IndexingError) -> Decision {
        let classification = self.classifier.classify_error(err);
        if classification.is_retryable() {
            Decision::Retry(classification)
        } else {
            Decision::Done(TaskDisposition::NotRetryable)
        }
    }

    async fn back_off(&self, item_id: WorkItemId, attempt: u32, classification: &ErrorClassification) {
        let delay = self.policy.delay_for(attempt);
        self.metrics.record_retry(attempt);
        debug!(
            item_id = %item_id,
            attempt = attempt,
            delay_ms = delay.as_millis() as u64,
            basis = ?classification.basis,
            "🔄 Retrying after transient failure"
        );
        tokio::time::sleep(delay).await;
    }
}
