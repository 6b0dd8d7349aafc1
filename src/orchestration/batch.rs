//! # Batch Indexing
//!
//! Runs the single-item flow over many ids. Large batches are split into
//! chunks up front and processed in a loop, so stack depth and memory stay
//! flat regardless of batch size. Every item lands in exactly one of
//! success, failed or skipped.
//!
//! Fail-fast stops new scheduling only. Chains already handed to the queue
//! run to completion.

use futures::FutureExt;
use serde::Serialize;
use std::collections::BTreeMap;
use std::panic::AssertUnwindSafe;
use tracing::{info, instrument, warn};

use crate::constants::batch_keys;
use crate::error::IndexingError;
use crate::models::WorkItemId;

use super::coordinator::{IndexResult, IndexingCoordinator};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchRequest {
    pub item_ids: Vec<WorkItemId>,
    /// Falls back to the coordinator's configured fail-fast setting
    pub fail_fast: Option<bool>,
    /// Falls back to the coordinator's configured chunk size
    pub chunk_size: Option<usize>,
}

impl BatchRequest {
    pub fn new(item_ids: impl IntoIterator<Item = WorkItemId>) -> Self {
        Self {
            item_ids: item_ids.into_iter().collect(),
            fail_fast: None,
            chunk_size: None,
        }
    }

    pub fn fail_fast(mut self, fail_fast: bool) -> Self {
        self.fail_fast = Some(fail_fast);
        self
    }

    pub fn chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = Some(chunk_size);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BatchItemError {
    pub item_id: WorkItemId,
    pub error: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BatchResult {
    pub total: usize,
    pub success_count: usize,
    pub failed_count: usize,
    pub skipped_count: usize,
    pub errors: Vec<BatchItemError>,
    /// Classification key to affected items
    pub error_types: BTreeMap<String, Vec<WorkItemId>>,
    pub chunks_processed: usize,
    /// Fail-fast stopped the batch early
    pub aborted: bool,
}

impl BatchResult {
    fn empty(total: usize) -> Self {
        Self {
            total,
            ..Self::default()
        }
    }

    /// Items that were looked at before the batch finished or aborted
    pub fn processed(&self) -> usize {
        self.success_count + self.failed_count + self.skipped_count
    }

    fn record_error_type(&mut self, key: &str, item_id: WorkItemId) {
        self.error_types
            .entry(key.to_string())
            .or_default()
            .push(item_id);
    }

    fn record_failure(&mut self, item_id: WorkItemId, key: &str, messages: &[String]) {
        self.failed_count += 1;
        self.record_error_type(key, item_id);
        self.errors.extend(messages.iter().map(|message| BatchItemError {
            item_id,
            error: message.clone(),
        }));
    }

    /// Fold one item's outcome in; returns whether it counts as a failure
    fn absorb(&mut self, item_id: WorkItemId, outcome: std::result::Result<IndexResult, ItemFailure>) -> bool {
        match outcome {
            Ok(result) => {
                if let Some(error_type) = result.error_type {
                    self.skipped_count += 1;
                    self.record_error_type(error_type.as_str(), item_id);
                    false
                } else if result.is_scheduled() {
                    self.success_count += 1;
                    false
                } else if !result.errors.is_empty() {
                    self.record_failure(item_id, batch_keys::SCHEDULING_ERROR, &result.errors);
                    true
                } else {
                    let message = result
                        .error
                        .unwrap_or_else(|| batch_keys::UNKNOWN_STATE.to_string());
                    self.record_failure(item_id, batch_keys::UNKNOWN_STATE, &[message]);
                    true
                }
            }
            Err(failure) => {
                self.record_failure(item_id, failure.kind, &[failure.message]);
                true
            }
        }
    }
}

/// An item whose processing raised instead of returning a result
#[derive(Debug, Clone, PartialEq, Eq)]
struct ItemFailure {
    /// Error kind name, used as the breakdown key
    kind: &'static str,
    message: String,
}

impl From<IndexingError> for ItemFailure {
    fn from(err: IndexingError) -> Self {
        Self {
            kind: err.kind_name(),
            message: err.to_string(),
        }
    }
}

impl IndexingCoordinator {
    /// Index many items, never aborting on a single item's error unless
    /// fail-fast is in effect
    #[instrument(skip_all, fields(total = request.item_ids.len()))]
    pub async fn index_batch(&self, request: BatchRequest) -> BatchResult {
        let total = request.item_ids.len();
        let mut result = BatchResult::empty(total);
        if total == 0 {
            return result;
        }

        let config = self.config();
        if total > config.max_batch_size {
            warn!(
                total = total,
                max_batch_size = config.max_batch_size,
                "Batch exceeds recommended maximum size"
            );
        }

        let fail_fast = request.fail_fast.unwrap_or(config.fail_fast);
        let chunk_size = request.chunk_size.unwrap_or(config.chunk_size).max(1);
        let chunks: Vec<&[WorkItemId]> = if total > chunk_size {
            request.item_ids.chunks(chunk_size).collect()
        } else {
            vec![request.item_ids.as_slice()]
        };
        let chunk_count = chunks.len();

        'chunks: for (index, chunk) in chunks.into_iter().enumerate() {
            result.chunks_processed += 1;
            info!(
                chunk = index + 1,
                chunks = chunk_count,
                size = chunk.len(),
                "📦 Processing indexing batch chunk"
            );

            for item_id in chunk {
                let outcome = self.index_one(*item_id).await;
                let failed = result.absorb(*item_id, outcome);

                if failed && fail_fast {
                    warn!(item_id = %item_id, "Fail-fast batch stopped after failure");
                    result.aborted = true;
                    break 'chunks;
                }
            }
        }

        info!(
            total = result.total,
            success = result.success_count,
            failed = result.failed_count,
            skipped = result.skipped_count,
            chunks = result.chunks_processed,
            aborted = result.aborted,
            "Indexing batch complete"
        );

        result
    }

    async fn index_one(&self, item_id: WorkItemId) -> std::result::Result<IndexResult, ItemFailure> {
        match AssertUnwindSafe(self.index_item(item_id, false, None))
            .catch_unwind()
            .await
        {
            Ok(outcome) => outcome.map_err(ItemFailure::from),
            Err(_) => Err(ItemFailure {
                kind: "Panic",
                message: format!("indexing item {item_id} panicked"),
            }),
        }
    }
}
