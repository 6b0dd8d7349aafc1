//! # Task Queue Interface
//!
//! The coordinator never performs indexing I/O itself. It hands work to a
//! [`TaskQueue`], either as a conditional [`IndexingChain`] or, when chain
//! scheduling fails, as independent [`TaskSignature`]s.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────┐  schedule_chain  ┌─────────────────┐     ┌─────────────────┐
//! │ Indexing        │─────────────────▶│ TaskQueue       │────▶│ ChainExecutor   │
//! │ Coordinator     │  schedule        │ (broker/local)  │     │ (worker side)   │
//! └─────────────────┘─────────────────▶└─────────────────┘     └─────────────────┘
//! ```
//!
//! Implementations must surface broker connection failures as errors rather
//! than hanging, so the coordinator's synchronous portion stays bounded.

pub mod chain;
pub mod executor;
pub mod local;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::models::WorkItemId;
use crate::pipelines::PipelineKind;

pub use chain::{ChainBuilder, ChainStep, Continuation, IndexTrigger, IndexingChain};
pub use executor::{
    ChainExecutor, ChainRunReport, ContinuationHandler, ContinuationPath, TaskRunOutcome,
};
pub use local::{CompletedTask, LocalTaskQueue};

/// A single task as the queue sees it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "task", rename_all = "snake_case")]
pub enum TaskSignature {
    IndexItem {
        pipeline: PipelineKind,
        item_id: WorkItemId,
    },
    RemoveItem {
        pipeline: PipelineKind,
        item_id: WorkItemId,
    },
}

impl TaskSignature {
    pub fn index(pipeline: PipelineKind, item_id: WorkItemId) -> Self {
        TaskSignature::IndexItem { pipeline, item_id }
    }

    pub fn remove(pipeline: PipelineKind, item_id: WorkItemId) -> Self {
        TaskSignature::RemoveItem { pipeline, item_id }
    }

    pub fn task_name(&self) -> &'static str {
        match self {
            TaskSignature::IndexItem { pipeline, .. } => pipeline.index_task_name(),
            TaskSignature::RemoveItem { pipeline, .. } => pipeline.remove_task_name(),
        }
    }

    pub fn pipeline(&self) -> PipelineKind {
        match self {
            TaskSignature::IndexItem { pipeline, .. } | TaskSignature::RemoveItem { pipeline, .. } => {
                *pipeline
            }
        }
    }

    pub fn item_id(&self) -> WorkItemId {
        match self {
            TaskSignature::IndexItem { item_id, .. } | TaskSignature::RemoveItem { item_id, .. } => {
                *item_id
            }
        }
    }
}

/// Receipt for a scheduled task
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskHandle {
    pub task_id: String,
    pub task_name: String,
    pub countdown: Option<Duration>,
    pub scheduled_at: DateTime<Utc>,
}

/// Receipt for a scheduled chain
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainHandle {
    pub id: String,
    pub step_count: usize,
    pub scheduled_at: DateTime<Utc>,
}

/// Errors that can occur while scheduling
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum QueueError {
    #[error("task broker unavailable: {0}")]
    BrokerUnavailable(String),

    #[error("timed out talking to task broker: {0}")]
    Timeout(String),

    #[error("invalid chain: {0}")]
    InvalidChain(String),

    #[error("task rejected: {0}")]
    Rejected(String),
}

/// Scheduling interface of the task broker
#[async_trait]
pub trait TaskQueue: Send + Sync {
    /// Schedule one task, optionally delayed by `countdown`
    async fn schedule(
        &self,
        task: TaskSignature,
        queue: &str,
        countdown: Option<Duration>,
    ) -> Result<TaskHandle, QueueError>;

    /// Schedule a chain; its continuations are run by the executing side
    async fn schedule_chain(
        &self,
        chain: IndexingChain,
        queue: &str,
    ) -> Result<ChainHandle, QueueError>;

    fn backend_name(&self) -> &'static str;
}
