//! Conditional indexing chains.
//!
//! A chain is an ordered list of steps plus two continuations. Each dispatch
//! step consumes the value of the validation step before it and no-ops on
//! the invalid sentinel. [`ChainBuilder::build`] refuses to produce a chain
//! without both continuations, so a scheduled chain always releases its lock.

use serde::{Deserialize, Serialize};

use super::QueueError;
use crate::locking::LockName;
use crate::models::WorkItemId;
use crate::pipelines::PipelineKind;

/// Why a chain was built
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IndexTrigger {
    Created,
    Updated,
}

impl IndexTrigger {
    pub fn from_creation_flag(is_creation_event: bool) -> Self {
        if is_creation_event {
            IndexTrigger::Created
        } else {
            IndexTrigger::Updated
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "step", rename_all = "snake_case")]
pub enum ChainStep {
    Validate {
        item_id: WorkItemId,
    },
    Dispatch {
        pipeline: PipelineKind,
        item_id: WorkItemId,
    },
}

/// Action run after a chain finishes
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum Continuation {
    ReleaseExecutionLock { lock_name: LockName },
    /// Chains scheduled without an execution lock have nothing to clean up
    NoOp,
}

impl Continuation {
    pub fn release_execution_lock(lock_name: LockName) -> Self {
        Continuation::ReleaseExecutionLock { lock_name }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexingChain {
    item_id: WorkItemId,
    trigger: IndexTrigger,
    steps: Vec<ChainStep>,
    on_success: Continuation,
    on_error: Continuation,
}

impl IndexingChain {
    /// validate → dispatch for each pipeline in order, with `release` attached
    /// as both the success and the error continuation
    pub fn for_item(
        item_id: WorkItemId,
        trigger: IndexTrigger,
        pipelines: &[PipelineKind],
        release: Continuation,
    ) -> Result<Self, QueueError> {
        let mut builder = ChainBuilder::new(item_id, trigger);
        for pipeline in pipelines {
            builder = builder.validate().dispatch(*pipeline);
        }
        builder.on_complete(release).build()
    }

    pub fn item_id(&self) -> WorkItemId {
        self.item_id
    }

    pub fn trigger(&self) -> IndexTrigger {
        self.trigger
    }

    pub fn steps(&self) -> &[ChainStep] {
        &self.steps
    }

    pub fn on_success(&self) -> &Continuation {
        &self.on_success
    }

    pub fn on_error(&self) -> &Continuation {
        &self.on_error
    }

    /// Pipelines in the order they are dispatched
    pub fn pipelines(&self) -> Vec<PipelineKind> {
        self.steps
            .iter()
            .filter_map(|step| match step {
                ChainStep::Dispatch { pipeline, .. } => Some(*pipeline),
                ChainStep::Validate { .. } => None,
            })
            .collect()
    }
}

#[derive(Debug, Clone)]
pub struct ChainBuilder {
    item_id: WorkItemId,
    trigger: IndexTrigger,
    steps: Vec<ChainStep>,
    on_success: Option<Continuation>,
    on_error: Option<Continuation>,
}

impl ChainBuilder {
    pub fn new(item_id: WorkItemId, trigger: IndexTrigger) -> Self {
        Self {
            item_id,
            trigger,
            steps: Vec::new(),
            on_success: None,
            on_error: None,
        }
    }

    pub fn validate(mut self) -> Self {
        self.steps.push(ChainStep::Validate {
            item_id: self.item_id,
        });
        self
    }

    pub fn dispatch(mut self, pipeline: PipelineKind) -> Self {
        self.steps.push(ChainStep::Dispatch {
            pipeline,
            item_id: self.item_id,
        });
        self
    }

    /// Success continuation
    pub fn link(mut self, continuation: Continuation) -> Self {
        self.on_success = Some(continuation);
        self
    }

    /// Error continuation
    pub fn link_error(mut self, continuation: Continuation) -> Self {
        self.on_error = Some(continuation);
        self
    }

    /// Same continuation for both outcomes
    pub fn on_complete(self, continuation: Continuation) -> Self {
        self.link(continuation.clone()).link_error(continuation)
    }

    pub fn build(self) -> Result<IndexingChain, QueueError> {
        if self.steps.is_empty() {
            return Err(QueueError::InvalidChain(format!(
                "chain for item {} has no steps",
                self.item_id
            )));
        }
        if let Some(ChainStep::Dispatch { pipeline, .. }) = self.steps.first() {
            return Err(QueueError::InvalidChain(format!(
                "dispatch to '{pipeline}' is not preceded by validation"
            )));
        }
        let on_success = self.on_success.ok_or_else(|| {
            QueueError::InvalidChain("success continuation not attached".to_string())
        })?;
        let on_error = self.on_error.ok_or_else(|| {
            QueueError::InvalidChain("error continuation not attached".to_string())
        })?;

        Ok(IndexingChain {
            item_id: self.item_id,
            trigger: self.trigger,
            steps: self.steps,
            on_success,
            on_error,
        })
    }
}
