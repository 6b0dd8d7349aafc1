use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::BTreeSet;
use std::sync::atomic::{AtomicBool, Ordering};

use super::{IndexPipeline, PipelineKind};
use crate::error::{IndexingError, Result};
use crate::models::{WorkItem, WorkItemId};

/// Pipeline that keeps its index in memory and records every call
#[derive(Debug)]
pub struct InMemoryPipeline {
    kind: PipelineKind,
    indexed: Mutex<BTreeSet<WorkItemId>>,
    index_calls: Mutex<Vec<WorkItemId>>,
    remove_calls: Mutex<Vec<WorkItemId>>,
    failing: AtomicBool,
}

impl InMemoryPipeline {
    pub fn new(kind: PipelineKind) -> Self {
        Self {
            kind,
            indexed: Mutex::new(BTreeSet::new()),
            index_calls: Mutex::new(Vec::new()),
            remove_calls: Mutex::new(Vec::new()),
            failing: AtomicBool::new(false),
        }
    }

    /// Make every subsequent call fail with a pipeline error
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn contains(&self, id: WorkItemId) -> bool {
        self.indexed.lock().contains(&id)
    }

    pub fn index_calls(&self) -> Vec<WorkItemId> {
        self.index_calls.lock().clone()
    }

    pub fn remove_calls(&self) -> Vec<WorkItemId> {
        self.remove_calls.lock().clone()
    }

    fn check_failing(&self, operation: &str, id: WorkItemId) -> Result<()> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(IndexingError::Pipeline {
                pipeline: self.kind.to_string(),
                message: format!("{operation} failed for item {id}"),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl IndexPipeline for InMemoryPipeline {
    fn kind(&self) -> PipelineKind {
        self.kind
    }

    async fn index_item(&self, item: &WorkItem) -> Result<()> {
        self.index_calls.lock().push(item.id);
        self.check_failing("index", item.id)?;
        self.indexed.lock().insert(item.id);
        Ok(())
    }

    async fn remove_item(&self, id: WorkItemId) -> Result<()> {
        self.remove_calls.lock().push(id);
        self.check_failing("remove", id)?;
        self.indexed.lock().remove(&id);
        Ok(())
    }
}
