//! # Indexing Pipelines
//!
//! The two downstream indexing systems, reached only through the task layer.
//! Implementations are registered into a [`PipelineRegistry`] once at process
//! start and looked up by [`PipelineKind`]; nothing is resolved from strings
//! at runtime.

pub mod in_memory;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tracing::info;

use crate::constants::task_names;
use crate::error::{IndexingError, Result};
use crate::models::{WorkItem, WorkItemId};

pub use in_memory::InMemoryPipeline;

/// Downstream pipeline identity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineKind {
    Search,
    Hierarchy,
}

impl PipelineKind {
    /// Chain order: search is always scheduled before hierarchy
    pub const ALL: [PipelineKind; 2] = [PipelineKind::Search, PipelineKind::Hierarchy];

    pub fn as_str(&self) -> &'static str {
        match self {
            PipelineKind::Search => "search",
            PipelineKind::Hierarchy => "hierarchy",
        }
    }

    pub fn index_task_name(&self) -> &'static str {
        match self {
            PipelineKind::Search => task_names::SEARCH_INDEX_ITEM,
            PipelineKind::Hierarchy => task_names::HIERARCHY_INDEX_ITEM,
        }
    }

    pub fn remove_task_name(&self) -> &'static str {
        match self {
            PipelineKind::Search => task_names::SEARCH_REMOVE_ITEM,
            PipelineKind::Hierarchy => task_names::HIERARCHY_REMOVE_ITEM,
        }
    }
}

impl fmt::Display for PipelineKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A downstream index. Both operations must be idempotent.
#[async_trait]
pub trait IndexPipeline: Send + Sync {
    fn kind(&self) -> PipelineKind;

    async fn index_item(&self, item: &WorkItem) -> Result<()>;

    async fn remove_item(&self, id: WorkItemId) -> Result<()>;
}

/// Startup-time registration table of pipelines
#[derive(Clone, Default)]
pub struct PipelineRegistry {
    pipelines: HashMap<PipelineKind, Arc<dyn IndexPipeline>>,
}

impl fmt::Debug for PipelineRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PipelineRegistry")
            .field("pipelines", &self.kinds())
            .finish()
    }
}

impl PipelineRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a pipeline under its own kind, replacing any previous one
    pub fn register(mut self, pipeline: Arc<dyn IndexPipeline>) -> Self {
        let kind = pipeline.kind();
        if self.pipelines.insert(kind, pipeline).is_some() {
            info!(pipeline = %kind, "Replaced registered pipeline");
        } else {
            info!(pipeline = %kind, "Registered pipeline");
        }
        self
    }

    pub fn get(&self, kind: PipelineKind) -> Result<Arc<dyn IndexPipeline>> {
        self.pipelines.get(&kind).cloned().ok_or_else(|| {
            IndexingError::Configuration(format!("no pipeline registered for '{kind}'"))
        })
    }

    pub fn kinds(&self) -> Vec<PipelineKind> {
        let mut kinds: Vec<_> = self.pipelines.keys().copied().collect();
        kinds.sort();
        kinds
    }

    pub fn is_complete(&self) -> bool {
        PipelineKind::ALL
            .iter()
            .all(|kind| self.pipelines.contains_key(kind))
    }
}
