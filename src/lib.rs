#![allow(clippy::missing_errors_doc)] // Allow public functions without # Errors sections
#![allow(clippy::must_use_candidate)] // Allow methods without must_use when context is clear

//! # Indexing Coordinator
//!
//! Lock-guarded coordination layer that fans "a work item changed" events out
//! to two downstream indexing pipelines: a full-text **search** index and a
//! **hierarchy** (taxonomy) index.
//!
//! ## Overview
//!
//! The coordinator never writes to an index itself. For each item it checks
//! permission, validates the item, takes a per-item execution lock and
//! schedules a conditional chain on a task queue:
//!
//! ```text
//! validate ─▶ search.index_item ─▶ validate ─▶ hierarchy.index_item
//!                                                    │
//!            on success / on error: release execution lock
//! ```
//!
//! Each dispatch re-validates because the two legs may run minutes apart.
//! When the chain cannot be scheduled the coordinator falls back to direct
//! tasks, with the hierarchy leg delayed.
//!
//! ## Module Organization
//!
//! - [`models`] - Work items, acting users and the item store
//! - [`validation`] - Eligibility check
//! - [`locking`] - Named TTL locks for scheduling and execution
//! - [`pipelines`] - Startup-time registry of downstream pipelines
//! - [`queue`] - Task queue interface, chains, chain executor, local queue
//! - [`orchestration`] - Coordinator, batch mode, retry layer, event handler
//! - [`metrics`] - TTL'd counters and running averages
//! - [`config`] - Layered YAML and environment configuration
//! - [`logging`] - Structured logging setup
//! - [`bootstrap`] - In-process wiring of all of the above
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use indexing_coordinator::bootstrap::{IndexingSystem, SystemComponents};
//! use indexing_coordinator::config::ConfigManager;
//! use indexing_coordinator::locking::InMemoryLockManager;
//! use indexing_coordinator::models::{InMemoryWorkItemStore, WorkItem, WorkItemId};
//! use indexing_coordinator::pipelines::{InMemoryPipeline, PipelineKind, PipelineRegistry};
//! use std::sync::Arc;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! indexing_coordinator::logging::init_structured_logging();
//!
//! let store = Arc::new(InMemoryWorkItemStore::with_items([WorkItem::new(42, "Quarterly report")]));
//! let pipelines = PipelineRegistry::new()
//!     .register(Arc::new(InMemoryPipeline::new(PipelineKind::Search)))
//!     .register(Arc::new(InMemoryPipeline::new(PipelineKind::Hierarchy)));
//! let components = SystemComponents::new(store, pipelines)
//!     .with_lock_manager(Arc::new(InMemoryLockManager::new()));
//!
//! let system = IndexingSystem::bootstrap(ConfigManager::load()?, components)?;
//! let result = system.coordinator().index_item(WorkItemId(42), true, None).await?;
//! println!("chain scheduled: {:?}", result.chain_task_id);
//!
//! system.shutdown().await;
//! # Ok(())
//! # }
//! ```

pub mod bootstrap;
pub mod config;
pub mod constants;
pub mod error;
pub mod locking;
pub mod logging;
pub mod metrics;
pub mod models;
pub mod orchestration;
pub mod pipelines;
pub mod queue;
pub mod validation;

pub use bootstrap::{IndexingSystem, SystemComponents};
pub use config::{ConfigManager, ConfigurationError, IndexingConfig};
pub use error::{ErrorType, IndexingError, Result};
pub use locking::{LockError, LockManager, LockName, LockReleaseOutcome};
pub use metrics::{IndexingMetrics, MetricsSnapshot};
pub use models::{ActingUser, WorkItem, WorkItemId, WorkItemStore};
pub use orchestration::{
    BatchRequest, BatchResult, DeindexResult, IndexResult, IndexingCoordinator,
    IndexingEventHandler, IndexingTasks, ItemEvent, SchedulingPath,
};
pub use pipelines::{IndexPipeline, PipelineKind, PipelineRegistry};
pub use queue::{IndexingChain, QueueError, TaskQueue, TaskSignature};
pub use validation::{Validation, Validator};
