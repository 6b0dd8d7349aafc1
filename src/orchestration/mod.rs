//! # Indexing Orchestration
//!
//! Coordination logic: the coordinator and its batch mode, the retrying task
//! layer, the event handler, error classification and the permission gate.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────┐     ┌──────────────────┐     ┌──────────────────┐
//! │ IndexingEvent    │────▶│ IndexingTasks    │────▶│ Indexing         │
//! │ Handler          │     │ (retry/backoff)  │     │ Coordinator      │
//! └──────────────────┘     └──────────────────┘     └──────────────────┘
//!   scheduling lock          ErrorClassifier          execution lock,
//!                                                     chain, fallback
//! ```

pub mod access;
pub mod batch;
pub mod coordinator;
pub mod error_classifier;
pub mod event_handler;
pub mod retry;

pub use access::{AccessChecker, InMemoryAccessChecker};
pub use batch::{BatchItemError, BatchRequest, BatchResult};
pub use coordinator::{
    CoordinatorConfig, DeindexFailure, DeindexResult, IndexResult, IndexingCoordinator,
    IndexingCoordinatorBuilder, LockDisposition, SchedulingPath,
};
pub use error_classifier::{
    classify_message, ClassificationBasis, ErrorClass, ErrorClassification, ErrorClassifier,
    IndexingErrorClassifier,
};
pub use event_handler::{DispatchedWork, HandlerDecision, IndexingEventHandler, ItemEvent};
pub use retry::{BackoffPolicy, IndexingTasks, TaskDisposition, TaskOutcome};
