//! # System Constants
//!
//! Task names, metric keys and defaults shared by the coordinator, the task
//! layer and the metrics collector.

/// Task names as seen by the task queue
pub mod task_names {
    pub const SEARCH_INDEX_ITEM: &str = "search.index_item";
    pub const SEARCH_REMOVE_ITEM: &str = "search.remove_item";
    pub const HIERARCHY_INDEX_ITEM: &str = "hierarchy.index_item";
    pub const HIERARCHY_REMOVE_ITEM: &str = "hierarchy.remove_item";
    pub const VALIDATE_ITEM: &str = "indexing.validate_item";
    pub const RELEASE_EXECUTION_LOCK: &str = "indexing.release_execution_lock";
}

/// Counter and average keys written by `IndexingMetrics`
pub mod metric_keys {
    pub const INDEX_SUCCESS: &str = "index_success";
    pub const INDEX_FAILURE: &str = "index_failure";
    pub const DEINDEX_SUCCESS: &str = "deindex_success";
    pub const DEINDEX_FAILURE: &str = "deindex_failure";
    pub const RETRY_COUNT: &str = "retry_count";
    pub const LOCK_RELEASE: &str = "lock_release";

    pub const INDEX_DURATION: &str = "index";
    pub const DEINDEX_DURATION: &str = "deindex";
}

/// Batch breakdown keys that are not error types
pub mod batch_keys {
    pub const SCHEDULING_ERROR: &str = "scheduling_error";
    pub const UNKNOWN_STATE: &str = "unknown indexing state";
}

pub const ALREADY_IN_PROGRESS: &str = "indexing already in progress";
pub const PERMISSION_DENIED: &str = "permission denied";

pub const DEFAULT_INDEXING_QUEUE: &str = "indexing";
pub const DEFAULT_EXECUTION_LOCK_PREFIX: &str = "index_item_lock";
pub const DEFAULT_SCHEDULING_LOCK_PREFIX: &str = "index_schedule_lock";
pub const DEFAULT_EXECUTION_LOCK_TIMEOUT_SECONDS: u64 = 600;
pub const DEFAULT_SCHEDULING_LOCK_TIMEOUT_SECONDS: u64 = 10;
pub const DEFAULT_FALLBACK_HIERARCHY_COUNTDOWN_SECONDS: u64 = 5;

pub const DEFAULT_CHUNK_SIZE: usize = 1000;
pub const DEFAULT_MAX_BATCH_SIZE: usize = 5000;

pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;
pub const DEFAULT_COUNTER_TTL_SECONDS: u64 = 3600;
pub const DEFAULT_SUMMARY_INTERVAL_SECONDS: u64 = 300;
