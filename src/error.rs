//! # Error Types
//!
//! Crate-wide error enum and the error-type taxonomy used in results, batch
//! breakdowns and metrics keys.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::config::ConfigurationError;
use crate::locking::LockError;
use crate::models::WorkItemId;
use crate::queue::QueueError;

/// Classification keys surfaced on results and in metrics
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorType {
    PermissionDenied,
    Trashed,
    NotFound,
    Stub,
    LockHeld,
    LockError,
    ConnectionError,
    Timeout,
    BrokerUnavailable,
    SchedulingError,
    ValidationError,
    PipelineError,
    ConfigurationError,
    InternalError,
    Unknown,
}

impl ErrorType {
    /// Every known error type, used to rebuild metric breakdowns
    pub const ALL: [ErrorType; 15] = [
        ErrorType::PermissionDenied,
        ErrorType::Trashed,
        ErrorType::NotFound,
        ErrorType::Stub,
        ErrorType::LockHeld,
        ErrorType::LockError,
        ErrorType::ConnectionError,
        ErrorType::Timeout,
        ErrorType::BrokerUnavailable,
        ErrorType::SchedulingError,
        ErrorType::ValidationError,
        ErrorType::PipelineError,
        ErrorType::ConfigurationError,
        ErrorType::InternalError,
        ErrorType::Unknown,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorType::PermissionDenied => "permission_denied",
            ErrorType::Trashed => "trashed",
            ErrorType::NotFound => "not_found",
            ErrorType::Stub => "stub",
            ErrorType::LockHeld => "lock_held",
            ErrorType::LockError => "lock_error",
            ErrorType::ConnectionError => "connection_error",
            ErrorType::Timeout => "timeout",
            ErrorType::BrokerUnavailable => "broker_unavailable",
            ErrorType::SchedulingError => "scheduling_error",
            ErrorType::ValidationError => "validation_error",
            ErrorType::PipelineError => "pipeline_error",
            ErrorType::ConfigurationError => "configuration_error",
            ErrorType::InternalError => "internal_error",
            ErrorType::Unknown => "unknown",
        }
    }

    /// Item-level rejections that no retry can fix
    pub fn is_invalid_item(&self) -> bool {
        matches!(
            self,
            ErrorType::Trashed | ErrorType::NotFound | ErrorType::Stub
        )
    }
}

impl fmt::Display for ErrorType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors raised inside the indexing coordination layer
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum IndexingError {
    #[error("work item {0} does not exist")]
    NotFound(WorkItemId),

    #[error("work item {0} is trashed")]
    Trashed(WorkItemId),

    #[error("work item {0} is a stub placeholder")]
    Stub(WorkItemId),

    #[error("validation error: {0}")]
    Validation(String),

    #[error("permission denied for work item {0}")]
    PermissionDenied(WorkItemId),

    #[error("lock '{0}' is already held")]
    LockHeld(String),

    #[error("lock backend error: {0}")]
    LockBackend(String),

    #[error("connection error: {0}")]
    Connection(String),

    #[error("operation timed out: {0}")]
    Timeout(String),

    #[error("task broker unavailable: {0}")]
    BrokerUnavailable(String),

    #[error("scheduling error: {0}")]
    Scheduling(String),

    #[error("pipeline '{pipeline}' failed: {message}")]
    Pipeline { pipeline: String, message: String },

    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl IndexingError {
    /// Variant name, used as the batch breakdown key for uncaught errors
    pub fn kind_name(&self) -> &'static str {
        match self {
            IndexingError::NotFound(_) => "NotFound",
            IndexingError::Trashed(_) => "Trashed",
            IndexingError::Stub(_) => "Stub",
            IndexingError::Validation(_) => "Validation",
            IndexingError::PermissionDenied(_) => "PermissionDenied",
            IndexingError::LockHeld(_) => "LockHeld",
            IndexingError::LockBackend(_) => "LockBackend",
            IndexingError::Connection(_) => "Connection",
            IndexingError::Timeout(_) => "Timeout",
            IndexingError::BrokerUnavailable(_) => "BrokerUnavailable",
            IndexingError::Scheduling(_) => "Scheduling",
            IndexingError::Pipeline { .. } => "Pipeline",
            IndexingError::Configuration(_) => "Configuration",
            IndexingError::Internal(_) => "Internal",
        }
    }

    /// Default error type implied by the variant alone
    pub fn error_type(&self) -> ErrorType {
        match self {
            IndexingError::NotFound(_) => ErrorType::NotFound,
            IndexingError::Trashed(_) => ErrorType::Trashed,
            IndexingError::Stub(_) => ErrorType::Stub,
            IndexingError::Validation(_) => ErrorType::ValidationError,
            IndexingError::PermissionDenied(_) => ErrorType::PermissionDenied,
            IndexingError::LockHeld(_) => ErrorType::LockHeld,
            IndexingError::LockBackend(_) => ErrorType::LockError,
            IndexingError::Connection(_) => ErrorType::ConnectionError,
            IndexingError::Timeout(_) => ErrorType::Timeout,
            IndexingError::BrokerUnavailable(_) => ErrorType::BrokerUnavailable,
            IndexingError::Scheduling(_) => ErrorType::SchedulingError,
            IndexingError::Pipeline { .. } => ErrorType::PipelineError,
            IndexingError::Configuration(_) => ErrorType::ConfigurationError,
            IndexingError::Internal(_) => ErrorType::InternalError,
        }
    }
}

impl From<LockError> for IndexingError {
    fn from(err: LockError) -> Self {
        match err {
            LockError::Held { name } => IndexingError::LockHeld(name),
            other => IndexingError::LockBackend(other.to_string()),
        }
    }
}

impl From<QueueError> for IndexingError {
    fn from(err: QueueError) -> Self {
        match err {
            QueueError::BrokerUnavailable(msg) => IndexingError::BrokerUnavailable(msg),
            QueueError::Timeout(msg) => IndexingError::Timeout(msg),
            other => IndexingError::Scheduling(other.to_string()),
        }
    }
}

impl From<ConfigurationError> for IndexingError {
    fn from(err: ConfigurationError) -> Self {
        IndexingError::Configuration(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, IndexingError>;
