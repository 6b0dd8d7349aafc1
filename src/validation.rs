//! # Work Item Validation
//!
//! Decides whether an item is eligible for indexing. Chains call this once
//! before each pipeline dispatch, because the dispatches can run minutes
//! apart and the item may have been trashed in between.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tracing::debug;

use crate::error::{ErrorType, IndexingError, Result};
use crate::models::{WorkItem, WorkItemId, WorkItemStore};

/// Why an item is not eligible for indexing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InvalidReason {
    NotFound,
    Trashed,
    Stub,
}

impl InvalidReason {
    pub fn error_type(&self) -> ErrorType {
        match self {
            InvalidReason::NotFound => ErrorType::NotFound,
            InvalidReason::Trashed => ErrorType::Trashed,
            InvalidReason::Stub => ErrorType::Stub,
        }
    }

    pub fn into_error(self, id: WorkItemId) -> IndexingError {
        match self {
            InvalidReason::NotFound => IndexingError::NotFound(id),
            InvalidReason::Trashed => IndexingError::Trashed(id),
            InvalidReason::Stub => IndexingError::Stub(id),
        }
    }
}

impl fmt::Display for InvalidReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.error_type().as_str())
    }
}

/// Outcome of validating a work item
#[derive(Debug, Clone, PartialEq)]
pub enum Validation {
    Valid(WorkItem),
    Invalid(InvalidReason),
}

impl Validation {
    pub fn is_valid(&self) -> bool {
        matches!(self, Validation::Valid(_))
    }

    /// The item, or `None` as the invalid sentinel
    pub fn into_item(self) -> Option<WorkItem> {
        match self {
            Validation::Valid(item) => Some(item),
            Validation::Invalid(_) => None,
        }
    }

    pub fn invalid_reason(&self) -> Option<InvalidReason> {
        match self {
            Validation::Valid(_) => None,
            Validation::Invalid(reason) => Some(*reason),
        }
    }
}

/// Reads an item and checks it exists, is not trashed and is not a stub
#[derive(Clone)]
pub struct Validator {
    store: Arc<dyn WorkItemStore>,
}

impl fmt::Debug for Validator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Validator")
            .field("store", &self.store.store_name())
            .finish()
    }
}

impl Validator {
    pub fn new(store: Arc<dyn WorkItemStore>) -> Self {
        Self { store }
    }

    /// Validate an item. Ineligibility is a value, only read failures are errors.
    pub async fn validate(&self, id: WorkItemId) -> Result<Validation> {
        let validation = match self.store.fetch(id).await? {
            None => Validation::Invalid(InvalidReason::NotFound),
            Some(item) if item.soft_deleted => Validation::Invalid(InvalidReason::Trashed),
            Some(item) if item.is_stub => Validation::Invalid(InvalidReason::Stub),
            Some(item) => Validation::Valid(item),
        };

        if let Some(reason) = validation.invalid_reason() {
            debug!(item_id = %id, reason = %reason, "Work item not eligible for indexing");
        }

        Ok(validation)
    }
}
