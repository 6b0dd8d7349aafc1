use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Opaque identifier of a work item
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct WorkItemId(pub i64);

impl WorkItemId {
    pub fn value(&self) -> i64 {
        self.0
    }
}

impl fmt::Display for WorkItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i64> for WorkItemId {
    fn from(value: i64) -> Self {
        Self(value)
    }
}

/// Validity projection of a stored work item
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkItem {
    pub id: WorkItemId,
    pub title: String,
    /// Moved to the trash but not yet purged
    pub soft_deleted: bool,
    /// Placeholder created ahead of its content
    pub is_stub: bool,
    pub updated_at: DateTime<Utc>,
}

impl WorkItem {
    pub fn new(id: impl Into<WorkItemId>, title: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            soft_deleted: false,
            is_stub: false,
            updated_at: Utc::now(),
        }
    }

    pub fn trashed(mut self) -> Self {
        self.soft_deleted = true;
        self
    }

    pub fn stub(mut self) -> Self {
        self.is_stub = true;
        self
    }
}
