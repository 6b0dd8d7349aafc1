//! Work item storage seam.
//!
//! The coordinator only ever reads through [`WorkItemStore`]. The in-memory
//! implementation backs development setups and the test suites.

use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use tracing::debug;

use super::{WorkItem, WorkItemId};
use crate::error::{IndexingError, Result};

/// Read access to work items owned by the surrounding application
#[async_trait]
pub trait WorkItemStore: Send + Sync {
    /// Fetch an item, `Ok(None)` when it does not exist
    async fn fetch(&self, id: WorkItemId) -> Result<Option<WorkItem>>;

    /// Store name for logging
    fn store_name(&self) -> &'static str {
        "work_item_store"
    }
}

/// DashMap-backed store
#[derive(Debug, Default)]
pub struct InMemoryWorkItemStore {
    items: DashMap<WorkItemId, WorkItem>,
    failing_reads: AtomicU32,
}

impl InMemoryWorkItemStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_items(items: impl IntoIterator<Item = WorkItem>) -> Self {
        let store = Self::new();
        for item in items {
            store.insert(item);
        }
        store
    }

    pub fn insert(&self, item: WorkItem) {
        self.items.insert(item.id, item);
    }

    pub fn remove(&self, id: WorkItemId) -> Option<WorkItem> {
        self.items.remove(&id).map(|(_, item)| item)
    }

    /// Soft-delete an item; returns false when it does not exist
    pub fn trash(&self, id: WorkItemId) -> bool {
        match self.items.get_mut(&id) {
            Some(mut item) => {
                item.soft_deleted = true;
                true
            }
            None => false,
        }
    }

    pub fn mark_stub(&self, id: WorkItemId) -> bool {
        match self.items.get_mut(&id) {
            Some(mut item) => {
                item.is_stub = true;
                true
            }
            None => false,
        }
    }

    /// Make the next `count` reads fail with a connection error
    pub fn fail_next_reads(&self, count: u32) {
        self.failing_reads.store(count, Ordering::SeqCst);
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

#[async_trait]
impl WorkItemStore for InMemoryWorkItemStore {
    async fn fetch(&self, id: WorkItemId) -> Result<Option<WorkItem>> {
        let should_fail = self
            .failing_reads
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if should_fail {
            debug!(item_id = %id, "Simulated store read failure");
            return Err(IndexingError::Connection(format!(
                "work item store read failed for {id}"
            )));
        }

        Ok(self.items.get(&id).map(|entry| entry.value().clone()))
    }

    fn store_name(&self) -> &'static str {
        "in_memory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_trash_and_stub_update_existing_items() {
        let store = InMemoryWorkItemStore::with_items([WorkItem::new(1, "invoice")]);

        assert!(store.trash(WorkItemId(1)));
        assert!(store.mark_stub(WorkItemId(1)));
        assert!(!store.trash(WorkItemId(2)));

        let item = store.fetch(WorkItemId(1)).await.unwrap().unwrap();
        assert!(item.soft_deleted);
        assert!(item.is_stub);
    }

    #[tokio::test]
    async fn test_failing_reads_are_consumed() {
        let store = InMemoryWorkItemStore::with_items([WorkItem::new(1, "invoice")]);
        store.fail_next_reads(1);

        assert!(matches!(
            store.fetch(WorkItemId(1)).await,
            Err(IndexingError::Connection(_))
        ));
        assert!(store.fetch(WorkItemId(1)).await.unwrap().is_some());
    }
}
