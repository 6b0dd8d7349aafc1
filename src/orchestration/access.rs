//! Optional permission gate consulted before any lock is taken.
//!
//! ```rust
//! use indexing_coordinator::orchestration::{AccessChecker, InMemoryAccessChecker};
//! use indexing_coordinator::models::{ActingUser, WorkItemId};
//!
//! # tokio_test::block_on(async {
//! let checker = InMemoryAccessChecker::new();
//! let alice = ActingUser::new(7, "alice");
//! checker.grant(&alice, WorkItemId(42));
//!
//! assert!(checker.check_access(WorkItemId(42), &alice).await);
//! assert!(!checker.check_access(WorkItemId(43), &alice).await);
//! # });
//! ```

use async_trait::async_trait;
use dashmap::DashSet;

use crate::models::{ActingUser, WorkItemId};

#[async_trait]
pub trait AccessChecker: Send + Sync {
    /// Whether `user` may view and act on the item
    async fn check_access(&self, item_id: WorkItemId, user: &ActingUser) -> bool;
}

/// Grants access to superusers and to explicitly granted (user, item) pairs
#[derive(Debug, Default)]
pub struct InMemoryAccessChecker {
    grants: DashSet<(i64, WorkItemId)>,
}

impl InMemoryAccessChecker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn grant(&self, user: &ActingUser, item_id: WorkItemId) {
        self.grants.insert((user.id, item_id));
    }

    pub fn revoke(&self, user: &ActingUser, item_id: WorkItemId) {
        self.grants.remove(&(user.id, item_id));
    }
}

#[async_trait]
impl AccessChecker for InMemoryAccessChecker {
    async fn check_access(&self, item_id: WorkItemId, user: &ActingUser) -> bool {
        user.is_superuser || self.grants.contains(&(user.id, item_id))
    }
}
