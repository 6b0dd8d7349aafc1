//! # Models
//!
//! The coordinator's read-only view of work items and the store it reads
//! them through. Item lifecycle is owned by the surrounding application.

pub mod store;
pub mod user;
pub mod work_item;

pub use store::{InMemoryWorkItemStore, WorkItemStore};
pub use user::ActingUser;
pub use work_item::{WorkItem, WorkItemId};
