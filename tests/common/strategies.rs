use proptest::prelude::*;
use proptest::strategy::Just;

use indexing_coordinator::models::{WorkItem, WorkItemId};

/// Stored state of one work item in a generated batch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItemState {
    Valid,
    Trashed,
    Stub,
    Missing,
}

impl ItemState {
    pub fn is_valid(&self) -> bool {
        matches!(self, ItemState::Valid)
    }

    /// The stored row for this state, `None` when the item does not exist
    pub fn to_item(self, id: WorkItemId) -> Option<WorkItem> {
        let item = WorkItem::new(id, format!("item {id}"));
        match self {
            ItemState::Valid => Some(item),
            ItemState::Trashed => Some(item.trashed()),
            ItemState::Stub => Some(item.stub()),
            ItemState::Missing => None,
        }
    }
}

/// Strategy for a single item state, weighted towards valid items
pub fn item_state_strategy() -> impl Strategy<Value = ItemState> {
    prop_oneof![
        4 => Just(ItemState::Valid),
        1 => Just(ItemState::Trashed),
        1 => Just(ItemState::Stub),
        1 => Just(ItemState::Missing),
    ]
}

/// Strategy for a batch of item states; ids are assigned by position
pub fn batch_states_strategy(max_len: usize) -> impl Strategy<Value = Vec<ItemState>> {
    prop::collection::vec(item_state_strategy(), 0..=max_len)
}

/// Strategy for chunk sizes small enough to force multiple chunks
pub fn chunk_size_strategy() -> impl Strategy<Value = usize> {
    1usize..=16
}

/// Strategy for free-form error messages
pub fn error_message_strategy() -> impl Strategy<Value = String> {
    "[a-zA-Z0-9 _:.-]{0,80}"
}

/// Strategy for messages that embed one of the non-transient signals
pub fn non_transient_message_strategy() -> impl Strategy<Value = String> {
    (
        "[a-z ]{0,20}",
        prop_oneof![
            Just("permission denied"),
            Just("not found"),
            Just("does not exist"),
            Just("is trashed"),
            Just("is a stub"),
        ],
        "[a-z ]{0,20}",
    )
        .prop_map(|(prefix, signal, suffix)| format!("{prefix}{signal}{suffix}"))
}
