//! Observable room state for invariant checks.

use std::{ops::Sub, time::Duration};

use roomsync_client::RoomView;
use roomsync_core::{ConnectionManager, ConnectionState};

/// Full store contents, available when snapshotting a manager.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreSnapshot {
    /// Every held message id, oldest first
    pub all_ids: Vec<String>,
    /// Messages per page
    pub page_size: usize,
    /// Pages currently shown
    pub current_page: usize,
}

/// What a room UI can observe.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoomSnapshot {
    /// Connection state
    pub state: ConnectionState,
    /// Displayed message ids, oldest first
    pub page_ids: Vec<String>,
    /// Displayed message ids with an empty display name
    pub unnamed_ids: Vec<String>,
    /// Older messages are hidden
    pub has_more: bool,
    /// Unconfirmed sends
    pub pending: usize,
    /// Full store, if known
    pub store: Option<StoreSnapshot>,
}

impl RoomSnapshot {
    /// Snapshot of a disconnected, empty room.
    pub fn empty() -> Self {
        Self {
            state: ConnectionState::Disconnected,
            page_ids: Vec::new(),
            unnamed_ids: Vec::new(),
            has_more: false,
            pending: 0,
            store: None,
        }
    }

    /// Snapshot including the full store.
    pub fn from_manager<I>(manager: &ConnectionManager<I>) -> Self
    where
        I: Copy + Ord + Send + Sync + Sub<Output = Duration>,
    {
        let store = manager.store();
        let page = store.page();

        Self {
            state: manager.state(),
            page_ids: page.iter().map(|m| m.id.clone()).collect(),
            unnamed_ids: page
                .iter()
                .filter(|m| !m.has_display_name())
                .map(|m| m.id.clone())
                .collect(),
            has_more: store.has_more(),
            pending: manager.pending().len(),
            store: Some(StoreSnapshot {
                all_ids: store.messages().iter().map(|m| m.id.clone()).collect(),
                page_size: store.window().page_size(),
                current_page: store.window().current_page(),
            }),
        }
    }

    /// Snapshot of a published view. The full store is not visible.
    pub fn from_view(view: &RoomView) -> Self {
        Self {
            state: view.state,
            page_ids: view.messages.iter().map(|m| m.id.clone()).collect(),
            unnamed_ids: view
                .messages
                .iter()
                .filter(|m| !m.has_display_name())
                .map(|m| m.id.clone())
                .collect(),
            has_more: view.has_more,
            pending: view.pending_confirmations,
            store: None,
        }
    }
}
