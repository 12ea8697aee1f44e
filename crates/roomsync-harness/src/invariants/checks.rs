//! Standard invariant checks.

use std::collections::HashSet;

use roomsync_core::ConnectionState;

use super::{Invariant, InvariantResult, RoomSnapshot, Violation};

/// No message id appears twice, on the page or in the store.
pub struct UniqueMessageIds;

impl Invariant for UniqueMessageIds {
    fn name(&self) -> &'static str {
        "unique_message_ids"
    }

    fn check(&self, state: &RoomSnapshot) -> InvariantResult {
        let store_ids = state.store.as_ref().map(|s| &s.all_ids);
        let lists = std::iter::once(&state.page_ids).chain(store_ids);
        for ids in lists {
            let mut seen = HashSet::new();
            if let Some(dup) = ids.iter().find(|id| !seen.insert(id.as_str())) {
                return Err(Violation {
                    invariant: self.name(),
                    message: format!("id {dup} appears twice in {ids:?}"),
                });
            }
        }
        Ok(())
    }
}

/// The page is the newest `min(total, page * size)` messages, and `has_more`
/// is set exactly when older ones are hidden.
///
/// Only the first half can be checked without the full store: a page with
/// hidden history is never empty.
pub struct PageWindow;

impl Invariant for PageWindow {
    fn name(&self) -> &'static str {
        "page_window"
    }

    fn check(&self, state: &RoomSnapshot) -> InvariantResult {
        let Some(store) = &state.store else {
            if state.has_more && state.page_ids.is_empty() {
                return Err(Violation {
                    invariant: self.name(),
                    message: "has_more set with an empty page".to_string(),
                });
            }
            return Ok(());
        };

        let total = store.all_ids.len();
        let expected = total.min(store.current_page * store.page_size);
        if state.page_ids.len() != expected {
            return Err(Violation {
                invariant: self.name(),
                message: format!(
                    "page shows {} of {total}, expected {expected} (page {} x {})",
                    state.page_ids.len(),
                    store.current_page,
                    store.page_size
                ),
            });
        }
        if state.page_ids[..] != store.all_ids[total - expected..] {
            return Err(Violation {
                invariant: self.name(),
                message: format!(
                    "page {:?} is not the newest suffix of {:?}",
                    state.page_ids, store.all_ids
                ),
            });
        }
        if state.has_more != (total > expected) {
            return Err(Violation {
                invariant: self.name(),
                message: format!("has_more={} with {expected} of {total} shown", state.has_more),
            });
        }
        Ok(())
    }
}

/// A disconnected room shows nothing and waits on nothing.
pub struct DisconnectedIsIdle;

impl Invariant for DisconnectedIsIdle {
    fn name(&self) -> &'static str {
        "disconnected_is_idle"
    }

    fn check(&self, state: &RoomSnapshot) -> InvariantResult {
        if state.state != ConnectionState::Disconnected {
            return Ok(());
        }
        let held = state.store.as_ref().map_or(state.page_ids.len(), |s| s.all_ids.len());
        if held > 0 || state.pending > 0 {
            return Err(Violation {
                invariant: self.name(),
                message: format!("disconnected with {held} messages and {} pending", state.pending),
            });
        }
        Ok(())
    }
}

/// Every displayed message has a display name.
pub struct DisplayNamesResolved;

impl Invariant for DisplayNamesResolved {
    fn name(&self) -> &'static str {
        "display_names_resolved"
    }

    fn check(&self, state: &RoomSnapshot) -> InvariantResult {
        if state.unnamed_ids.is_empty() {
            Ok(())
        } else {
            Err(Violation {
                invariant: self.name(),
                message: format!("messages without a name: {:?}", state.unnamed_ids),
            })
        }
    }
}
