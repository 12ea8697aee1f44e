//! Ordered, deduplicated message store with a pagination window.
//!
//! # Invariants
//!
//! - No two stored messages share an id.
//! - Messages are held oldest first.
//! - The displayed page is the most recent
//!   `min(len, current_page * page_size)` messages, oldest first.
//! - A snapshot merge never drops a message stored after the snapshot was
//!   requested.

use std::collections::{HashMap, HashSet};

use crate::{message::Message, session::UserIdentity};

/// Default number of messages per page.
pub const DEFAULT_PAGE_SIZE: usize = 5;

/// Prefix of synthesized display names.
pub const FALLBACK_NAME_PREFIX: &str = "User_";

/// How a batch is merged into the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeStrategy {
    /// Authoritative snapshot. Replaces the store if the ordered id sequence
    /// differs from the current one.
    Replace,
    /// Snapshot requested when the store was at revision `since`.
    ///
    /// Like [`MergeStrategy::Replace`], except that messages stored after
    /// `since` and missing from the snapshot are kept after it.
    Snapshot {
        /// [`MessageStore::revision`] when the request was issued
        since: u64,
    },
    /// Incremental push. Appends each message whose id is not yet stored.
    Append,
}

/// Result of a merge.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MergeOutcome {
    /// Store contents changed
    pub changed: bool,
    /// Ids that were not present before the merge
    pub added: Vec<String>,
}

/// Pagination bookkeeping.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaginationWindow {
    page_size: usize,
    current_page: usize,
    loading_more: bool,
}

impl PaginationWindow {
    /// Window at page 1. A zero page size is raised to 1.
    pub fn new(page_size: usize) -> Self {
        Self { page_size: page_size.max(1), current_page: 1, loading_more: false }
    }

    /// Messages per page.
    pub fn page_size(&self) -> usize {
        self.page_size
    }

    /// Current page, starting at 1.
    pub fn current_page(&self) -> usize {
        self.current_page
    }

    /// Returns true while a page advance is in progress.
    pub fn is_loading_more(&self) -> bool {
        self.loading_more
    }

    /// Number of messages displayed out of `total`.
    pub fn displayed_count(&self, total: usize) -> usize {
        total.min(self.current_page.saturating_mul(self.page_size))
    }

    /// Returns true if `total` exceeds what is displayed.
    pub fn has_more(&self, total: usize) -> bool {
        total > self.displayed_count(total)
    }

    /// Back to page 1.
    pub fn reset(&mut self) {
        self.current_page = 1;
        self.loading_more = false;
    }

    /// Start showing one more page.
    ///
    /// Returns false, changing nothing, if an advance is already in progress
    /// or everything is displayed.
    pub fn begin_advance(&mut self, total: usize) -> bool {
        if self.loading_more || !self.has_more(total) {
            return false;
        }
        self.loading_more = true;
        self.current_page += 1;
        true
    }

    /// Finish the advance started by [`PaginationWindow::begin_advance`].
    pub fn finish_advance(&mut self) {
        self.loading_more = false;
    }
}

impl Default for PaginationWindow {
    fn default() -> Self {
        Self::new(DEFAULT_PAGE_SIZE)
    }
}

/// Author id to display name mapping.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DisplayNameCache {
    names: HashMap<String, String>,
}

impl DisplayNameCache {
    /// Cached name for `author_id`.
    pub fn get(&self, author_id: &str) -> Option<&str> {
        self.names.get(author_id).map(String::as_str)
    }

    /// Record `name` for `author_id`. Empty ids or names are ignored.
    pub fn remember(&mut self, author_id: &str, name: &str) {
        if author_id.is_empty() || name.is_empty() {
            return;
        }
        self.names.insert(author_id.to_string(), name.to_string());
    }

    /// Attach a display name to `message` if it has none.
    ///
    /// Lookup order: cache, then `me` if the author is the local user, then a
    /// synthesized fallback. The last two are cached.
    pub fn resolve(&mut self, message: &mut Message, me: Option<&UserIdentity>) {
        if message.has_display_name() {
            return;
        }

        if let Some(name) = self.get(&message.author_id) {
            message.display_name = name.to_string();
            return;
        }

        let name = match me {
            Some(me) if me.user_id == message.author_id && !me.username.is_empty() => {
                me.username.clone()
            },
            _ => fallback_name(&message.author_id),
        };

        self.remember(&message.author_id, &name);
        message.display_name = name;
    }

    /// Number of cached names.
    pub fn len(&self) -> usize {
        self.names.len()
    }

    /// Returns true if nothing is cached.
    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

/// Synthesized display name for an author without one.
pub fn fallback_name(author_id: &str) -> String {
    let short: String = author_id.chars().take(8).collect();
    if short.is_empty() {
        format!("{FALLBACK_NAME_PREFIX}unknown")
    } else {
        format!("{FALLBACK_NAME_PREFIX}{short}")
    }
}

/// The message list of one room session.
#[derive(Debug, Clone, Default)]
pub struct MessageStore {
    messages: Vec<Message>,
    /// Id to the revision it was first stored at
    stored_at: HashMap<String, u64>,
    revision: u64,
    window: PaginationWindow,
}

impl MessageStore {
    /// Empty store with the given page size.
    pub fn new(page_size: usize) -> Self {
        Self {
            messages: Vec::new(),
            stored_at: HashMap::new(),
            revision: 0,
            window: PaginationWindow::new(page_size),
        }
    }

    /// Merge `batch` (oldest first) using `strategy`.
    pub fn merge(&mut self, batch: Vec<Message>, strategy: MergeStrategy) -> MergeOutcome {
        match strategy {
            MergeStrategy::Replace => self.replace(batch, None),
            MergeStrategy::Snapshot { since } => self.replace(batch, Some(since)),
            MergeStrategy::Append => self.append_all(batch),
        }
    }

    /// Append one message unless its id is already stored.
    pub fn append(&mut self, message: Message) -> bool {
        if self.stored_at.contains_key(&message.id) {
            return false;
        }
        self.revision += 1;
        self.stored_at.insert(message.id.clone(), self.revision);
        self.messages.push(message);
        true
    }

    /// Bumped whenever a new id is stored. Never goes backwards, not even on
    /// [`MessageStore::clear`].
    pub fn revision(&self) -> u64 {
        self.revision
    }

    fn append_all(&mut self, batch: Vec<Message>) -> MergeOutcome {
        let mut added = Vec::new();
        for message in batch {
            let id = message.id.clone();
            if self.append(message) {
                added.push(id);
            }
        }
        MergeOutcome { changed: !added.is_empty(), added }
    }

    fn replace(&mut self, batch: Vec<Message>, since: Option<u64>) -> MergeOutcome {
        let mut seen = HashSet::with_capacity(batch.len());
        let mut next: Vec<Message> =
            batch.into_iter().filter(|m| seen.insert(m.id.clone())).collect();

        if let Some(since) = since {
            let newer = self.messages.iter().filter(|m| {
                !seen.contains(&m.id) && self.stored_at.get(&m.id).is_some_and(|&at| at > since)
            });
            next.extend(newer.cloned());
        }

        let same = next.len() == self.messages.len()
            && next.iter().zip(&self.messages).all(|(a, b)| a.id == b.id);
        if same {
            return MergeOutcome::default();
        }

        let mut stored_at = HashMap::with_capacity(next.len());
        let mut added = Vec::new();
        for message in &next {
            let at = match self.stored_at.get(&message.id) {
                Some(&at) => at,
                None => {
                    self.revision += 1;
                    added.push(message.id.clone());
                    self.revision
                },
            };
            stored_at.insert(message.id.clone(), at);
        }

        self.stored_at = stored_at;
        self.messages = next;
        MergeOutcome { changed: true, added }
    }

    /// Displayed messages, oldest first.
    pub fn page(&self) -> &[Message] {
        let shown = self.window.displayed_count(self.messages.len());
        &self.messages[self.messages.len() - shown..]
    }

    /// Show one more page. Returns false if nothing changed.
    pub fn advance_page(&mut self) -> bool {
        if !self.window.begin_advance(self.messages.len()) {
            return false;
        }
        self.window.finish_advance();
        true
    }

    /// Returns true if older messages are hidden.
    pub fn has_more(&self) -> bool {
        self.window.has_more(self.messages.len())
    }

    /// Pagination state.
    pub fn window(&self) -> &PaginationWindow {
        &self.window
    }

    /// Back to page 1.
    pub fn reset_window(&mut self) {
        self.window.reset();
    }

    /// Drop all messages and reset the window.
    pub fn clear(&mut self) {
        self.messages.clear();
        self.stored_at.clear();
        self.window.reset();
    }

    /// Every stored message, oldest first.
    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    /// Returns true if `id` is stored.
    pub fn contains(&self, id: &str) -> bool {
        self.stored_at.contains_key(id)
    }

    /// Number of stored messages.
    pub fn len(&self) -> usize {
        self.messages.len()
    }

    /// Returns true if the store is empty.
    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}
