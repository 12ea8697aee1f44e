//! Tracking of sent messages awaiting server confirmation.
//!
//! A message id is added when the server accepts a send. It leaves the
//! tracker when the id shows up in a later poll or stream batch, or when the
//! confirmation timeout elapses. The timeout path is optimistic: it does not
//! prove the message was delivered.

use std::{collections::HashMap, ops::Sub, time::Duration};

/// Pending confirmations keyed by message id.
///
/// Generic over `Instant` to support both real time and virtual time.
#[derive(Debug, Clone)]
pub struct PendingConfirmationTracker<I> {
    entries: HashMap<String, I>,
}

impl<I> Default for PendingConfirmationTracker<I> {
    fn default() -> Self {
        Self { entries: HashMap::new() }
    }
}

impl<I> PendingConfirmationTracker<I>
where
    I: Copy + Ord + Sub<Output = Duration>,
{
    /// Empty tracker.
    pub fn new() -> Self {
        Self::default()
    }

    /// Start tracking `message_id` as of `now`.
    ///
    /// Returns false, keeping the original submission time, if the id is
    /// already tracked.
    pub fn add(&mut self, message_id: &str, now: I) -> bool {
        if self.entries.contains_key(message_id) {
            return false;
        }
        self.entries.insert(message_id.to_string(), now);
        true
    }

    /// Stop tracking `message_id`. Returns whether it was tracked.
    pub fn confirm(&mut self, message_id: &str) -> bool {
        self.entries.remove(message_id).is_some()
    }

    /// Confirm every tracked id present in `ids`, returning those confirmed.
    pub fn confirm_all<'a>(&mut self, ids: impl IntoIterator<Item = &'a str>) -> Vec<String> {
        ids.into_iter()
            .filter(|id| self.confirm(id))
            .map(str::to_string)
            .collect()
    }

    /// Drop entries submitted `timeout` or longer before `now`.
    ///
    /// Returns the expired ids, sorted for deterministic output.
    pub fn sweep_expired(&mut self, now: I, timeout: Duration) -> Vec<String> {
        let mut expired: Vec<String> = self
            .entries
            .iter()
            .filter(|(_, submitted)| now >= **submitted && now - **submitted >= timeout)
            .map(|(id, _)| id.clone())
            .collect();

        for id in &expired {
            self.entries.remove(id);
        }

        expired.sort();
        expired
    }

    /// Returns true if `message_id` is awaiting confirmation.
    pub fn contains(&self, message_id: &str) -> bool {
        self.entries.contains_key(message_id)
    }

    /// Number of pending confirmations.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if nothing is pending.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Forget everything.
    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

#[cfg(test)]
mod tests {
    use std::time::Instant;

    use super::*;

    const TIMEOUT: Duration = Duration::from_secs(2);

    #[test]
    fn add_is_idempotent() {
        let t0 = Instant::now();
        let mut tracker = PendingConfirmationTracker::new();

        assert!(tracker.add("m1", t0));
        assert!(!tracker.add("m1", t0 + Duration::from_secs(1)));
        assert_eq!(tracker.len(), 1);

        // The first submission time is kept
        assert_eq!(tracker.sweep_expired(t0 + TIMEOUT, TIMEOUT), vec!["m1".to_string()]);
    }

    #[test]
    fn confirm_removes_once() {
        let mut tracker = PendingConfirmationTracker::new();
        tracker.add("m9", Instant::now());

        assert!(tracker.confirm("m9"));
        assert!(!tracker.confirm("m9"));
        assert!(tracker.is_empty());
    }

    #[test]
    fn sweep_keeps_fresh_entries() {
        let t0 = Instant::now();
        let mut tracker = PendingConfirmationTracker::new();
        tracker.add("old", t0);
        tracker.add("new", t0 + Duration::from_millis(1500));

        let expired = tracker.sweep_expired(t0 + TIMEOUT + Duration::from_millis(1), TIMEOUT);

        assert_eq!(expired, vec!["old".to_string()]);
        assert!(tracker.contains("new"));
    }

    #[test]
    fn sweep_before_timeout_is_noop() {
        let t0 = Instant::now();
        let mut tracker = PendingConfirmationTracker::new();
        tracker.add("m1", t0);

        assert!(tracker.sweep_expired(t0 + Duration::from_millis(1999), TIMEOUT).is_empty());
        assert!(tracker.contains("m1"));
    }

    #[test]
    fn confirm_all_reports_only_tracked() {
        let mut tracker = PendingConfirmationTracker::new();
        tracker.add("m1", Instant::now());
        tracker.add("m3", Instant::now());

        let confirmed = tracker.confirm_all(["m1", "m2", "m1"]);

        assert_eq!(confirmed, vec!["m1".to_string()]);
        assert!(tracker.contains("m3"));
    }
}
