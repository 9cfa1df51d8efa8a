//! Notification deduplication.
//!
//! Spec §4.5: entering an `error:*` state for the first time fires a
//! notification; DLQ counts crossing the configured threshold fire
//! another, deduplicated per `(workflow, title)` for 5 minutes. This is a
//! single cache with periodic-sweep semantics rather than a per-entry
//! expiry task, per spec §9 "Unbounded ad-hoc caches".

use std::collections::HashMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;

/// Default dedup window (spec §4.5).
pub const DEFAULT_WINDOW: Duration = Duration::from_secs(5 * 60);

/// Deduplicates notifications keyed by `(workflow_id, title)`.
#[derive(Debug)]
pub struct NotificationDedup {
    window: chrono::Duration,
    seen: Mutex<HashMap<(String, String), DateTime<Utc>>>,
}

impl NotificationDedup {
    /// Create a dedup cache with the given window.
    #[must_use]
    pub fn new(window: Duration) -> Self {
        Self {
            window: chrono::Duration::from_std(window).unwrap_or(chrono::Duration::minutes(5)),
            seen: Mutex::new(HashMap::new()),
        }
    }

    /// Returns `true` if a notification for `(workflow_id, title)` should
    /// fire now — i.e. none fired within the window — and records that
    /// one just did.
    pub fn should_fire(&self, workflow_id: &str, title: &str, now: DateTime<Utc>) -> bool {
        let key = (workflow_id.to_string(), title.to_string());
        let mut seen = self.seen.lock();
        match seen.get(&key) {
            Some(last) if now - *last < self.window => false,
            _ => {
                seen.insert(key, now);
                true
            }
        }
    }

    /// Drop entries older than the window. Call this periodically
    /// (e.g. alongside the registry's retention purge) instead of
    /// spawning a task per entry.
    pub fn sweep(&self, now: DateTime<Utc>) {
        self.seen.lock().retain(|_, last| now - *last < self.window);
    }

    /// Number of tracked keys (for tests / introspection).
    #[must_use]
    pub fn len(&self) -> usize {
        self.seen.lock().len()
    }

    /// `true` if no keys are tracked.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for NotificationDedup {
    fn default() -> Self {
        Self::new(DEFAULT_WINDOW)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_notification_fires() {
        let dedup = NotificationDedup::default();
        assert!(dedup.should_fire("wf1", "dlq_threshold", Utc::now()));
    }

    #[test]
    fn repeat_within_window_is_suppressed() {
        let dedup = NotificationDedup::default();
        let t0 = Utc::now();
        assert!(dedup.should_fire("wf1", "dlq_threshold", t0));
        assert!(!dedup.should_fire("wf1", "dlq_threshold", t0 + chrono::Duration::seconds(10)));
    }

    #[test]
    fn repeat_after_window_fires_again() {
        let dedup = NotificationDedup::default();
        let t0 = Utc::now();
        assert!(dedup.should_fire("wf1", "dlq_threshold", t0));
        assert!(dedup.should_fire("wf1", "dlq_threshold", t0 + chrono::Duration::minutes(6)));
    }

    #[test]
    fn different_titles_are_independent() {
        let dedup = NotificationDedup::default();
        let t0 = Utc::now();
        assert!(dedup.should_fire("wf1", "error", t0));
        assert!(dedup.should_fire("wf1", "dlq_threshold", t0));
    }

    #[test]
    fn sweep_drops_stale_entries() {
        let dedup = NotificationDedup::default();
        let t0 = Utc::now();
        dedup.should_fire("wf1", "error", t0);
        assert_eq!(dedup.len(), 1);
        dedup.sweep(t0 + chrono::Duration::minutes(6));
        assert!(dedup.is_empty());
    }
}
