//! Thread viewer presence with TTL expiry.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use parking_lot::Mutex;

/// Tracks which users are currently viewing which thread.
///
/// One entry per (thread, user) pair; re-entering refreshes the timestamp
/// instead of duplicating. Reads filter expired entries lazily, and the
/// periodic sweep removes them so each expiry yields exactly one
/// `PRESENCE_LEAVE`.
pub struct PresenceTracker {
    threads: DashMap<String, Mutex<HashMap<String, Instant>>>,
    ttl: Duration,
}

impl PresenceTracker {
    pub fn new(ttl: Duration) -> Self {
        Self {
            threads: DashMap::new(),
            ttl,
        }
    }

    /// Mark a user as viewing a thread.
    ///
    /// Returns `(joined, viewers)`: `joined` is true only on an
    /// absent-to-viewing transition (the caller broadcasts `PRESENCE_JOIN`
    /// for those), and `viewers` is the active list including this user.
    pub fn enter(&self, thread_id: &str, user_id: &str) -> (bool, Vec<String>) {
        let now = Instant::now();
        let entry = self
            .threads
            .entry(thread_id.to_string())
            .or_insert_with(|| Mutex::new(HashMap::new()));
        let mut viewers = entry.lock();

        // An expired entry the sweep has not collected yet counts as absent.
        let joined = match viewers.get(user_id) {
            Some(last_seen) => now.duration_since(*last_seen) > self.ttl,
            None => true,
        };
        viewers.insert(user_id.to_string(), now);
        (joined, active_of(&viewers, self.ttl, now))
    }

    /// Refresh a viewer's timestamp without any transition or broadcast.
    /// Returns false when the user is not in the thread's viewer set.
    pub fn heartbeat(&self, thread_id: &str, user_id: &str) -> bool {
        let Some(entry) = self.threads.get(thread_id) else {
            return false;
        };
        let mut viewers = entry.lock();
        match viewers.get_mut(user_id) {
            Some(last_seen) => {
                *last_seen = Instant::now();
                true
            }
            None => false,
        }
    }

    /// Remove a viewer immediately. Returns true when an entry existed, in
    /// which case the caller broadcasts `PRESENCE_LEAVE`.
    pub fn exit(&self, thread_id: &str, user_id: &str) -> bool {
        let removed = match self.threads.get(thread_id) {
            Some(entry) => entry.lock().remove(user_id).is_some(),
            None => false,
        };
        self.threads
            .remove_if(thread_id, |_, viewers| viewers.lock().is_empty());
        removed
    }

    /// Active viewers of a thread, expired entries filtered out.
    pub fn active_viewers(&self, thread_id: &str) -> Vec<String> {
        match self.threads.get(thread_id) {
            Some(entry) => active_of(&entry.lock(), self.ttl, Instant::now()),
            None => Vec::new(),
        }
    }

    /// Remove every entry older than the TTL. Returns the expired
    /// (thread, user) pairs so the caller can broadcast their leaves.
    pub fn sweep(&self) -> Vec<(String, String)> {
        let now = Instant::now();
        let mut expired = Vec::new();
        for entry in self.threads.iter() {
            let thread_id = entry.key();
            let mut viewers = entry.value().lock();
            viewers.retain(|user_id, last_seen| {
                if now.duration_since(*last_seen) > self.ttl {
                    expired.push((thread_id.clone(), user_id.clone()));
                    false
                } else {
                    true
                }
            });
        }
        self.threads.retain(|_, viewers| !viewers.lock().is_empty());
        expired
    }

    /// Remove a user from every thread, for when their last session
    /// disconnects. Returns the affected thread IDs.
    pub fn remove_user(&self, user_id: &str) -> Vec<String> {
        let mut affected = Vec::new();
        for entry in self.threads.iter() {
            if entry.value().lock().remove(user_id).is_some() {
                affected.push(entry.key().clone());
            }
        }
        self.threads.retain(|_, viewers| !viewers.lock().is_empty());
        affected
    }
}

fn active_of(viewers: &HashMap<String, Instant>, ttl: Duration, now: Instant) -> Vec<String> {
    viewers
        .iter()
        .filter(|(_, last_seen)| now.duration_since(**last_seen) <= ttl)
        .map(|(user_id, _)| user_id.clone())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const TTL: Duration = Duration::from_secs(30);

    fn backdate(tracker: &PresenceTracker, thread_id: &str, user_id: &str, by: Duration) {
        let entry = tracker.threads.get(thread_id).unwrap();
        let mut viewers = entry.lock();
        let last_seen = viewers.get_mut(user_id).unwrap();
        *last_seen = Instant::now() - by;
    }

    #[test]
    fn test_enter_joins_once() {
        let tracker = PresenceTracker::new(TTL);

        let (joined, viewers) = tracker.enter("thr_1", "usr_1");
        assert!(joined);
        assert_eq!(viewers, vec!["usr_1".to_string()]);

        // Re-entering refreshes without a second join.
        let (joined, viewers) = tracker.enter("thr_1", "usr_1");
        assert!(!joined);
        assert_eq!(viewers.len(), 1);
    }

    #[test]
    fn test_enter_after_expiry_is_a_fresh_join() {
        let tracker = PresenceTracker::new(TTL);
        tracker.enter("thr_1", "usr_1");
        backdate(&tracker, "thr_1", "usr_1", TTL * 2);

        let (joined, _) = tracker.enter("thr_1", "usr_1");
        assert!(joined);
    }

    #[test]
    fn test_heartbeat_refreshes_without_transition() {
        let tracker = PresenceTracker::new(TTL);
        tracker.enter("thr_1", "usr_1");
        backdate(&tracker, "thr_1", "usr_1", TTL * 2);

        assert!(tracker.heartbeat("thr_1", "usr_1"));
        assert_eq!(tracker.active_viewers("thr_1"), vec!["usr_1".to_string()]);
        assert!(tracker.sweep().is_empty());
    }

    #[test]
    fn test_heartbeat_unknown_viewer() {
        let tracker = PresenceTracker::new(TTL);
        assert!(!tracker.heartbeat("thr_1", "usr_1"));

        tracker.enter("thr_1", "usr_1");
        assert!(!tracker.heartbeat("thr_1", "usr_2"));
    }

    #[test]
    fn test_exit_removes_and_drops_empty_thread() {
        let tracker = PresenceTracker::new(TTL);
        tracker.enter("thr_1", "usr_1");

        assert!(tracker.exit("thr_1", "usr_1"));
        assert!(tracker.threads.is_empty());
        assert!(!tracker.exit("thr_1", "usr_1"));
    }

    #[test]
    fn test_expired_viewers_filtered_before_sweep() {
        let tracker = PresenceTracker::new(TTL);
        tracker.enter("thr_1", "usr_1");
        tracker.enter("thr_1", "usr_2");
        backdate(&tracker, "thr_1", "usr_1", TTL * 2);

        // usr_1 is expired but unswept; reads already exclude it.
        assert_eq!(tracker.active_viewers("thr_1"), vec!["usr_2".to_string()]);
    }

    #[test]
    fn test_sweep_collects_each_expiry_once() {
        let tracker = PresenceTracker::new(TTL);
        tracker.enter("thr_1", "usr_1");
        tracker.enter("thr_2", "usr_2");
        backdate(&tracker, "thr_1", "usr_1", TTL * 2);

        let expired = tracker.sweep();
        assert_eq!(expired, vec![("thr_1".to_string(), "usr_1".to_string())]);

        // A second sweep finds nothing; the leave already happened.
        assert!(tracker.sweep().is_empty());
        assert_eq!(tracker.threads.len(), 1);
    }

    #[test]
    fn test_exit_beats_sweep() {
        let tracker = PresenceTracker::new(TTL);
        tracker.enter("thr_1", "usr_1");
        backdate(&tracker, "thr_1", "usr_1", TTL * 2);

        // Explicit exit of an expired entry still owns the single leave.
        assert!(tracker.exit("thr_1", "usr_1"));
        assert!(tracker.sweep().is_empty());
    }

    #[test]
    fn test_remove_user_across_threads() {
        let tracker = PresenceTracker::new(TTL);
        tracker.enter("thr_1", "usr_1");
        tracker.enter("thr_2", "usr_1");
        tracker.enter("thr_2", "usr_2");

        let mut affected = tracker.remove_user("usr_1");
        affected.sort();
        assert_eq!(affected, vec!["thr_1".to_string(), "thr_2".to_string()]);

        assert!(tracker.active_viewers("thr_1").is_empty());
        assert_eq!(tracker.active_viewers("thr_2"), vec!["usr_2".to_string()]);
        assert_eq!(tracker.threads.len(), 1);
    }
}
