//! Per-channel typing indicators.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use parking_lot::Mutex;

/// Tracks who is typing in which channel.
///
/// Each entry stores its expiry instant. Repeated starts inside the TTL only
/// push the expiry out (the debounce that keeps one `TYPING_START` per
/// burst); the stop side is either an explicit clear or the periodic sweep.
pub struct TypingTracker {
    channels: DashMap<String, Mutex<HashMap<String, Instant>>>,
    ttl: Duration,
}

impl TypingTracker {
    pub fn new(ttl: Duration) -> Self {
        Self {
            channels: DashMap::new(),
            ttl,
        }
    }

    /// Mark a user as typing. Returns true on a not-typing to typing
    /// transition; the caller broadcasts `TYPING_START` for those.
    pub fn start(&self, channel_id: &str, user_id: &str) -> bool {
        let now = Instant::now();
        let entry = self
            .channels
            .entry(channel_id.to_string())
            .or_insert_with(|| Mutex::new(HashMap::new()));
        let mut typers = entry.lock();

        // An expired entry the sweep has not collected yet counts as absent.
        let started = match typers.get(user_id) {
            Some(expires_at) => *expires_at <= now,
            None => true,
        };
        typers.insert(user_id.to_string(), now + self.ttl);
        started
    }

    /// Drop a user's indicator before its TTL, typically because their
    /// message arrived. Returns true when an entry was removed; the caller
    /// broadcasts `TYPING_STOP` for those.
    pub fn clear(&self, channel_id: &str, user_id: &str) -> bool {
        let cleared = match self.channels.get(channel_id) {
            Some(entry) => entry.lock().remove(user_id).is_some(),
            None => false,
        };
        self.channels
            .remove_if(channel_id, |_, typers| typers.lock().is_empty());
        cleared
    }

    /// Users currently typing in a channel, expired entries filtered out.
    pub fn typing_users(&self, channel_id: &str) -> Vec<String> {
        let now = Instant::now();
        match self.channels.get(channel_id) {
            Some(entry) => entry
                .lock()
                .iter()
                .filter(|(_, expires_at)| **expires_at > now)
                .map(|(user_id, _)| user_id.clone())
                .collect(),
            None => Vec::new(),
        }
    }

    /// Remove every indicator past its expiry. Returns the expired
    /// (channel, user) pairs so the caller can broadcast their stops.
    pub fn sweep(&self) -> Vec<(String, String)> {
        let now = Instant::now();
        let mut expired = Vec::new();
        for entry in self.channels.iter() {
            let channel_id = entry.key();
            let mut typers = entry.value().lock();
            typers.retain(|user_id, expires_at| {
                if *expires_at <= now {
                    expired.push((channel_id.clone(), user_id.clone()));
                    false
                } else {
                    true
                }
            });
        }
        self.channels.retain(|_, typers| !typers.lock().is_empty());
        expired
    }

    /// Remove a user's indicators everywhere, for when their last session
    /// disconnects. Returns the affected channel IDs.
    pub fn remove_user(&self, user_id: &str) -> Vec<String> {
        let mut affected = Vec::new();
        for entry in self.channels.iter() {
            if entry.value().lock().remove(user_id).is_some() {
                affected.push(entry.key().clone());
            }
        }
        self.channels.retain(|_, typers| !typers.lock().is_empty());
        affected
    }
}
