//! Room membership registry.
//!
//! Rooms are created lazily on first subscribe and removed when the last
//! session leaves, so memory tracks live interest rather than the full ID
//! space.

use std::collections::HashSet;
use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::Mutex;

use super::events::RoomId;
use super::session::GatewaySession;

/// Maps each room to the set of subscribed session IDs.
///
/// Every room's member set sits behind its own mutex. The publish path runs
/// its whole fan-out under that lock, which is what serializes publishes to
/// one room; unrelated rooms stay uncontended. The session's own room set is
/// updated under the same lock so the two sides of the relation never
/// disagree.
pub struct RoomRegistry {
    rooms: DashMap<RoomId, Mutex<HashSet<String>>>,
}

impl RoomRegistry {
    pub fn new() -> Self {
        Self {
            rooms: DashMap::new(),
        }
    }

    /// Add a session to a room. Idempotent; returns false when it was
    /// already subscribed.
    pub fn subscribe(&self, session: &Arc<GatewaySession>, room: RoomId) -> bool {
        let entry = self
            .rooms
            .entry(room.clone())
            .or_insert_with(|| Mutex::new(HashSet::new()));
        let mut members = entry.lock();
        let added = members.insert(session.session_id.clone());
        session.insert_room(room);
        added
    }

    /// Remove a session from a room. Idempotent; the room itself is dropped
    /// once its last member leaves.
    pub fn unsubscribe(&self, session: &Arc<GatewaySession>, room: &RoomId) -> bool {
        let removed = match self.rooms.get(room) {
            Some(entry) => {
                let mut members = entry.lock();
                let removed = members.remove(&session.session_id);
                session.remove_room(room);
                removed
            }
            None => {
                session.remove_room(room);
                false
            }
        };
        // Emptiness is re-checked under the shard write lock so a concurrent
        // subscribe is not lost.
        self.rooms.remove_if(room, |_, members| members.lock().is_empty());
        removed
    }

    /// Remove a session from every room it is subscribed to.
    pub fn unsubscribe_all(&self, session: &Arc<GatewaySession>) {
        for room in session.rooms() {
            self.unsubscribe(session, &room);
        }
    }

    /// Run `f` against the room's member set while holding the room lock.
    ///
    /// This is the fan-out entry point: two publishes to the same room cannot
    /// interleave because both run inside this lock.
    pub fn with_room<R>(&self, room: &RoomId, f: impl FnOnce(&HashSet<String>) -> R) -> Option<R> {
        let entry = self.rooms.get(room)?;
        let members = entry.lock();
        Some(f(&members))
    }

    /// Snapshot of a room's members. Empty for unknown rooms.
    pub fn members(&self, room: &RoomId) -> Vec<String> {
        self.with_room(room, |members| members.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub fn contains(&self, room: &RoomId, session_id: &str) -> bool {
        self.with_room(room, |members| members.contains(session_id))
            .unwrap_or(false)
    }

    /// Number of rooms with at least one subscriber.
    pub fn len(&self) -> usize {
        self.rooms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rooms.is_empty()
    }
}

impl Default for RoomRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session(user: &str) -> Arc<GatewaySession> {
        Arc::new(GatewaySession::new(user, 8))
    }

    #[test]
    fn test_subscribe_is_bidirectional() {
        let rooms = RoomRegistry::new();
        let s = session("usr_1");
        let room = RoomId::channel("ch_1");

        assert!(rooms.subscribe(&s, room.clone()));
        assert!(rooms.contains(&room, &s.session_id));
        assert!(s.is_subscribed(&room));
    }

    #[test]
    fn test_subscribe_idempotent() {
        let rooms = RoomRegistry::new();
        let s = session("usr_1");
        let room = RoomId::channel("ch_1");

        assert!(rooms.subscribe(&s, room.clone()));
        assert!(!rooms.subscribe(&s, room.clone()));
        assert_eq!(rooms.members(&room).len(), 1);
        assert_eq!(s.rooms().len(), 1);
    }

    #[test]
    fn test_unsubscribe_drops_empty_room() {
        let rooms = RoomRegistry::new();
        let s = session("usr_1");
        let room = RoomId::thread("thr_1");

        rooms.subscribe(&s, room.clone());
        assert_eq!(rooms.len(), 1);

        assert!(rooms.unsubscribe(&s, &room));
        assert!(rooms.is_empty());
        assert!(!s.is_subscribed(&room));
        assert!(!rooms.unsubscribe(&s, &room));
    }

    #[test]
    fn test_room_survives_until_last_member_leaves() {
        let rooms = RoomRegistry::new();
        let a = session("usr_1");
        let b = session("usr_2");
        let room = RoomId::channel("ch_1");

        rooms.subscribe(&a, room.clone());
        rooms.subscribe(&b, room.clone());

        rooms.unsubscribe(&a, &room);
        assert_eq!(rooms.len(), 1);
        assert_eq!(rooms.members(&room), vec![b.session_id.clone()]);

        rooms.unsubscribe(&b, &room);
        assert!(rooms.is_empty());
    }

    #[test]
    fn test_unsubscribe_all() {
        let rooms = RoomRegistry::new();
        let s = session("usr_1");
        rooms.subscribe(&s, RoomId::channel("ch_1"));
        rooms.subscribe(&s, RoomId::server("srv_1"));
        rooms.subscribe(&s, RoomId::thread("thr_1"));

        rooms.unsubscribe_all(&s);
        assert!(rooms.is_empty());
        assert!(s.rooms().is_empty());
    }

    #[test]
    fn test_with_room_on_unknown_room() {
        let rooms = RoomRegistry::new();
        assert!(rooms.with_room(&RoomId::channel("ch_x"), |m| m.len()).is_none());
        assert!(rooms.members(&RoomId::channel("ch_x")).is_empty());
    }
}
