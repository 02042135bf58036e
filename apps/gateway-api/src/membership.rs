//! Room membership collaborator.

use std::collections::{HashMap, HashSet};
use std::fmt;

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::gateway::events::RoomId;

/// The membership backend could not answer.
#[derive(Debug)]
pub struct MembershipError(pub String);

impl fmt::Display for MembershipError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "membership lookup failed: {}", self.0)
    }
}

impl std::error::Error for MembershipError {}

/// Source of truth for which rooms a user belongs to.
///
/// The domain services own channel, server and thread membership; this trait
/// is the gateway's view of them. `StaticMembership` below backs development
/// and tests.
#[async_trait]
pub trait MembershipProvider: Send + Sync {
    /// Rooms a fresh session is auto-subscribed to.
    async fn rooms_for_user(&self, user_id: &str) -> Result<Vec<RoomId>, MembershipError>;

    /// Whether the user may subscribe to the room.
    async fn can_join(&self, user_id: &str, room: &RoomId) -> Result<bool, MembershipError>;
}

// ---------------------------------------------------------------------------
// In-memory implementation
// ---------------------------------------------------------------------------

/// Membership table with explicit grants.
#[derive(Default)]
pub struct StaticMembership {
    grants: Mutex<HashMap<String, HashSet<RoomId>>>,
}

impl StaticMembership {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allow a user into a room.
    pub fn grant(&self, user_id: impl Into<String>, room: RoomId) {
        self.grants
            .lock()
            .entry(user_id.into())
            .or_default()
            .insert(room);
    }

    /// Take a previously granted room away.
    pub fn revoke(&self, user_id: &str, room: &RoomId) {
        if let Some(rooms) = self.grants.lock().get_mut(user_id) {
            rooms.remove(room);
        }
    }
}

#[async_trait]
impl MembershipProvider for StaticMembership {
    async fn rooms_for_user(&self, user_id: &str) -> Result<Vec<RoomId>, MembershipError> {
        Ok(self
            .grants
            .lock()
            .get(user_id)
            .map(|rooms| rooms.iter().cloned().collect())
            .unwrap_or_default())
    }

    async fn can_join(&self, user_id: &str, room: &RoomId) -> Result<bool, MembershipError> {
        Ok(self
            .grants
            .lock()
            .get(user_id)
            .is_some_and(|rooms| rooms.contains(room)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_grant_and_revoke() {
        let membership = StaticMembership::new();
        let room = RoomId::channel("ch_1");

        assert!(!membership.can_join("usr_1", &room).await.unwrap());

        membership.grant("usr_1", room.clone());
        assert!(membership.can_join("usr_1", &room).await.unwrap());
        assert!(!membership.can_join("usr_2", &room).await.unwrap());

        membership.revoke("usr_1", &room);
        assert!(!membership.can_join("usr_1", &room).await.unwrap());
    }

    #[tokio::test]
    async fn test_rooms_for_user() {
        let membership = StaticMembership::new();
        membership.grant("usr_1", RoomId::channel("ch_1"));
        membership.grant("usr_1", RoomId::server("srv_1"));

        let rooms = membership.rooms_for_user("usr_1").await.unwrap();
        assert_eq!(rooms.len(), 2);
        assert!(rooms.contains(&RoomId::channel("ch_1")));

        assert!(membership.rooms_for_user("usr_2").await.unwrap().is_empty());
    }
}
