//! Registry of live sessions, indexed by session ID and by user.

use std::collections::HashSet;
use std::sync::Arc;

use dashmap::DashMap;

use super::session::GatewaySession;

/// What `remove` found.
pub struct RemovedSession {
    pub session: Arc<GatewaySession>,
    /// True when no other session for the same user remains. The caller uses
    /// this to unwind user-level presence and typing state.
    pub last_for_user: bool,
}

/// Concurrent session table.
///
/// The user index exists for user-addressed delivery: one user may hold
/// several sessions (multiple devices) and each gets its own copy.
pub struct SessionRegistry {
    sessions: DashMap<String, Arc<GatewaySession>>,
    by_user: DashMap<String, HashSet<String>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self {
            sessions: DashMap::new(),
            by_user: DashMap::new(),
        }
    }

    /// Register a session after the transport handshake.
    pub fn insert(&self, session: Arc<GatewaySession>) {
        self.by_user
            .entry(session.user_id.clone())
            .or_default()
            .insert(session.session_id.clone());
        self.sessions.insert(session.session_id.clone(), session);
    }

    pub fn get(&self, session_id: &str) -> Option<Arc<GatewaySession>> {
        self.sessions.get(session_id).map(|entry| entry.value().clone())
    }

    /// Remove a session, reporting whether it was the user's last one.
    pub fn remove(&self, session_id: &str) -> Option<RemovedSession> {
        let (_, session) = self.sessions.remove(session_id)?;
        let last_for_user = match self.by_user.get_mut(&session.user_id) {
            Some(mut ids) => {
                ids.remove(session_id);
                ids.is_empty()
            }
            None => true,
        };
        if last_for_user {
            // Re-checked under the write lock so a session registering
            // concurrently for the same user is not thrown away.
            self.by_user
                .remove_if(&session.user_id, |_, ids| ids.is_empty());
        }
        Some(RemovedSession {
            session,
            last_for_user,
        })
    }

    /// Every live session for one user.
    pub fn sessions_for_user(&self, user_id: &str) -> Vec<Arc<GatewaySession>> {
        let ids: Vec<String> = match self.by_user.get(user_id) {
            Some(ids) => ids.iter().cloned().collect(),
            None => return Vec::new(),
        };
        ids.iter().filter_map(|id| self.get(id)).collect()
    }

    /// Snapshot of every live session.
    pub fn all(&self) -> Vec<Arc<GatewaySession>> {
        self.sessions
            .iter()
            .map(|entry| entry.value().clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

impl Default for SessionRegistry {
    fn default() -> Self {
        Self::new()
    }
}
