//! Event fan-out.

use std::sync::Arc;

use tracing::warn;

use super::events::{Event, OutboundEvent, RoomId};
use super::queue::{CloseReason, EnqueueError};
use super::registry::SessionRegistry;
use super::rooms::RoomRegistry;
use super::session::GatewaySession;
use super::stats::StatsCollector;

/// Resolves receivers and enqueues events without ever blocking on a slow
/// client. One fan-out allocates the event once and shares it by `Arc`.
pub struct Dispatcher {
    sessions: Arc<SessionRegistry>,
    rooms: Arc<RoomRegistry>,
    stats: Arc<StatsCollector>,
}

impl Dispatcher {
    pub fn new(
        sessions: Arc<SessionRegistry>,
        rooms: Arc<RoomRegistry>,
        stats: Arc<StatsCollector>,
    ) -> Self {
        Self {
            sessions,
            rooms,
            stats,
        }
    }

    /// Publish an event to every session subscribed to a room.
    ///
    /// The whole fan-out runs under the room lock, so sessions subscribed to
    /// the same room see concurrent publishes in one agreed order. Returns
    /// the number of sessions the event was enqueued for; an empty or
    /// unknown room is not an error.
    pub fn publish(&self, room: &RoomId, event: Event) -> usize {
        self.stats.message_processed();
        let outbound = Arc::new(OutboundEvent {
            room: Some(room.clone()),
            event,
        });

        let mut delivered = 0;
        let mut slow: Vec<Arc<GatewaySession>> = Vec::new();

        self.rooms.with_room(room, |members| {
            for session_id in members {
                // A member whose session is already gone is mid-teardown;
                // its queue would reject the push anyway.
                let Some(session) = self.sessions.get(session_id) else {
                    continue;
                };
                match session.queue.push(outbound.clone()) {
                    Ok(()) => delivered += 1,
                    Err(EnqueueError::Overflow) => slow.push(session),
                    Err(EnqueueError::Closed) => {}
                }
            }
        });

        // Closing wakes the session loop; keep that outside the room lock.
        for session in slow {
            warn!(
                session_id = %session.session_id,
                user_id = %session.user_id,
                room = %room,
                queued = session.queue.len(),
                "outbound queue overflowed on a non-droppable event, closing slow consumer"
            );
            session.queue.close(CloseReason::SlowConsumer);
        }

        delivered
    }

    /// Deliver an event to every live session of one user.
    ///
    /// User-addressed events have no room and therefore no cross-session
    /// ordering guarantee.
    pub fn publish_to_user(&self, user_id: &str, event: Event) -> usize {
        self.stats.message_processed();
        let outbound = Arc::new(OutboundEvent { room: None, event });

        let mut delivered = 0;
        for session in self.sessions.sessions_for_user(user_id) {
            match session.queue.push(outbound.clone()) {
                Ok(()) => delivered += 1,
                Err(EnqueueError::Overflow) => {
                    warn!(
                        session_id = %session.session_id,
                        user_id = %session.user_id,
                        "outbound queue overflowed on a non-droppable event, closing slow consumer"
                    );
                    session.queue.close(CloseReason::SlowConsumer);
                }
                Err(EnqueueError::Closed) => {}
            }
        }
        delivered
    }
}
