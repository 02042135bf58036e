//! Per-connection session state.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use parley_common::id::{prefix, prefixed_ulid};

use super::events::RoomId;
use super::queue::OutboundQueue;

/// State for one live gateway connection.
///
/// The registry, dispatcher and room registry all hold `Arc`s to this and
/// touch it only through the methods below, so a session never needs an
/// outer lock.
pub struct GatewaySession {
    /// Unique session identifier (`gw_` prefixed ULID).
    pub session_id: String,
    /// Authenticated user ID.
    pub user_id: String,
    /// Outbound events awaiting this session's writer.
    pub queue: OutboundQueue,
    /// When the connection was accepted.
    pub connected_at: Instant,
    last_heartbeat: Mutex<Instant>,
    rooms: Mutex<HashSet<RoomId>>,
    /// Monotonically increasing sequence number for dispatch frames.
    seq: AtomicU64,
    closing: AtomicBool,
}

impl GatewaySession {
    pub fn new(user_id: impl Into<String>, queue_capacity: usize) -> Self {
        Self {
            session_id: prefixed_ulid(prefix::SESSION),
            user_id: user_id.into(),
            queue: OutboundQueue::new(queue_capacity),
            connected_at: Instant::now(),
            last_heartbeat: Mutex::new(Instant::now()),
            rooms: Mutex::new(HashSet::new()),
            seq: AtomicU64::new(0),
            closing: AtomicBool::new(false),
        }
    }

    /// Next sequence number for dispatch frames. Starts at 1, increments per
    /// frame sent to this session.
    pub fn next_seq(&self) -> u64 {
        self.seq.fetch_add(1, Ordering::Relaxed) + 1
    }

    /// Record a client heartbeat.
    pub fn mark_heartbeat(&self) {
        *self.last_heartbeat.lock() = Instant::now();
    }

    /// Time since the last client heartbeat.
    pub fn heartbeat_elapsed(&self) -> Duration {
        self.last_heartbeat.lock().elapsed()
    }

    /// Snapshot of the rooms this session is subscribed to.
    pub fn rooms(&self) -> Vec<RoomId> {
        self.rooms.lock().iter().cloned().collect()
    }

    pub fn is_subscribed(&self, room: &RoomId) -> bool {
        self.rooms.lock().contains(room)
    }

    /// Claim teardown. Only the first caller gets `true`, which is what keeps
    /// teardown single-shot when the reader and a closer race.
    pub fn begin_close(&self) -> bool {
        !self.closing.swap(true, Ordering::SeqCst)
    }

    // Room set mutation is reserved to the room registry so both sides of
    // the membership relation change under the room lock.
    pub(super) fn insert_room(&self, room: RoomId) -> bool {
        self.rooms.lock().insert(room)
    }

    pub(super) fn remove_room(&self, room: &RoomId) -> bool {
        self.rooms.lock().remove(room)
    }
}
