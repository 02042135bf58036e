//! Process-wide gateway counters.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;
use utoipa::ToSchema;

/// Lock-free counters shared by every gateway component.
#[derive(Debug, Default)]
pub struct StatsCollector {
    total_connections: AtomicU64,
    active_connections: AtomicU64,
    messages_processed: AtomicU64,
    active_sessions: AtomicU64,
}

/// Point-in-time view of the counters.
///
/// Each field is read independently; the snapshot is not atomic across
/// fields.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct StatsSnapshot {
    pub total_connections: u64,
    pub active_connections: u64,
    pub messages_processed: u64,
    pub active_sessions: u64,
}

impl StatsCollector {
    pub fn new() -> Self {
        Self::default()
    }

    /// A WebSocket connection was accepted.
    pub fn connection_opened(&self) {
        self.total_connections.fetch_add(1, Ordering::Relaxed);
        self.active_connections.fetch_add(1, Ordering::Relaxed);
    }

    /// A WebSocket connection ended.
    pub fn connection_closed(&self) {
        saturating_decrement(&self.active_connections);
    }

    /// A session finished its handshake and was registered.
    pub fn session_registered(&self) {
        self.active_sessions.fetch_add(1, Ordering::Relaxed);
    }

    /// A session was torn down.
    pub fn session_closed(&self) {
        saturating_decrement(&self.active_sessions);
    }

    /// One publish was accepted for fan-out, regardless of receiver count.
    pub fn message_processed(&self) {
        self.messages_processed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            total_connections: self.total_connections.load(Ordering::Relaxed),
            active_connections: self.active_connections.load(Ordering::Relaxed),
            messages_processed: self.messages_processed.load(Ordering::Relaxed),
            active_sessions: self.active_sessions.load(Ordering::Relaxed),
        }
    }
}

/// Decrement, saturating at zero.
fn saturating_decrement(counter: &AtomicU64) {
    let _ = counter.fetch_update(Ordering::Relaxed, Ordering::Relaxed, |v| v.checked_sub(1));
}
