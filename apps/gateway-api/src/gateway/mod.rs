//! Real-time event gateway core.
//!
//! Sessions connect over WebSocket, subscribe to rooms, and receive every
//! event published to those rooms while they stay connected. Fan-out is
//! fire-and-forget: publishing enqueues onto bounded per-session queues and
//! never waits for a slow client.

pub mod dispatch;
pub mod error;
pub mod events;
pub mod presence;
pub mod queue;
pub mod registry;
pub mod rooms;
pub mod server;
pub mod session;
pub mod stats;
pub mod typing;

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, warn};

use crate::membership::MembershipProvider;

use self::dispatch::Dispatcher;
use self::error::GatewayError;
use self::events::{Event, PresencePayload, RoomId, TypingPayload};
use self::presence::PresenceTracker;
use self::queue::CloseReason;
use self::registry::SessionRegistry;
use self::rooms::RoomRegistry;
use self::session::GatewaySession;
use self::stats::{StatsCollector, StatsSnapshot};
use self::typing::TypingTracker;

/// How often expired thread viewers are collected.
const PRESENCE_SWEEP_INTERVAL: Duration = Duration::from_secs(5);
/// How often expired typing indicators are collected.
const TYPING_SWEEP_INTERVAL: Duration = Duration::from_secs(2);

/// Tunables for the gateway core.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// Interval clients are told to heartbeat at.
    pub heartbeat_interval: Duration,
    /// Outbound queue capacity per session.
    pub queue_capacity: usize,
    /// How long a thread viewer survives without a presence heartbeat.
    pub presence_ttl: Duration,
    /// How long a typing indicator lives without being refreshed.
    pub typing_ttl: Duration,
}

impl Default for GatewayConfig {
    fn default() -> GatewayConfig {
        GatewayConfig {
            heartbeat_interval: Duration::from_millis(41_250),
            queue_capacity: 256,
            presence_ttl: Duration::from_secs(30),
            typing_ttl: Duration::from_secs(8),
        }
    }
}

/// The gateway: session and room registries, the ephemeral-state trackers
/// and the dispatcher, behind one facade.
///
/// Built once at startup and injected everywhere it is needed; nothing in
/// here is a global.
pub struct Gateway {
    pub config: GatewayConfig,
    pub sessions: Arc<SessionRegistry>,
    pub rooms: Arc<RoomRegistry>,
    pub stats: Arc<StatsCollector>,
    presence: PresenceTracker,
    typing: TypingTracker,
    dispatcher: Dispatcher,
    membership: Arc<dyn MembershipProvider>,
}

impl Gateway {
    pub fn new(config: GatewayConfig, membership: Arc<dyn MembershipProvider>) -> Gateway {
        let sessions = Arc::new(SessionRegistry::new());
        let rooms = Arc::new(RoomRegistry::new());
        let stats = Arc::new(StatsCollector::new());
        let dispatcher = Dispatcher::new(sessions.clone(), rooms.clone(), stats.clone());
        Gateway {
            presence: PresenceTracker::new(config.presence_ttl),
            typing: TypingTracker::new(config.typing_ttl),
            config,
            sessions,
            rooms,
            stats,
            dispatcher,
            membership,
        }
    }

    // -----------------------------------------------------------------------
    // Session lifecycle
    // -----------------------------------------------------------------------

    /// Create and register a session for an authenticated user, subscribing
    /// it to every room the membership collaborator reports.
    pub async fn connect(&self, user_id: String) -> Result<Arc<GatewaySession>, GatewayError> {
        let rooms = self
            .membership
            .rooms_for_user(&user_id)
            .await
            .map_err(|err| {
                warn!(%user_id, %err, "membership lookup failed during connect");
                GatewayError::AuthorizationDenied
            })?;

        let session = Arc::new(GatewaySession::new(user_id, self.config.queue_capacity));
        self.sessions.insert(session.clone());
        self.stats.session_registered();
        for room in rooms {
            self.rooms.subscribe(&session, room);
        }
        Ok(session)
    }

    /// Tear a session down: close its queue, leave every room, drop it from
    /// the registry, and unwind user-level state when it was the user's last
    /// session. Safe to call from racing paths; only the first call acts.
    pub fn teardown(&self, session: &Arc<GatewaySession>) {
        if !session.begin_close() {
            return;
        }
        session.queue.close(CloseReason::Disconnect);
        self.rooms.unsubscribe_all(session);

        let Some(removed) = self.sessions.remove(&session.session_id) else {
            return;
        };
        self.stats.session_closed();

        if removed.last_for_user {
            let user_id = &session.user_id;
            for thread_id in self.presence.remove_user(user_id) {
                self.dispatcher.publish(
                    &RoomId::Thread(thread_id.clone()),
                    Event::PresenceLeave(PresencePayload {
                        thread_id,
                        user_id: user_id.clone(),
                    }),
                );
            }
            for channel_id in self.typing.remove_user(user_id) {
                self.dispatcher.publish(
                    &RoomId::Channel(channel_id.clone()),
                    Event::TypingStop(TypingPayload {
                        channel_id,
                        user_id: user_id.clone(),
                    }),
                );
            }
        }
        debug!(
            session_id = %session.session_id,
            user_id = %session.user_id,
            last_for_user = removed.last_for_user,
            "gateway session torn down"
        );
    }

    /// Close every live session's queue; their loops send the going-away
    /// close frame and tear down.
    pub fn shutdown(&self) {
        for session in self.sessions.all() {
            session.queue.close(CloseReason::Shutdown);
        }
    }

    // -----------------------------------------------------------------------
    // Rooms
    // -----------------------------------------------------------------------

    /// Check the membership collaborator. A lookup failure counts as a
    /// denial rather than a transport error.
    pub async fn authorize(&self, user_id: &str, room: &RoomId) -> Result<(), GatewayError> {
        match self.membership.can_join(user_id, room).await {
            Ok(true) => Ok(()),
            Ok(false) => Err(GatewayError::AuthorizationDenied),
            Err(err) => {
                warn!(%user_id, %room, %err, "membership lookup failed, denying subscribe");
                Err(GatewayError::AuthorizationDenied)
            }
        }
    }

    /// Subscribe a session to a room after an authorization check. On denial
    /// nothing changes and the session stays connected.
    pub async fn subscribe(
        &self,
        session: &Arc<GatewaySession>,
        room: RoomId,
    ) -> Result<(), GatewayError> {
        self.authorize(&session.user_id, &room).await?;
        self.rooms.subscribe(session, room);
        Ok(())
    }

    pub fn unsubscribe(&self, session: &Arc<GatewaySession>, room: &RoomId) {
        self.rooms.unsubscribe(session, room);
    }

    // -----------------------------------------------------------------------
    // Publishing
    // -----------------------------------------------------------------------

    /// Publish an event to a room. Returns the number of sessions it was
    /// enqueued for.
    ///
    /// A message implicitly ends its author's typing indicator, so the stop
    /// lands in the same room order just ahead of the message itself.
    pub fn publish(&self, room: &RoomId, event: Event) -> usize {
        if let Event::MessageCreate(payload) = &event {
            if self.typing.clear(&payload.channel_id, &payload.author_id) {
                self.dispatcher.publish(
                    &RoomId::Channel(payload.channel_id.clone()),
                    Event::TypingStop(TypingPayload {
                        channel_id: payload.channel_id.clone(),
                        user_id: payload.author_id.clone(),
                    }),
                );
            }
        }
        self.dispatcher.publish(room, event)
    }

    /// Deliver an event to every live session of one user.
    pub fn publish_to_user(&self, user_id: &str, event: Event) -> usize {
        self.dispatcher.publish_to_user(user_id, event)
    }

    // -----------------------------------------------------------------------
    // Thread presence
    // -----------------------------------------------------------------------

    /// Enter a thread's viewer set, broadcasting `PRESENCE_JOIN` on a fresh
    /// join. Returns the active viewer list.
    pub fn enter_thread(&self, thread_id: &str, user_id: &str) -> Vec<String> {
        let (joined, viewers) = self.presence.enter(thread_id, user_id);
        if joined {
            self.dispatcher.publish(
                &RoomId::thread(thread_id),
                Event::PresenceJoin(PresencePayload {
                    thread_id: thread_id.to_string(),
                    user_id: user_id.to_string(),
                }),
            );
        }
        viewers
    }

    /// Refresh a viewer's TTL. No broadcast either way.
    pub fn heartbeat_thread(&self, thread_id: &str, user_id: &str) -> bool {
        self.presence.heartbeat(thread_id, user_id)
    }

    /// Leave a thread's viewer set, broadcasting `PRESENCE_LEAVE` if the
    /// user was in it.
    pub fn exit_thread(&self, thread_id: &str, user_id: &str) {
        if self.presence.exit(thread_id, user_id) {
            self.dispatcher.publish(
                &RoomId::thread(thread_id),
                Event::PresenceLeave(PresencePayload {
                    thread_id: thread_id.to_string(),
                    user_id: user_id.to_string(),
                }),
            );
        }
    }

    pub fn thread_viewers(&self, thread_id: &str) -> Vec<String> {
        self.presence.active_viewers(thread_id)
    }

    // -----------------------------------------------------------------------
    // Typing indicators
    // -----------------------------------------------------------------------

    /// Mark a user as typing, broadcasting `TYPING_START` only on the first
    /// start of a burst.
    pub fn start_typing(&self, channel_id: &str, user_id: &str) {
        if self.typing.start(channel_id, user_id) {
            self.dispatcher.publish(
                &RoomId::channel(channel_id),
                Event::TypingStart(TypingPayload {
                    channel_id: channel_id.to_string(),
                    user_id: user_id.to_string(),
                }),
            );
        }
    }

    pub fn typing_users(&self, channel_id: &str) -> Vec<String> {
        self.typing.typing_users(channel_id)
    }

    // -----------------------------------------------------------------------
    // Sweeps
    // -----------------------------------------------------------------------

    /// Collect expired thread viewers and broadcast their leaves. Returns
    /// how many expired.
    pub fn sweep_presence(&self) -> usize {
        let expired = self.presence.sweep();
        let count = expired.len();
        for (thread_id, user_id) in expired {
            self.dispatcher.publish(
                &RoomId::Thread(thread_id.clone()),
                Event::PresenceLeave(PresencePayload { thread_id, user_id }),
            );
        }
        count
    }

    /// Collect expired typing indicators and broadcast their stops. Returns
    /// how many expired.
    pub fn sweep_typing(&self) -> usize {
        let expired = self.typing.sweep();
        let count = expired.len();
        for (channel_id, user_id) in expired {
            self.dispatcher.publish(
                &RoomId::Channel(channel_id.clone()),
                Event::TypingStop(TypingPayload { channel_id, user_id }),
            );
        }
        count
    }

    /// Spawn the periodic TTL sweepers. The caller owns the handles and
    /// aborts them on shutdown.
    pub fn spawn_sweepers(self: &Arc<Gateway>) -> Vec<JoinHandle<()>> {
        let presence_gateway = self.clone();
        let presence_task = tokio::spawn(async move {
            let mut ticker = interval(PRESENCE_SWEEP_INTERVAL);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                let expired = presence_gateway.sweep_presence();
                if expired > 0 {
                    debug!(expired, "presence sweep collected expired viewers");
                }
            }
        });

        let typing_gateway = self.clone();
        let typing_task = tokio::spawn(async move {
            let mut ticker = interval(TYPING_SWEEP_INTERVAL);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                let expired = typing_gateway.sweep_typing();
                if expired > 0 {
                    debug!(expired, "typing sweep collected expired indicators");
                }
            }
        });

        vec![presence_task, typing_task]
    }

    pub fn stats_snapshot(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::events::MessagePayload;
    use crate::membership::StaticMembership;

    fn gateway_with(membership: Arc<StaticMembership>) -> Gateway {
        Gateway::new(GatewayConfig::default(), membership)
    }

    fn message(channel: &str, author: &str, content: &str) -> Event {
        Event::MessageCreate(MessagePayload {
            id: "msg_1".to_string(),
            channel_id: channel.to_string(),
            author_id: author.to_string(),
            content: content.to_string(),
            created_at: chrono::Utc::now(),
        })
    }

    #[tokio::test]
    async fn test_connect_auto_subscribes_membership_rooms() {
        let membership = Arc::new(StaticMembership::new());
        membership.grant("usr_1", RoomId::channel("ch_1"));
        membership.grant("usr_1", RoomId::server("srv_1"));
        let gateway = gateway_with(membership);

        let session = gateway.connect("usr_1".to_string()).await.unwrap();
        assert_eq!(session.rooms().len(), 2);
        assert!(gateway.rooms.contains(&RoomId::channel("ch_1"), &session.session_id));
        assert_eq!(gateway.stats_snapshot().active_sessions, 1);
    }

    #[tokio::test]
    async fn test_subscribe_denied_changes_nothing() {
        let membership = Arc::new(StaticMembership::new());
        let gateway = gateway_with(membership.clone());
        let session = gateway.connect("usr_1".to_string()).await.unwrap();

        let secret = RoomId::channel("ch_secret");
        let denied = gateway.subscribe(&session, secret.clone()).await;
        assert_eq!(denied, Err(GatewayError::AuthorizationDenied));
        assert!(!session.is_subscribed(&secret));
        assert!(gateway.rooms.is_empty());

        membership.grant("usr_1", secret.clone());
        gateway.subscribe(&session, secret.clone()).await.unwrap();
        assert!(session.is_subscribed(&secret));
    }

    #[tokio::test]
    async fn test_teardown_unwinds_and_is_idempotent() {
        let membership = Arc::new(StaticMembership::new());
        membership.grant("usr_1", RoomId::channel("ch_1"));
        let gateway = gateway_with(membership);
        let session = gateway.connect("usr_1".to_string()).await.unwrap();

        gateway.teardown(&session);
        assert!(gateway.sessions.is_empty());
        assert!(gateway.rooms.is_empty());
        assert_eq!(session.queue.close_reason(), Some(CloseReason::Disconnect));
        assert_eq!(gateway.stats_snapshot().active_sessions, 0);

        // Racing closers come through here too; the second call is a no-op.
        gateway.teardown(&session);
        assert_eq!(gateway.stats_snapshot().active_sessions, 0);
    }

    #[tokio::test]
    async fn test_last_session_disconnect_clears_user_presence() {
        let membership = Arc::new(StaticMembership::new());
        membership.grant("watcher", RoomId::thread("thr_1"));
        let gateway = gateway_with(membership);

        let watcher = gateway.connect("watcher".to_string()).await.unwrap();
        let first = gateway.connect("usr_1".to_string()).await.unwrap();
        let second = gateway.connect("usr_1".to_string()).await.unwrap();

        gateway.enter_thread("thr_1", "usr_1");
        let join = watcher.queue.pop().await.unwrap();
        assert!(matches!(join.event, Event::PresenceJoin(_)));

        // One session left, the other still holds the user's presence.
        gateway.teardown(&first);
        assert_eq!(gateway.thread_viewers("thr_1"), vec!["usr_1".to_string()]);
        assert!(watcher.queue.is_empty());

        gateway.teardown(&second);
        assert!(gateway.thread_viewers("thr_1").is_empty());
        let leave = watcher.queue.pop().await.unwrap();
        match leave.event {
            Event::PresenceLeave(ref p) => assert_eq!(p.user_id, "usr_1"),
            ref other => panic!("expected leave, got {}", other.name()),
        }
    }

    #[tokio::test]
    async fn test_message_clears_author_typing() {
        let membership = Arc::new(StaticMembership::new());
        membership.grant("watcher", RoomId::channel("ch_1"));
        let gateway = gateway_with(membership);
        let watcher = gateway.connect("watcher".to_string()).await.unwrap();

        gateway.start_typing("ch_1", "usr_1");
        gateway.publish(&RoomId::channel("ch_1"), message("ch_1", "usr_1", "hello"));

        let names: Vec<&str> = [
            watcher.queue.pop().await.unwrap(),
            watcher.queue.pop().await.unwrap(),
            watcher.queue.pop().await.unwrap(),
        ]
        .iter()
        .map(|e| e.event.name())
        .collect();
        assert_eq!(names, vec!["TYPING_START", "TYPING_STOP", "MESSAGE_CREATE"]);
        assert!(gateway.typing_users("ch_1").is_empty());
    }

    #[tokio::test]
    async fn test_sweeps_broadcast_expiries() {
        let membership = Arc::new(StaticMembership::new());
        membership.grant("watcher", RoomId::thread("thr_1"));
        membership.grant("watcher", RoomId::channel("ch_1"));
        let config = GatewayConfig {
            presence_ttl: Duration::from_millis(1),
            typing_ttl: Duration::from_millis(1),
            ..GatewayConfig::default()
        };
        let gateway = Gateway::new(config, membership);
        let watcher = gateway.connect("watcher".to_string()).await.unwrap();

        gateway.enter_thread("thr_1", "usr_1");
        gateway.start_typing("ch_1", "usr_1");
        watcher.queue.pop().await.unwrap();
        watcher.queue.pop().await.unwrap();

        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(gateway.sweep_presence(), 1);
        assert_eq!(gateway.sweep_typing(), 1);

        let first = watcher.queue.pop().await.unwrap();
        let second = watcher.queue.pop().await.unwrap();
        assert!(matches!(first.event, Event::PresenceLeave(_)));
        assert!(matches!(second.event, Event::TypingStop(_)));

        // Nothing left to expire.
        assert_eq!(gateway.sweep_presence(), 0);
        assert_eq!(gateway.sweep_typing(), 0);
    }

    #[tokio::test]
    async fn test_shutdown_closes_every_queue() {
        let membership = Arc::new(StaticMembership::new());
        let gateway = gateway_with(membership);
        let a = gateway.connect("usr_1".to_string()).await.unwrap();
        let b = gateway.connect("usr_2".to_string()).await.unwrap();

        gateway.shutdown();
        assert_eq!(a.queue.close_reason(), Some(CloseReason::Shutdown));
        assert_eq!(b.queue.close_reason(), Some(CloseReason::Shutdown));
    }
}
