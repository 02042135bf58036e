//! Wire protocol types: opcodes, rooms, events and frames.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use utoipa::ToSchema;

// ---------------------------------------------------------------------------
// Opcodes
// ---------------------------------------------------------------------------

/// Server -> client event dispatch.
pub const OP_DISPATCH: u8 = 0;
/// Client -> server keepalive.
pub const OP_HEARTBEAT: u8 = 1;
/// Client -> server room subscribe request.
pub const OP_SUBSCRIBE: u8 = 2;
/// Client -> server room unsubscribe request.
pub const OP_UNSUBSCRIBE: u8 = 3;
/// Server -> client answer to subscribe/unsubscribe.
pub const OP_SUBSCRIBE_ACK: u8 = 4;
/// Server -> client heartbeat acknowledgement.
pub const OP_HEARTBEAT_ACK: u8 = 6;

// ---------------------------------------------------------------------------
// Rooms
// ---------------------------------------------------------------------------

/// Typed key for a broadcast group.
///
/// Kinds never collide even when the underlying IDs do; on the wire a room is
/// `{"kind": "channel", "id": "ch_..."}`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(tag = "kind", content = "id", rename_all = "lowercase")]
pub enum RoomId {
    Channel(String),
    Server(String),
    Thread(String),
}

impl RoomId {
    pub fn channel(id: impl Into<String>) -> Self {
        RoomId::Channel(id.into())
    }

    pub fn server(id: impl Into<String>) -> Self {
        RoomId::Server(id.into())
    }

    pub fn thread(id: impl Into<String>) -> Self {
        RoomId::Thread(id.into())
    }
}

impl fmt::Display for RoomId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RoomId::Channel(id) => write!(f, "channel:{}", id),
            RoomId::Server(id) => write!(f, "server:{}", id),
            RoomId::Thread(id) => write!(f, "thread:{}", id),
        }
    }
}

// ---------------------------------------------------------------------------
// Events
// ---------------------------------------------------------------------------

/// Payload for `MESSAGE_CREATE` and `MESSAGE_UPDATE`.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct MessagePayload {
    pub id: String,
    pub channel_id: String,
    pub author_id: String,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

/// Payload for `MESSAGE_DELETE`.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct MessageDeletePayload {
    pub id: String,
    pub channel_id: String,
}

/// Payload for `REACTION_ADD` and `REACTION_REMOVE`.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ReactionPayload {
    pub message_id: String,
    pub channel_id: String,
    pub user_id: String,
    pub emoji: String,
}

/// Payload for `TYPING_START` and `TYPING_STOP`.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct TypingPayload {
    pub channel_id: String,
    pub user_id: String,
}

/// Payload for `PRESENCE_JOIN` and `PRESENCE_LEAVE`.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct PresencePayload {
    pub thread_id: String,
    pub user_id: String,
}

/// Payload for user-addressed `NOTIFICATION` events.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct NotificationPayload {
    pub id: String,
    pub title: String,
    pub body: String,
    pub created_at: DateTime<Utc>,
}

/// A broadcast event with its typed payload.
///
/// The enum is closed: dispatch and the backpressure policy both match on it
/// exhaustively. Serialized as `{"type": "MESSAGE_CREATE", "data": {...}}`.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(tag = "type", content = "data", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Event {
    MessageCreate(MessagePayload),
    MessageUpdate(MessagePayload),
    MessageDelete(MessageDeletePayload),
    ReactionAdd(ReactionPayload),
    ReactionRemove(ReactionPayload),
    TypingStart(TypingPayload),
    TypingStop(TypingPayload),
    PresenceJoin(PresencePayload),
    PresenceLeave(PresencePayload),
    Notification(NotificationPayload),
}

impl Event {
    /// Wire name carried in the dispatch `t` field.
    pub fn name(&self) -> &'static str {
        match self {
            Event::MessageCreate(_) => "MESSAGE_CREATE",
            Event::MessageUpdate(_) => "MESSAGE_UPDATE",
            Event::MessageDelete(_) => "MESSAGE_DELETE",
            Event::ReactionAdd(_) => "REACTION_ADD",
            Event::ReactionRemove(_) => "REACTION_REMOVE",
            Event::TypingStart(_) => "TYPING_START",
            Event::TypingStop(_) => "TYPING_STOP",
            Event::PresenceJoin(_) => "PRESENCE_JOIN",
            Event::PresenceLeave(_) => "PRESENCE_LEAVE",
            Event::Notification(_) => "NOTIFICATION",
        }
    }

    /// Whether this event may be shed under backpressure.
    ///
    /// Ephemeral indicators lose nothing a later update does not repair;
    /// everything else must reach the client or close the session.
    pub fn is_droppable(&self) -> bool {
        matches!(
            self,
            Event::TypingStart(_)
                | Event::TypingStop(_)
                | Event::PresenceJoin(_)
                | Event::PresenceLeave(_)
        )
    }

    /// Payload serialized for the dispatch `d` field.
    pub fn payload(&self) -> Value {
        match self {
            Event::MessageCreate(p) | Event::MessageUpdate(p) => serde_json::to_value(p).unwrap(),
            Event::MessageDelete(p) => serde_json::to_value(p).unwrap(),
            Event::ReactionAdd(p) | Event::ReactionRemove(p) => serde_json::to_value(p).unwrap(),
            Event::TypingStart(p) | Event::TypingStop(p) => serde_json::to_value(p).unwrap(),
            Event::PresenceJoin(p) | Event::PresenceLeave(p) => serde_json::to_value(p).unwrap(),
            Event::Notification(p) => serde_json::to_value(p).unwrap(),
        }
    }
}

/// An event queued for one session, shared across all receivers of a fan-out.
#[derive(Debug)]
pub struct OutboundEvent {
    /// Room the event was published to; `None` for user-addressed events.
    pub room: Option<RoomId>,
    pub event: Event,
}

// ---------------------------------------------------------------------------
// Frames
// ---------------------------------------------------------------------------

/// A server -> client frame.
#[derive(Debug, Clone, Serialize)]
pub struct GatewayFrame {
    pub op: u8,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub t: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub room: Option<RoomId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub s: Option<u64>,
    pub d: Value,
}

impl GatewayFrame {
    /// Dispatch frame for a fanned-out event.
    pub fn dispatch(event: &Event, room: Option<&RoomId>, seq: u64) -> Self {
        Self {
            op: OP_DISPATCH,
            t: Some(event.name().to_string()),
            room: room.cloned(),
            s: Some(seq),
            d: event.payload(),
        }
    }

    /// The READY dispatch sent immediately after registration.
    pub fn ready(
        session_id: &str,
        user_id: &str,
        heartbeat_interval_ms: u64,
        rooms: &[RoomId],
        seq: u64,
    ) -> Self {
        Self {
            op: OP_DISPATCH,
            t: Some("READY".to_string()),
            room: None,
            s: Some(seq),
            d: serde_json::json!({
                "session_id": session_id,
                "user_id": user_id,
                "heartbeat_interval_ms": heartbeat_interval_ms,
                "rooms": rooms,
            }),
        }
    }

    /// Acknowledge a client heartbeat, echoing its `seq`.
    pub fn heartbeat_ack(seq: u64) -> Self {
        Self {
            op: OP_HEARTBEAT_ACK,
            t: None,
            room: None,
            s: None,
            d: serde_json::json!({ "ack": seq }),
        }
    }

    /// Confirm a subscribe or unsubscribe.
    pub fn subscribe_ack(room: &RoomId, subscribed: bool) -> Self {
        Self {
            op: OP_SUBSCRIBE_ACK,
            t: None,
            room: None,
            s: None,
            d: serde_json::json!({ "room": room, "subscribed": subscribed }),
        }
    }

    /// Refuse a subscribe, naming the error code.
    pub fn subscribe_nack(room: &RoomId, code: &str) -> Self {
        Self {
            op: OP_SUBSCRIBE_ACK,
            t: None,
            room: None,
            s: None,
            d: serde_json::json!({ "room": room, "subscribed": false, "error": code }),
        }
    }
}

/// A client -> server frame. Payload shape depends on the opcode.
#[derive(Debug, Deserialize)]
pub struct ClientFrame {
    pub op: u8,
    #[serde(default)]
    pub d: Value,
}

/// `d` payload of a client HEARTBEAT.
#[derive(Debug, Default, Deserialize)]
pub struct HeartbeatPayload {
    #[serde(default)]
    pub seq: u64,
}

/// `d` payload of SUBSCRIBE and UNSUBSCRIBE.
#[derive(Debug, Deserialize)]
pub struct SubscribePayload {
    pub room: RoomId,
}
