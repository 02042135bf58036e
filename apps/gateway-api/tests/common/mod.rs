use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

use gateway_api::auth::MemoryTokens;
use gateway_api::config::Config;
use gateway_api::gateway::Gateway;
use gateway_api::membership::StaticMembership;
use gateway_api::AppState;

pub const INTERNAL_TOKEN: &str = "internal-test-token";

pub type WsStream = WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>;

/// Build an AppState wired to in-memory collaborators.
///
/// The heartbeat interval is long enough that no test ever hits the
/// deadline by accident; queue capacity is small so overflow is cheap to
/// trigger.
pub fn test_state() -> (AppState, Arc<MemoryTokens>, Arc<StaticMembership>) {
    let tokens = Arc::new(MemoryTokens::new());
    let membership = Arc::new(StaticMembership::new());

    let config = Config {
        port: 0,
        internal_token: INTERNAL_TOKEN.to_string(),
        static_tokens: Vec::new(),
        heartbeat_interval_ms: 60_000,
        queue_capacity: 32,
        presence_ttl_secs: 30,
        typing_ttl_secs: 8,
    };
    let gateway = Arc::new(Gateway::new(config.gateway(), membership.clone()));

    let state = AppState {
        config: Arc::new(config),
        tokens: tokens.clone(),
        gateway,
    };
    (state, tokens, membership)
}

/// Serve the full router on an ephemeral port.
pub async fn start_server(state: AppState) -> SocketAddr {
    let app = gateway_api::routes::router().with_state(state);
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind test listener");
    let addr = listener.local_addr().expect("local addr");
    tokio::spawn(async move {
        axum::serve(listener, app).await.expect("test server");
    });
    addr
}

/// Connect to the gateway and consume the READY frame.
pub async fn connect_gateway(addr: SocketAddr, token: &str) -> (WsStream, serde_json::Value) {
    let url = format!("ws://{}/gateway?token={}", addr, token);
    let (mut ws, _) = tokio_tungstenite::connect_async(&url)
        .await
        .expect("gateway connect");
    let ready = recv_json(&mut ws).await;
    assert_eq!(ready["op"], 0);
    assert_eq!(ready["t"], "READY");
    (ws, ready)
}

/// Next text frame as JSON, with a bounded wait.
pub async fn recv_json(ws: &mut WsStream) -> serde_json::Value {
    let message = tokio::time::timeout(Duration::from_secs(5), ws.next())
        .await
        .expect("timed out waiting for a frame")
        .expect("stream ended")
        .expect("websocket read");
    let text = message.into_text().expect("expected a text frame");
    serde_json::from_str(&text).expect("frame is not JSON")
}

pub async fn send_json(ws: &mut WsStream, value: &serde_json::Value) {
    ws.send(Message::Text(value.to_string().into()))
        .await
        .expect("websocket send");
}

/// Publish an event to a room through the internal endpoint.
pub async fn publish_event(
    client: &reqwest::Client,
    addr: SocketAddr,
    room: serde_json::Value,
    event: serde_json::Value,
) -> serde_json::Value {
    let resp = client
        .post(format!("http://{}/internal/v1/events", addr))
        .bearer_auth(INTERNAL_TOKEN)
        .json(&serde_json::json!({ "room": room, "event": event }))
        .send()
        .await
        .expect("publish request");
    assert_eq!(resp.status(), reqwest::StatusCode::ACCEPTED);
    resp.json().await.expect("publish response")
}

/// A room-addressed MESSAGE_CREATE event body.
pub fn message_event(channel_id: &str, author_id: &str, content: &str) -> serde_json::Value {
    serde_json::json!({
        "type": "MESSAGE_CREATE",
        "data": {
            "id": "msg_01J0000000000000000000TEST",
            "channel_id": channel_id,
            "author_id": author_id,
            "content": content,
            "created_at": "2025-06-01T12:00:00Z",
        }
    })
}

pub fn channel_room(channel_id: &str) -> serde_json::Value {
    serde_json::json!({ "kind": "channel", "id": channel_id })
}

pub fn thread_room(thread_id: &str) -> serde_json::Value {
    serde_json::json!({ "kind": "thread", "id": thread_id })
}
