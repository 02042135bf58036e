//! WebSocket endpoint and the per-session connection loop.

use std::sync::Arc;

use axum::extract::ws::{CloseFrame, Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::http::header::AUTHORIZATION;
use axum::http::HeaderMap;
use axum::response::Response;
use axum::routing::get;
use axum::Router;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio::time::interval;
use tracing::{debug, info, warn};

use crate::error::{ApiError, ApiErrorBody};
use crate::AppState;

use super::events::{
    ClientFrame, GatewayFrame, HeartbeatPayload, SubscribePayload, OP_HEARTBEAT, OP_SUBSCRIBE,
    OP_UNSUBSCRIBE,
};
use super::queue::CloseReason;
use super::session::GatewaySession;
use super::Gateway;

/// Session could not be established.
const CLOSE_INTERNAL_ERROR: u16 = 4000;
/// Too many malformed frames.
const CLOSE_MALFORMED_FRAME: u16 = 4002;
/// Outbound queue overflowed on a non-droppable event.
const CLOSE_SLOW_CONSUMER: u16 = 4008;
/// No heartbeat within the deadline.
const CLOSE_HEARTBEAT_TIMEOUT: u16 = 4009;
/// Server is shutting down.
const CLOSE_GOING_AWAY: u16 = 1001;

/// Malformed frames tolerated before the session is closed.
const MALFORMED_FRAME_LIMIT: u32 = 5;

pub fn router() -> Router<AppState> {
    Router::new().route("/gateway", get(ws_upgrade))
}

/// Query parameters accepted by the upgrade request.
#[derive(Debug, Deserialize)]
pub struct ConnectParams {
    token: Option<String>,
}

/// Authenticates the upgrade request, then hands the socket to the
/// connection loop.
///
/// The token travels as the `token` query parameter (browsers cannot set
/// headers on a WebSocket request) or as a regular bearer Authorization
/// header. It is resolved before the upgrade, so an unauthenticated client
/// never holds a socket.
#[utoipa::path(
    get,
    path = "/gateway",
    tag = "Gateway",
    params(
        ("token" = Option<String>, Query, description = "Bearer token, for clients that cannot set headers"),
    ),
    responses(
        (status = 101, description = "Switching to the WebSocket protocol"),
        (status = 401, description = "Missing or invalid token", body = ApiErrorBody),
    ),
)]
pub async fn ws_upgrade(
    ws: WebSocketUpgrade,
    Query(params): Query<ConnectParams>,
    headers: HeaderMap,
    State(state): State<AppState>,
) -> Result<Response, ApiError> {
    let token = params
        .token
        .or_else(|| bearer_from_headers(&headers))
        .ok_or_else(|| ApiError::unauthorized("Missing gateway token"))?;
    let user_id = state
        .tokens
        .verify(&token)
        .await?
        .ok_or_else(|| ApiError::unauthorized("Invalid or expired token"))?;

    let gateway = state.gateway.clone();
    Ok(ws.on_upgrade(move |socket| handle_connection(gateway, socket, user_id)))
}

fn bearer_from_headers(headers: &HeaderMap) -> Option<String> {
    headers
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(|token| token.to_string())
}

/// Drive one connection from upgrade to teardown.
async fn handle_connection(gateway: Arc<Gateway>, socket: WebSocket, user_id: String) {
    gateway.stats.connection_opened();
    let (mut ws_tx, ws_rx) = socket.split();

    let session = match gateway.connect(user_id).await {
        Ok(session) => session,
        Err(err) => {
            warn!(%err, "gateway handshake failed");
            let _ = send_close(&mut ws_tx, CLOSE_INTERNAL_ERROR, "Failed to establish session")
                .await;
            gateway.stats.connection_closed();
            return;
        }
    };

    let ready = GatewayFrame::ready(
        &session.session_id,
        &session.user_id,
        gateway.config.heartbeat_interval.as_millis() as u64,
        &session.rooms(),
        session.next_seq(),
    );
    if send_frame(&mut ws_tx, &ready).await.is_err() {
        gateway.teardown(&session);
        gateway.stats.connection_closed();
        return;
    }

    info!(
        session_id = %session.session_id,
        user_id = %session.user_id,
        rooms = session.rooms().len(),
        "gateway session established"
    );

    run_session(&gateway, &session, &mut ws_tx, ws_rx).await;

    gateway.teardown(&session);
    gateway.stats.connection_closed();
    info!(
        session_id = %session.session_id,
        user_id = %session.user_id,
        uptime_secs = session.connected_at.elapsed().as_secs(),
        "gateway session closed"
    );
}

/// Read frames, flush the outbound queue and enforce the heartbeat deadline
/// until either side is done. Sends the close frame; the caller tears the
/// session down.
async fn run_session(
    gateway: &Arc<Gateway>,
    session: &Arc<GatewaySession>,
    ws_tx: &mut SplitSink<WebSocket, Message>,
    mut ws_rx: SplitStream<WebSocket>,
) {
    // Clients get half an interval of grace before they are considered gone.
    let deadline = gateway.config.heartbeat_interval * 3 / 2;
    let mut heartbeat_timer = interval(deadline);
    // The first tick completes immediately.
    heartbeat_timer.tick().await;
    let mut got_heartbeat = true;
    let mut malformed: u32 = 0;

    let close: Option<(u16, &'static str)> = loop {
        tokio::select! {
            incoming = ws_rx.next() => {
                match incoming {
                    Some(Ok(Message::Text(text))) => {
                        match handle_frame(gateway, session, ws_tx, &text, &mut got_heartbeat).await {
                            FrameResult::Handled => {}
                            FrameResult::Malformed => {
                                malformed += 1;
                                if malformed >= MALFORMED_FRAME_LIMIT {
                                    break Some((CLOSE_MALFORMED_FRAME, "Too many malformed frames"));
                                }
                            }
                            FrameResult::WriteFailed => break None,
                        }
                    }
                    Some(Ok(Message::Binary(_))) => {
                        malformed += 1;
                        if malformed >= MALFORMED_FRAME_LIMIT {
                            break Some((CLOSE_MALFORMED_FRAME, "Too many malformed frames"));
                        }
                    }
                    Some(Ok(Message::Ping(_))) | Some(Ok(Message::Pong(_))) => {}
                    Some(Ok(Message::Close(_))) | None => break None,
                    Some(Err(err)) => {
                        debug!(session_id = %session.session_id, %err, "gateway read error");
                        break None;
                    }
                }
            }
            outbound = session.queue.pop() => {
                match outbound {
                    Some(event) => {
                        let frame = GatewayFrame::dispatch(
                            &event.event,
                            event.room.as_ref(),
                            session.next_seq(),
                        );
                        if send_frame(ws_tx, &frame).await.is_err() {
                            break None;
                        }
                    }
                    // Queue closed out from under us by the dispatcher or a
                    // server shutdown.
                    None => break match session.queue.close_reason() {
                        Some(CloseReason::SlowConsumer) => {
                            Some((CLOSE_SLOW_CONSUMER, "Outbound queue overflowed"))
                        }
                        Some(CloseReason::Shutdown) => {
                            Some((CLOSE_GOING_AWAY, "Server is shutting down"))
                        }
                        _ => None,
                    },
                }
            }
            _ = heartbeat_timer.tick() => {
                if !got_heartbeat {
                    warn!(
                        session_id = %session.session_id,
                        elapsed_ms = session.heartbeat_elapsed().as_millis() as u64,
                        "no heartbeat within the deadline, closing session"
                    );
                    break Some((CLOSE_HEARTBEAT_TIMEOUT, "Heartbeat timed out"));
                }
                got_heartbeat = false;
            }
        }
    };

    if let Some((code, reason)) = close {
        let _ = send_close(ws_tx, code, reason).await;
    }
}

enum FrameResult {
    Handled,
    Malformed,
    WriteFailed,
}

/// Decode and act on one client text frame.
async fn handle_frame(
    gateway: &Arc<Gateway>,
    session: &Arc<GatewaySession>,
    ws_tx: &mut SplitSink<WebSocket, Message>,
    text: &str,
    got_heartbeat: &mut bool,
) -> FrameResult {
    let frame: ClientFrame = match serde_json::from_str(text) {
        Ok(frame) => frame,
        Err(_) => return FrameResult::Malformed,
    };

    match frame.op {
        OP_HEARTBEAT => {
            *got_heartbeat = true;
            session.mark_heartbeat();
            let payload: HeartbeatPayload = serde_json::from_value(frame.d).unwrap_or_default();
            send_or_fail(ws_tx, &GatewayFrame::heartbeat_ack(payload.seq)).await
        }
        OP_SUBSCRIBE => {
            let Ok(payload) = serde_json::from_value::<SubscribePayload>(frame.d) else {
                return FrameResult::Malformed;
            };
            let reply = match gateway.subscribe(session, payload.room.clone()).await {
                Ok(()) => GatewayFrame::subscribe_ack(&payload.room, true),
                Err(err) => {
                    debug!(
                        session_id = %session.session_id,
                        room = %payload.room,
                        "subscribe denied"
                    );
                    GatewayFrame::subscribe_nack(&payload.room, err.code())
                }
            };
            send_or_fail(ws_tx, &reply).await
        }
        OP_UNSUBSCRIBE => {
            let Ok(payload) = serde_json::from_value::<SubscribePayload>(frame.d) else {
                return FrameResult::Malformed;
            };
            gateway.unsubscribe(session, &payload.room);
            send_or_fail(ws_tx, &GatewayFrame::subscribe_ack(&payload.room, false)).await
        }
        op => {
            debug!(session_id = %session.session_id, op, "unknown gateway opcode");
            FrameResult::Malformed
        }
    }
}

async fn send_or_fail(
    ws_tx: &mut SplitSink<WebSocket, Message>,
    frame: &GatewayFrame,
) -> FrameResult {
    match send_frame(ws_tx, frame).await {
        Ok(()) => FrameResult::Handled,
        Err(_) => FrameResult::WriteFailed,
    }
}

async fn send_frame(
    ws_tx: &mut SplitSink<WebSocket, Message>,
    frame: &GatewayFrame,
) -> Result<(), axum::Error> {
    let json = serde_json::to_string(frame).unwrap();
    ws_tx.send(Message::Text(json.into())).await
}

async fn send_close(
    ws_tx: &mut SplitSink<WebSocket, Message>,
    code: u16,
    reason: &str,
) -> Result<(), axum::Error> {
    ws_tx
        .send(Message::Close(Some(CloseFrame {
            code,
            reason: reason.to_string().into(),
        })))
        .await
}
