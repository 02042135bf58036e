//! Internal endpoints for domain services to publish events.
//!
//! Message, reaction and notification events originate in the domain
//! services after their own persistence and permission checks; the gateway
//! only fans them out. Publishes are fire-and-forget: a 202 means the event
//! was enqueued for the current subscribers, not that any client has read
//! it. Guarded by the shared internal token, never exposed to end users.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::post;
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::auth::InternalAuth;
use crate::error::ApiErrorBody;
use crate::gateway::events::{Event, RoomId};
use crate::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/events", post(publish_event))
        .route("/users/{user_id}/events", post(publish_user_event))
}

/// Room-addressed publish request.
#[derive(Debug, Deserialize, ToSchema)]
pub struct PublishRequest {
    pub room: RoomId,
    pub event: Event,
}

/// User-addressed publish request.
#[derive(Debug, Deserialize, ToSchema)]
pub struct UserPublishRequest {
    pub event: Event,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct PublishResponse {
    /// Sessions the event was enqueued for.
    pub delivered: usize,
}

// ---------------------------------------------------------------------------
// POST /internal/v1/events
// ---------------------------------------------------------------------------

#[utoipa::path(
    post,
    path = "/internal/v1/events",
    tag = "Events",
    security(("bearer" = [])),
    request_body = PublishRequest,
    responses(
        (status = 202, description = "Event accepted for fan-out", body = PublishResponse),
        (status = 401, description = "Unauthorized", body = ApiErrorBody),
    ),
)]
pub async fn publish_event(
    _auth: InternalAuth,
    State(state): State<AppState>,
    Json(body): Json<PublishRequest>,
) -> (StatusCode, Json<PublishResponse>) {
    let delivered = state.gateway.publish(&body.room, body.event);
    (StatusCode::ACCEPTED, Json(PublishResponse { delivered }))
}

// ---------------------------------------------------------------------------
// POST /internal/v1/users/:user_id/events
// ---------------------------------------------------------------------------

#[utoipa::path(
    post,
    path = "/internal/v1/users/{user_id}/events",
    tag = "Events",
    security(("bearer" = [])),
    params(("user_id" = String, Path, description = "User ID")),
    request_body = UserPublishRequest,
    responses(
        (status = 202, description = "Event accepted for delivery", body = PublishResponse),
        (status = 401, description = "Unauthorized", body = ApiErrorBody),
    ),
)]
pub async fn publish_user_event(
    _auth: InternalAuth,
    State(state): State<AppState>,
    Path(user_id): Path<String>,
    Json(body): Json<UserPublishRequest>,
) -> (StatusCode, Json<PublishResponse>) {
    let delivered = state.gateway.publish_to_user(&user_id, body.event);
    (StatusCode::ACCEPTED, Json(PublishResponse { delivered }))
}
