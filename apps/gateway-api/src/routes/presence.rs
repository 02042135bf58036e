//! Thread viewer presence endpoints.
//!
//! Called by clients while a thread is open on screen: enter on open,
//! heartbeat while it stays open, exit on close. The TTL sweep catches
//! everyone who never got to call exit.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Serialize;
use utoipa::ToSchema;

use crate::auth::AuthUser;
use crate::error::{ApiError, ApiErrorBody};
use crate::gateway::events::RoomId;
use crate::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route(
            "/threads/{thread_id}/viewers",
            get(list_viewers).post(enter_thread).delete(exit_thread),
        )
        .route(
            "/threads/{thread_id}/viewers/heartbeat",
            post(heartbeat_thread),
        )
}

/// Active viewers of a thread.
#[derive(Debug, Serialize, ToSchema)]
pub struct ViewersResponse {
    pub viewers: Vec<String>,
}

// ---------------------------------------------------------------------------
// POST /api/v1/threads/:thread_id/viewers
// ---------------------------------------------------------------------------

#[utoipa::path(
    post,
    path = "/api/v1/threads/{thread_id}/viewers",
    tag = "Presence",
    security(("bearer" = [])),
    params(("thread_id" = String, Path, description = "Thread ID")),
    responses(
        (status = 200, description = "Joined the viewer set", body = ViewersResponse),
        (status = 401, description = "Unauthorized", body = ApiErrorBody),
        (status = 403, description = "Not a thread member", body = ApiErrorBody),
    ),
)]
pub async fn enter_thread(
    AuthUser { user_id }: AuthUser,
    State(state): State<AppState>,
    Path(thread_id): Path<String>,
) -> Result<Json<ViewersResponse>, ApiError> {
    state
        .gateway
        .authorize(&user_id, &RoomId::thread(thread_id.clone()))
        .await?;
    let viewers = state.gateway.enter_thread(&thread_id, &user_id);
    Ok(Json(ViewersResponse { viewers }))
}

// ---------------------------------------------------------------------------
// POST /api/v1/threads/:thread_id/viewers/heartbeat
// ---------------------------------------------------------------------------

#[utoipa::path(
    post,
    path = "/api/v1/threads/{thread_id}/viewers/heartbeat",
    tag = "Presence",
    security(("bearer" = [])),
    params(("thread_id" = String, Path, description = "Thread ID")),
    responses(
        (status = 204, description = "Viewer TTL refreshed"),
        (status = 401, description = "Unauthorized", body = ApiErrorBody),
        (status = 403, description = "Not a thread member", body = ApiErrorBody),
    ),
)]
pub async fn heartbeat_thread(
    AuthUser { user_id }: AuthUser,
    State(state): State<AppState>,
    Path(thread_id): Path<String>,
) -> Result<StatusCode, ApiError> {
    state
        .gateway
        .authorize(&user_id, &RoomId::thread(thread_id.clone()))
        .await?;
    state.gateway.heartbeat_thread(&thread_id, &user_id);
    Ok(StatusCode::NO_CONTENT)
}

// ---------------------------------------------------------------------------
// DELETE /api/v1/threads/:thread_id/viewers
// ---------------------------------------------------------------------------

#[utoipa::path(
    delete,
    path = "/api/v1/threads/{thread_id}/viewers",
    tag = "Presence",
    security(("bearer" = [])),
    params(("thread_id" = String, Path, description = "Thread ID")),
    responses(
        (status = 204, description = "Left the viewer set"),
        (status = 401, description = "Unauthorized", body = ApiErrorBody),
    ),
)]
pub async fn exit_thread(
    AuthUser { user_id }: AuthUser,
    State(state): State<AppState>,
    Path(thread_id): Path<String>,
) -> StatusCode {
    state.gateway.exit_thread(&thread_id, &user_id);
    StatusCode::NO_CONTENT
}

// ---------------------------------------------------------------------------
// GET /api/v1/threads/:thread_id/viewers
// ---------------------------------------------------------------------------

#[utoipa::path(
    get,
    path = "/api/v1/threads/{thread_id}/viewers",
    tag = "Presence",
    security(("bearer" = [])),
    params(("thread_id" = String, Path, description = "Thread ID")),
    responses(
        (status = 200, description = "Active viewers", body = ViewersResponse),
        (status = 401, description = "Unauthorized", body = ApiErrorBody),
        (status = 403, description = "Not a thread member", body = ApiErrorBody),
    ),
)]
pub async fn list_viewers(
    AuthUser { user_id }: AuthUser,
    State(state): State<AppState>,
    Path(thread_id): Path<String>,
) -> Result<Json<ViewersResponse>, ApiError> {
    state
        .gateway
        .authorize(&user_id, &RoomId::thread(thread_id.clone()))
        .await?;
    Ok(Json(ViewersResponse {
        viewers: state.gateway.thread_viewers(&thread_id),
    }))
}
