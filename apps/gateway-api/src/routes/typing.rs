//! Typing indicator endpoints.
//!
//! Clients post on keystrokes; repeated posts inside the TTL only refresh
//! the indicator, so watchers see a single `TYPING_START` per burst.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::get;
use axum::{Json, Router};
use serde::Serialize;
use utoipa::ToSchema;

use crate::auth::AuthUser;
use crate::error::{ApiError, ApiErrorBody};
use crate::gateway::events::RoomId;
use crate::AppState;

pub fn router() -> Router<AppState> {
    Router::new().route(
        "/channels/{channel_id}/typing",
        get(list_typing).post(start_typing),
    )
}

/// Users currently typing in a channel.
#[derive(Debug, Serialize, ToSchema)]
pub struct TypingResponse {
    pub user_ids: Vec<String>,
}

// ---------------------------------------------------------------------------
// POST /api/v1/channels/:channel_id/typing
// ---------------------------------------------------------------------------

#[utoipa::path(
    post,
    path = "/api/v1/channels/{channel_id}/typing",
    tag = "Typing",
    security(("bearer" = [])),
    params(("channel_id" = String, Path, description = "Channel ID")),
    responses(
        (status = 204, description = "Indicator recorded"),
        (status = 401, description = "Unauthorized", body = ApiErrorBody),
        (status = 403, description = "Not a channel member", body = ApiErrorBody),
    ),
)]
pub async fn start_typing(
    AuthUser { user_id }: AuthUser,
    State(state): State<AppState>,
    Path(channel_id): Path<String>,
) -> Result<StatusCode, ApiError> {
    state
        .gateway
        .authorize(&user_id, &RoomId::channel(channel_id.clone()))
        .await?;
    state.gateway.start_typing(&channel_id, &user_id);
    Ok(StatusCode::NO_CONTENT)
}

// ---------------------------------------------------------------------------
// GET /api/v1/channels/:channel_id/typing
// ---------------------------------------------------------------------------

#[utoipa::path(
    get,
    path = "/api/v1/channels/{channel_id}/typing",
    tag = "Typing",
    security(("bearer" = [])),
    params(("channel_id" = String, Path, description = "Channel ID")),
    responses(
        (status = 200, description = "Users currently typing", body = TypingResponse),
        (status = 401, description = "Unauthorized", body = ApiErrorBody),
        (status = 403, description = "Not a channel member", body = ApiErrorBody),
    ),
)]
pub async fn list_typing(
    AuthUser { user_id }: AuthUser,
    State(state): State<AppState>,
    Path(channel_id): Path<String>,
) -> Result<Json<TypingResponse>, ApiError> {
    state
        .gateway
        .authorize(&user_id, &RoomId::channel(channel_id.clone()))
        .await?;
    Ok(Json(TypingResponse {
        user_ids: state.gateway.typing_users(&channel_id),
    }))
}
