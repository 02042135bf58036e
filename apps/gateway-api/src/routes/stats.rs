//! Gateway statistics endpoint.

use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};

use crate::auth::InternalAuth;
use crate::error::ApiErrorBody;
use crate::gateway::stats::StatsSnapshot;
use crate::AppState;

pub fn router() -> Router<AppState> {
    Router::new().route("/stats", get(get_stats))
}

#[utoipa::path(
    get,
    path = "/internal/v1/stats",
    tag = "Stats",
    security(("bearer" = [])),
    responses(
        (status = 200, description = "Current gateway counters", body = StatsSnapshot),
        (status = 401, description = "Unauthorized", body = ApiErrorBody),
    ),
)]
pub async fn get_stats(_auth: InternalAuth, State(state): State<AppState>) -> Json<StatsSnapshot> {
    Json(state.gateway.stats_snapshot())
}
