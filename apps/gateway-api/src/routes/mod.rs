pub mod health;
pub mod presence;
pub mod publish;
pub mod stats;
pub mod typing;

use axum::Router;
use utoipa::openapi::security::{Http, HttpAuthScheme, SecurityScheme};
use utoipa::{Modify, OpenApi};

use crate::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .merge(health::router())
        .merge(crate::gateway::server::router())
        .nest("/api/v1", presence::router().merge(typing::router()))
        .nest("/internal/v1", publish::router().merge(stats::router()))
}

struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer",
                SecurityScheme::Http(Http::new(HttpAuthScheme::Bearer)),
            );
        }
    }
}

#[derive(OpenApi)]
#[openapi(
    paths(
        // Health
        health::health,
        // Gateway
        crate::gateway::server::ws_upgrade,
        // Presence
        presence::enter_thread,
        presence::heartbeat_thread,
        presence::exit_thread,
        presence::list_viewers,
        // Typing
        typing::start_typing,
        typing::list_typing,
        // Events
        publish::publish_event,
        publish::publish_user_event,
        // Stats
        stats::get_stats,
    ),
    components(
        schemas(
            // Error types
            crate::error::ApiErrorBody,
            crate::error::ApiErrorDetail,
            crate::error::FieldError,
            // Wire types
            crate::gateway::events::RoomId,
            crate::gateway::events::Event,
            crate::gateway::events::MessagePayload,
            crate::gateway::events::MessageDeletePayload,
            crate::gateway::events::ReactionPayload,
            crate::gateway::events::TypingPayload,
            crate::gateway::events::PresencePayload,
            crate::gateway::events::NotificationPayload,
            crate::gateway::stats::StatsSnapshot,
            // Route request/response types
            health::HealthResponse,
            presence::ViewersResponse,
            typing::TypingResponse,
            publish::PublishRequest,
            publish::UserPublishRequest,
            publish::PublishResponse,
        )
    ),
    modifiers(&SecurityAddon),
    tags(
        (name = "Health", description = "Service health"),
        (name = "Gateway", description = "WebSocket gateway"),
        (name = "Presence", description = "Thread viewer presence"),
        (name = "Typing", description = "Typing indicators"),
        (name = "Events", description = "Internal event publishing"),
        (name = "Stats", description = "Gateway statistics"),
    )
)]
pub struct ApiDoc;
