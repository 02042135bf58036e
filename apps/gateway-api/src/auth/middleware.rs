//! Bearer-token extractors for user and internal routes.

use axum::extract::FromRequestParts;
use axum::http::header::AUTHORIZATION;
use axum::http::request::Parts;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;

use crate::AppState;

/// The authenticated user behind a request.
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub user_id: String,
}

/// Rejection for a missing or invalid bearer token.
#[derive(Debug)]
pub struct AuthError {
    message: &'static str,
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        (
            StatusCode::UNAUTHORIZED,
            Json(serde_json::json!({
                "error": { "code": "UNAUTHORIZED", "message": self.message }
            })),
        )
            .into_response()
    }
}

fn bearer_token(parts: &Parts) -> Result<&str, AuthError> {
    let header = parts
        .headers
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .ok_or(AuthError {
            message: "Missing Authorization header",
        })?;
    header.strip_prefix("Bearer ").ok_or(AuthError {
        message: "Invalid Authorization header format",
    })
}

impl FromRequestParts<AppState> for AuthUser {
    type Rejection = AuthError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let token = bearer_token(parts)?;
        let user_id = state
            .tokens
            .verify(token)
            .await
            .map_err(|_| AuthError {
                message: "Token verification failed",
            })?
            .ok_or(AuthError {
                message: "Invalid or expired token",
            })?;
        Ok(AuthUser { user_id })
    }
}

/// Marker extractor for the internal service-to-service routes. Requires the
/// shared internal token from configuration.
#[derive(Debug, Clone)]
pub struct InternalAuth;

impl FromRequestParts<AppState> for InternalAuth {
    type Rejection = AuthError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let token = bearer_token(parts)?;
        if token != state.config.internal_token {
            return Err(AuthError {
                message: "Invalid internal token",
            });
        }
        Ok(InternalAuth)
    }
}
