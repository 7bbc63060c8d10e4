use axum::{
    extract::{Request, State},
    http::{HeaderMap, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use constant_time_eq::constant_time_eq;
use serde_json::json;

use crate::AppState;

pub(crate) fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get("Authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
}

fn unauthorized() -> Response {
    (
        StatusCode::UNAUTHORIZED,
        Json(json!({"error": "unauthorized"})),
    )
        .into_response()
}

/// Axum middleware guarding operator endpoints with `Authorization: Bearer <admin key>`.
/// Without a configured admin key those endpoints are closed.
pub async fn require_admin(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Response {
    let token = bearer_token(request.headers());

    match (token, state.admin_key.as_deref()) {
        (Some(t), Some(key)) if constant_time_eq(t.as_bytes(), key.as_bytes()) => {
            next.run(request).await
        }
        _ => unauthorized(),
    }
}

/// Axum middleware that gates uploads on a valid account session when
/// `require_login` is set. The resolved user is attached as an extension.
pub async fn require_session(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Response {
    if !state.require_login {
        return next.run(request).await;
    }

    let user = bearer_token(request.headers()).and_then(|t| state.accounts.resolve_token(t));
    match user {
        Some(user) => {
            request.extensions_mut().insert(user);
            next.run(request).await
        }
        None => unauthorized(),
    }
}
