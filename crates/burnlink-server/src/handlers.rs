use std::net::SocketAddr;

use axum::{
    extract::{rejection::JsonRejection, ConnectInfo, Path, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use tracing::info;

use crate::{
    accounts::AuthError,
    api::{CreatedResponse, CredentialsRequest, PutSecretRequest, SecretResponse, SessionResponse},
    auth::bearer_token,
    store::{generate_id, NewSecret, StoreError},
    AppState,
};

// ── IP extraction ────────────────────────────────────────────────────────────

fn extract_ip(headers: &HeaderMap, addr: &SocketAddr) -> String {
    if let Some(xff) = headers.get("x-forwarded-for").and_then(|v| v.to_str().ok()) {
        if let Some(first) = xff.split(',').next() {
            let trimmed = first.trim();
            if !trimmed.is_empty() {
                return trimmed.to_owned();
            }
        }
    }
    if let Some(real_ip) = headers.get("x-real-ip").and_then(|v| v.to_str().ok()) {
        let trimmed = real_ip.trim();
        if !trimmed.is_empty() {
            return trimmed.to_owned();
        }
    }
    addr.ip().to_string()
}

// ── Health ────────────────────────────────────────────────────────────────────

pub async fn health(State(state): State<AppState>) -> Response {
    match state.store.len() {
        Ok(n) => Json(json!({"status": "ok", "secrets": n})).into_response(),
        Err(e) => store_error(e),
    }
}

// ── Create ────────────────────────────────────────────────────────────────────

/// `PUT /secrets/{id}`: store under a client-chosen id.
pub async fn put_secret(
    State(state): State<AppState>,
    headers: HeaderMap,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    Path(id): Path<String>,
    payload: Result<Json<PutSecretRequest>, JsonRejection>,
) -> Response {
    let ip = extract_ip(&headers, &addr);
    match payload {
        Ok(Json(body)) => store_secret(&state, &id, body, ip),
        Err(rejection) => bad_request(&rejection.body_text()),
    }
}

/// `POST /secrets`: store under a server-generated id.
pub async fn create_secret(
    State(state): State<AppState>,
    headers: HeaderMap,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    payload: Result<Json<PutSecretRequest>, JsonRejection>,
) -> Response {
    let ip = extract_ip(&headers, &addr);
    match payload {
        Ok(Json(body)) => store_secret(&state, &generate_id(), body, ip),
        Err(rejection) => bad_request(&rejection.body_text()),
    }
}

fn store_secret(state: &AppState, id: &str, body: PutSecretRequest, ip: String) -> Response {
    if body.ciphertext.len() > state.limits.max_ciphertext_bytes {
        return bad_request(&format!(
            "ciphertext exceeds {} byte limit",
            state.limits.max_ciphertext_bytes
        ));
    }
    if body.ttl_seconds > state.limits.max_ttl_seconds {
        return bad_request(&format!(
            "ttl_seconds must not exceed {}",
            state.limits.max_ttl_seconds
        ));
    }

    let view_once = body.view_once();
    let ttl_seconds = body.ttl_seconds;
    let size = body.ciphertext.len();
    let content = body.content();
    let secret = NewSecret::new(body.ciphertext, ttl_seconds, view_once)
        .with_content(content)
        .with_origin(ip);

    match state.store.put(id, secret) {
        Ok(record) => {
            info!(
                id = %record.id,
                ttl_seconds,
                view_once,
                bytes = size,
                "secret.create"
            );
            (
                StatusCode::CREATED,
                Json(CreatedResponse {
                    id: record.id,
                    expires_at: record.expires_at,
                }),
            )
                .into_response()
        }
        Err(e) => store_error(e),
    }
}

// ── Get ───────────────────────────────────────────────────────────────────────

pub async fn get_secret(
    State(state): State<AppState>,
    headers: HeaderMap,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    Path(id): Path<String>,
) -> Response {
    let ip = extract_ip(&headers, &addr);
    match state.store.get(&id) {
        Ok(record) => {
            if record.view_once {
                info!(id = %id, "secret.burned");
            } else {
                info!(id = %id, "secret.read");
            }
            let now = state.clock.now();
            Json(SecretResponse::from_record(record, now, Some(ip))).into_response()
        }
        Err(e) => store_error(e),
    }
}

// ── Delete ────────────────────────────────────────────────────────────────────

pub async fn delete_secret(State(state): State<AppState>, Path(id): Path<String>) -> Response {
    match state.store.delete(&id) {
        Ok(()) => {
            info!(id = %id, "secret.delete");
            Json(json!({"deleted": true})).into_response()
        }
        Err(e) => store_error(e),
    }
}

// ── Sweep ─────────────────────────────────────────────────────────────────────

pub async fn sweep(State(state): State<AppState>) -> Response {
    match state.store.sweep_expired() {
        Ok(removed) => {
            info!(removed, "secret.sweep");
            Json(json!({"removed": removed})).into_response()
        }
        Err(e) => store_error(e),
    }
}

// ── Accounts ──────────────────────────────────────────────────────────────────

pub async fn register(
    State(state): State<AppState>,
    payload: Result<Json<CredentialsRequest>, JsonRejection>,
) -> Response {
    let Json(body) = match payload {
        Ok(body) => body,
        Err(rejection) => return bad_request(&rejection.body_text()),
    };
    let accounts = state.accounts.clone();
    // argon2 is CPU-heavy; keep it off the async workers.
    let result =
        tokio::task::spawn_blocking(move || accounts.register(&body.email, &body.password)).await;

    match result {
        Ok(Ok(user)) => {
            info!(user_id = %user.id, "account.register");
            let token = state.accounts.issue_token(&user.id);
            (StatusCode::CREATED, Json(SessionResponse { user, token })).into_response()
        }
        Ok(Err(AuthError::Validation(msg))) => bad_request(&msg),
        Ok(Err(e @ AuthError::EmailTaken)) => {
            (StatusCode::CONFLICT, Json(json!({"error": e.to_string()}))).into_response()
        }
        Ok(Err(e)) => internal_error(&e),
        Err(e) => internal_error(&e),
    }
}

pub async fn login(
    State(state): State<AppState>,
    payload: Result<Json<CredentialsRequest>, JsonRejection>,
) -> Response {
    let Json(body) = match payload {
        Ok(body) => body,
        Err(rejection) => return bad_request(&rejection.body_text()),
    };
    let accounts = state.accounts.clone();
    let result = tokio::task::spawn_blocking(move || {
        accounts.verify_credentials(&body.email, &body.password)
    })
    .await;

    match result {
        Ok(Some(user)) => {
            info!(user_id = %user.id, "account.login");
            let token = state.accounts.issue_token(&user.id);
            Json(SessionResponse { user, token }).into_response()
        }
        Ok(None) => (
            StatusCode::UNAUTHORIZED,
            Json(json!({"error": "invalid credentials"})),
        )
            .into_response(),
        Err(e) => internal_error(&e),
    }
}

pub async fn me(State(state): State<AppState>, headers: HeaderMap) -> Response {
    let user = bearer_token(&headers).and_then(|t| state.accounts.resolve_token(t));
    Json(json!({ "user": user })).into_response()
}

pub async fn logout(State(state): State<AppState>, headers: HeaderMap) -> Response {
    if let Some(token) = bearer_token(&headers) {
        state.accounts.revoke_token(token);
    }
    Json(json!({"ok": true})).into_response()
}

// ── Helpers ───────────────────────────────────────────────────────────────────

fn bad_request(msg: &str) -> Response {
    (StatusCode::BAD_REQUEST, Json(json!({"error": msg}))).into_response()
}

fn store_error(e: StoreError) -> Response {
    match e {
        StoreError::Validation(msg) => bad_request(&msg),
        // One body for never-existed, expired and consumed.
        StoreError::NotFound => {
            (StatusCode::NOT_FOUND, Json(json!({"error": "not found"}))).into_response()
        }
        StoreError::DuplicateId => (
            StatusCode::CONFLICT,
            Json(json!({"error": "id already in use"})),
        )
            .into_response(),
        e @ StoreError::Backend(_) => internal_error(&e),
    }
}

fn internal_error(e: &dyn std::fmt::Display) -> Response {
    tracing::error!(error = %e, "internal error");
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(json!({"error": "internal server error"})),
    )
        .into_response()
}
