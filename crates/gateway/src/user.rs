//! User-facing routes: login, logout, chat, source listing and uploads.
//!
//! - `POST /user/login`              - photo in, session credential out
//! - `POST /user/logout`             - revoke the presented credential
//! - `POST /user/chat`               - role-scoped answer with citations
//! - `GET|POST /user/chat/data-sources` - sources enabled for the role
//! - `POST /user/upload`             - text into the caller's personal collection

use crate::error::ApiError;
use crate::state::SharedState;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::Json;
use axum::routing::{get, post};
use axum::Router;
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use mimir_agent::{AvailableSources, ChatResponse, IngestReport, IngestTarget};
use mimir_core::error::SessionError;
use mimir_core::message::Message;
use mimir_core::session::{AuthenticatedUser, SessionCredential};
use serde::{Deserialize, Serialize};
use tracing::info;

pub fn user_router() -> Router<SharedState> {
    Router::new()
        .route("/login", post(login_handler))
        .route("/logout", post(logout_handler))
        .route("/chat", post(chat_handler))
        .route("/chat/data-sources", get(data_sources_handler).post(data_sources_handler))
        .route("/upload", post(upload_handler))
}

// ── Request / Response types ──────────────────────────────────────────────

#[derive(Deserialize)]
pub(crate) struct LoginRequest {
    /// Base64 photo, optionally as a `data:` URL
    pub image: String,
}

#[derive(Deserialize)]
pub(crate) struct ChatRequest {
    pub user_input: String,
    #[serde(default)]
    pub history: Option<Vec<Message>>,
}

#[derive(Deserialize)]
pub(crate) struct UploadRequest {
    pub filename: String,
    pub content: String,
}

#[derive(Serialize, Deserialize)]
pub(crate) struct LogoutResponse {
    pub status: String,
}

// ── Helpers ───────────────────────────────────────────────────────────────

/// Decode a base64 photo, stripping any `data:image/...;base64,` prefix.
pub(crate) fn decode_photo(image: &str) -> Result<Vec<u8>, ApiError> {
    let payload = match image.split_once(";base64,") {
        Some((prefix, data)) if prefix.starts_with("data:") => data,
        _ => image,
    };
    let bytes = STANDARD
        .decode(payload.trim())
        .map_err(|e| ApiError::bad_request(format!("image is not valid base64: {e}")))?;
    if bytes.is_empty() {
        return Err(ApiError::bad_request("image is empty"));
    }
    Ok(bytes)
}

fn bearer(headers: &HeaderMap) -> Result<&str, ApiError> {
    headers
        .get("Authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .ok_or_else(|| SessionError::Invalid("missing bearer credential".into()).into())
}

fn session_user(state: &SharedState, headers: &HeaderMap) -> Result<AuthenticatedUser, ApiError> {
    Ok(state.auth.validate(bearer(headers)?)?)
}

// ── Handlers ──────────────────────────────────────────────────────────────

async fn login_handler(
    State(state): State<SharedState>,
    Json(req): Json<LoginRequest>,
) -> Result<Json<SessionCredential>, ApiError> {
    let photo = decode_photo(&req.image)?;
    let credential = state.auth.authenticate(&photo).await?;
    Ok(Json(credential))
}

async fn logout_handler(
    State(state): State<SharedState>,
    headers: HeaderMap,
) -> Result<Json<LogoutResponse>, ApiError> {
    let token = bearer(&headers)?;
    if let Ok(user) = state.auth.validate(token) {
        state.forget(&user.user_id);
    }
    state.auth.logout(token)?;
    Ok(Json(LogoutResponse {
        status: "logged_out".into(),
    }))
}

async fn chat_handler(
    State(state): State<SharedState>,
    headers: HeaderMap,
    Json(req): Json<ChatRequest>,
) -> Result<Json<ChatResponse>, ApiError> {
    if req.user_input.trim().is_empty() {
        return Err(ApiError::bad_request("user_input must not be empty"));
    }
    let user = session_user(&state, &headers)?;
    info!(user_id = %user.user_id, role = %user.role, "Chat request");

    let history = match req.history {
        Some(history) => history,
        None => state.history(&user.user_id),
    };
    let response = state.engine.chat_as(&user, &req.user_input, &history).await?;
    state.record_turn(&user.user_id, &req.user_input, &response.answer);
    Ok(Json(response))
}

async fn data_sources_handler(
    State(state): State<SharedState>,
    headers: HeaderMap,
) -> Result<Json<AvailableSources>, ApiError> {
    let user = session_user(&state, &headers)?;
    Ok(Json(state.engine.sources_for_user(&user)))
}

async fn upload_handler(
    State(state): State<SharedState>,
    headers: HeaderMap,
    Json(req): Json<UploadRequest>,
) -> Result<(StatusCode, Json<IngestReport>), ApiError> {
    let user = session_user(&state, &headers)?;
    if req.content.trim().is_empty() {
        return Err(ApiError::bad_request("content must not be empty"));
    }
    let report = state
        .ingestor
        .ingest_text(&IngestTarget::Personal(user.user_id), &req.filename, &req.content)
        .await?;
    Ok((StatusCode::CREATED, Json(report)))
}
