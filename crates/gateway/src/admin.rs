//! Administrative routes, all behind the `X-Admin-Key` header.
//!
//! - `POST /admin/register_user`    - photo + identity fields
//! - `GET  /admin/collections`      - collection statistics
//! - `POST /admin/knowledge`        - text into common / role / personal collections
//! - `POST /admin/data_mart`        - a structured record into the data mart
//! - `POST /admin/clear_collection` - drop one collection
//! - `POST /admin/delete_faces`     - drop every identity and personal collection

use crate::error::ApiError;
use crate::state::SharedState;
use crate::user::decode_photo;
use axum::extract::{Request, State};
use axum::http::StatusCode;
use axum::middleware::Next;
use axum::response::{IntoResponse, Json, Response};
use axum::routing::{get, post};
use axum::Router;
use mimir_agent::{IngestReport, IngestTarget};
use mimir_core::identity::UserIdentity;
use mimir_core::knowledge::{CollectionStats, Scope};
use mimir_security::PurgeReport;
use serde::{Deserialize, Serialize};
use tracing::warn;

pub fn admin_router() -> Router<SharedState> {
    Router::new()
        .route("/register_user", post(register_user_handler))
        .route("/collections", get(list_collections_handler))
        .route("/knowledge", post(knowledge_handler))
        .route("/data_mart", post(data_mart_handler))
        .route("/clear_collection", post(clear_collection_handler))
        .route("/delete_faces", post(delete_faces_handler))
}

/// Byte comparison that does not stop at the first difference.
fn keys_match(expected: &str, provided: &str) -> bool {
    let (a, b) = (expected.as_bytes(), provided.as_bytes());
    a.len() == b.len() && a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

/// Admin routes are refused outright when no admin key is configured.
pub async fn admin_key_middleware(State(state): State<SharedState>, req: Request, next: Next) -> Response {
    let Some(expected) = state.admin_key.as_deref() else {
        return ApiError::new(StatusCode::FORBIDDEN, "admin_disabled", "no admin key is configured").into_response();
    };
    let authorized = req
        .headers()
        .get("X-Admin-Key")
        .and_then(|v| v.to_str().ok())
        .is_some_and(|key| keys_match(expected, key));
    if !authorized {
        warn!(path = %req.uri().path(), "Admin request with missing or wrong key");
        return ApiError::new(StatusCode::UNAUTHORIZED, "admin_unauthorized", "missing or invalid X-Admin-Key")
            .into_response();
    }
    next.run(req).await
}

// ── Request / Response types ──────────────────────────────────────────────

#[derive(Deserialize)]
pub(crate) struct RegisterUserRequest {
    /// User id; usually an e-mail address
    pub email: String,
    pub name: String,
    pub role: String,
    pub image: String,
}

#[derive(Deserialize)]
pub(crate) struct KnowledgeRequest {
    pub scope: String,
    /// Role name for `role`, user id for `personal`
    #[serde(default)]
    pub owner: Option<String>,
    pub document: String,
    pub content: String,
}

#[derive(Deserialize)]
pub(crate) struct DataMartRequest {
    pub data_type: String,
    pub data: serde_json::Map<String, serde_json::Value>,
}

#[derive(Deserialize)]
pub(crate) struct ClearCollectionRequest {
    pub collection_id: String,
}

#[derive(Serialize, Deserialize)]
pub(crate) struct ClearCollectionResponse {
    pub collection_id: String,
    pub removed: usize,
}

#[derive(Serialize, Deserialize)]
pub(crate) struct CollectionListResponse {
    pub collections: Vec<CollectionStats>,
    pub count: usize,
}

// ── Handlers ──────────────────────────────────────────────────────────────

async fn register_user_handler(
    State(state): State<SharedState>,
    Json(req): Json<RegisterUserRequest>,
) -> Result<(StatusCode, Json<UserIdentity>), ApiError> {
    let photo = decode_photo(&req.image)?;
    let identity = state
        .auth
        .register_identity(&photo, req.email.trim(), req.name.trim(), req.role.trim())
        .await?;
    Ok((StatusCode::CREATED, Json(identity)))
}

async fn list_collections_handler(State(state): State<SharedState>) -> Result<Json<CollectionListResponse>, ApiError> {
    let collections = state.ingestor.index().list_collections().await.map_err(mimir_core::error::Error::from)?;
    Ok(Json(CollectionListResponse {
        count: collections.len(),
        collections,
    }))
}

async fn knowledge_handler(
    State(state): State<SharedState>,
    Json(req): Json<KnowledgeRequest>,
) -> Result<(StatusCode, Json<IngestReport>), ApiError> {
    let scope: Scope = req.scope.parse().map_err(ApiError::bad_request)?;
    let target = IngestTarget::from_scope(scope, req.owner.as_deref())?;
    if req.content.trim().is_empty() {
        return Err(ApiError::bad_request("content must not be empty"));
    }
    let report = state.ingestor.ingest_text(&target, &req.document, &req.content).await?;
    Ok((StatusCode::CREATED, Json(report)))
}

async fn data_mart_handler(
    State(state): State<SharedState>,
    Json(req): Json<DataMartRequest>,
) -> Result<(StatusCode, Json<IngestReport>), ApiError> {
    if req.data.is_empty() {
        return Err(ApiError::bad_request("data must not be empty"));
    }
    let report = state.ingestor.ingest_record(&req.data_type, &req.data).await?;
    Ok((StatusCode::CREATED, Json(report)))
}

async fn clear_collection_handler(
    State(state): State<SharedState>,
    Json(req): Json<ClearCollectionRequest>,
) -> Result<Json<ClearCollectionResponse>, ApiError> {
    let removed = state.ingestor.clear_collection(&req.collection_id).await?;
    Ok(Json(ClearCollectionResponse {
        collection_id: req.collection_id,
        removed,
    }))
}

async fn delete_faces_handler(State(state): State<SharedState>) -> Result<Json<PurgeReport>, ApiError> {
    let report = state.auth.purge_all().await?;
    state.histories.clear();
    Ok(Json(report))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_comparison() {
        assert!(keys_match("s3cret", "s3cret"));
        assert!(!keys_match("s3cret", "s3creT"));
        assert!(!keys_match("s3cret", "s3cret "));
        assert!(!keys_match("s3cret", ""));
    }
}
