//! Multipart upload sessions: initiate, send chunks, poll, abort.
//!
//! The session finalizes itself when its last chunk arrives; there is no
//! separate completion call.

use crate::auth::Owner;
use crate::error::{ErrorResponse, HttpAppError, ValidatedJson};
use crate::state::AppState;
use axum::{
    body::Bytes,
    extract::{rejection::BytesRejection, Path, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use cadence_core::models::{FileKind, UploadProgress};
use cadence_services::{ChunkReceipt, InitiateUpload, MultipartSession};
use serde::Deserialize;
use std::sync::Arc;
use utoipa::ToSchema;
use uuid::Uuid;

/// Request to open a multipart upload session
#[derive(Debug, Deserialize, ToSchema)]
pub struct InitiateUploadRequest {
    pub filename: String,
    pub content_type: String,
    /// Total size of the file in bytes
    pub total_size: u64,
    /// Detected from content type and extension when omitted
    #[serde(default)]
    pub kind: Option<FileKind>,
    #[serde(default)]
    pub is_public: bool,
    #[serde(default = "empty_object")]
    #[schema(value_type = Object)]
    pub metadata: serde_json::Value,
    #[serde(default)]
    pub master_id: Option<Uuid>,
}

fn empty_object() -> serde_json::Value {
    serde_json::json!({})
}

#[utoipa::path(
    post,
    path = "/api/v1/uploads",
    tag = "uploads",
    request_body = InitiateUploadRequest,
    responses(
        (status = 201, description = "Session opened", body = MultipartSession),
        (status = 400, description = "Invalid input", body = ErrorResponse),
        (status = 413, description = "File too large", body = ErrorResponse)
    )
)]
#[tracing::instrument(skip(state, request), fields(owner_id = %owner.id(), filename = %request.filename))]
pub async fn initiate_upload(
    State(state): State<Arc<AppState>>,
    owner: Owner,
    ValidatedJson(request): ValidatedJson<InitiateUploadRequest>,
) -> Result<impl IntoResponse, HttpAppError> {
    let session = state
        .storage
        .initiate_multipart_upload(InitiateUpload {
            filename: request.filename,
            content_type: request.content_type,
            total_size: request.total_size,
            owner_id: owner.id(),
            kind: request.kind,
            is_public: request.is_public,
            metadata: request.metadata,
            master_id: request.master_id,
        })
        .await?;
    Ok((StatusCode::CREATED, Json(session)))
}

#[utoipa::path(
    put,
    path = "/api/v1/uploads/{upload_id}/chunks/{chunk_number}",
    tag = "uploads",
    params(
        ("upload_id" = String, Path, description = "Upload session ID"),
        ("chunk_number" = i32, Path, description = "1-based chunk number")
    ),
    request_body(content = Vec<u8>, content_type = "application/octet-stream"),
    responses(
        (status = 200, description = "Chunk stored", body = ChunkReceipt),
        (status = 400, description = "Chunk out of range or wrong size", body = ErrorResponse),
        (status = 403, description = "Session belongs to another account", body = ErrorResponse),
        (status = 404, description = "Unknown session", body = ErrorResponse),
        (status = 409, description = "Session no longer accepts chunks", body = ErrorResponse)
    )
)]
#[tracing::instrument(skip(state, data), fields(owner_id = %owner.id()))]
pub async fn upload_chunk(
    State(state): State<Arc<AppState>>,
    owner: Owner,
    Path((upload_id, chunk_number)): Path<(String, i32)>,
    data: Result<Bytes, BytesRejection>,
) -> Result<impl IntoResponse, HttpAppError> {
    let data = data?;
    let receipt = state
        .storage
        .upload_chunk(&upload_id, chunk_number, data, owner.id())
        .await?;
    Ok(Json(receipt))
}

#[utoipa::path(
    get,
    path = "/api/v1/uploads/{upload_id}",
    tag = "uploads",
    params(("upload_id" = String, Path, description = "Upload session ID")),
    responses(
        (status = 200, description = "Session progress", body = UploadProgress),
        (status = 403, description = "Session belongs to another account", body = ErrorResponse),
        (status = 404, description = "Unknown session", body = ErrorResponse)
    )
)]
#[tracing::instrument(skip(state), fields(owner_id = %owner.id()))]
pub async fn get_upload_progress(
    State(state): State<Arc<AppState>>,
    owner: Owner,
    Path(upload_id): Path<String>,
) -> Result<impl IntoResponse, HttpAppError> {
    let progress = state
        .storage
        .get_upload_progress(&upload_id, owner.id())
        .await?;
    Ok(Json(progress))
}

#[utoipa::path(
    delete,
    path = "/api/v1/uploads/{upload_id}",
    tag = "uploads",
    params(("upload_id" = String, Path, description = "Upload session ID")),
    responses(
        (status = 204, description = "Session aborted"),
        (status = 403, description = "Session belongs to another account", body = ErrorResponse),
        (status = 404, description = "Unknown session", body = ErrorResponse),
        (status = 409, description = "Session is finalizing or complete", body = ErrorResponse)
    )
)]
#[tracing::instrument(skip(state), fields(owner_id = %owner.id()))]
pub async fn abort_upload(
    State(state): State<Arc<AppState>>,
    owner: Owner,
    Path(upload_id): Path<String>,
) -> Result<impl IntoResponse, HttpAppError> {
    state
        .storage
        .abort_multipart_upload(&upload_id, owner.id())
        .await?;
    Ok(StatusCode::NO_CONTENT)
}
