//! File endpoints: single-shot upload and everything addressed by file id.

use crate::auth::Owner;
use crate::error::{ErrorResponse, HttpAppError, ValidatedJson};
use crate::state::AppState;
use axum::{
    body::{Body, Bytes},
    extract::{rejection::BytesRejection, Multipart, Path, State},
    http::{header, StatusCode},
    response::IntoResponse,
    Json,
};
use cadence_core::models::{FileKind, FileResponse};
use cadence_core::AppError;
use cadence_services::{FileMetadata, SignedUrlKind, UploadRequest, ValidationReport};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use utoipa::ToSchema;
use uuid::Uuid;

/// Parsed `multipart/form-data` body of a single-shot upload.
struct UploadForm {
    data: Bytes,
    filename: String,
    content_type: String,
    kind: Option<FileKind>,
    is_public: bool,
    metadata: serde_json::Value,
    master_id: Option<Uuid>,
}

async fn read_upload_form(mut multipart: Multipart) -> Result<UploadForm, AppError> {
    let mut file: Option<(Bytes, String, String)> = None;
    let mut kind = None;
    let mut is_public = false;
    let mut metadata = serde_json::json!({});
    let mut master_id = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::InvalidInput(format!("Failed to read multipart: {}", e)))?
    {
        let name = field.name().map(str::to_string).unwrap_or_default();
        match name.as_str() {
            "file" => {
                if file.is_some() {
                    return Err(AppError::InvalidInput(
                        "Multiple file fields are not allowed; send exactly one field named 'file'"
                            .to_string(),
                    ));
                }
                let filename = field.file_name().unwrap_or("unknown").to_string();
                let content_type = field
                    .content_type()
                    .unwrap_or("application/octet-stream")
                    .to_string();
                let data = field.bytes().await.map_err(|e| {
                    AppError::InvalidInput(format!("Failed to read file data: {}", e))
                })?;
                file = Some((data, filename, content_type));
            }
            "kind" => {
                let value = form_text(field).await?;
                kind = Some(value.parse::<FileKind>().map_err(AppError::InvalidInput)?);
            }
            "is_public" => {
                is_public = match form_text(field).await?.trim() {
                    "true" | "1" => true,
                    "false" | "0" | "" => false,
                    other => {
                        return Err(AppError::InvalidInput(format!(
                            "is_public must be true or false, got '{}'",
                            other
                        )))
                    }
                };
            }
            "metadata" => {
                let value = form_text(field).await?;
                metadata = serde_json::from_str(&value).map_err(|e| {
                    AppError::InvalidInput(format!("metadata must be a JSON object: {}", e))
                })?;
            }
            "master_id" => {
                let value = form_text(field).await?;
                master_id = Some(Uuid::parse_str(value.trim()).map_err(|_| {
                    AppError::InvalidInput("master_id must be a UUID".to_string())
                })?);
            }
            other => {
                tracing::debug!(field = other, "Ignoring unknown form field");
            }
        }
    }

    let (data, filename, content_type) =
        file.ok_or_else(|| AppError::InvalidInput("No file provided".to_string()))?;

    Ok(UploadForm {
        data,
        filename,
        content_type,
        kind,
        is_public,
        metadata,
        master_id,
    })
}

async fn form_text(field: axum::extract::multipart::Field<'_>) -> Result<String, AppError> {
    field
        .text()
        .await
        .map_err(|e| AppError::InvalidInput(format!("Failed to read form field: {}", e)))
}

#[utoipa::path(
    post,
    path = "/api/v1/files",
    tag = "files",
    request_body(content = inline(Object), content_type = "multipart/form-data"),
    responses(
        (status = 201, description = "File stored", body = FileResponse),
        (status = 400, description = "Invalid input", body = ErrorResponse),
        (status = 413, description = "File too large", body = ErrorResponse),
        (status = 502, description = "Storage backend failure", body = ErrorResponse)
    )
)]
#[tracing::instrument(skip(state, multipart), fields(owner_id = %owner.id(), operation = "upload_file"))]
pub async fn upload_file(
    State(state): State<Arc<AppState>>,
    owner: Owner,
    multipart: Multipart,
) -> Result<impl IntoResponse, HttpAppError> {
    let form = read_upload_form(multipart).await?;
    let request = UploadRequest {
        filename: form.filename,
        content_type: form.content_type,
        owner_id: owner.id(),
        kind: form.kind,
        is_public: form.is_public,
        metadata: form.metadata,
        master_id: form.master_id,
    };
    let file = state.storage.upload_file(form.data, request).await?;
    Ok((StatusCode::CREATED, Json(FileResponse::from(file))))
}

#[utoipa::path(
    get,
    path = "/api/v1/files/{id}",
    tag = "files",
    params(("id" = Uuid, Path, description = "File ID")),
    responses(
        (status = 200, description = "File found", body = FileResponse),
        (status = 403, description = "File is private", body = ErrorResponse),
        (status = 404, description = "File not found", body = ErrorResponse)
    )
)]
#[tracing::instrument(skip(state), fields(owner_id = %owner.id(), file_id = %id))]
pub async fn get_file(
    State(state): State<Arc<AppState>>,
    owner: Owner,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, HttpAppError> {
    let file = state.storage.get_file(id, owner.id()).await?;
    Ok(Json(FileResponse::from(file)))
}

#[utoipa::path(
    delete,
    path = "/api/v1/files/{id}",
    tag = "files",
    params(("id" = Uuid, Path, description = "File ID")),
    responses(
        (status = 204, description = "File deleted"),
        (status = 403, description = "Not the owner", body = ErrorResponse),
        (status = 404, description = "File not found", body = ErrorResponse)
    )
)]
#[tracing::instrument(skip(state), fields(owner_id = %owner.id(), file_id = %id))]
pub async fn delete_file(
    State(state): State<Arc<AppState>>,
    owner: Owner,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, HttpAppError> {
    state.storage.delete_file(id, owner.id()).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Debug, Default, Deserialize, ToSchema)]
pub struct CopyFileRequest {
    /// Name of the copy; defaults to the source filename.
    #[serde(default)]
    pub filename: Option<String>,
}

#[utoipa::path(
    post,
    path = "/api/v1/files/{id}/copy",
    tag = "files",
    params(("id" = Uuid, Path, description = "Source file ID")),
    request_body = CopyFileRequest,
    responses(
        (status = 201, description = "Copy created", body = FileResponse),
        (status = 403, description = "Source is private", body = ErrorResponse),
        (status = 404, description = "Source not found", body = ErrorResponse),
        (status = 409, description = "Source is not complete", body = ErrorResponse)
    )
)]
#[tracing::instrument(skip(state, body), fields(owner_id = %owner.id(), file_id = %id))]
pub async fn copy_file(
    State(state): State<Arc<AppState>>,
    owner: Owner,
    Path(id): Path<Uuid>,
    body: Result<Bytes, BytesRejection>,
) -> Result<impl IntoResponse, HttpAppError> {
    let body = body?;
    // The body is optional, so it is parsed by hand rather than through a JSON extractor.
    let request: CopyFileRequest = if body.iter().all(u8::is_ascii_whitespace) {
        CopyFileRequest::default()
    } else {
        serde_json::from_slice(&body)
            .map_err(|e| AppError::InvalidInput(format!("Invalid request body: {}", e)))?
    };
    let copy = state
        .storage
        .copy_file(id, owner.id(), request.filename)
        .await?;
    Ok((StatusCode::CREATED, Json(FileResponse::from(copy))))
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct MoveFileRequest {
    /// New filename within the same directory.
    pub filename: String,
}

#[utoipa::path(
    post,
    path = "/api/v1/files/{id}/move",
    tag = "files",
    params(("id" = Uuid, Path, description = "File ID")),
    request_body = MoveFileRequest,
    responses(
        (status = 200, description = "File renamed", body = FileResponse),
        (status = 403, description = "Not the owner", body = ErrorResponse),
        (status = 404, description = "File not found", body = ErrorResponse)
    )
)]
#[tracing::instrument(skip(state, request), fields(owner_id = %owner.id(), file_id = %id))]
pub async fn move_file(
    State(state): State<Arc<AppState>>,
    owner: Owner,
    Path(id): Path<Uuid>,
    ValidatedJson(request): ValidatedJson<MoveFileRequest>,
) -> Result<impl IntoResponse, HttpAppError> {
    let moved = state
        .storage
        .move_file(id, &request.filename, owner.id())
        .await?;
    Ok(Json(FileResponse::from(moved)))
}

#[derive(Debug, Serialize, ToSchema)]
pub struct SignedUrlResponse {
    pub url: String,
    pub expires_at: Option<DateTime<Utc>>,
    /// False when the backend cannot sign and the URL is a plain local reference.
    pub presigned: bool,
}

#[utoipa::path(
    get,
    path = "/api/v1/files/{id}/url",
    tag = "files",
    params(("id" = Uuid, Path, description = "File ID")),
    responses(
        (status = 200, description = "Retrieval URL", body = SignedUrlResponse),
        (status = 403, description = "File is private", body = ErrorResponse),
        (status = 404, description = "File not found", body = ErrorResponse),
        (status = 409, description = "File is not complete", body = ErrorResponse)
    )
)]
#[tracing::instrument(skip(state), fields(owner_id = %owner.id(), file_id = %id))]
pub async fn get_signed_url(
    State(state): State<Arc<AppState>>,
    owner: Owner,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, HttpAppError> {
    let signed = state.storage.get_signed_url(id, owner.id()).await?;
    Ok(Json(SignedUrlResponse {
        presigned: signed.kind == SignedUrlKind::Presigned,
        url: signed.url,
        expires_at: signed.expires_at,
    }))
}

#[utoipa::path(
    get,
    path = "/api/v1/files/{id}/content",
    tag = "files",
    params(("id" = Uuid, Path, description = "File ID")),
    responses(
        (status = 200, description = "File content", content_type = "application/octet-stream"),
        (status = 403, description = "File is private", body = ErrorResponse),
        (status = 404, description = "File not found", body = ErrorResponse),
        (status = 409, description = "File is not complete", body = ErrorResponse)
    )
)]
#[tracing::instrument(skip(state), fields(owner_id = %owner.id(), file_id = %id))]
pub async fn download_file(
    State(state): State<Arc<AppState>>,
    owner: Owner,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, HttpAppError> {
    let (file, stream) = state.storage.download_stream(id, owner.id()).await?;
    let base = file.base();
    let headers = [
        (header::CONTENT_TYPE, base.mime_type.clone()),
        (header::CONTENT_LENGTH, base.size.to_string()),
        (
            header::CONTENT_DISPOSITION,
            format!(
                "attachment; filename=\"{}\"",
                base.filename.replace(|c: char| c == '"' || c == '\\', "_")
            ),
        ),
    ];
    Ok((headers, Body::from_stream(stream)))
}

#[utoipa::path(
    get,
    path = "/api/v1/files/{id}/metadata",
    tag = "files",
    params(("id" = Uuid, Path, description = "File ID")),
    responses(
        (status = 200, description = "Record and object metadata", body = FileMetadata),
        (status = 403, description = "File is private", body = ErrorResponse),
        (status = 404, description = "File not found", body = ErrorResponse)
    )
)]
#[tracing::instrument(skip(state), fields(owner_id = %owner.id(), file_id = %id))]
pub async fn get_file_metadata(
    State(state): State<Arc<AppState>>,
    owner: Owner,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, HttpAppError> {
    let metadata = state.storage.get_file_metadata(id, owner.id()).await?;
    Ok(Json(metadata))
}

#[utoipa::path(
    patch,
    path = "/api/v1/files/{id}/metadata",
    tag = "files",
    params(("id" = Uuid, Path, description = "File ID")),
    request_body(content = inline(Object), description = "Keys to merge into the user metadata"),
    responses(
        (status = 200, description = "Metadata merged", body = FileResponse),
        (status = 400, description = "Invalid metadata", body = ErrorResponse),
        (status = 403, description = "Not the owner", body = ErrorResponse),
        (status = 404, description = "File not found", body = ErrorResponse)
    )
)]
#[tracing::instrument(skip(state, patch), fields(owner_id = %owner.id(), file_id = %id))]
pub async fn update_file_metadata(
    State(state): State<Arc<AppState>>,
    owner: Owner,
    Path(id): Path<Uuid>,
    ValidatedJson(patch): ValidatedJson<serde_json::Value>,
) -> Result<impl IntoResponse, HttpAppError> {
    let file = state
        .storage
        .update_file_metadata(id, patch, owner.id())
        .await?;
    Ok(Json(FileResponse::from(file)))
}

#[utoipa::path(
    get,
    path = "/api/v1/files/{id}/validation",
    tag = "files",
    params(("id" = Uuid, Path, description = "File ID")),
    responses(
        (status = 200, description = "Validation report", body = ValidationReport),
        (status = 403, description = "File is private", body = ErrorResponse),
        (status = 404, description = "File not found", body = ErrorResponse)
    )
)]
#[tracing::instrument(skip(state), fields(owner_id = %owner.id(), file_id = %id))]
pub async fn get_validation_report(
    State(state): State<Arc<AppState>>,
    owner: Owner,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, HttpAppError> {
    let report = state
        .validation
        .get_validation_report(id, owner.id())
        .await?;
    Ok(Json(report))
}

#[utoipa::path(
    get,
    path = "/api/v1/files/{id}/versions",
    tag = "files",
    params(("id" = Uuid, Path, description = "Master file ID")),
    responses(
        (status = 200, description = "Versions of the master", body = Vec<FileResponse>),
        (status = 403, description = "Master is private", body = ErrorResponse),
        (status = 404, description = "Master not found", body = ErrorResponse)
    )
)]
#[tracing::instrument(skip(state), fields(owner_id = %owner.id(), file_id = %id))]
pub async fn list_versions(
    State(state): State<Arc<AppState>>,
    owner: Owner,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, HttpAppError> {
    let versions = state.storage.list_versions(id, owner.id()).await?;
    let body: Vec<FileResponse> = versions.into_iter().map(FileResponse::from).collect();
    Ok(Json(body))
}
