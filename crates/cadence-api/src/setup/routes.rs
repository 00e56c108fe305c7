//! Route configuration and setup

use crate::api_doc::ApiDoc;
use crate::handlers::{files, health, uploads};
use crate::state::AppState;
use axum::{
    extract::DefaultBodyLimit,
    response::IntoResponse,
    routing::{get, post, put},
    Json, Router,
};
use cadence_core::Config;
use std::sync::Arc;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;
use utoipa::OpenApi;

pub const API_PREFIX: &str = "/api/v1";

/// Largest request body accepted: a whole file of the biggest kind, or one chunk.
pub fn max_body_bytes(config: &Config) -> usize {
    let upload = &config.upload;
    [
        upload.audio.max_file_size,
        upload.image.max_file_size,
        upload.video.max_file_size,
        upload.chunk_size_bytes,
    ]
    .into_iter()
    .max()
    .unwrap_or(upload.chunk_size_bytes)
    // multipart framing
    .saturating_add(64 * 1024)
    .try_into()
    .unwrap_or(usize::MAX)
}

pub fn setup_routes(config: &Config, state: Arc<AppState>) -> Router {
    let api = Router::new()
        .route("/files", post(files::upload_file))
        .route(
            "/files/{id}",
            get(files::get_file).delete(files::delete_file),
        )
        .route("/files/{id}/copy", post(files::copy_file))
        .route("/files/{id}/move", post(files::move_file))
        .route("/files/{id}/url", get(files::get_signed_url))
        .route("/files/{id}/content", get(files::download_file))
        .route(
            "/files/{id}/metadata",
            get(files::get_file_metadata).patch(files::update_file_metadata),
        )
        .route("/files/{id}/validation", get(files::get_validation_report))
        .route("/files/{id}/versions", get(files::list_versions))
        .route("/uploads", post(uploads::initiate_upload))
        .route(
            "/uploads/{upload_id}",
            get(uploads::get_upload_progress).delete(uploads::abort_upload),
        )
        .route(
            "/uploads/{upload_id}/chunks/{chunk_number}",
            put(uploads::upload_chunk),
        )
        .route("/health", get(health::health))
        .layer(DefaultBodyLimit::disable())
        .layer(RequestBodyLimitLayer::new(max_body_bytes(config)))
        .with_state(state);

    Router::new()
        .nest(API_PREFIX, api)
        .route("/api-docs/openapi.json", get(openapi_json))
        .layer(TraceLayer::new_for_http())
}

async fn openapi_json() -> impl IntoResponse {
    Json(ApiDoc::openapi())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_body_limit_covers_largest_kind() {
        let config = Config::default();
        let limit = max_body_bytes(&config) as u64;
        assert!(limit > config.upload.video.max_file_size);
        assert!(limit > config.upload.chunk_size_bytes);
    }
}
