//! OpenAPI documentation, served at `/api-docs/openapi.json`.

use utoipa::OpenApi;

use crate::error;
use crate::handlers;
use cadence_core::models;

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Cadence Storage API",
        version = "0.1.0",
        description = "File storage for a music distribution platform: audio masters, cover artwork and music videos. Single-shot and chunked uploads, signed retrieval URLs, metadata and asynchronous distribution checks. Every file endpoint expects the caller's account id in X-Owner-Id."
    ),
    paths(
        handlers::files::upload_file,
        handlers::files::get_file,
        handlers::files::delete_file,
        handlers::files::copy_file,
        handlers::files::move_file,
        handlers::files::get_signed_url,
        handlers::files::download_file,
        handlers::files::get_file_metadata,
        handlers::files::update_file_metadata,
        handlers::files::get_validation_report,
        handlers::files::list_versions,
        handlers::uploads::initiate_upload,
        handlers::uploads::upload_chunk,
        handlers::uploads::get_upload_progress,
        handlers::uploads::abort_upload,
        handlers::health::health,
    ),
    components(schemas(
        error::ErrorResponse,
        models::FileResponse,
        models::FileKind,
        models::FileStatus,
        models::ValidationStatus,
        models::UploadProgress,
        cadence_services::MultipartSession,
        cadence_services::ChunkReceipt,
        cadence_services::FileMetadata,
        cadence_services::ValidationReport,
        cadence_services::CheckResult,
        handlers::files::CopyFileRequest,
        handlers::files::MoveFileRequest,
        handlers::files::SignedUrlResponse,
        handlers::uploads::InitiateUploadRequest,
        handlers::health::HealthResponse,
    )),
    tags(
        (name = "files", description = "Stored files"),
        (name = "uploads", description = "Chunked upload sessions"),
        (name = "health", description = "Liveness"),
    )
)]
pub struct ApiDoc;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_route_is_documented() {
        let spec = ApiDoc::openapi();
        for path in [
            "/api/v1/files",
            "/api/v1/files/{id}",
            "/api/v1/files/{id}/copy",
            "/api/v1/files/{id}/move",
            "/api/v1/files/{id}/url",
            "/api/v1/files/{id}/content",
            "/api/v1/files/{id}/metadata",
            "/api/v1/files/{id}/validation",
            "/api/v1/files/{id}/versions",
            "/api/v1/uploads",
            "/api/v1/uploads/{upload_id}",
            "/api/v1/uploads/{upload_id}/chunks/{chunk_number}",
            "/api/v1/health",
        ] {
            assert!(spec.paths.paths.contains_key(path), "missing {}", path);
        }
    }
}
