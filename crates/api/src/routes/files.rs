//! File upload, download and delete routes.
//!
//! Thin HTTP adapter over [`ObjectStore`]: multipart uploads go in, object
//! ids come back as retrieval URLs.

use axum::{
    Json, Router,
    extract::{DefaultBodyLimit, Multipart, Path, State, multipart::MultipartError},
    http::{StatusCode, header},
    response::{IntoResponse, Response},
    routing::{delete, get, post},
};
use chrono::Utc;
use folio_core::storage::{ObjectMetadata, ObjectStore, ObjectStoreError};
use folio_shared::{AppError, types::ObjectId};
use serde::Serialize;
use serde_json::json;
use tracing::{error, info, warn};

use crate::{AppState, error::ApiError, middleware::AuthUser};

/// Multipart field carrying the upload.
const FILE_FIELD: &str = "file";

/// Content type recorded when the client sends none.
const DEFAULT_CONTENT_TYPE: &str = "application/octet-stream";

/// One year.
const CACHE_FOREVER: &str = "public, max-age=31536000";

/// Routes reachable without a token.
pub fn public_routes() -> Router<AppState> {
    Router::new().route("/files/{file_id}", get(download_file))
}

/// Routes that must sit behind the auth middleware.
pub fn protected_routes(max_upload_bytes: usize) -> Router<AppState> {
    Router::new()
        .route(
            "/files/upload",
            post(upload_file).layer(DefaultBodyLimit::max(max_upload_bytes)),
        )
        .route("/files/{file_id}", delete(delete_file))
}

// ============================================================================
// Request/Response Types
// ============================================================================

/// Response for a stored upload.
#[derive(Debug, Serialize)]
pub struct UploadResponse {
    /// Identifier of the new object.
    pub id: ObjectId,
    /// Filename as sent by the client.
    pub filename: String,
    /// Path the object can be fetched from.
    pub url: String,
}

// ============================================================================
// Helper Functions
// ============================================================================

fn parse_file_id(raw: &str) -> Result<ObjectId, ApiError> {
    ObjectStore::parse_id(raw).map_err(|e| {
        warn!(file_id = raw, error = %e, "Rejected file id");
        ApiError::new(
            "invalid_file_id",
            AppError::Validation("Invalid file id".into()),
        )
    })
}

fn multipart_error(err: &MultipartError) -> ApiError {
    if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
        return ApiError::new(
            "file_too_large",
            AppError::PayloadTooLarge("File exceeds the upload size limit".into()),
        );
    }
    warn!(error = %err, "Malformed multipart body");
    ApiError::new("invalid_multipart", AppError::Validation(err.body_text()))
}

// ============================================================================
// Route Handlers
// ============================================================================

/// POST `/files/upload`
/// Store the multipart field `file` as a new object.
async fn upload_file(
    State(state): State<AppState>,
    auth: AuthUser,
    mut multipart: Multipart,
) -> Result<Json<UploadResponse>, ApiError> {
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| multipart_error(&e))?
    {
        if field.name() != Some(FILE_FIELD) {
            continue;
        }
        // Plain form values named `file` are not uploads
        let Some(filename) = field.file_name().map(str::to_string) else {
            continue;
        };

        let content_type = field
            .content_type()
            .unwrap_or(DEFAULT_CONTENT_TYPE)
            .to_string();
        let payload = field.bytes().await.map_err(|e| multipart_error(&e))?;

        let metadata = ObjectMetadata {
            content_type,
            size: payload.len() as u64,
            uploaded_at: Utc::now(),
        };

        let id = match state.objects.put(&filename, payload, metadata).await {
            Ok(id) => id,
            Err(ObjectStoreError::Uninitialized) => {
                return Err(ApiError::storage_not_configured());
            }
            Err(e) => {
                error!(error = %e, filename = %filename, "File upload failed");
                return Err(ApiError::new(
                    "upload_failed",
                    AppError::Internal("Failed to upload file".into()),
                ));
            }
        };

        info!(
            file_id = %id,
            filename = %filename,
            user_id = %auth.user_id(),
            "File uploaded"
        );

        return Ok(Json(UploadResponse {
            id,
            url: ObjectStore::url_for(id),
            filename,
        }));
    }

    Err(ApiError::new(
        "no_file",
        AppError::Validation("No file provided".into()),
    ))
}

/// GET `/files/{file_id}`
/// Return the stored bytes.
async fn download_file(
    State(state): State<AppState>,
    Path(file_id): Path<String>,
) -> Result<Response, ApiError> {
    let id = parse_file_id(&file_id)?;

    match state.objects.get(id).await {
        Ok(payload) => Ok((
            [
                (header::CONTENT_TYPE, DEFAULT_CONTENT_TYPE),
                (header::CACHE_CONTROL, CACHE_FOREVER),
            ],
            payload,
        )
            .into_response()),
        Err(ObjectStoreError::Uninitialized) => Err(ApiError::storage_not_configured()),
        // Read failures are reported as missing
        Err(e) => {
            warn!(file_id = %id, error = %e, "File download failed");
            Err(ApiError::new(
                "not_found",
                AppError::NotFound("File not found".into()),
            ))
        }
    }
}

/// DELETE `/files/{file_id}`
/// Remove an object and its chunks.
async fn delete_file(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(file_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let id = parse_file_id(&file_id)?;

    match state.objects.remove(id).await {
        Ok(()) => {
            info!(file_id = %id, user_id = %auth.user_id(), "File deleted");
            Ok(Json(json!({ "message": "File deleted successfully" })))
        }
        Err(ObjectStoreError::Uninitialized) => Err(ApiError::storage_not_configured()),
        Err(e) => {
            error!(file_id = %id, error = %e, "File deletion failed");
            Err(ApiError::new(
                "delete_failed",
                AppError::Internal("Failed to delete file".into()),
            ))
        }
    }
}
