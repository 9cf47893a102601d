//! JSON error responses.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use folio_shared::AppError;
use serde_json::json;

/// An [`AppError`] tagged with the route-specific code sent to clients.
///
/// Renders as `{"error": code, "message": msg}` with the status of the
/// wrapped error.
#[derive(Debug)]
pub struct ApiError {
    code: &'static str,
    source: AppError,
}

impl ApiError {
    /// Tag `source` with `code`.
    #[must_use]
    pub const fn new(code: &'static str, source: AppError) -> Self {
        Self { code, source }
    }

    /// 401 with the given code.
    #[must_use]
    pub fn unauthorized(code: &'static str, message: &str) -> Self {
        Self::new(code, AppError::Unauthorized(message.to_string()))
    }

    /// 503 reported while no storage backend is bound.
    #[must_use]
    pub fn storage_not_configured() -> Self {
        Self::new(
            "storage_not_configured",
            AppError::Unavailable("File storage is not configured".into()),
        )
    }

    /// Client-facing code.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        self.code
    }

    /// HTTP status of the response.
    #[must_use]
    pub fn status(&self) -> StatusCode {
        StatusCode::from_u16(self.source.status_code())
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (
            self.status(),
            Json(json!({
                "error": self.code,
                "message": self.source.message(),
            })),
        )
            .into_response()
    }
}
