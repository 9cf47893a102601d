//! Health check endpoints.

use axum::{Json, Router, extract::State, routing::get};
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::AppState;

/// Health check response.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    /// Service status.
    pub status: &'static str,
    /// Service version.
    pub version: &'static str,
    /// Server time when the report was produced.
    pub timestamp: DateTime<Utc>,
    /// Object store state.
    pub storage: StorageHealth,
}

/// Object store section of the health report.
#[derive(Debug, Serialize)]
pub struct StorageHealth {
    /// Whether a backing store is bound.
    pub initialized: bool,
    /// Name of the bound backend, if any.
    pub backend: Option<&'static str>,
}

/// Health check handler.
///
/// Answers `ok` even when storage is unbound; callers read `storage` for that.
async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        timestamp: Utc::now(),
        storage: StorageHealth {
            initialized: state.objects.is_initialized(),
            backend: state.objects.backend_name(),
        },
    })
}

/// Creates health check routes.
pub fn routes() -> Router<AppState> {
    Router::new().route("/health", get(health_check))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{body::Body, http::Request, http::StatusCode};
    use folio_core::storage::{MemoryChunkedStore, ObjectStore};
    use folio_shared::{JwtConfig, JwtService};
    use http_body_util::BodyExt;
    use std::sync::Arc;
    use tower::ServiceExt;

    async fn fetch_health(objects: ObjectStore) -> serde_json::Value {
        let state = AppState {
            objects: Arc::new(objects),
            jwt_service: Arc::new(JwtService::new(JwtConfig::default())),
            max_upload_bytes: 1024,
        };
        let response = crate::create_router(state)
            .oneshot(
                Request::builder()
                    .uri("/api/health")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body = response.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&body).unwrap()
    }

    #[tokio::test]
    async fn test_health_reports_bound_backend() {
        let objects = ObjectStore::with_store(Arc::new(MemoryChunkedStore::new()));
        let json = fetch_health(objects).await;

        assert_eq!(json["status"], "ok");
        assert_eq!(json["version"], env!("CARGO_PKG_VERSION"));
        assert!(json["timestamp"].is_string());
        assert_eq!(json["storage"]["initialized"], true);
        assert_eq!(json["storage"]["backend"], "memory");
    }

    #[tokio::test]
    async fn test_health_ok_without_storage() {
        let json = fetch_health(ObjectStore::new()).await;

        assert_eq!(json["status"], "ok");
        assert_eq!(json["storage"]["initialized"], false);
        assert!(json["storage"]["backend"].is_null());
    }
}
