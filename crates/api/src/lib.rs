//! HTTP API layer with Axum routes and middleware.
//!
//! This crate provides:
//! - File upload, download and delete routes over the object store
//! - Bearer token authentication middleware
//! - A health report

pub mod error;
pub mod middleware;
pub mod routes;

use axum::{Router, http::header::AUTHORIZATION};
use folio_core::storage::ObjectStore;
use folio_shared::JwtService;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::sensitive_headers::SetSensitiveRequestHeadersLayer;
use tower_http::trace::TraceLayer;

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    /// Object store holding uploaded files.
    pub objects: Arc<ObjectStore>,
    /// JWT service for token operations.
    pub jwt_service: Arc<JwtService>,
    /// Largest accepted upload body, in bytes.
    pub max_upload_bytes: usize,
}

/// Creates the main application router.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .nest("/api", routes::api_routes_with_state(state.clone()))
        .layer(TraceLayer::new_for_http())
        // Keep bearer tokens out of request traces
        .layer(SetSensitiveRequestHeadersLayer::new([AUTHORIZATION]))
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(state)
}
