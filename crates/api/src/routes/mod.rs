//! API route definitions.

use axum::{Router, middleware};

use crate::{AppState, middleware::auth_middleware};

pub mod files;
pub mod health;

/// Creates the API router with protected routes that need state for middleware.
#[allow(clippy::needless_pass_by_value)]
pub fn api_routes_with_state(state: AppState) -> Router<AppState> {
    // Upload and delete require a bearer token
    let protected_routes = files::protected_routes(state.max_upload_bytes).layer(
        middleware::from_fn_with_state(state.clone(), auth_middleware),
    );

    Router::new()
        .merge(health::routes())
        .merge(files::public_routes())
        .merge(protected_routes)
}
