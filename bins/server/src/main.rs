//! Folio API Server
//!
//! Main entry point for the Folio file service.

use std::sync::Arc;

use anyhow::Context;
use tokio::net::TcpListener;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use folio_api::{AppState, create_router};
use folio_core::storage::{ObjectStore, OpendalChunkedStore, StorageConfig};
use folio_shared::{AppConfig, JwtConfig, JwtService};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "folio=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let config = AppConfig::load().context("Failed to load configuration")?;

    // Bind the object store. A backend that cannot be built leaves the store
    // unbound; file routes answer 503 until a restart fixes the config.
    let objects = ObjectStore::new();
    let storage_config = StorageConfig::from(config.storage.clone());
    match OpendalChunkedStore::from_config(storage_config) {
        Ok(store) => objects.initialize(Arc::new(store)),
        Err(e) => error!(
            provider = config.storage.provider.name(),
            error = %e,
            "Failed to create storage backend"
        ),
    }

    // Create JWT service
    let jwt_service = JwtService::new(JwtConfig::from(&config.jwt));

    // Create application state
    let state = AppState {
        objects: Arc::new(objects),
        jwt_service: Arc::new(jwt_service),
        max_upload_bytes: config.server.max_upload_bytes,
    };

    // Create router
    let app = create_router(state);

    // Start server
    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;
    info!("Server listening on {}", addr);

    axum::serve(listener, app).await?;

    Ok(())
}
