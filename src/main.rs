mod api;
mod app;
mod auth;
mod config;
mod db;
mod domain;
mod error;
mod logging;
mod middleware;
mod routes;
mod services;
mod store;

use anyhow::Result;
use std::sync::Arc;

use services::sam::OpportunitySource;
use services::{ObjectStorage, RedisCache, SamClient};

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    let settings = config::Settings::from_env()?;

    logging::init_logging(&settings.env);

    tracing::info!(
        env = ?settings.env,
        server_addr = %settings.server_addr,
        version = %settings.tool_version,
        "Starting estimation backend"
    );

    // Postgres when configured, in-memory stores otherwise
    let pool = db::create_pool(&settings).await?;
    let stores = store::Stores::from_pool(pool);
    tracing::info!(mode = %stores.mode, "Stores initialized");

    // Redis is optional; generated text is just not cached without it
    let cache = match settings.redis_url.as_deref() {
        Some(url) => match RedisCache::new(url, settings.redis_cache_ttl_seconds).await {
            Ok(cache) => Some(cache),
            Err(e) => {
                tracing::warn!(error = %e, "Redis unavailable - AI output will not be cached");
                None
            }
        },
        None => None,
    };

    let storage = ObjectStorage::from_settings(&settings).await;
    if storage.is_none() {
        tracing::warn!("S3_BUCKET not set - uploads and stored reports are disabled");
    }

    let authenticator = auth::Authenticator::from_settings(&settings)?;
    if let Some(jwks) = authenticator.cognito() {
        if let Err(e) = jwks.warm_cache().await {
            tracing::warn!(error = %e, "Failed to warm JWKS cache - will fetch on first request");
        }
    } else {
        tracing::info!("Cognito not configured - accepting local tokens only");
    }

    let sam: Option<Arc<dyn OpportunitySource>> = match SamClient::from_settings(&settings)? {
        Some(client) => Some(Arc::new(client)),
        None => None,
    };

    if !settings.ai_configured() {
        tracing::warn!("OPENAI_API_KEY not set - narrative falls back to templates");
    }

    let state = app::AppState::new(settings.clone(), stores, authenticator, cache, storage, sam)?;

    // Background SAM.gov poller
    let poller = state.contract_sync.clone().spawn_poller();

    let app = app::create_app(state);

    let listener = tokio::net::TcpListener::bind(&settings.server_addr).await?;
    tracing::info!("Listening on {}", settings.server_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    if let Some(poller) = poller {
        poller.abort();
    }
    tracing::info!("Server stopped");

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
