use axum::{extract::State, http::StatusCode, Json};
use serde::Serialize;
use std::sync::Arc;

use crate::app::AppState;
use crate::db;
use crate::store::StoreMode;

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub ai_configured: bool,
    pub store_mode: StoreMode,
    pub storage_configured: bool,
    pub cache_configured: bool,
    pub services: ServiceHealth,
}

#[derive(Serialize)]
pub struct ServiceHealth {
    pub database: String,
    pub redis: String,
}

/// Health check endpoint - public
pub async fn health_check(
    State(state): State<Arc<AppState>>,
) -> (StatusCode, Json<HealthResponse>) {
    let redis = match &state.cache {
        Some(cache) => match cache.health_check().await {
            Ok(()) => "ok",
            Err(_) => "error",
        },
        None => "disabled",
    };

    let database = match &state.stores.pool {
        Some(pool) if db::health_check(pool).await => "ok",
        Some(_) => "error",
        None => "memory",
    };

    // Redis is optional; a failing cache only degrades the service
    let (status_code, status) = if database == "error" {
        (StatusCode::SERVICE_UNAVAILABLE, "unhealthy")
    } else if redis == "error" {
        (StatusCode::OK, "degraded")
    } else {
        (StatusCode::OK, "healthy")
    };

    (
        status_code,
        Json(HealthResponse {
            status: status.to_string(),
            version: state.settings.tool_version.clone(),
            ai_configured: state.narrative.ai_configured(),
            store_mode: state.stores.mode,
            storage_configured: state.storage.is_some(),
            cache_configured: state.cache.is_some(),
            services: ServiceHealth {
                database: database.to_string(),
                redis: redis.to_string(),
            },
        }),
    )
}
