use anyhow::Result;
use axum::{extract::DefaultBodyLimit, http::HeaderValue, Router};
use std::sync::Arc;
use tower_http::{
    cors::{AllowHeaders, AllowMethods, CorsLayer},
    limit::RequestBodyLimitLayer,
    trace::{DefaultMakeSpan, DefaultOnRequest, DefaultOnResponse, TraceLayer},
};
use tracing::Level;

use crate::auth::Authenticator;
use crate::config::Settings;
use crate::middleware::{request_id_layer, X_REQUEST_ID};
use crate::routes;
use crate::services::sam::OpportunitySource;
use crate::services::{
    Calculator, Catalog, ContractSync, LlmClient, NarrativeService, ObjectStorage, RedisCache,
    ReportBuilder, WebScraper,
};
use crate::store::Stores;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub settings: Settings,
    pub stores: Stores,
    pub auth: Authenticator,
    pub catalog: Arc<Catalog>,
    pub calculator: Arc<Calculator>,
    pub narrative: NarrativeService,
    pub reports: ReportBuilder,
    /// None when no bucket is configured; uploads are refused
    pub storage: Option<ObjectStorage>,
    /// None when Redis is not configured or unreachable
    pub cache: Option<RedisCache>,
    pub scraper: WebScraper,
    pub contract_sync: Arc<ContractSync>,
}

impl AppState {
    pub fn new(
        settings: Settings,
        stores: Stores,
        auth: Authenticator,
        cache: Option<RedisCache>,
        storage: Option<ObjectStorage>,
        sam: Option<Arc<dyn OpportunitySource>>,
    ) -> Result<Arc<Self>> {
        let catalog = Arc::new(Catalog::new());
        let calculator = Arc::new(Calculator::new(catalog.clone()));
        let narrative = NarrativeService::new(LlmClient::new(&settings)?, cache.clone(), catalog.clone());
        let reports = ReportBuilder::new(
            calculator.clone(),
            narrative.clone(),
            storage.clone(),
            stores.proposals.clone(),
            stores.reports.clone(),
            &settings.tool_version,
        );
        let scraper = WebScraper::new(&settings.scraper_user_agent)?;
        let contract_sync = Arc::new(ContractSync::new(&settings, sam, stores.contracts.clone()));

        Ok(Arc::new(Self {
            settings,
            stores,
            auth,
            catalog,
            calculator,
            narrative,
            reports,
            storage,
            cache,
            scraper,
            contract_sync,
        }))
    }

    /// Memory stores and no external services; local tokens only.
    #[cfg(test)]
    pub fn for_tests() -> Arc<Self> {
        let settings = Settings::default();
        let auth = Authenticator::from_settings(&settings).unwrap();
        Self::new(settings, Stores::memory(), auth, None, None, None).unwrap()
    }

    pub fn storage(&self) -> crate::error::ApiResult<&ObjectStorage> {
        self.storage
            .as_ref()
            .ok_or_else(|| crate::error::ApiError::bad_request("Object storage is not configured"))
    }
}

/// Build the complete application with all middleware
pub fn create_app(state: Arc<AppState>) -> Router {
    let cors = build_cors_layer(&state.settings);

    // Build trace layer (use DEBUG for spans to reduce overhead at INFO level)
    let trace_layer = TraceLayer::new_for_http()
        .make_span_with(DefaultMakeSpan::new().level(Level::DEBUG))
        .on_request(DefaultOnRequest::new().level(Level::DEBUG))
        .on_response(DefaultOnResponse::new().level(Level::INFO));

    let (set_request_id, propagate_request_id) = request_id_layer();

    // Multipart uploads carry some framing on top of the file itself
    let body_limit = state.settings.max_upload_bytes + 64 * 1024;

    Router::new()
        .merge(routes::api_router())
        // Middleware stack (applied bottom-up)
        .layer(DefaultBodyLimit::disable())
        .layer(RequestBodyLimitLayer::new(body_limit))
        .layer(propagate_request_id)
        .layer(trace_layer)
        .layer(set_request_id)
        .layer(cors)
        .with_state(state)
}

fn build_cors_layer(settings: &Settings) -> CorsLayer {
    let origins: Vec<HeaderValue> = settings
        .cors_allow_origins
        .iter()
        .filter_map(|origin| origin.parse().ok())
        .collect();

    let max_age = if settings.env.is_dev() {
        std::time::Duration::from_secs(86400)
    } else {
        std::time::Duration::from_secs(3600)
    };

    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods(AllowMethods::list([
            axum::http::Method::GET,
            axum::http::Method::POST,
            axum::http::Method::PUT,
            axum::http::Method::PATCH,
            axum::http::Method::DELETE,
            axum::http::Method::OPTIONS,
        ]))
        .allow_headers(AllowHeaders::list([
            axum::http::header::AUTHORIZATION,
            axum::http::header::CONTENT_TYPE,
            axum::http::header::ACCEPT,
            axum::http::HeaderName::from_static(X_REQUEST_ID),
        ]))
        .expose_headers([
            axum::http::header::CONTENT_DISPOSITION,
            axum::http::HeaderName::from_static(X_REQUEST_ID),
        ])
        .allow_credentials(true)
        .max_age(max_age)
}
