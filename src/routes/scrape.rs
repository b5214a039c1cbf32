use axum::{extract::State, Json};
use std::sync::Arc;

use crate::app::AppState;
use crate::auth::RequireAuth;
use crate::domain::scrape::{ScrapeRequest, ScrapeResult};

/// POST /api/v1/scrape/url
///
/// Always 200; fetch failures are reported in the body.
pub async fn scrape_url(
    auth: RequireAuth,
    State(state): State<Arc<AppState>>,
    Json(req): Json<ScrapeRequest>,
) -> Json<ScrapeResult> {
    let result = state.scraper.scrape(&req).await;
    tracing::info!(
        owner = %auth.owner_email,
        url = %result.url,
        success = result.success,
        chars = result.text_excerpt.len(),
        "Scrape finished"
    );
    Json(result)
}
