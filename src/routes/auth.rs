//! Authentication routes
//!
//! Magic-link login for local development plus the caller's identity.
//! Cognito handles sign-in itself; its tokens are only verified here.

use axum::{extract::State, Json};
use std::sync::Arc;

use crate::app::AppState;
use crate::auth::{LocalTokens, RequireAuth};
use crate::domain::auth::{
    ExchangeRequest, MagicLinkRequest, MagicLinkResponse, MeResponse, SessionResponse,
};
use crate::error::{ApiError, ApiResult};

fn magic_link_tokens(state: &AppState) -> ApiResult<&LocalTokens> {
    if !state.settings.magic_link_enabled {
        return Err(ApiError::forbidden("Magic-link login is disabled"));
    }
    state
        .auth
        .local()
        .ok_or_else(|| ApiError::forbidden("Magic-link login requires LOCAL_JWT_SECRET"))
}

/// POST /api/v1/auth/request_link
pub async fn request_link(
    State(state): State<Arc<AppState>>,
    Json(req): Json<MagicLinkRequest>,
) -> ApiResult<Json<MagicLinkResponse>> {
    let tokens = magic_link_tokens(&state)?;
    let email = req.email.trim().to_lowercase();
    if !email.contains('@') {
        return Err(ApiError::bad_request("A valid email address is required"));
    }
    let (token, expires_at) = tokens.issue_magic_link(&email).map_err(ApiError::Internal)?;
    tracing::info!(email = %email, "Magic link issued");
    Ok(Json(MagicLinkResponse {
        email,
        token,
        expires_at,
        message: "Exchange this token at /api/v1/auth/exchange within 15 minutes".to_string(),
    }))
}

/// POST /api/v1/auth/exchange
pub async fn exchange(
    State(state): State<Arc<AppState>>,
    Json(req): Json<ExchangeRequest>,
) -> ApiResult<Json<SessionResponse>> {
    let tokens = magic_link_tokens(&state)?;
    let claims = tokens.verify_magic_link(req.token.trim()).map_err(|e| {
        tracing::warn!(error = %e, "Magic-link exchange rejected");
        ApiError::Unauthorized("Invalid or expired magic link".to_string())
    })?;
    let email = claims.email.unwrap_or(claims.sub);
    let (access_token, expires_at) = tokens.issue_session(&email).map_err(ApiError::Internal)?;
    Ok(Json(SessionResponse {
        access_token,
        token_type: "Bearer",
        expires_at,
        email,
    }))
}

/// GET /api/v1/auth/me
pub async fn me(auth: RequireAuth) -> Json<MeResponse> {
    Json(MeResponse {
        email: auth.owner_email.clone(),
        sub: auth.sub.clone(),
        issuer: auth.issuer.clone(),
        auth_method: auth.method,
    })
}
