//! Authentication domain types
//!
//! Magic-link login for local development and the identity view returned by
//! `/auth/me`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// How a bearer token was verified
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AuthMethod {
    Cognito,
    Local,
}

/// Magic link request
#[derive(Debug, Clone, Deserialize)]
pub struct MagicLinkRequest {
    pub email: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct MagicLinkResponse {
    pub email: String,
    /// Single-use login token; in a deployed system this goes out by email
    pub token: String,
    pub expires_at: DateTime<Utc>,
    pub message: String,
}

/// Exchange a magic-link token for a session token
#[derive(Debug, Clone, Deserialize)]
pub struct ExchangeRequest {
    pub token: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct SessionResponse {
    pub access_token: String,
    pub token_type: &'static str,
    pub expires_at: DateTime<Utc>,
    pub email: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct MeResponse {
    pub email: String,
    pub sub: String,
    pub issuer: String,
    pub auth_method: AuthMethod,
}
