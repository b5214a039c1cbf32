use anyhow::{Context, Result};
use std::env;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Environment {
    Dev,
    Staging,
    Prod,
}

impl Environment {
    pub fn from_str(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "prod" | "production" => Self::Prod,
            "staging" => Self::Staging,
            _ => Self::Dev,
        }
    }

    pub fn is_dev(&self) -> bool {
        matches!(self, Self::Dev)
    }

    pub fn is_prod(&self) -> bool {
        matches!(self, Self::Prod)
    }
}

#[derive(Debug, Clone)]
pub struct Settings {
    pub env: Environment,
    pub server_addr: String,
    pub tool_version: String,

    // Database (memory stores when unset)
    pub database_url: Option<String>,
    pub database_max_connections: u32,

    // Redis (AI result cache, optional)
    pub redis_url: Option<String>,
    pub redis_cache_ttl_seconds: u64,

    // CORS
    pub cors_allow_origins: Vec<String>,

    // Cognito
    pub cognito_region: Option<String>,
    pub cognito_user_pool_id: Option<String>,
    pub cognito_app_client_id: Option<String>,
    pub jwks_cache_ttl_seconds: u64,

    // Local HS256 tokens
    pub local_jwt_secret: Option<String>,
    pub local_jwt_ttl_seconds: u64,
    pub magic_link_enabled: bool,

    // LLM
    pub openai_api_key: Option<String>,
    pub openai_base_url: String,
    pub openai_model: String,
    pub ai_timeout_seconds: u64,

    // Object storage
    pub s3_bucket: Option<String>,
    pub s3_prefix: String,
    pub aws_region: Option<String>,

    // SAM.gov contract sync
    pub sam_api_key: Option<String>,
    pub sam_base_url: String,
    pub sam_sync_enabled: bool,
    pub sam_sync_interval_seconds: u64,
    pub sam_daily_request_quota: u32,
    pub sam_sync_days_back: u32,
    pub sam_sync_page_size: u32,
    pub sam_sync_query: Option<String>,

    // Scraper
    pub scraper_user_agent: String,

    pub max_upload_bytes: usize,
}

pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
     (KHTML, like Gecko) Chrome/123.0.0.0 Safari/537.36 EstimationToolScraper/0.2";

impl Default for Settings {
    fn default() -> Self {
        Self {
            env: Environment::Dev,
            server_addr: "0.0.0.0:8000".to_string(),
            tool_version: env!("CARGO_PKG_VERSION").to_string(),
            database_url: None,
            database_max_connections: 10,
            redis_url: None,
            redis_cache_ttl_seconds: 3600,
            cors_allow_origins: vec![
                "http://localhost:3000".to_string(),
                "http://localhost:3001".to_string(),
                "http://127.0.0.1:3000".to_string(),
                "http://127.0.0.1:3001".to_string(),
            ],
            cognito_region: None,
            cognito_user_pool_id: None,
            cognito_app_client_id: None,
            jwks_cache_ttl_seconds: 1800,
            local_jwt_secret: Some("local-dev-secret-change-me".to_string()),
            local_jwt_ttl_seconds: 8 * 3600,
            magic_link_enabled: true,
            openai_api_key: None,
            openai_base_url: "https://api.openai.com/v1".to_string(),
            openai_model: "gpt-4o-mini".to_string(),
            ai_timeout_seconds: 60,
            s3_bucket: None,
            s3_prefix: String::new(),
            aws_region: None,
            sam_api_key: None,
            sam_base_url: "https://api.sam.gov".to_string(),
            sam_sync_enabled: false,
            sam_sync_interval_seconds: 6 * 3600,
            sam_daily_request_quota: 10,
            sam_sync_days_back: 7,
            sam_sync_page_size: 100,
            sam_sync_query: None,
            scraper_user_agent: DEFAULT_USER_AGENT.to_string(),
            max_upload_bytes: 25 * 1024 * 1024,
        }
    }
}

fn non_empty(key: &str) -> Option<String> {
    env::var(key)
        .ok()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

fn parsed<T: std::str::FromStr>(key: &str, default: T) -> T {
    non_empty(key).and_then(|s| s.parse().ok()).unwrap_or(default)
}

fn flag(key: &str, default: bool) -> bool {
    match non_empty(key).map(|s| s.to_lowercase()) {
        Some(v) if matches!(v.as_str(), "1" | "true" | "yes" | "on") => true,
        Some(v) if matches!(v.as_str(), "0" | "false" | "no" | "off") => false,
        _ => default,
    }
}

impl Settings {
    pub fn from_env() -> Result<Self> {
        let defaults = Settings::default();
        let env = Environment::from_str(&env::var("ENV").unwrap_or_else(|_| "dev".to_string()));

        // Durable storage is mandatory outside local development
        let database_url = non_empty("DATABASE_URL");
        if env.is_prod() && database_url.is_none() {
            return Err(anyhow::anyhow!("DATABASE_URL")).context("DATABASE_URL must be set in production");
        }

        let cors_allow_origins = non_empty("CORS_ALLOW_ORIGINS")
            .map(|raw| {
                raw.split(',')
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty())
                    .collect()
            })
            .unwrap_or(defaults.cors_allow_origins);

        // The built-in development secret is never used outside dev
        let local_jwt_secret = match non_empty("LOCAL_JWT_SECRET") {
            Some(secret) => Some(secret),
            None if env.is_dev() => defaults.local_jwt_secret,
            None => None,
        };

        Ok(Settings {
            server_addr: non_empty("SERVER_ADDR").unwrap_or(defaults.server_addr),
            tool_version: non_empty("TOOL_VERSION").unwrap_or(defaults.tool_version),
            database_url,
            database_max_connections: parsed("DATABASE_MAX_CONNECTIONS", defaults.database_max_connections),
            redis_url: non_empty("REDIS_URL"),
            redis_cache_ttl_seconds: parsed("REDIS_CACHE_TTL_SECONDS", defaults.redis_cache_ttl_seconds),
            cors_allow_origins,
            cognito_region: non_empty("COGNITO_REGION").or_else(|| non_empty("AWS_REGION")),
            cognito_user_pool_id: non_empty("COGNITO_USER_POOL_ID"),
            cognito_app_client_id: non_empty("COGNITO_APP_CLIENT_ID"),
            jwks_cache_ttl_seconds: parsed("JWKS_CACHE_TTL_SECONDS", defaults.jwks_cache_ttl_seconds),
            local_jwt_secret,
            local_jwt_ttl_seconds: parsed("LOCAL_JWT_TTL_SECONDS", defaults.local_jwt_ttl_seconds),
            magic_link_enabled: flag("MAGIC_LINK_ENABLED", !env.is_prod()),
            openai_api_key: non_empty("OPENAI_API_KEY"),
            openai_base_url: non_empty("OPENAI_BASE_URL").unwrap_or(defaults.openai_base_url),
            openai_model: non_empty("OPENAI_MODEL").unwrap_or(defaults.openai_model),
            ai_timeout_seconds: parsed("AI_TIMEOUT_SECONDS", defaults.ai_timeout_seconds),
            s3_bucket: non_empty("S3_BUCKET").or_else(|| non_empty("S3_REPORT_BUCKET")),
            s3_prefix: non_empty("S3_PREFIX")
                .map(|p| p.trim_matches('/').to_string())
                .unwrap_or_default(),
            aws_region: non_empty("AWS_REGION").or_else(|| non_empty("AWS_DEFAULT_REGION")),
            sam_api_key: non_empty("SAM_API_KEY"),
            sam_base_url: non_empty("SAM_BASE_URL").unwrap_or(defaults.sam_base_url),
            sam_sync_enabled: flag("SAM_SYNC_ENABLED", defaults.sam_sync_enabled),
            sam_sync_interval_seconds: parsed("SAM_SYNC_INTERVAL_SECONDS", defaults.sam_sync_interval_seconds),
            sam_daily_request_quota: parsed("SAM_DAILY_REQUEST_QUOTA", defaults.sam_daily_request_quota),
            sam_sync_days_back: parsed("SAM_SYNC_DAYS_BACK", defaults.sam_sync_days_back),
            sam_sync_page_size: parsed("SAM_SYNC_PAGE_SIZE", defaults.sam_sync_page_size),
            sam_sync_query: non_empty("SAM_SYNC_QUERY"),
            scraper_user_agent: non_empty("SCRAPER_USER_AGENT").unwrap_or(defaults.scraper_user_agent),
            max_upload_bytes: parsed("MAX_UPLOAD_BYTES", defaults.max_upload_bytes),
            env,
        })
    }

    pub fn ai_configured(&self) -> bool {
        self.openai_api_key.is_some()
    }

    /// Issuer URL of the configured Cognito user pool.
    pub fn cognito_issuer(&self) -> Option<String> {
        match (&self.cognito_region, &self.cognito_user_pool_id) {
            (Some(region), Some(pool)) => Some(format!(
                "https://cognito-idp.{}.amazonaws.com/{}",
                region, pool
            )),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_environment_parsing() {
        assert_eq!(Environment::from_str("production"), Environment::Prod);
        assert_eq!(Environment::from_str("PROD"), Environment::Prod);
        assert_eq!(Environment::from_str("staging"), Environment::Staging);
        assert_eq!(Environment::from_str("anything"), Environment::Dev);
    }

    #[test]
    fn test_cognito_issuer_requires_region_and_pool() {
        let mut settings = Settings::default();
        assert!(settings.cognito_issuer().is_none());

        settings.cognito_region = Some("us-east-1".to_string());
        settings.cognito_user_pool_id = Some("us-east-1_abc".to_string());
        assert_eq!(
            settings.cognito_issuer().as_deref(),
            Some("https://cognito-idp.us-east-1.amazonaws.com/us-east-1_abc")
        );
    }

    #[test]
    fn test_defaults_are_local() {
        let settings = Settings::default();
        assert!(settings.env.is_dev());
        assert!(settings.database_url.is_none());
        assert!(!settings.ai_configured());
        assert!(settings.magic_link_enabled);
    }
}
