use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// POST /api/v1/scrape/url body
#[derive(Debug, Clone, Deserialize)]
pub struct ScrapeRequest {
    pub url: String,
    #[serde(default = "default_max_bytes")]
    pub max_bytes: usize,
    #[serde(default = "default_max_chars")]
    pub max_chars: usize,
    /// Seconds
    #[serde(default = "default_timeout")]
    pub timeout: f64,
    #[serde(default)]
    pub user_agent: Option<String>,
}

fn default_max_bytes() -> usize {
    500_000
}

fn default_max_chars() -> usize {
    4_000
}

fn default_timeout() -> f64 {
    10.0
}

impl ScrapeRequest {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            max_bytes: default_max_bytes(),
            max_chars: default_max_chars(),
            timeout: default_timeout(),
            user_agent: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScrapeResult {
    pub url: String,
    pub final_url: Option<String>,
    pub success: bool,
    pub status_code: Option<u16>,
    pub content_type: Option<String>,
    pub text_excerpt: String,
    pub fetched_at: DateTime<Utc>,
    pub truncated: bool,
    pub error: Option<String>,
}

impl ScrapeResult {
    pub fn failure(url: &str, error: impl Into<String>) -> Self {
        Self {
            url: url.to_string(),
            final_url: None,
            success: false,
            status_code: None,
            content_type: None,
            text_excerpt: String::new(),
            fetched_at: Utc::now(),
            truncated: false,
            error: Some(error.into()),
        }
    }
}
