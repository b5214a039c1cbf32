//! Client for an OpenAI-compatible chat-completions API.
//!
//! Used by the narrative service for report sections, subtasks and generated
//! lists. Transport errors, 429 and 5xx responses are retried with exponential
//! backoff; anything else fails immediately.

use anyhow::{Context, Result};
use backoff::{future::retry, ExponentialBackoff, ExponentialBackoffBuilder};
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, instrument, warn};

use crate::config::Settings;

#[derive(Debug, Error)]
pub enum LlmError {
    #[error("OPENAI_API_KEY not configured")]
    NotConfigured,

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("LLM returned empty content")]
    EmptyContent,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: [ChatMessage<'a>; 2],
    temperature: f32,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
    #[serde(default)]
    usage: Option<Usage>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Usage {
    #[serde(default)]
    prompt_tokens: u32,
    #[serde(default)]
    completion_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    error: ApiErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ApiErrorDetail {
    message: String,
}

/// Chat-completions client. Without an API key every call returns
/// [`LlmError::NotConfigured`] so callers can fall back to templates.
#[derive(Clone)]
pub struct LlmClient {
    client: Client,
    api_key: Option<String>,
    base_url: String,
    model: String,
    max_elapsed: Duration,
}

impl LlmClient {
    pub fn new(settings: &Settings) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(settings.ai_timeout_seconds))
            .build()
            .context("Failed to create HTTP client")?;

        if settings.ai_configured() {
            tracing::info!(model = %settings.openai_model, "LLM client initialized");
        } else {
            tracing::warn!("OPENAI_API_KEY not set; narratives use offline templates");
        }

        Ok(Self {
            client,
            api_key: settings.openai_api_key.clone(),
            base_url: settings.openai_base_url.trim_end_matches('/').to_string(),
            model: settings.openai_model.clone(),
            max_elapsed: Duration::from_secs(settings.ai_timeout_seconds.max(1) * 2),
        })
    }

    pub fn is_configured(&self) -> bool {
        self.api_key.is_some()
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    fn retry_policy(&self) -> ExponentialBackoff {
        ExponentialBackoffBuilder::new()
            .with_initial_interval(Duration::from_millis(500))
            .with_max_interval(Duration::from_secs(4))
            .with_max_elapsed_time(Some(self.max_elapsed))
            .build()
    }

    /// Single system + user exchange, returning the assistant text.
    #[instrument(skip(self, system, prompt), fields(model = %self.model))]
    pub async fn complete(
        &self,
        system: &str,
        prompt: &str,
        temperature: f32,
    ) -> Result<String, LlmError> {
        let api_key = self.api_key.as_deref().ok_or(LlmError::NotConfigured)?;
        let url = format!("{}/chat/completions", self.base_url);
        let body = ChatRequest {
            model: &self.model,
            messages: [
                ChatMessage {
                    role: "system",
                    content: system,
                },
                ChatMessage {
                    role: "user",
                    content: prompt,
                },
            ],
            temperature,
        };
        let (url, body) = (&url, &body);

        let response: ChatResponse = retry(self.retry_policy(), || async move {
            let response = self
                .client
                .post(url)
                .bearer_auth(api_key)
                .json(body)
                .send()
                .await
                .map_err(|e| {
                    warn!(error = %e, "LLM request failed");
                    backoff::Error::transient(LlmError::Http(e))
                })?;

            let status = response.status();
            if status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
                let message = response.text().await.unwrap_or_default();
                warn!(status = %status, "LLM API returned a retryable status");
                return Err(backoff::Error::transient(LlmError::Api {
                    status: status.as_u16(),
                    message,
                }));
            }
            if !status.is_success() {
                let text = response.text().await.unwrap_or_default();
                let message = serde_json::from_str::<ApiErrorBody>(&text)
                    .map(|e| e.error.message)
                    .unwrap_or(text);
                return Err(backoff::Error::permanent(LlmError::Api {
                    status: status.as_u16(),
                    message,
                }));
            }

            response
                .json::<ChatResponse>()
                .await
                .map_err(|e| backoff::Error::permanent(LlmError::Http(e)))
        })
        .await?;

        if let Some(usage) = &response.usage {
            debug!(
                prompt_tokens = usage.prompt_tokens,
                completion_tokens = usage.completion_tokens,
                "LLM call succeeded"
            );
        }

        response
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .map(|text| text.trim().to_string())
            .filter(|text| !text.is_empty())
            .ok_or(LlmError::EmptyContent)
    }
}

/// Strips ```json ... ``` or ``` ... ``` code fences from model output.
pub fn strip_json_fences(text: &str) -> &str {
    let text = text.trim();
    let inner = text
        .strip_prefix("```json")
        .or_else(|| text.strip_prefix("```JSON"))
        .or_else(|| text.strip_prefix("```"));
    match inner {
        Some(stripped) => {
            let stripped = stripped.trim_start();
            stripped
                .strip_suffix("```")
                .map(str::trim)
                .unwrap_or(stripped)
        }
        None => text,
    }
}
