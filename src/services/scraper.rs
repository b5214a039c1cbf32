//! Fetch a page and reduce it to plain text for RFP analysis.
//!
//! Google Docs links go through the plain-text export and SAM.gov
//! opportunity pages through the public opportunity JSON, since both serve
//! script-only shells to plain HTTP clients. Failures come back as a result
//! with `success = false`, never as an error.

use anyhow::{anyhow, Context, Result};
use chrono::Utc;
use regex::Regex;
use reqwest::{header, Client, Response};
use serde_json::Value;
use std::sync::LazyLock;
use std::time::Duration;
use tracing::{debug, instrument, warn};
use url::Url;

use crate::domain::scrape::{ScrapeRequest, ScrapeResult};

static HIDDEN_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?is)<!--.*?-->|<script\b.*?</script\s*>|<style\b.*?</style\s*>|<noscript\b.*?</noscript\s*>")
        .unwrap()
});
static TAG_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?s)<[^>]*>").unwrap());
static ENTITY_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"&(#[0-9]{1,7}|#[xX][0-9a-fA-F]{1,6}|[a-zA-Z]{2,8});").unwrap());
static SPACE_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").unwrap());

const TRUNCATED_MESSAGE: &str = "Response truncated to max_bytes; text excerpt may be incomplete.";
const GOOGLE_AUTH_MESSAGE: &str =
    "Google Docs link requires authentication or is not publicly accessible.";

fn decode_entity(entity: &str) -> Option<String> {
    let c = match entity {
        "amp" => '&',
        "lt" => '<',
        "gt" => '>',
        "quot" => '"',
        "apos" => '\'',
        "nbsp" => ' ',
        "ndash" => '-',
        "mdash" => '-',
        "rsquo" | "lsquo" => '\'',
        "rdquo" | "ldquo" => '"',
        "hellip" => return Some("...".to_string()),
        "copy" => '\u{00A9}',
        "reg" => '\u{00AE}',
        _ => {
            let code = if let Some(hex) = entity.strip_prefix("#x").or_else(|| entity.strip_prefix("#X")) {
                u32::from_str_radix(hex, 16).ok()?
            } else {
                entity.strip_prefix('#')?.parse().ok()?
            };
            char::from_u32(code)?
        }
    };
    Some(c.to_string())
}

fn truncate_chars(text: &str, max_chars: usize) -> (String, bool) {
    if max_chars == 0 || text.chars().count() <= max_chars {
        return (text.to_string(), false);
    }
    (text.chars().take(max_chars).collect(), true)
}

/// Visible text of an HTML document with whitespace collapsed.
pub fn extract_visible_text(html: &str) -> String {
    let without_hidden = HIDDEN_RE.replace_all(html, " ");
    let without_tags = TAG_RE.replace_all(&without_hidden, " ");
    let decoded = ENTITY_RE.replace_all(&without_tags, |caps: &regex::Captures| {
        decode_entity(&caps[1]).unwrap_or_else(|| caps[0].to_string())
    });
    SPACE_RE.replace_all(&decoded, " ").trim().to_string()
}

/// `mailto:x` and `data:...` have a scheme, `example.gov:8080/x` does not.
fn has_explicit_scheme(raw: &str) -> bool {
    if raw.contains("://") {
        return true;
    }
    match raw.split_once(':') {
        Some((scheme, rest)) => {
            !scheme.is_empty()
                && !scheme.contains('.')
                && scheme != "localhost"
                && scheme
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-'))
                && !rest.starts_with(|c: char| c.is_ascii_digit())
        }
        None => false,
    }
}

/// Trimmed URL with `https://` added to bare hostnames; only http(s).
pub fn normalize_url(raw: &str) -> Result<Url, String> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Err("URL must not be empty".to_string());
    }
    let candidate = if has_explicit_scheme(raw) {
        raw.to_string()
    } else {
        format!("https://{raw}")
    };
    let url = Url::parse(&candidate).map_err(|e| format!("Invalid URL: {e}"))?;
    match url.scheme() {
        "http" | "https" => Ok(url),
        other => Err(format!("Unsupported URL scheme '{other}'")),
    }
}

/// Document id from `docs.google.com/.../d/<id>/...`
pub fn google_doc_id(url: &Url) -> Option<String> {
    let host = url.host_str()?.to_lowercase();
    if !host.contains("docs.google.com") {
        return None;
    }
    let parts: Vec<&str> = url.path_segments()?.filter(|p| !p.is_empty()).collect();
    parts
        .windows(2)
        .find(|w| w[0] == "d" && w[1].len() > 8)
        .map(|w| w[1].to_string())
}

/// Opportunity id from `sam.gov/opp/<id>/view`
pub fn sam_opportunity_id(url: &Url) -> Option<String> {
    let host = url.host_str()?.to_lowercase();
    if !host.ends_with("sam.gov") {
        return None;
    }
    let parts: Vec<&str> = url.path_segments()?.filter(|p| !p.is_empty()).collect();
    parts
        .windows(2)
        .find(|w| w[0] == "opp")
        .map(|w| w[1].to_string())
}

/// Readable summary of a SAM.gov opportunity JSON document.
pub fn sam_opportunity_text(data: &Value) -> Option<String> {
    let opp = data
        .get("opportunity")
        .or_else(|| data.get("data"))
        .unwrap_or(data);
    let meta = opp.get("data2").or_else(|| opp.get("data")).unwrap_or(&Value::Null);
    let str_at = |v: &Value, path: &[&str]| -> Option<String> {
        let mut cur = v;
        for key in path {
            cur = cur.get(*key)?;
        }
        cur.as_str()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
    };

    let mut parts: Vec<String> = Vec::new();
    parts.extend(str_at(meta, &["title"]));
    parts.extend(
        str_at(meta, &["solicitationNumber"])
            .or_else(|| str_at(meta, &["solicitation", "solicitationNumber"])),
    );
    if let Some(due) = str_at(meta, &["solicitation", "deadlines", "response"]) {
        parts.push(format!("Response due: {due}"));
        if let Some(tz) = str_at(meta, &["solicitation", "deadlines", "responseTz"]) {
            parts.push(format!("Time zone: {tz}"));
        }
    }

    let place = meta.get("placeOfPerformance").unwrap_or(&Value::Null);
    let location: Vec<String> = [
        str_at(place, &["streetAddress"]),
        str_at(place, &["city", "name"]),
        str_at(place, &["state", "name"]),
        str_at(place, &["zip"]),
    ]
    .into_iter()
    .flatten()
    .collect();
    if !location.is_empty() {
        parts.push(format!("Place of performance: {}", location.join(", ")));
    }

    let description = opp
        .get("description")
        .or_else(|| meta.get("description"))
        .unwrap_or(&Value::Null);
    match description {
        Value::Array(items) => {
            for item in items {
                let body = match item {
                    Value::Object(_) => str_at(item, &["body"]),
                    Value::String(s) => Some(s.trim().to_string()).filter(|s| !s.is_empty()),
                    _ => None,
                };
                parts.extend(body);
            }
        }
        Value::String(s) if !s.trim().is_empty() => parts.push(s.trim().to_string()),
        _ => {}
    }

    if parts.is_empty() {
        None
    } else {
        Some(parts.join("\n\n"))
    }
}

struct Fetched {
    status: u16,
    final_url: String,
    content_type: Option<String>,
    body: Vec<u8>,
    truncated: bool,
}

#[derive(Clone)]
pub struct WebScraper {
    client: Client,
    default_user_agent: String,
}

impl WebScraper {
    pub fn new(default_user_agent: &str) -> Result<Self> {
        let client = Client::builder()
            .redirect(reqwest::redirect::Policy::limited(10))
            .build()
            .context("Failed to create scraper HTTP client")?;
        Ok(Self {
            client,
            default_user_agent: default_user_agent.to_string(),
        })
    }

    async fn read_limited(mut response: Response, max_bytes: usize) -> Result<(Vec<u8>, bool)> {
        let mut body = Vec::new();
        while let Some(chunk) = response.chunk().await? {
            body.extend_from_slice(&chunk);
            if body.len() > max_bytes {
                body.truncate(max_bytes);
                return Ok((body, true));
            }
        }
        Ok((body, false))
    }

    async fn fetch(&self, url: &str, accept: &str, request: &ScrapeRequest) -> Result<Fetched> {
        let user_agent = request
            .user_agent
            .as_deref()
            .unwrap_or(&self.default_user_agent);
        let timeout = Duration::from_secs_f64(request.timeout.clamp(1.0, 60.0));
        let response = self
            .client
            .get(url)
            .header(header::USER_AGENT, user_agent)
            .header(header::ACCEPT, accept)
            .timeout(timeout)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(anyhow!("HTTP {}", status));
        }
        let final_url = response.url().to_string();
        let content_type = response
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let (body, truncated) = Self::read_limited(response, request.max_bytes).await?;
        Ok(Fetched {
            status: status.as_u16(),
            final_url,
            content_type,
            body,
            truncated,
        })
    }

    fn into_result(url: &str, fetched: Fetched, as_html: bool, max_chars: usize) -> ScrapeResult {
        let raw = String::from_utf8_lossy(&fetched.body);
        let is_html = as_html
            || fetched
                .content_type
                .as_deref()
                .is_some_and(|ct| ct.contains("html"));
        let text = if is_html {
            extract_visible_text(&raw)
        } else {
            raw.trim().to_string()
        };
        let (text_excerpt, clipped) = truncate_chars(&text, max_chars);
        ScrapeResult {
            url: url.to_string(),
            final_url: Some(fetched.final_url),
            success: true,
            status_code: Some(fetched.status),
            content_type: fetched.content_type,
            text_excerpt,
            fetched_at: Utc::now(),
            truncated: fetched.truncated || clipped,
            error: fetched.truncated.then(|| TRUNCATED_MESSAGE.to_string()),
        }
    }

    async fn scrape_google_doc(
        &self,
        target: &str,
        doc_id: &str,
        request: &ScrapeRequest,
    ) -> Result<ScrapeResult> {
        let base = format!("https://docs.google.com/document/d/{doc_id}");
        let mut last_error = anyhow!("Google Docs export failed");
        for (export_url, as_html) in [
            (format!("{base}/export?format=txt"), false),
            (format!("{base}/export?format=html"), true),
        ] {
            match self
                .fetch(&export_url, "text/plain, text/html;q=0.9, */*;q=0.8", request)
                .await
            {
                Ok(fetched) if fetched.final_url.contains("accounts.google.com") => {
                    last_error = anyhow!(GOOGLE_AUTH_MESSAGE);
                }
                Ok(fetched) => return Ok(Self::into_result(target, fetched, as_html, request.max_chars)),
                Err(e) => last_error = e,
            }
        }
        Err(last_error)
    }

    async fn scrape_sam(&self, target: &str, opp_id: &str, request: &ScrapeRequest) -> Option<ScrapeResult> {
        for candidate in [
            format!("https://sam.gov/api/prod/opps/v2/opportunities/{opp_id}"),
            format!("https://sam.gov/api/prod/sgs/v1/opportunities/{opp_id}"),
        ] {
            let Ok(fetched) = self.fetch(&candidate, "*/*", request).await else {
                continue;
            };
            let Ok(data) = serde_json::from_slice::<Value>(&fetched.body) else {
                continue;
            };
            if let Some(text) = sam_opportunity_text(&data) {
                let (text_excerpt, clipped) = truncate_chars(&text, request.max_chars);
                return Some(ScrapeResult {
                    url: target.to_string(),
                    final_url: Some(target.to_string()),
                    success: true,
                    status_code: Some(200),
                    content_type: Some("application/json".to_string()),
                    text_excerpt,
                    fetched_at: Utc::now(),
                    truncated: clipped,
                    error: None,
                });
            }
        }
        None
    }

    #[instrument(skip(self, request), fields(url = %request.url))]
    pub async fn scrape(&self, request: &ScrapeRequest) -> ScrapeResult {
        let url = match normalize_url(&request.url) {
            Ok(url) => url,
            Err(e) => return ScrapeResult::failure(&request.url, e),
        };
        let target = url.to_string();

        let mut google_error = None;
        if let Some(doc_id) = google_doc_id(&url) {
            match self.scrape_google_doc(&target, &doc_id, request).await {
                Ok(result) => return result,
                Err(e) => {
                    debug!(error = %e, "Google Docs export unavailable");
                    google_error = Some(e.to_string());
                }
            }
        }

        if let Some(opp_id) = sam_opportunity_id(&url) {
            if let Some(result) = self.scrape_sam(&target, &opp_id, request).await {
                return result;
            }
        }

        match self
            .fetch(
                &target,
                "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8",
                request,
            )
            .await
        {
            Ok(fetched) => Self::into_result(&target, fetched, false, request.max_chars),
            Err(e) => {
                warn!(error = %e, "Scrape failed");
                let message = match google_error {
                    Some(g) => format!("{g} | {e}"),
                    None => e.to_string(),
                };
                ScrapeResult::failure(&target, message)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn test_extract_visible_text_strips_hidden_content() {
        let html = r#"<html><head><style>body { color: red }</style>
            <script type="text/javascript">var x = "<p>";</script></head>
            <body><!-- note --><h1>Statement&nbsp;of Work</h1>
            <p>Scope &amp; schedule&#8230; &#x41;</p><noscript>Enable JS</noscript></body></html>"#;
        assert_eq!(extract_visible_text(html), "Statement of Work Scope & schedule\u{2026} A");
    }

    #[test]
    fn test_unknown_entities_are_kept() {
        assert_eq!(extract_visible_text("a &bogus; b"), "a &bogus; b");
    }

    #[test]
    fn test_normalize_url() {
        assert_eq!(
            normalize_url("  example.gov/rfp ").unwrap().as_str(),
            "https://example.gov/rfp"
        );
        assert!(normalize_url("").is_err());
        assert!(normalize_url("ftp://example.gov/file").is_err());
        assert!(normalize_url("http://").is_err());
        assert!(normalize_url("mailto:pm@agency.gov").is_err());
        assert_eq!(
            normalize_url("localhost:8000/doc").unwrap().as_str(),
            "https://localhost:8000/doc"
        );
    }

    #[test]
    fn test_google_doc_id() {
        let url = Url::parse("https://docs.google.com/document/d/1AbCdEfGhIjKlMnOp/edit").unwrap();
        assert_eq!(google_doc_id(&url).as_deref(), Some("1AbCdEfGhIjKlMnOp"));
        let short = Url::parse("https://docs.google.com/document/d/edit").unwrap();
        assert_eq!(google_doc_id(&short), None);
        let other = Url::parse("https://example.com/d/1AbCdEfGhIjKlMnOp").unwrap();
        assert_eq!(google_doc_id(&other), None);
    }

    #[test]
    fn test_sam_opportunity_id() {
        let url = Url::parse("https://sam.gov/opp/abc123def/view").unwrap();
        assert_eq!(sam_opportunity_id(&url).as_deref(), Some("abc123def"));
        assert_eq!(
            sam_opportunity_id(&Url::parse("https://sam.gov/search").unwrap()),
            None
        );
    }

    #[test]
    fn test_sam_opportunity_text() {
        let data = json!({
            "data2": {
                "title": "Network Refresh",
                "solicitation": {
                    "solicitationNumber": "W91-24-R-0001",
                    "deadlines": {"response": "2024-07-01", "responseTz": "America/New_York"}
                },
                "placeOfPerformance": {"city": {"name": "Norfolk"}, "state": {"name": "Virginia"}}
            },
            "description": [{"body": "Replace core switches."}, "Phase two."]
        });
        let text = sam_opportunity_text(&data).unwrap();
        assert_eq!(
            text,
            "Network Refresh\n\nW91-24-R-0001\n\nResponse due: 2024-07-01\n\nTime zone: America/New_York\n\n\
             Place of performance: Norfolk, Virginia\n\nReplace core switches.\n\nPhase two."
        );
        assert_eq!(sam_opportunity_text(&json!({})), None);
    }

    #[test]
    fn test_truncate_chars() {
        assert_eq!(truncate_chars("abcdef", 4), ("abcd".to_string(), true));
        assert_eq!(truncate_chars("abc", 4), ("abc".to_string(), false));
        assert_eq!(truncate_chars("abc", 0), ("abc".to_string(), false));
    }

    #[tokio::test]
    async fn test_invalid_url_is_unsuccessful_result() {
        let scraper = WebScraper::new("test-agent").unwrap();
        let result = scraper.scrape(&ScrapeRequest::new("mailto:someone@example.gov")).await;
        assert!(!result.success);
        assert!(result.error.unwrap().contains("Unsupported URL scheme"));
    }
}
