//! SAM.gov opportunities API client and record normalization.

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime, TimeZone, Utc};
use reqwest::Client;
use rust_decimal::Decimal;
use serde_json::Value;
use std::str::FromStr;
use std::time::Duration as StdDuration;
use tracing::{debug, instrument};

use crate::config::Settings;
use crate::domain::contracts::{excerpt, NewContract, SAM_SOURCE};

/// Largest page the search endpoint accepts
pub const MAX_PAGE_SIZE: u32 = 1000;

/// Widest `postedFrom` window a sync may ask for
pub const MAX_DAYS_BACK: u32 = 365;

/// Anything that can return raw opportunity records.
#[async_trait]
pub trait OpportunitySource: Send + Sync {
    async fn search(
        &self,
        query: Option<&str>,
        days_back: u32,
        limit: u32,
        offset: u32,
    ) -> Result<Vec<Value>>;
}

#[derive(Clone)]
pub struct SamClient {
    client: Client,
    api_key: String,
    base_url: String,
}

impl SamClient {
    /// None when no API key is configured.
    pub fn from_settings(settings: &Settings) -> Result<Option<Self>> {
        let Some(api_key) = settings.sam_api_key.clone() else {
            return Ok(None);
        };
        let client = Client::builder()
            .timeout(StdDuration::from_secs(20))
            .user_agent(settings.scraper_user_agent.clone())
            .build()
            .context("Failed to create SAM.gov HTTP client")?;
        Ok(Some(Self {
            client,
            api_key,
            base_url: settings.sam_base_url.trim_end_matches('/').to_string(),
        }))
    }
}

/// `postedFrom` / `postedTo` window ending now
fn posted_window(now: DateTime<Utc>, days_back: u32) -> (String, String) {
    let from = now - Duration::days(i64::from(days_back.clamp(1, MAX_DAYS_BACK)));
    (
        from.format("%m/%d/%Y").to_string(),
        now.format("%m/%d/%Y").to_string(),
    )
}

#[async_trait]
impl OpportunitySource for SamClient {
    #[instrument(skip(self))]
    async fn search(
        &self,
        query: Option<&str>,
        days_back: u32,
        limit: u32,
        offset: u32,
    ) -> Result<Vec<Value>> {
        let (posted_from, posted_to) = posted_window(Utc::now(), days_back);
        let mut params: Vec<(&str, String)> = vec![
            ("api_key", self.api_key.clone()),
            ("limit", limit.clamp(1, MAX_PAGE_SIZE).to_string()),
            ("offset", offset.to_string()),
            ("postedFrom", posted_from),
            ("postedTo", posted_to),
        ];
        if let Some(q) = query.map(str::trim).filter(|q| !q.is_empty()) {
            params.push(("q", q.to_string()));
        }

        let response = self
            .client
            .get(format!("{}/opportunities/v2/search", self.base_url))
            .header("Accept", "application/json")
            .query(&params)
            .send()
            .await
            .context("SAM.gov request failed")?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let snippet: String = body.chars().take(300).collect();
            return Err(anyhow!("SAM.gov returned {}: {}", status, snippet));
        }

        let payload: Value = response
            .json()
            .await
            .context("SAM.gov returned invalid JSON")?;
        let records = extract_results(&payload);
        debug!(count = records.len(), "Fetched SAM.gov opportunities");
        Ok(records)
    }
}

/// First record list among the envelope keys the API has used.
pub fn extract_results(payload: &Value) -> Vec<Value> {
    ["opportunitiesData", "opportunities", "data", "results"]
        .iter()
        .find_map(|key| payload.get(*key).and_then(Value::as_array))
        .cloned()
        .unwrap_or_default()
}

/// RFC 3339, ISO local date-times, `MM/DD/YYYY` or `YYYY-MM-DD`, as UTC.
pub fn parse_datetime(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    for fmt in ["%Y-%m-%d %H:%M:%S%.f%:z", "%Y-%m-%dT%H:%M:%S%.f%z", "%Y-%m-%d %H:%M:%S%.f%z"] {
        if let Ok(dt) = DateTime::parse_from_str(raw, fmt) {
            return Some(dt.with_timezone(&Utc));
        }
    }
    for fmt in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(raw, fmt) {
            return Some(Utc.from_utc_datetime(&naive));
        }
    }
    for fmt in ["%m/%d/%Y", "%Y-%m-%d"] {
        if let Ok(date) = NaiveDate::parse_from_str(raw, fmt) {
            return date.and_hms_opt(0, 0, 0).map(|n| Utc.from_utc_datetime(&n));
        }
    }
    None
}

fn stringify(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.trim().to_string()).filter(|s| !s.is_empty()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        other => Some(other.to_string()),
    }
}

fn first_value<'a>(payload: &'a Value, keys: &[&str]) -> Option<&'a Value> {
    keys.iter().find_map(|key| {
        payload.get(*key).filter(|v| match v {
            Value::Null => false,
            Value::String(s) => !s.trim().is_empty(),
            _ => true,
        })
    })
}

fn first_string(payload: &Value, keys: &[&str]) -> Option<String> {
    first_value(payload, keys).and_then(stringify)
}

/// Place of performance as a single line.
fn normalize_location(payload: &Value) -> Option<String> {
    let place = first_value(payload, &["placeOfPerformance", "placeOfPerformanceCity"])?;
    match place {
        Value::String(s) => Some(s.trim().to_string()).filter(|s| !s.is_empty()),
        Value::Object(obj) => {
            let parts: Vec<String> = ["streetAddress", "street", "cityName", "city", "state", "zip", "country"]
                .iter()
                .filter_map(|key| {
                    let value = obj.get(*key)?;
                    let value = match value {
                        Value::Object(inner) => inner.get("name").or_else(|| inner.get("code"))?,
                        other => other,
                    };
                    stringify(value)
                })
                .collect();
            if parts.is_empty() {
                None
            } else {
                Some(parts.join(", "))
            }
        }
        _ => None,
    }
}

/// Dollar figure from strings like `$1,250,000.00`
pub fn parse_amount(raw: &str) -> Option<Decimal> {
    let cleaned: String = raw
        .chars()
        .filter(|c| c.is_ascii_digit() || matches!(c, '.' | '-'))
        .collect();
    if cleaned.is_empty() {
        return None;
    }
    Decimal::from_str(&cleaned).ok()
}

/// Map a raw SAM.gov record onto contract fields.
pub fn normalize_record(payload: &Value) -> NewContract {
    let value = first_string(payload, &["baseAndAllOptionsValue", "estimatedValue", "awardValue"]);
    let synopsis = first_string(payload, &["description", "synopsis", "summary"]);
    let date = |keys: &[&str]| first_string(payload, keys).as_deref().and_then(parse_datetime);

    NewContract {
        source: Some(SAM_SOURCE.to_string()),
        source_id: first_string(payload, &["noticeId", "id", "opportunityId", "oppId"]),
        title: first_string(payload, &["title", "solicitationTitle", "noticeTitle"]),
        agency: first_string(payload, &["department", "agency", "agencyName", "organization"]),
        sub_agency: first_string(payload, &["subTier", "subAgency"]),
        office: first_string(payload, &["office", "officeName"]),
        naics: first_string(payload, &["naicsCode", "naics"]),
        psc: first_string(payload, &["pscCode", "psc"]),
        set_aside: first_string(payload, &["typeOfSetAside", "setAside", "setAsideType"]),
        posted_at: date(&["postedDate", "postDate", "publishDate"]),
        due_at: date(&["responseDeadLine", "responseDate", "dueDate"]),
        estimated_value: value.as_deref().and_then(parse_amount),
        value,
        location: normalize_location(payload),
        url: first_string(payload, &["uiLink", "link", "opportunityUrl", "url"]),
        contract_excerpt: synopsis.as_deref().map(excerpt),
        synopsis,
        raw_payload: Some(payload.clone()),
        ..Default::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn test_extract_results_envelopes() {
        assert_eq!(extract_results(&json!({"opportunitiesData": [{"a": 1}]})).len(), 1);
        assert_eq!(extract_results(&json!({"data": [{}, {}]})).len(), 2);
        assert!(extract_results(&json!({"totalRecords": 0})).is_empty());
        // a non-list value under an earlier key is skipped
        assert_eq!(extract_results(&json!({"opportunities": {}, "results": [1]})).len(), 1);
    }

    #[test]
    fn test_parse_datetime_formats() {
        let expected = Utc.with_ymd_and_hms(2024, 6, 15, 21, 0, 0).unwrap();
        assert_eq!(parse_datetime("2024-06-15T17:00:00-04:00"), Some(expected));
        assert_eq!(parse_datetime("2024-06-15T21:00:00Z"), Some(expected));
        assert_eq!(parse_datetime("2024-06-15 21:00:00"), Some(expected));

        let midnight = Utc.with_ymd_and_hms(2024, 6, 15, 0, 0, 0).unwrap();
        assert_eq!(parse_datetime("06/15/2024"), Some(midnight));
        assert_eq!(parse_datetime("2024-06-15"), Some(midnight));
        assert_eq!(parse_datetime("next week"), None);
        assert_eq!(parse_datetime("  "), None);
    }

    #[test]
    fn test_normalize_record_alternate_fields() {
        let record = json!({
            "noticeId": "abc123",
            "solicitationTitle": "Cloud Migration Support",
            "department": "DEPT OF DEFENSE",
            "subTier": "DISA",
            "naicsCode": 541512,
            "typeOfSetAside": "",
            "setAside": "SBA",
            "postedDate": "2024-06-01",
            "responseDeadLine": "2024-07-01T12:00:00-04:00",
            "baseAndAllOptionsValue": "$1,250,000.00",
            "placeOfPerformance": {
                "city": {"code": "123", "name": "Arlington"},
                "state": {"code": "VA"},
                "country": {"code": "USA", "name": "UNITED STATES"}
            },
            "uiLink": "https://sam.gov/opp/abc123/view",
            "description": "x".repeat(5000)
        });

        let c = normalize_record(&record);
        assert_eq!(c.source.as_deref(), Some(SAM_SOURCE));
        assert_eq!(c.source_id.as_deref(), Some("abc123"));
        assert_eq!(c.title.as_deref(), Some("Cloud Migration Support"));
        assert_eq!(c.sub_agency.as_deref(), Some("DISA"));
        assert_eq!(c.naics.as_deref(), Some("541512"));
        assert_eq!(c.set_aside.as_deref(), Some("SBA"));
        assert_eq!(c.location.as_deref(), Some("Arlington, VA, UNITED STATES"));
        assert_eq!(c.estimated_value, Some(Decimal::new(125000000, 2)));
        assert_eq!(c.due_at, Some(Utc.with_ymd_and_hms(2024, 7, 1, 16, 0, 0).unwrap()));
        assert_eq!(c.contract_excerpt.map(|e| e.chars().count()), Some(4000));
        assert_eq!(c.synopsis.map(|s| s.len()), Some(5000));
        assert!(c.raw_payload.is_some());
    }

    #[test]
    fn test_normalize_location_fallbacks() {
        let plain = normalize_record(&json!({"placeOfPerformance": "Remote"}));
        assert_eq!(plain.location.as_deref(), Some("Remote"));

        let city = normalize_record(&json!({"placeOfPerformanceCity": "Denver"}));
        assert_eq!(city.location.as_deref(), Some("Denver"));

        let none = normalize_record(&json!({"placeOfPerformance": {}}));
        assert_eq!(none.location, None);
    }

    #[test]
    fn test_posted_window_format() {
        let now = Utc.with_ymd_and_hms(2024, 3, 10, 8, 0, 0).unwrap();
        assert_eq!(
            posted_window(now, 7),
            ("03/03/2024".to_string(), "03/10/2024".to_string())
        );
        assert_eq!(posted_window(now, 0).0, "03/09/2024");
        assert_eq!(posted_window(now, u32::MAX).0, "03/11/2023");
    }
}
