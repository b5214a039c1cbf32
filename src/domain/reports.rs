//! Report request and stored-report metadata types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

use super::estimation::EstimationInput;
use super::narrative::default_tone;

pub const PDF_CONTENT_TYPE: &str = "application/pdf";

/// POST /api/v1/report body
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportRequest {
    #[serde(flatten)]
    pub input: EstimationInput,
    #[serde(default)]
    pub project_name: Option<String>,
    /// Pre-written narrative; skips generation when present
    #[serde(default)]
    pub narrative: Option<BTreeMap<String, String>>,
    #[serde(default)]
    pub include_ai: bool,
    #[serde(default = "default_tone")]
    pub tone: String,
    #[serde(default)]
    pub include_subtasks: bool,
    #[serde(default)]
    pub proposal_id: Option<String>,
    #[serde(default)]
    pub proposal_version: Option<i32>,
    #[serde(default)]
    pub period_of_performance: Option<String>,
    #[serde(default)]
    pub estimating_method: Option<String>,
    #[serde(default)]
    pub report_label: Option<String>,
}

/// Query overrides on POST /api/v1/report
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ReportQuery {
    #[serde(default)]
    pub include_ai: Option<bool>,
    #[serde(default)]
    pub tone: Option<String>,
}

impl ReportRequest {
    pub fn apply_query(&mut self, query: ReportQuery) {
        if let Some(include_ai) = query.include_ai {
            self.include_ai = include_ai;
        }
        if let Some(tone) = query.tone.filter(|t| !t.trim().is_empty()) {
            self.tone = tone;
        }
    }

    pub fn filename(&self) -> String {
        let stem: String = self
            .project_name
            .as_deref()
            .unwrap_or("estimate")
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() { c.to_ascii_lowercase() } else { '_' })
            .collect();
        let stem = stem.trim_matches('_');
        let stem = if stem.is_empty() { "estimate" } else { stem };
        format!("{}_{}.pdf", stem, Utc::now().format("%Y%m%d"))
    }
}

/// Metadata for a PDF kept in object storage
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ReportRecord {
    pub owner_email: String,
    pub report_id: String,
    pub filename: String,
    pub content_type: String,
    pub bucket: String,
    pub key: String,
    pub size_bytes: i64,
    pub created_by: String,
    pub tool_version: Option<String>,
    pub proposal_id: Option<String>,
    pub proposal_title: Option<String>,
    pub proposal_public_id: Option<String>,
    pub proposal_version: Option<i32>,
    pub total_cost: Option<f64>,
    pub total_hours: Option<f64>,
    pub module_count: Option<usize>,
    pub complexity: Option<String>,
    pub period_of_performance: Option<String>,
    pub estimating_method: Option<String>,
    pub tone: Option<String>,
    pub include_ai: bool,
    pub report_label: Option<String>,
    /// Original request, for regenerating the report
    #[serde(default)]
    pub payload: Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// API listing row
#[derive(Debug, Clone, Serialize)]
pub struct ReportView {
    pub id: String,
    pub filename: String,
    pub report_label: Option<String>,
    pub content_type: String,
    pub size_bytes: i64,
    pub created_by: String,
    pub tool_version: Option<String>,
    pub proposal_id: Option<String>,
    pub proposal_title: Option<String>,
    pub proposal_version: Option<i32>,
    pub total_cost: Option<f64>,
    pub total_hours: Option<f64>,
    pub module_count: Option<usize>,
    pub complexity: Option<String>,
    pub tone: Option<String>,
    pub include_ai: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

impl ReportView {
    pub fn new(record: &ReportRecord, url: Option<String>) -> Self {
        Self {
            id: record.report_id.clone(),
            filename: record.filename.clone(),
            report_label: record.report_label.clone(),
            content_type: record.content_type.clone(),
            size_bytes: record.size_bytes,
            created_by: record.created_by.clone(),
            tool_version: record.tool_version.clone(),
            proposal_id: record.proposal_id.clone(),
            proposal_title: record.proposal_title.clone(),
            proposal_version: record.proposal_version,
            total_cost: record.total_cost,
            total_hours: record.total_hours,
            module_count: record.module_count,
            complexity: record.complexity.clone(),
            tone: record.tone.clone(),
            include_ai: record.include_ai,
            created_at: record.created_at,
            updated_at: record.updated_at,
            url,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ReportListQuery {
    #[serde(default)]
    pub proposal_id: Option<String>,
    #[serde(default)]
    pub limit: Option<usize>,
}

impl ReportListQuery {
    pub fn limit(&self) -> usize {
        self.limit.unwrap_or(500).clamp(1, 500)
    }
}

/// Result payload of a finished report job
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportJobResult {
    pub filename: String,
    pub size_bytes: usize,
    pub total_cost: f64,
    pub total_hours: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub report_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    /// Inline PDF when no object storage is configured
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pdf_base64: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_request_flattens_estimation_input() {
        let req: ReportRequest = serde_json::from_value(json!({
            "modules": ["dt_discovery"],
            "complexity": "L",
            "project_name": "Cloud Move",
            "include_ai": true
        }))
        .unwrap();
        assert_eq!(req.input.modules, vec!["dt_discovery".to_string()]);
        assert_eq!(req.tone, "professional");
        assert!(req.include_ai);
        assert!(req.filename().starts_with("cloud_move_"));
    }

    #[test]
    fn test_query_overrides_body() {
        let mut req: ReportRequest =
            serde_json::from_value(json!({"modules": ["sa_audit"], "complexity": "M", "include_ai": true})).unwrap();
        req.apply_query(ReportQuery {
            include_ai: Some(false),
            tone: Some("concise".to_string()),
        });
        assert!(!req.include_ai);
        assert_eq!(req.tone, "concise");
    }
}
