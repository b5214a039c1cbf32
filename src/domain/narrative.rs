//! AI narrative domain types
//!
//! Request and response DTOs for narrative sections, SOP-style subtasks and
//! generated proposal lists.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::estimation::{EstimationInput, EstimationResult, InputSummary};

pub const DEFAULT_SECTIONS: [&str; 4] = [
    "executive_summary",
    "assumptions",
    "risks",
    "recommendations",
];

pub fn default_tone() -> String {
    "professional".to_string()
}

/// Where generated text came from
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TextSource {
    Ai,
    Cache,
    Template,
}

/// POST /api/v1/narrative body
#[derive(Debug, Clone, Deserialize)]
pub struct NarrativeRequest {
    pub estimation_result: EstimationResult,
    pub input_summary: InputSummary,
    #[serde(default)]
    pub sections: Option<Vec<String>>,
    #[serde(default = "default_tone")]
    pub tone: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NarrativeResponse {
    pub sections: BTreeMap<String, String>,
    pub source: TextSource,
}

/// POST /api/v1/narrative/section body
#[derive(Debug, Clone, Deserialize)]
pub struct SectionRequest {
    pub section: String,
    pub estimation_result: EstimationResult,
    pub input_summary: InputSummary,
    /// Extra guidance appended to the prompt
    #[serde(default)]
    pub prompt: Option<String>,
    #[serde(default = "default_tone")]
    pub tone: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SectionResponse {
    pub section: String,
    pub text: String,
    pub source: TextSource,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Subtask {
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub hours: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModuleSubtasks {
    pub module_id: String,
    pub module_name: String,
    pub hours: f64,
    pub subtasks: Vec<Subtask>,
    pub source: TextSource,
}

/// POST /api/v1/subtasks/preview body
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubtasksPreviewRequest {
    #[serde(flatten)]
    pub input: EstimationInput,
    #[serde(default)]
    pub project_name: Option<String>,
    #[serde(default = "default_tone")]
    pub tone: String,
    /// Ask the model; otherwise the deterministic template is used
    #[serde(default = "default_use_ai")]
    pub use_ai: bool,
}

fn default_use_ai() -> bool {
    true
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubtasksPreviewResponse {
    pub modules: Vec<ModuleSubtasks>,
    pub total_hours: f64,
}

/// Kind of generated proposal list
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ListKind {
    Assumptions,
    Comments,
    SecurityProtocols,
    ComplianceFrameworks,
}

impl ListKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Assumptions => "assumptions",
            Self::Comments => "comments",
            Self::SecurityProtocols => "security_protocols",
            Self::ComplianceFrameworks => "compliance_frameworks",
        }
    }

    pub fn describe(&self) -> &'static str {
        match self {
            Self::Assumptions => "estimating and delivery assumptions",
            Self::Comments => "reviewer comments and clarification questions",
            Self::SecurityProtocols => "security protocols and controls",
            Self::ComplianceFrameworks => "applicable compliance frameworks",
        }
    }
}

impl std::fmt::Display for ListKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// POST /api/v1/{assumptions,comments,...}/generate body
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ListGenerationRequest {
    /// Scraped RFP or statement-of-work text
    #[serde(default)]
    pub rfp_text: Option<String>,
    #[serde(default)]
    pub modules: Vec<String>,
    #[serde(default)]
    pub project_name: Option<String>,
    #[serde(default)]
    pub max_items: Option<usize>,
}

impl ListGenerationRequest {
    pub const DEFAULT_MAX_ITEMS: usize = 8;

    pub fn max_items(&self) -> usize {
        self.max_items.unwrap_or(Self::DEFAULT_MAX_ITEMS).clamp(1, 25)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListGenerationResponse {
    pub kind: ListKind,
    pub items: Vec<String>,
    pub source: TextSource,
}
