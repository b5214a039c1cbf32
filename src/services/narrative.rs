//! Proposal narrative generation.
//!
//! Every operation asks the LLM first and falls back to deterministic text
//! built from the estimate when the model is unconfigured, fails or returns
//! something unusable. Successful model output is cached in Redis when a
//! cache is available.

use futures::future::join_all;
use serde::Serialize;
use serde_json::Value;
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use tracing::{debug, instrument, warn};

use super::ai_client::{strip_json_fences, LlmClient, LlmError};
use super::cache::{keys, RedisCache};
use super::catalog::Catalog;
use super::export::format_currency;
use crate::domain::catalog::FocusArea;
use crate::domain::estimation::{EstimationInput, EstimationResult, InputSummary, ModuleBreakdown};
use crate::domain::narrative::{
    ListGenerationRequest, ListGenerationResponse, ListKind, ModuleSubtasks, NarrativeResponse,
    SectionResponse, Subtask, SubtasksPreviewResponse, TextSource, DEFAULT_SECTIONS,
};
use crate::error::{ApiError, ApiResult};

const NARRATIVE_SYSTEM: &str = "You are an engagement manager at a federal IT contractor. \
     Write concise, client-ready narrative for a cost estimate. Use only the figures provided.";

const SUBTASK_SYSTEM: &str = "You break government IT work packages into SOP-style subtasks \
     for proposal volumes. Reply with JSON only.";

const LIST_SYSTEM: &str = "You support federal proposal teams by drafting short, specific \
     bullet items grounded in the solicitation text. Reply with JSON only.";

/// Maximum characters of RFP text sent to the model
const MAX_RFP_CHARS: usize = 6000;

#[derive(Debug, Serialize)]
struct ContextSummary {
    total_labor_hours: f64,
    total_labor_cost: f64,
    risk_reserve: f64,
    overhead_cost: f64,
    management_reserve: f64,
    total_cost: f64,
    effective_hourly_rate: f64,
    complexity: String,
    module_count: usize,
}

#[derive(Debug, Serialize)]
struct ContextModule {
    name: String,
    focus_area: FocusArea,
    hours: f64,
    cost: f64,
}

#[derive(Debug, Serialize)]
struct ContextRole {
    role: String,
    hours: f64,
    rate: f64,
    cost: f64,
}

/// Compact view of an estimate given to the model and the offline templates.
#[derive(Debug, Serialize)]
struct NarrativeContext {
    summary: ContextSummary,
    modules: Vec<ContextModule>,
    /// Largest share of hours first
    roles: Vec<ContextRole>,
}

fn round_to(value: f64, places: i32) -> f64 {
    let factor = 10f64.powi(places);
    (value * factor).round() / factor
}

impl NarrativeContext {
    fn new(result: &EstimationResult, summary: &InputSummary) -> Self {
        let mut roles: Vec<ContextRole> = result
            .breakdown_by_role
            .values()
            .map(|r| ContextRole {
                role: r.role_name.clone(),
                hours: round_to(r.hours, 1),
                rate: round_to(r.effective_rate, 2),
                cost: round_to(r.cost, 2),
            })
            .collect();
        roles.sort_by(|a, b| b.hours.total_cmp(&a.hours));

        Self {
            summary: ContextSummary {
                total_labor_hours: round_to(result.total_labor_hours, 2),
                total_labor_cost: round_to(result.total_labor_cost, 2),
                risk_reserve: round_to(result.risk_reserve, 2),
                overhead_cost: round_to(result.overhead_cost, 2),
                management_reserve: round_to(result.management_reserve, 2),
                total_cost: round_to(result.total_cost, 2),
                effective_hourly_rate: round_to(result.effective_hourly_rate, 2),
                complexity: summary.complexity.code().to_string(),
                module_count: summary.module_count,
            },
            modules: result
                .breakdown_by_module
                .values()
                .map(|m| ContextModule {
                    name: m.module_name.clone(),
                    focus_area: m.focus_area,
                    hours: round_to(m.hours, 1),
                    cost: round_to(m.cost, 2),
                })
                .collect(),
            roles,
        }
    }

    fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }
}

/// Deterministic text for the known narrative sections.
fn offline_narrative(ctx: &NarrativeContext, sections: &[String]) -> NarrativeResponse {
    NarrativeResponse {
        sections: sections
            .iter()
            .filter_map(|s| offline_section(s, ctx).map(|t| (s.clone(), t)))
            .collect(),
        source: TextSource::Template,
    }
}

fn offline_section(section: &str, ctx: &NarrativeContext) -> Option<String> {
    let s = &ctx.summary;
    let module_count = if s.module_count > 0 {
        s.module_count
    } else {
        ctx.modules.len()
    };
    let noun = if module_count == 1 { "module" } else { "modules" };

    let text = match section {
        "executive_summary" => {
            let mut text = format!(
                "This estimate covers {} {} at {} complexity. Projected effort is about {:.0} labor hours \
                 for a total of {}. That total carries a risk reserve of {} and overhead of {}.",
                module_count,
                noun,
                s.complexity,
                s.total_labor_hours,
                format_currency(s.total_cost),
                format_currency(s.risk_reserve),
                format_currency(s.overhead_cost),
            );
            if s.management_reserve > 0.0 {
                text.push_str(&format!(
                    " A management reserve of {} is held against the contract value.",
                    format_currency(s.management_reserve)
                ));
            }
            text.push_str(&format!(
                " The blended rate works out to {} per hour.",
                format_currency(s.effective_hourly_rate)
            ));
            text
        }
        "assumptions" => {
            let top: Vec<&str> = ctx.roles.iter().take(3).map(|r| r.role.as_str()).collect();
            let staffing = if top.is_empty() {
                "a multi-disciplinary team".to_string()
            } else {
                top.join(", ")
            };
            format!(
                "Staffing follows a conventional labor mix led by {}. Modules are sequenced so that \
                 prerequisites complete before dependent work begins. Government stakeholders are \
                 available for reviews and decisions on the proposed schedule.",
                staffing
            )
        }
        "risks" => {
            let names: Vec<&str> = ctx.modules.iter().map(|m| m.name.as_str()).collect();
            let modules = if names.is_empty() {
                "the selected modules".to_string()
            } else {
                names.join(", ")
            };
            format!(
                "Scope growth and unknown integration points could push effort past the {:.0} hour \
                 baseline. Dependencies between {} may constrain sequencing. The risk reserve of {} \
                 absorbs ordinary variance.",
                s.total_labor_hours,
                modules,
                format_currency(s.risk_reserve)
            )
        }
        "recommendations" => "Open with a short planning sprint to confirm scope and interfaces. \
             Deliver incrementally so early value lands while complex integrations are de-risked. \
             Revisit staffing at each milestone to protect the schedule."
            .to_string(),
        _ => return None,
    };
    Some(text)
}

fn value_to_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.trim().to_string(),
        other => other.to_string(),
    }
}

/// Parse model output into section text.
///
/// A JSON object maps keys to sections; anything else lands in the first
/// requested section.
pub fn coerce_sections(raw: &str, sections: &[String]) -> BTreeMap<String, String> {
    let body = strip_json_fences(raw);
    if let Ok(Value::Object(map)) = serde_json::from_str::<Value>(body) {
        let parsed: BTreeMap<String, String> = map
            .iter()
            .map(|(k, v)| (k.clone(), value_to_text(v)))
            .filter(|(_, v)| !v.is_empty())
            .collect();
        if !parsed.is_empty() {
            return parsed;
        }
    }

    let first = sections
        .first()
        .cloned()
        .unwrap_or_else(|| DEFAULT_SECTIONS[0].to_string());
    BTreeMap::from([(first, raw.trim().to_string())])
}

/// Text of a bullet or numbered line without its marker.
fn strip_bullet(line: &str) -> Option<&str> {
    let line = line.trim();
    if let Some(rest) = line.strip_prefix(|c: char| matches!(c, '-' | '*' | '•')) {
        return Some(rest.trim()).filter(|s| !s.is_empty());
    }
    let rest = line.trim_start_matches(|c: char| c.is_ascii_digit());
    if rest.len() < line.len() {
        if let Some(rest) = rest.strip_prefix(|c: char| matches!(c, '.' | ')')) {
            return Some(rest.trim()).filter(|s| !s.is_empty());
        }
    }
    None
}

fn subtask_from_value(value: &Value) -> Option<Subtask> {
    match value {
        Value::String(s) => subtask_from_line(s),
        Value::Object(obj) => {
            let text = |keys: &[&str]| {
                keys.iter()
                    .find_map(|k| obj.get(*k).and_then(Value::as_str))
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty())
            };
            let title = text(&["title", "name", "task"])?;
            let hours = obj
                .get("hours")
                .and_then(|h| h.as_f64().or_else(|| h.as_str().and_then(|s| s.parse().ok())))
                .unwrap_or(0.0)
                .max(0.0);
            Some(Subtask {
                title,
                description: text(&["description", "details", "summary"]).unwrap_or_default(),
                hours,
                role: text(&["role", "owner"]),
            })
        }
        _ => None,
    }
}

fn subtask_from_line(line: &str) -> Option<Subtask> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }
    let (title, description) = match line.split_once(':') {
        Some((t, d)) if !t.trim().is_empty() => (t.trim(), d.trim()),
        _ => (line, ""),
    };
    Some(Subtask {
        title: title.to_string(),
        description: description.to_string(),
        hours: 0.0,
        role: None,
    })
}

/// Parse `{"subtasks": [...]}`, a bare array or bullet lines.
pub fn coerce_subtasks(raw: &str) -> Vec<Subtask> {
    let body = strip_json_fences(raw);
    if let Ok(value) = serde_json::from_str::<Value>(body) {
        let items = match &value {
            Value::Array(items) => Some(items),
            Value::Object(obj) => obj
                .get("subtasks")
                .or_else(|| obj.get("tasks"))
                .and_then(Value::as_array),
            _ => None,
        };
        if let Some(items) = items {
            return items.iter().filter_map(subtask_from_value).collect();
        }
    }

    raw.lines()
        .filter_map(strip_bullet)
        .filter_map(subtask_from_line)
        .collect()
}

/// Parse `{"items": [...]}`, a bare array or bullet lines into list items.
pub fn coerce_list(raw: &str, kind: ListKind) -> Vec<String> {
    let body = strip_json_fences(raw);
    if let Ok(value) = serde_json::from_str::<Value>(body) {
        let items = match &value {
            Value::Array(items) => Some(items),
            Value::Object(obj) => obj
                .get("items")
                .or_else(|| obj.get(kind.as_str()))
                .and_then(Value::as_array),
            _ => None,
        };
        if let Some(items) = items {
            return items
                .iter()
                .filter_map(|item| match item {
                    Value::String(s) => Some(s.trim().to_string()),
                    Value::Object(obj) => ["text", "item", "title", "name"]
                        .iter()
                        .find_map(|k| obj.get(*k).and_then(Value::as_str))
                        .map(|s| s.trim().to_string()),
                    _ => None,
                })
                .filter(|s| !s.is_empty())
                .collect();
        }
    }

    let bullets: Vec<String> = raw
        .lines()
        .filter_map(strip_bullet)
        .map(str::to_string)
        .collect();
    if !bullets.is_empty() {
        return bullets;
    }
    raw.lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .map(str::to_string)
        .collect()
}

/// Hours rescaled so subtasks add up to the module total.
fn balance_hours(mut subtasks: Vec<Subtask>, module_hours: f64) -> Vec<Subtask> {
    if subtasks.is_empty() {
        return subtasks;
    }
    let stated: f64 = subtasks.iter().map(|s| s.hours).sum();
    if stated > 0.0 {
        let scale = module_hours / stated;
        for task in &mut subtasks {
            task.hours = round_to(task.hours * scale, 1);
        }
    } else {
        let each = round_to(module_hours / subtasks.len() as f64, 1);
        for task in &mut subtasks {
            task.hours = each;
        }
    }
    subtasks
}

fn focus_items(kind: ListKind, area: FocusArea) -> &'static [&'static str] {
    use FocusArea::*;
    use ListKind::*;
    match (kind, area) {
        (Assumptions, DigitalTransformation) => &[
            "Current business processes are documented or can be captured through stakeholder interviews.",
        ],
        (Assumptions, ItModernization) => &[
            "An accurate inventory of the current infrastructure is available at project start.",
        ],
        (Assumptions, SecurityAssurance) => &[
            "Existing security baselines and authorization artifacts are shared with the team.",
        ],
        (Assumptions, CloudMigration) => &[
            "Target cloud accounts and landing zone approvals are in place before migration waves.",
        ],
        (Assumptions, DataAnalytics) => &[
            "Data owners grant read access to representative source extracts.",
        ],
        (Comments, DigitalTransformation) => &[
            "Confirm which business units are in scope for the transformation roadmap.",
        ],
        (Comments, ItModernization) => &[
            "Request the current hardware and software inventory to validate sizing.",
        ],
        (Comments, SecurityAssurance) => &[
            "Confirm the system impact level and the authorization boundary.",
        ],
        (Comments, CloudMigration) => &[
            "Confirm the approved cloud service providers and regions.",
        ],
        (Comments, DataAnalytics) => &[
            "Request data volumes and retention requirements for pipeline sizing.",
        ],
        (SecurityProtocols, DigitalTransformation) => &[
            "Security review gates are built into each delivery increment.",
        ],
        (SecurityProtocols, ItModernization) => &[
            "Configuration baselines and patch management cover all refreshed assets.",
        ],
        (SecurityProtocols, SecurityAssurance) => &[
            "Continuous monitoring with scheduled vulnerability scanning and POA&M tracking.",
        ],
        (SecurityProtocols, CloudMigration) => &[
            "Cloud security posture management across every migrated account.",
        ],
        (SecurityProtocols, DataAnalytics) => &[
            "Encryption at rest with field-level protection for sensitive data.",
        ],
        (ComplianceFrameworks, DigitalTransformation) => &["OMB Circular A-130"],
        (ComplianceFrameworks, ItModernization) => &["NIST SP 800-128 security-focused configuration management"],
        (ComplianceFrameworks, SecurityAssurance) => &["NIST Risk Management Framework (SP 800-37)", "CMMC 2.0"],
        (ComplianceFrameworks, CloudMigration) => &["FedRAMP Moderate", "TIC 3.0"],
        (ComplianceFrameworks, DataAnalytics) => &["Privacy Act of 1974", "Federal Data Strategy"],
    }
}

fn generic_items(kind: ListKind) -> &'static [&'static str] {
    match kind {
        ListKind::Assumptions => &[
            "The government provides timely access to stakeholders, facilities and systems.",
            "Work is performed during standard business hours unless stated otherwise.",
            "Government-furnished equipment and accounts are available at kickoff.",
        ],
        ListKind::Comments => &[
            "Clarify the period of performance and any option periods.",
            "Confirm how technical and price factors are weighted in evaluation.",
        ],
        ListKind::SecurityProtocols => &[
            "Multi-factor authentication for privileged and remote access.",
            "TLS 1.2 or higher for all data in transit.",
            "Role-based access control under least privilege.",
        ],
        ListKind::ComplianceFrameworks => &[
            "FISMA",
            "NIST SP 800-53 Rev. 5",
            "Section 508 accessibility",
        ],
    }
}

/// Items derived from the focus areas of the selected modules, then generic ones.
pub fn fallback_list(kind: ListKind, areas: &[FocusArea], max_items: usize) -> Vec<String> {
    let mut seen = HashSet::new();
    areas
        .iter()
        .flat_map(|area| focus_items(kind, *area).iter())
        .chain(generic_items(kind).iter())
        .filter(|item| seen.insert(**item))
        .take(max_items)
        .map(|item| item.to_string())
        .collect()
}

/// Narrative, subtask and list generation backed by the LLM.
#[derive(Clone)]
pub struct NarrativeService {
    llm: LlmClient,
    cache: Option<RedisCache>,
    catalog: Arc<Catalog>,
}

impl NarrativeService {
    pub fn new(llm: LlmClient, cache: Option<RedisCache>, catalog: Arc<Catalog>) -> Self {
        Self {
            llm,
            cache,
            catalog,
        }
    }

    pub fn ai_configured(&self) -> bool {
        self.llm.is_configured()
    }

    /// Model text for a prompt, served from the cache when present.
    async fn ask(
        &self,
        kind: &str,
        system: &str,
        prompt: &str,
        temperature: f32,
    ) -> Result<(String, TextSource), LlmError> {
        if !self.llm.is_configured() {
            return Err(LlmError::NotConfigured);
        }
        let key = keys::ai(kind, &[self.llm.model(), system, prompt]);
        if let Some(cache) = &self.cache {
            if let Some(text) = cache.get::<String>(&key).await {
                return Ok((text, TextSource::Cache));
            }
        }

        let text = self.llm.complete(system, prompt, temperature).await?;

        if let Some(cache) = &self.cache {
            if let Err(e) = cache.set(&key, &text).await {
                warn!(error = %e, "Failed to cache AI output");
            }
        }
        Ok((text, TextSource::Ai))
    }

    #[instrument(skip(self, result, summary))]
    pub async fn generate_narrative(
        &self,
        result: &EstimationResult,
        summary: &InputSummary,
        sections: Option<&[String]>,
        tone: &str,
    ) -> NarrativeResponse {
        let sections: Vec<String> = match sections {
            Some(s) if !s.is_empty() => s.to_vec(),
            _ => DEFAULT_SECTIONS.iter().map(|s| s.to_string()).collect(),
        };
        let ctx = NarrativeContext::new(result, summary);
        let prompt = format!(
            "Write these sections as short paragraphs of 3 to 6 sentences.\n\
             Tone: {tone}.\n\
             Sections: {}.\n\
             Return a JSON object whose keys are exactly the section names.\n\
             Estimate context as JSON:\n{}",
            sections.join(", "),
            ctx.to_json()
        );

        match self.ask("narrative", NARRATIVE_SYSTEM, &prompt, 0.5).await {
            Ok((raw, source)) => NarrativeResponse {
                sections: coerce_sections(&raw, &sections),
                source,
            },
            Err(e) => {
                if !matches!(e, LlmError::NotConfigured) {
                    warn!(error = %e, "Narrative generation failed, using offline text");
                }
                offline_narrative(&ctx, &sections)
            }
        }
    }

    /// Deterministic narrative for the default sections, no model call.
    pub fn template_narrative(
        &self,
        result: &EstimationResult,
        summary: &InputSummary,
    ) -> NarrativeResponse {
        let sections: Vec<String> = DEFAULT_SECTIONS.iter().map(|s| s.to_string()).collect();
        offline_narrative(&NarrativeContext::new(result, summary), &sections)
    }

    #[instrument(skip(self, result, summary, extra))]
    pub async fn generate_section(
        &self,
        section: &str,
        result: &EstimationResult,
        summary: &InputSummary,
        extra: Option<&str>,
        tone: &str,
    ) -> ApiResult<SectionResponse> {
        let section = section.trim();
        if section.is_empty() {
            return Err(ApiError::bad_request("section is required"));
        }
        let ctx = NarrativeContext::new(result, summary);
        let mut prompt = format!(
            "Write the \"{section}\" section of an estimate narrative as plain text, \
             one to three short paragraphs, no headings.\nTone: {tone}.\n"
        );
        if let Some(extra) = extra.map(str::trim).filter(|e| !e.is_empty()) {
            prompt.push_str(&format!("Additional guidance: {extra}\n"));
        }
        prompt.push_str("Estimate context as JSON:\n");
        prompt.push_str(&ctx.to_json());

        match self.ask("section", NARRATIVE_SYSTEM, &prompt, 0.5).await {
            Ok((text, source)) => Ok(SectionResponse {
                section: section.to_string(),
                text: strip_json_fences(&text).to_string(),
                source,
            }),
            Err(e) => {
                if !matches!(e, LlmError::NotConfigured) {
                    warn!(error = %e, section, "Section generation failed, using offline text");
                }
                let text = offline_section(section, &ctx).ok_or_else(|| {
                    ApiError::bad_request(format!(
                        "AI is unavailable and no offline text exists for section '{section}'"
                    ))
                })?;
                Ok(SectionResponse {
                    section: section.to_string(),
                    text,
                    source: TextSource::Template,
                })
            }
        }
    }

    fn role_name(&self, role_id: &str) -> String {
        self.catalog
            .get_role(role_id)
            .map(|r| r.name.clone())
            .unwrap_or_else(|| role_id.to_string())
    }

    /// Plan / execute / validate split owned by the role with the most hours.
    pub fn template_subtasks(&self, breakdown: &ModuleBreakdown) -> Vec<Subtask> {
        let lead = breakdown
            .hours_by_role
            .iter()
            .max_by(|a, b| a.1.total_cmp(b.1))
            .map(|(id, _)| self.role_name(id));
        let name = &breakdown.module_name;
        let hours = breakdown.hours;

        [
            (
                format!("Plan and mobilize {name}"),
                "Confirm scope, stakeholders, schedule and entry criteria; stand up tooling and access.",
                0.2,
            ),
            (
                format!("Execute {name}"),
                "Perform the core activities for the module and track progress against the plan.",
                0.6,
            ),
            (
                format!("Validate and transition {name}"),
                "Verify deliverables against acceptance criteria, document results and hand over.",
                0.2,
            ),
        ]
        .into_iter()
        .map(|(title, description, share)| Subtask {
            title,
            description: description.to_string(),
            hours: round_to(hours * share, 1),
            role: lead.clone(),
        })
        .collect()
    }

    #[instrument(skip(self, breakdown), fields(module = %module_id))]
    pub async fn generate_subtasks(
        &self,
        module_id: &str,
        breakdown: &ModuleBreakdown,
        tone: &str,
        use_ai: bool,
    ) -> ModuleSubtasks {
        let template = |svc: &Self| ModuleSubtasks {
            module_id: module_id.to_string(),
            module_name: breakdown.module_name.clone(),
            hours: round_to(breakdown.hours, 1),
            subtasks: svc.template_subtasks(breakdown),
            source: TextSource::Template,
        };
        if !use_ai {
            return template(self);
        }

        let roles: Vec<String> = breakdown
            .hours_by_role
            .iter()
            .map(|(id, h)| format!("{} ({:.0} h)", self.role_name(id), h))
            .collect();
        let prompt = format!(
            "Module: {}\nFocus area: {}\nTotal hours: {:.1}\nRoles: {}\nTone: {tone}\n\
             List 3 to 6 sequential subtasks. Return {{\"subtasks\": [{{\"title\": str, \
             \"description\": str, \"hours\": number, \"role\": str}}]}} with hours summing to the total.",
            breakdown.module_name,
            breakdown.focus_area.label(),
            breakdown.hours,
            roles.join(", "),
        );

        match self.ask("subtasks", SUBTASK_SYSTEM, &prompt, 0.3).await {
            Ok((raw, source)) => {
                let subtasks = balance_hours(coerce_subtasks(&raw), breakdown.hours);
                if subtasks.is_empty() {
                    debug!("Model returned no usable subtasks");
                    return template(self);
                }
                ModuleSubtasks {
                    module_id: module_id.to_string(),
                    module_name: breakdown.module_name.clone(),
                    hours: round_to(breakdown.hours, 1),
                    subtasks,
                    source,
                }
            }
            Err(e) => {
                if !matches!(e, LlmError::NotConfigured) {
                    warn!(error = %e, "Subtask generation failed, using template");
                }
                template(self)
            }
        }
    }

    /// Subtasks for every module of a calculated estimate, in input order.
    pub async fn preview_subtasks(
        &self,
        input: &EstimationInput,
        result: &EstimationResult,
        tone: &str,
        use_ai: bool,
    ) -> SubtasksPreviewResponse {
        let mut seen = HashSet::new();
        let pending = input
            .modules
            .iter()
            .filter(|id| seen.insert(id.as_str()))
            .filter_map(|id| result.breakdown_by_module.get(id).map(|b| (id, b)))
            .map(|(id, b)| self.generate_subtasks(id, b, tone, use_ai));
        let modules = join_all(pending).await;
        let total_hours = round_to(modules.iter().map(|m| m.hours).sum(), 1);
        SubtasksPreviewResponse {
            modules,
            total_hours,
        }
    }

    #[instrument(skip(self, request), fields(kind = %kind))]
    pub async fn generate_list(
        &self,
        kind: ListKind,
        request: &ListGenerationRequest,
    ) -> ListGenerationResponse {
        let max_items = request.max_items();
        let modules: Vec<_> = request
            .modules
            .iter()
            .filter_map(|id| self.catalog.get_module(id))
            .collect();
        let mut areas: Vec<FocusArea> = Vec::new();
        for m in &modules {
            if !areas.contains(&m.focus_area) {
                areas.push(m.focus_area);
            }
        }

        let rfp: String = request
            .rfp_text
            .as_deref()
            .unwrap_or_default()
            .chars()
            .take(MAX_RFP_CHARS)
            .collect();
        let module_names: Vec<&str> = modules.iter().map(|m| m.name.as_str()).collect();
        let prompt = format!(
            "Draft up to {max_items} {} for a proposal{}.\nSelected work modules: {}.\n\
             Return {{\"items\": [str]}}.\nSolicitation text:\n{}",
            kind.describe(),
            request
                .project_name
                .as_deref()
                .map(|p| format!(" titled \"{p}\""))
                .unwrap_or_default(),
            if module_names.is_empty() {
                "none specified".to_string()
            } else {
                module_names.join(", ")
            },
            if rfp.trim().is_empty() { "(not provided)" } else { rfp.as_str() },
        );

        match self.ask(kind.as_str(), LIST_SYSTEM, &prompt, 0.4).await {
            Ok((raw, source)) => {
                let mut seen = HashSet::new();
                let items: Vec<String> = coerce_list(&raw, kind)
                    .into_iter()
                    .filter(|i| seen.insert(i.to_lowercase()))
                    .take(max_items)
                    .collect();
                if !items.is_empty() {
                    return ListGenerationResponse {
                        kind,
                        items,
                        source,
                    };
                }
                debug!("Model returned no usable items");
            }
            Err(e) => {
                if !matches!(e, LlmError::NotConfigured) {
                    warn!(error = %e, "List generation failed, using focus-area defaults");
                }
            }
        }

        ListGenerationResponse {
            kind,
            items: fallback_list(kind, &areas, max_items),
            source: TextSource::Template,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Settings;
    use crate::domain::catalog::ComplexityLevel;
    use crate::services::calculation::Calculator;
    use pretty_assertions::assert_eq;

    fn service() -> NarrativeService {
        let llm = LlmClient::new(&Settings::default()).unwrap();
        NarrativeService::new(llm, None, Arc::new(Catalog::new()))
    }

    fn estimate(modules: &[&str]) -> (EstimationInput, EstimationResult, InputSummary) {
        let input = EstimationInput::new(
            modules.iter().map(|m| m.to_string()).collect(),
            ComplexityLevel::Medium,
        );
        let result = Calculator::new(Arc::new(Catalog::new()))
            .calculate(&input)
            .unwrap();
        let summary = InputSummary::from_input(&input, Some("Pilot".to_string()));
        (input, result, summary)
    }

    #[tokio::test]
    async fn test_narrative_from_model_after_retry() {
        use crate::services::ai_client::tests::{chat_reply, spawn_mock_llm};
        use reqwest::StatusCode;
        use std::sync::atomic::Ordering;

        let (settings, calls) = spawn_mock_llm(vec![
            (StatusCode::SERVICE_UNAVAILABLE, serde_json::json!({})),
            (
                StatusCode::OK,
                chat_reply("```json\n{\"executive_summary\": \"Model summary.\", \"risks\": \"Model risks.\"}\n```"),
            ),
        ])
        .await;
        let service =
            NarrativeService::new(LlmClient::new(&settings).unwrap(), None, Arc::new(Catalog::new()));
        let (_, result, summary) = estimate(&["sa_audit"]);

        let narrative = service
            .generate_narrative(&result, &summary, None, "professional")
            .await;
        assert_eq!(narrative.source, TextSource::Ai);
        assert_eq!(narrative.sections["executive_summary"], "Model summary.");
        assert_eq!(narrative.sections["risks"], "Model risks.");
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_narrative_falls_back_on_client_error() {
        use crate::services::ai_client::tests::spawn_mock_llm;
        use reqwest::StatusCode;
        use std::sync::atomic::Ordering;

        let (settings, calls) = spawn_mock_llm(vec![(
            StatusCode::BAD_REQUEST,
            serde_json::json!({"error": {"message": "bad prompt"}}),
        )])
        .await;
        let service =
            NarrativeService::new(LlmClient::new(&settings).unwrap(), None, Arc::new(Catalog::new()));
        let (_, result, summary) = estimate(&["sa_audit"]);

        let narrative = service
            .generate_narrative(&result, &summary, None, "professional")
            .await;
        assert_eq!(narrative.source, TextSource::Template);
        for section in DEFAULT_SECTIONS {
            assert!(!narrative.sections[section].is_empty(), "{section}");
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_coerce_sections_from_fenced_json() {
        let raw = "```json\n{\"executive_summary\": \"Short.\", \"risks\": 3}\n```";
        let sections = coerce_sections(raw, &["executive_summary".to_string()]);
        assert_eq!(sections["executive_summary"], "Short.");
        assert_eq!(sections["risks"], "3");
    }

    #[test]
    fn test_coerce_sections_plain_text_goes_to_first_section() {
        let sections = coerce_sections("Just prose.", &["risks".to_string()]);
        assert_eq!(
            sections,
            BTreeMap::from([("risks".to_string(), "Just prose.".to_string())])
        );
    }

    #[test]
    fn test_coerce_subtasks_shapes() {
        let wrapped = coerce_subtasks(r#"{"subtasks": [{"title": "Kickoff", "hours": "4"}, "Review: check work"]}"#);
        assert_eq!(wrapped.len(), 2);
        assert_eq!(wrapped[0].hours, 4.0);
        assert_eq!(wrapped[1].title, "Review");
        assert_eq!(wrapped[1].description, "check work");

        let bare = coerce_subtasks(r#"[{"name": "Inventory", "role": "Engineer"}]"#);
        assert_eq!(bare[0].title, "Inventory");
        assert_eq!(bare[0].role.as_deref(), Some("Engineer"));

        let bullets = coerce_subtasks("Here you go:\n- Plan\n2. Build: the thing\n");
        let titles: Vec<&str> = bullets.iter().map(|s| s.title.as_str()).collect();
        assert_eq!(titles, vec!["Plan", "Build"]);
    }

    #[test]
    fn test_coerce_list_shapes() {
        assert_eq!(
            coerce_list(r#"{"items": ["FISMA", {"text": "FedRAMP"}]}"#, ListKind::ComplianceFrameworks),
            vec!["FISMA", "FedRAMP"]
        );
        assert_eq!(
            coerce_list(r#"{"assumptions": ["A"]}"#, ListKind::Assumptions),
            vec!["A"]
        );
        assert_eq!(coerce_list("* one\n* two", ListKind::Comments), vec!["one", "two"]);
    }

    #[test]
    fn test_balance_hours_distributes_evenly_without_estimates() {
        let tasks = vec![subtask_from_line("a").unwrap(), subtask_from_line("b").unwrap()];
        let balanced = balance_hours(tasks, 10.0);
        assert!(balanced.iter().all(|t| t.hours == 5.0));
    }

    #[test]
    fn test_balance_hours_rescales_to_total() {
        let mut tasks = vec![subtask_from_line("a").unwrap(), subtask_from_line("b").unwrap()];
        tasks[0].hours = 1.0;
        tasks[1].hours = 3.0;
        let balanced = balance_hours(tasks, 100.0);
        assert_eq!(balanced[0].hours, 25.0);
        assert_eq!(balanced[1].hours, 75.0);
    }

    #[test]
    fn test_fallback_list_uses_focus_areas_then_generic() {
        let items = fallback_list(
            ListKind::ComplianceFrameworks,
            &[FocusArea::CloudMigration],
            3,
        );
        assert_eq!(items, vec!["FedRAMP Moderate", "TIC 3.0", "FISMA"]);

        let generic = fallback_list(ListKind::Comments, &[], 10);
        assert_eq!(generic.len(), generic_items(ListKind::Comments).len());
    }

    #[tokio::test]
    async fn test_offline_narrative_when_unconfigured() {
        let (_, result, summary) = estimate(&["dt_discovery", "sa_audit"]);
        let narrative = service()
            .generate_narrative(&result, &summary, None, "professional")
            .await;
        assert_eq!(narrative.source, TextSource::Template);
        assert_eq!(narrative.sections.len(), DEFAULT_SECTIONS.len());
        assert!(narrative.sections["executive_summary"].contains("2 modules"));
        assert!(narrative.sections["risks"].contains("$"));
    }

    #[tokio::test]
    async fn test_offline_narrative_skips_unknown_sections() {
        let (_, result, summary) = estimate(&["sa_audit"]);
        let sections = vec!["risks".to_string(), "pricing_strategy".to_string()];
        let narrative = service()
            .generate_narrative(&result, &summary, Some(&sections), "formal")
            .await;
        assert_eq!(narrative.sections.keys().collect::<Vec<_>>(), vec!["risks"]);
    }

    #[tokio::test]
    async fn test_unknown_section_without_ai_is_bad_request() {
        let (_, result, summary) = estimate(&["sa_audit"]);
        let err = service()
            .generate_section("win_themes", &result, &summary, None, "professional")
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::BadRequest(_)));

        let ok = service()
            .generate_section("assumptions", &result, &summary, None, "professional")
            .await
            .unwrap();
        assert_eq!(ok.source, TextSource::Template);
    }

    #[tokio::test]
    async fn test_template_subtasks_split_hours() {
        let (input, result, _) = estimate(&["sa_audit", "dt_discovery", "sa_audit"]);
        let preview = service()
            .preview_subtasks(&input, &result, "professional", true)
            .await;
        assert_eq!(preview.modules.len(), 2);
        assert_eq!(preview.modules[0].module_id, "sa_audit");

        let audit = &preview.modules[0];
        let shares: Vec<f64> = audit.subtasks.iter().map(|s| s.hours).collect();
        assert_eq!(shares.len(), 3);
        assert!((shares[0] - audit.hours * 0.2).abs() < 0.1);
        assert!((shares[1] - audit.hours * 0.6).abs() < 0.1);
        assert!(audit.subtasks.iter().all(|s| s.role.is_some()));
    }

    #[tokio::test]
    async fn test_generate_list_fallback_respects_max_items() {
        let request = ListGenerationRequest {
            modules: vec!["sa_audit".to_string(), "cm_assessment".to_string()],
            max_items: Some(2),
            ..Default::default()
        };
        let list = service()
            .generate_list(ListKind::SecurityProtocols, &request)
            .await;
        assert_eq!(list.source, TextSource::Template);
        assert_eq!(list.items.len(), 2);
        assert!(list.items[0].contains("Continuous monitoring"));
    }
}
