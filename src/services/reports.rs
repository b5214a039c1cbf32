//! Report pipeline: calculate, narrate, render, and optionally persist.
//!
//! The synchronous `/report` route and the background report jobs both go
//! through [`ReportBuilder`], so a job produces exactly what the route would.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use chrono::Utc;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{error, info, instrument, warn};

use super::calculation::Calculator;
use super::export::{render_estimate_pdf, EstimateReport};
use super::narrative::NarrativeService;
use super::storage::{ObjectStorage, PRESIGN_TTL};
use crate::domain::estimation::{EstimationResult, InputSummary};
use crate::domain::jobs::JobStatus;
use crate::domain::narrative::{SubtasksPreviewRequest, SubtasksPreviewResponse};
use crate::domain::proposals::{NewDocument, Proposal};
use crate::domain::reports::{ReportJobResult, ReportRecord, ReportRequest, PDF_CONTENT_TYPE};
use crate::error::{ApiError, ApiResult};
use crate::store::{new_id, ProposalStore, ReportJobStore, ReportRegistry};

const REPORT_KEY_PREFIX: &str = "reports";

/// A rendered PDF together with the estimate it was built from
pub struct RenderedReport {
    pub filename: String,
    pub pdf: Vec<u8>,
    pub result: EstimationResult,
    pub proposal: Option<Proposal>,
}

#[derive(Clone)]
pub struct ReportBuilder {
    calculator: Arc<Calculator>,
    narrative: NarrativeService,
    storage: Option<ObjectStorage>,
    proposals: Arc<dyn ProposalStore>,
    registry: Arc<dyn ReportRegistry>,
    tool_version: String,
}

impl ReportBuilder {
    pub fn new(
        calculator: Arc<Calculator>,
        narrative: NarrativeService,
        storage: Option<ObjectStorage>,
        proposals: Arc<dyn ProposalStore>,
        registry: Arc<dyn ReportRegistry>,
        tool_version: &str,
    ) -> Self {
        Self {
            calculator,
            narrative,
            storage,
            proposals,
            registry,
            tool_version: tool_version.to_string(),
        }
    }

    async fn linked_proposal(
        &self,
        owner_email: &str,
        request: &ReportRequest,
    ) -> ApiResult<Option<Proposal>> {
        let Some(proposal_id) = request.proposal_id.as_deref().filter(|p| !p.is_empty()) else {
            return Ok(None);
        };
        let proposal = self
            .proposals
            .get_owned_proposal(proposal_id, owner_email)
            .await?
            .ok_or_else(|| ApiError::not_found(format!("Proposal {proposal_id} not found")))?;
        Ok(Some(proposal))
    }

    /// Runs the calculation and renders the PDF without storing anything.
    #[instrument(skip(self, request), fields(modules = request.input.modules.len()))]
    pub async fn render(&self, owner_email: &str, request: &ReportRequest) -> ApiResult<RenderedReport> {
        let proposal = self.linked_proposal(owner_email, request).await?;
        let result = self.calculator.calculate(&request.input)?;
        let summary = InputSummary::from_input(&request.input, request.project_name.clone());

        let narrative: BTreeMap<String, String> = match &request.narrative {
            Some(given) if !given.is_empty() => given.clone(),
            _ if request.include_ai => {
                self.narrative
                    .generate_narrative(&result, &summary, None, &request.tone)
                    .await
                    .sections
            }
            _ => self.narrative.template_narrative(&result, &summary).sections,
        };

        let subtasks = if request.include_subtasks {
            self.narrative
                .preview_subtasks(&request.input, &result, &request.tone, request.include_ai)
                .await
                .modules
        } else {
            Vec::new()
        };

        let mut details: Vec<(&'static str, String)> = Vec::new();
        if let Some(p) = &proposal {
            if let Some(title) = &p.title {
                details.push(("Proposal", title.clone()));
            }
            let version = request.proposal_version.unwrap_or(p.latest_version);
            details.push(("Proposal version", version.to_string()));
        }
        if let Some(pop) = request.period_of_performance.as_deref().filter(|s| !s.is_empty()) {
            details.push(("Period of performance", pop.to_string()));
        }
        if let Some(method) = request.estimating_method.as_deref().filter(|s| !s.is_empty()) {
            details.push(("Estimating method", method.to_string()));
        }
        if let Some(label) = request.report_label.as_deref().filter(|s| !s.is_empty()) {
            details.push(("Label", label.to_string()));
        }

        let pdf = render_estimate_pdf(&EstimateReport {
            title: "Cost Estimate",
            project_name: request.project_name.as_deref(),
            generated_at: Utc::now(),
            summary: &summary,
            result: &result,
            narrative: &narrative,
            subtasks: &subtasks,
            details,
        })
        .map_err(ApiError::Internal)?;

        Ok(RenderedReport {
            filename: request.filename(),
            pdf,
            result,
            proposal,
        })
    }

    /// Uploads the PDF and registers it. None when storage is not configured.
    #[instrument(skip(self, request, rendered), fields(filename = %rendered.filename))]
    pub async fn persist(
        &self,
        owner_email: &str,
        request: &ReportRequest,
        rendered: &RenderedReport,
    ) -> ApiResult<Option<(ReportRecord, Option<String>)>> {
        let Some(storage) = &self.storage else {
            return Ok(None);
        };
        let stored = storage
            .upload_bytes(
                rendered.pdf.clone(),
                REPORT_KEY_PREFIX,
                &rendered.filename,
                PDF_CONTENT_TYPE,
            )
            .await
            .map_err(ApiError::Internal)?;

        let now = Utc::now();
        let record = ReportRecord {
            owner_email: owner_email.to_string(),
            report_id: new_id("rep"),
            filename: rendered.filename.clone(),
            content_type: PDF_CONTENT_TYPE.to_string(),
            bucket: stored.bucket.clone(),
            key: stored.key.clone(),
            size_bytes: rendered.pdf.len() as i64,
            created_by: owner_email.to_string(),
            tool_version: Some(self.tool_version.clone()),
            proposal_id: rendered.proposal.as_ref().map(|p| p.proposal_id.clone()),
            proposal_title: rendered.proposal.as_ref().and_then(|p| p.title.clone()),
            proposal_public_id: rendered.proposal.as_ref().map(|p| p.public_id.clone()),
            proposal_version: request
                .proposal_version
                .or(rendered.proposal.as_ref().map(|p| p.latest_version)),
            total_cost: Some(rendered.result.total_cost),
            total_hours: Some(rendered.result.total_labor_hours),
            module_count: Some(rendered.result.breakdown_by_module.len()),
            complexity: Some(request.input.complexity.code().to_string()),
            period_of_performance: request.period_of_performance.clone(),
            estimating_method: request.estimating_method.clone(),
            tone: Some(request.tone.clone()),
            include_ai: request.include_ai,
            report_label: request.report_label.clone(),
            payload: serde_json::to_value(request).unwrap_or(Value::Null),
            created_at: now,
            updated_at: now,
        };
        self.registry.save_report(&record).await?;

        if let Some(proposal) = &rendered.proposal {
            let document = NewDocument {
                kind: "report".to_string(),
                version: record.proposal_version,
                filename: stored.filename.clone(),
                content_type: Some(PDF_CONTENT_TYPE.to_string()),
                bucket: stored.bucket.clone(),
                key: stored.key.clone(),
                size_bytes: record.size_bytes,
                meta: serde_json::json!({ "report_id": record.report_id }),
            };
            if let Err(e) = self
                .proposals
                .add_document(&proposal.proposal_id, owner_email, document)
                .await
            {
                warn!(error = %e, "Failed to attach report to proposal");
            }
        }

        let url = storage.presign_get(&record.key, PRESIGN_TTL).await;
        info!(report_id = %record.report_id, key = %record.key, "Report stored");
        Ok(Some((record, url)))
    }

    /// Full pipeline as run by a report job.
    pub async fn build_job_result(
        &self,
        owner_email: &str,
        request: &ReportRequest,
    ) -> ApiResult<ReportJobResult> {
        let rendered = self.render(owner_email, request).await?;
        let mut result = ReportJobResult {
            filename: rendered.filename.clone(),
            size_bytes: rendered.pdf.len(),
            total_cost: rendered.result.total_cost,
            total_hours: rendered.result.total_labor_hours,
            report_id: None,
            key: None,
            url: None,
            pdf_base64: None,
        };
        match self.persist(owner_email, request, &rendered).await? {
            Some((record, url)) => {
                result.report_id = Some(record.report_id);
                result.key = Some(record.key);
                result.url = url;
            }
            None => result.pdf_base64 = Some(STANDARD.encode(&rendered.pdf)),
        }
        Ok(result)
    }

    /// Subtask preview as run by a subtasks job.
    pub async fn build_subtasks(
        &self,
        request: &SubtasksPreviewRequest,
    ) -> ApiResult<SubtasksPreviewResponse> {
        let result = self.calculator.calculate(&request.input)?;
        Ok(self
            .narrative
            .preview_subtasks(&request.input, &result, &request.tone, request.use_ai)
            .await)
    }
}

async fn finish_job<T: serde::Serialize>(
    jobs: &dyn ReportJobStore,
    job_id: &str,
    outcome: ApiResult<T>,
) {
    let update = match outcome.map(|value| serde_json::to_value(value)) {
        Ok(Ok(value)) => jobs
            .update_status(job_id, JobStatus::Completed, None, Some(value))
            .await,
        Ok(Err(e)) => {
            jobs.update_status(job_id, JobStatus::Failed, Some(e.to_string()), None)
                .await
        }
        Err(e) => {
            warn!(job_id, error = %e, "Job failed");
            jobs.update_status(job_id, JobStatus::Failed, Some(e.to_string()), None)
                .await
        }
    };
    if let Err(e) = update {
        error!(job_id, error = %e, "Failed to record job outcome");
    }
}

async fn mark_running(jobs: &dyn ReportJobStore, job_id: &str) {
    if let Err(e) = jobs
        .update_status(job_id, JobStatus::Running, None, None)
        .await
    {
        error!(job_id, error = %e, "Failed to mark job running");
    }
}

/// Runs a queued report job in the background.
pub fn spawn_report_job(
    jobs: Arc<dyn ReportJobStore>,
    builder: ReportBuilder,
    job_id: String,
    owner_email: String,
    request: ReportRequest,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        mark_running(jobs.as_ref(), &job_id).await;
        let outcome = builder.build_job_result(&owner_email, &request).await;
        finish_job(jobs.as_ref(), &job_id, outcome).await;
        info!(job_id = %job_id, "Report job finished");
    })
}

/// Runs a queued subtasks job in the background.
pub fn spawn_subtasks_job(
    jobs: Arc<dyn ReportJobStore>,
    builder: ReportBuilder,
    job_id: String,
    request: SubtasksPreviewRequest,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        mark_running(jobs.as_ref(), &job_id).await;
        let outcome = builder.build_subtasks(&request).await;
        finish_job(jobs.as_ref(), &job_id, outcome).await;
        info!(job_id = %job_id, "Subtasks job finished");
    })
}
