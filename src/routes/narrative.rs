//! AI narrative, generated lists and subtask previews

use axum::{
    extract::{Path, State},
    Json,
};
use std::sync::Arc;

use crate::api::Accepted;
use crate::app::AppState;
use crate::auth::RequireAuth;
use crate::domain::jobs::{JobAccepted, JobKind, ReportJob};
use crate::domain::narrative::{
    ListGenerationRequest, ListGenerationResponse, ListKind, NarrativeRequest, NarrativeResponse,
    SectionRequest, SectionResponse, SubtasksPreviewRequest, SubtasksPreviewResponse,
};
use crate::error::{ApiError, ApiResult};
use crate::services::reports::spawn_subtasks_job;

/// POST /api/v1/narrative
pub async fn generate_narrative(
    auth: RequireAuth,
    State(state): State<Arc<AppState>>,
    Json(req): Json<NarrativeRequest>,
) -> Json<NarrativeResponse> {
    tracing::info!(owner = %auth.owner_email, "Generating narrative");
    Json(
        state
            .narrative
            .generate_narrative(
                &req.estimation_result,
                &req.input_summary,
                req.sections.as_deref(),
                &req.tone,
            )
            .await,
    )
}

/// POST /api/v1/narrative/section
pub async fn generate_section(
    _auth: RequireAuth,
    State(state): State<Arc<AppState>>,
    Json(req): Json<SectionRequest>,
) -> ApiResult<Json<SectionResponse>> {
    let response = state
        .narrative
        .generate_section(
            &req.section,
            &req.estimation_result,
            &req.input_summary,
            req.prompt.as_deref(),
            &req.tone,
        )
        .await?;
    Ok(Json(response))
}

async fn generate_list(
    state: &AppState,
    kind: ListKind,
    req: ListGenerationRequest,
) -> Json<ListGenerationResponse> {
    Json(state.narrative.generate_list(kind, &req).await)
}

/// POST /api/v1/assumptions/generate
pub async fn generate_assumptions(
    _auth: RequireAuth,
    State(state): State<Arc<AppState>>,
    Json(req): Json<ListGenerationRequest>,
) -> Json<ListGenerationResponse> {
    generate_list(&state, ListKind::Assumptions, req).await
}

/// POST /api/v1/comments/generate
pub async fn generate_comments(
    _auth: RequireAuth,
    State(state): State<Arc<AppState>>,
    Json(req): Json<ListGenerationRequest>,
) -> Json<ListGenerationResponse> {
    generate_list(&state, ListKind::Comments, req).await
}

/// POST /api/v1/security-protocols/generate
pub async fn generate_security_protocols(
    _auth: RequireAuth,
    State(state): State<Arc<AppState>>,
    Json(req): Json<ListGenerationRequest>,
) -> Json<ListGenerationResponse> {
    generate_list(&state, ListKind::SecurityProtocols, req).await
}

/// POST /api/v1/compliance-frameworks/generate
pub async fn generate_compliance_frameworks(
    _auth: RequireAuth,
    State(state): State<Arc<AppState>>,
    Json(req): Json<ListGenerationRequest>,
) -> Json<ListGenerationResponse> {
    generate_list(&state, ListKind::ComplianceFrameworks, req).await
}

/// POST /api/v1/subtasks/preview
pub async fn preview_subtasks(
    _auth: RequireAuth,
    State(state): State<Arc<AppState>>,
    Json(req): Json<SubtasksPreviewRequest>,
) -> ApiResult<Json<SubtasksPreviewResponse>> {
    Ok(Json(state.reports.build_subtasks(&req).await?))
}

/// POST /api/v1/subtasks/preview/jobs
pub async fn create_subtasks_job(
    auth: RequireAuth,
    State(state): State<Arc<AppState>>,
    Json(req): Json<SubtasksPreviewRequest>,
) -> ApiResult<Accepted<JobAccepted>> {
    // Fail fast on inputs the calculator would reject
    state.calculator.calculate(&req.input)?;

    let payload = serde_json::to_value(&req).map_err(|e| ApiError::Internal(e.into()))?;
    let job = state
        .stores
        .report_jobs
        .create_job(&auth.owner_email, JobKind::Subtasks, payload)
        .await?;
    tracing::info!(job_id = %job.job_id, owner = %auth.owner_email, "Subtasks job queued");

    spawn_subtasks_job(
        state.stores.report_jobs.clone(),
        state.reports.clone(),
        job.job_id.clone(),
        req,
    );
    Ok(Accepted(JobAccepted::from(&job)))
}

/// Job lookup restricted to the caller and one job kind
pub(crate) async fn owned_job(
    state: &AppState,
    owner_email: &str,
    job_id: &str,
    kind: JobKind,
) -> ApiResult<ReportJob> {
    state
        .stores
        .report_jobs
        .get_job(job_id)
        .await?
        .filter(|job| job.owner_email == owner_email && job.job_kind == kind)
        .ok_or_else(|| ApiError::not_found(format!("Job {job_id} not found")))
}

/// GET /api/v1/subtasks/preview/jobs/:job_id
pub async fn get_subtasks_job(
    auth: RequireAuth,
    State(state): State<Arc<AppState>>,
    Path(job_id): Path<String>,
) -> ApiResult<Json<ReportJob>> {
    Ok(Json(
        owned_job(&state, &auth.owner_email, &job_id, JobKind::Subtasks).await?,
    ))
}
