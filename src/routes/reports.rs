//! PDF report routes, report jobs and the stored-report registry

use axum::{
    extract::{Path, Query, State},
    http::HeaderValue,
    response::{IntoResponse, Redirect, Response},
    Json,
};
use serde_json::Value;
use std::sync::Arc;

use super::narrative::owned_job;
use crate::api::{Accepted, Attachment, ListResponse, NoContent};
use crate::app::AppState;
use crate::auth::RequireAuth;
use crate::domain::jobs::{JobAccepted, JobKind, ReportJob};
use crate::domain::reports::{
    ReportListQuery, ReportQuery, ReportRecord, ReportRequest, ReportView, PDF_CONTENT_TYPE,
};
use crate::error::{ApiError, ApiResult};
use crate::services::reports::spawn_report_job;
use crate::services::storage::PRESIGN_TTL;

const REPORT_ID_HEADER: &str = "x-report-id";

/// POST /api/v1/report
///
/// Renders the PDF and returns it as an attachment. When object storage is
/// configured the PDF is also stored and its id returned in `x-report-id`.
pub async fn create_report(
    auth: RequireAuth,
    State(state): State<Arc<AppState>>,
    Query(query): Query<ReportQuery>,
    Json(mut req): Json<ReportRequest>,
) -> ApiResult<Response> {
    req.apply_query(query);
    let rendered = state.reports.render(&auth.owner_email, &req).await?;

    let stored = match state.reports.persist(&auth.owner_email, &req, &rendered).await {
        Ok(stored) => stored,
        Err(e) => {
            // The caller still gets the PDF
            tracing::warn!(error = %e, "Failed to store report");
            None
        }
    };

    tracing::info!(
        owner = %auth.owner_email,
        filename = %rendered.filename,
        size = rendered.pdf.len(),
        "Report rendered"
    );

    let mut response = Attachment {
        filename: rendered.filename,
        content_type: PDF_CONTENT_TYPE.to_string(),
        bytes: rendered.pdf,
    }
    .into_response();
    if let Some((record, _)) = stored {
        if let Ok(value) = HeaderValue::from_str(&record.report_id) {
            response.headers_mut().insert(REPORT_ID_HEADER, value);
        }
    }
    Ok(response)
}

/// POST /api/v1/report/jobs
pub async fn create_report_job(
    auth: RequireAuth,
    State(state): State<Arc<AppState>>,
    Query(query): Query<ReportQuery>,
    Json(mut req): Json<ReportRequest>,
) -> ApiResult<Accepted<JobAccepted>> {
    req.apply_query(query);
    state.calculator.calculate(&req.input)?;

    let payload = serde_json::to_value(&req).map_err(|e| ApiError::Internal(e.into()))?;
    let job = state
        .stores
        .report_jobs
        .create_job(&auth.owner_email, JobKind::Report, payload)
        .await?;
    tracing::info!(job_id = %job.job_id, owner = %auth.owner_email, "Report job queued");

    spawn_report_job(
        state.stores.report_jobs.clone(),
        state.reports.clone(),
        job.job_id.clone(),
        auth.owner_email.clone(),
        req,
    );
    Ok(Accepted(JobAccepted::from(&job)))
}

/// GET /api/v1/report/jobs/:job_id
pub async fn get_report_job(
    auth: RequireAuth,
    State(state): State<Arc<AppState>>,
    Path(job_id): Path<String>,
) -> ApiResult<Json<ReportJob>> {
    Ok(Json(
        owned_job(&state, &auth.owner_email, &job_id, JobKind::Report).await?,
    ))
}

async fn owned_report(state: &AppState, owner_email: &str, report_id: &str) -> ApiResult<ReportRecord> {
    state
        .stores
        .reports
        .get_report(owner_email, report_id)
        .await?
        .ok_or_else(|| ApiError::not_found(format!("Report {report_id} not found")))
}

/// GET /api/v1/reports
pub async fn list_reports(
    auth: RequireAuth,
    State(state): State<Arc<AppState>>,
    Query(query): Query<ReportListQuery>,
) -> ApiResult<ListResponse<ReportView>> {
    let records = state
        .stores
        .reports
        .list_reports(&auth.owner_email, query.proposal_id.as_deref(), query.limit())
        .await?;

    let mut views = Vec::with_capacity(records.len());
    for record in &records {
        let url = match &state.storage {
            Some(storage) => storage.presign_get(&record.key, PRESIGN_TTL).await,
            None => None,
        };
        views.push(ReportView::new(record, url));
    }
    Ok(ListResponse::new(views))
}

/// GET /api/v1/reports/:report_id/payload
///
/// The request the report was built from, for regenerating it.
pub async fn get_report_payload(
    auth: RequireAuth,
    State(state): State<Arc<AppState>>,
    Path(report_id): Path<String>,
) -> ApiResult<Json<Value>> {
    let record = owned_report(&state, &auth.owner_email, &report_id).await?;
    Ok(Json(record.payload))
}

/// GET /api/v1/reports/:report_id/download
///
/// Redirects to a presigned URL, or streams the object when presigning fails.
pub async fn download_report(
    auth: RequireAuth,
    State(state): State<Arc<AppState>>,
    Path(report_id): Path<String>,
) -> ApiResult<Response> {
    let record = owned_report(&state, &auth.owner_email, &report_id).await?;
    let storage = state.storage()?;

    if let Some(url) = storage.presign_get(&record.key, PRESIGN_TTL).await {
        return Ok(Redirect::temporary(&url).into_response());
    }
    let bytes = storage
        .get_bytes(&record.key)
        .await
        .map_err(ApiError::Internal)?;
    Ok(Attachment {
        filename: record.filename,
        content_type: record.content_type,
        bytes,
    }
    .into_response())
}

/// DELETE /api/v1/reports/:report_id
pub async fn delete_report(
    auth: RequireAuth,
    State(state): State<Arc<AppState>>,
    Path(report_id): Path<String>,
) -> ApiResult<NoContent> {
    let record = owned_report(&state, &auth.owner_email, &report_id).await?;
    if let Some(storage) = &state.storage {
        if let Err(e) = storage.delete(&record.key).await {
            tracing::warn!(key = %record.key, error = %e, "Failed to delete report object");
        }
    }
    state
        .stores
        .reports
        .delete_report(&auth.owner_email, &report_id)
        .await?;
    tracing::info!(report_id = %report_id, owner = %auth.owner_email, "Report deleted");
    Ok(NoContent)
}
