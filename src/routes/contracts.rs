//! Contract opportunity pipeline and SAM.gov sync controls

use axum::{
    extract::{Path, Query, State},
    Json,
};
use chrono::Utc;
use std::sync::Arc;

use crate::api::{Created, ListResponse};
use crate::app::AppState;
use crate::auth::RequireAuth;
use crate::domain::contracts::{
    Contract, ContractFilter, ContractListQuery, ContractPatch, ContractStats, NewContract,
    SyncReport, SyncRequest, SyncStatus,
};
use crate::error::{ApiError, ApiResult};

/// GET /api/v1/contracts
pub async fn list_contracts(
    _auth: RequireAuth,
    State(state): State<Arc<AppState>>,
    Query(query): Query<ContractListQuery>,
) -> ApiResult<ListResponse<Contract>> {
    let filter = ContractFilter::try_from(query).map_err(ApiError::bad_request)?;
    let contracts = state.stores.contracts.list_contracts(&filter).await?;
    Ok(ListResponse::new(contracts))
}

/// POST /api/v1/contracts
pub async fn create_contract(
    auth: RequireAuth,
    State(state): State<Arc<AppState>>,
    Json(new): Json<NewContract>,
) -> ApiResult<Created<Contract>> {
    if new.title.as_deref().map_or(true, |t| t.trim().is_empty()) {
        return Err(ApiError::bad_request("title is required"));
    }
    let contract = state.stores.contracts.create_contract(new).await?;
    tracing::info!(
        contract_id = %contract.contract_id,
        owner = %auth.owner_email,
        "Contract created"
    );
    Ok(Created(contract))
}

/// GET /api/v1/contracts/stats
pub async fn contract_stats(
    _auth: RequireAuth,
    State(state): State<Arc<AppState>>,
) -> ApiResult<Json<ContractStats>> {
    let stats = state.stores.contracts.contract_stats(Utc::now()).await?;
    Ok(Json(stats))
}

/// GET /api/v1/contracts/:contract_id
pub async fn get_contract(
    _auth: RequireAuth,
    State(state): State<Arc<AppState>>,
    Path(contract_id): Path<String>,
) -> ApiResult<Json<Contract>> {
    let contract = state
        .stores
        .contracts
        .get_contract(&contract_id)
        .await?
        .ok_or_else(|| ApiError::not_found(format!("Contract {contract_id} not found")))?;
    Ok(Json(contract))
}

/// PATCH /api/v1/contracts/:contract_id
pub async fn update_contract(
    auth: RequireAuth,
    State(state): State<Arc<AppState>>,
    Path(contract_id): Path<String>,
    Json(patch): Json<ContractPatch>,
) -> ApiResult<Json<Contract>> {
    let contract = state
        .stores
        .contracts
        .update_contract(&contract_id, patch)
        .await?
        .ok_or_else(|| ApiError::not_found(format!("Contract {contract_id} not found")))?;
    tracing::info!(
        contract_id = %contract_id,
        status = %contract.status,
        owner = %auth.owner_email,
        "Contract updated"
    );
    Ok(Json(contract))
}

/// GET /api/v1/contracts/sam/status
pub async fn sam_status(
    _auth: RequireAuth,
    State(state): State<Arc<AppState>>,
) -> ApiResult<Json<SyncStatus>> {
    Ok(Json(state.contract_sync.status().await?))
}

/// POST /api/v1/contracts/sam/sync
///
/// Body is optional; an empty request uses the configured defaults.
pub async fn sam_sync(
    auth: RequireAuth,
    State(state): State<Arc<AppState>>,
    body: Option<Json<SyncRequest>>,
) -> ApiResult<Json<SyncReport>> {
    if !state.contract_sync.is_configured() {
        return Err(ApiError::unavailable("SAM.gov sync is not configured"));
    }
    let request = body.map(|Json(r)| r).unwrap_or_default();
    tracing::info!(owner = %auth.owner_email, "Manual SAM.gov sync requested");
    Ok(Json(state.contract_sync.run_once("manual", request).await))
}
