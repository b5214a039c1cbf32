//! Estimate calculation routes (public)

use axum::{extract::State, Json};
use std::sync::Arc;

use crate::app::AppState;
use crate::domain::estimation::{
    EstimateRequest, EstimateResponse, EstimationInput, InputSummary, QuickCalculateRequest,
    QuickCalculateResponse, ValidationResponse,
};
use crate::error::{ApiError, ApiResult};

/// POST /api/v1/calculate
pub async fn quick_calculate(
    State(state): State<Arc<AppState>>,
    Json(req): Json<QuickCalculateRequest>,
) -> ApiResult<Json<QuickCalculateResponse>> {
    if !req.base_hours.is_finite() || req.base_hours < 0.0 {
        return Err(ApiError::bad_request("base_hours must be a non-negative number"));
    }
    Ok(Json(state.calculator.quick_calculate(req.base_hours, req.complexity)))
}

/// POST /api/v1/estimate
pub async fn estimate(
    State(state): State<Arc<AppState>>,
    Json(req): Json<EstimateRequest>,
) -> ApiResult<Json<EstimateResponse>> {
    let estimation_result = state.calculator.calculate(&req.input)?;
    tracing::info!(
        modules = req.input.modules.len(),
        total_cost = estimation_result.total_cost,
        "Estimate calculated"
    );
    Ok(Json(EstimateResponse {
        warnings: state.calculator.validate(&req.input),
        input_summary: InputSummary::from_input(&req.input, req.project_name),
        estimation_result,
    }))
}

/// POST /api/v1/estimate/validate
pub async fn validate(
    State(state): State<Arc<AppState>>,
    Json(input): Json<EstimationInput>,
) -> Json<ValidationResponse> {
    let mut warnings = state.calculator.validate(&input);
    let valid = match state.calculator.calculate(&input) {
        Ok(_) => true,
        Err(e) => {
            let message = e.to_string();
            if !warnings.contains(&message) {
                warnings.push(message);
            }
            false
        }
    };
    Json(ValidationResponse { valid, warnings })
}
