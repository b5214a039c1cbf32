//! Catalog routes: modules, roles and focus areas

use axum::{
    extract::{Query, State},
    Json,
};
use serde::Deserialize;
use std::sync::Arc;

use crate::api::ListResponse;
use crate::app::AppState;
use crate::domain::catalog::{FocusArea, FocusAreaInfo, Module, Role};

#[derive(Debug, Deserialize)]
pub struct ModuleQuery {
    pub focus_area: Option<FocusArea>,
}

/// GET /api/v1/modules
pub async fn list_modules(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ModuleQuery>,
) -> ListResponse<Module> {
    let modules = match query.focus_area {
        Some(area) => state
            .catalog
            .get_modules_by_focus_area(area)
            .into_iter()
            .cloned()
            .collect(),
        None => state.catalog.all_modules().to_vec(),
    };
    ListResponse::new(modules)
}

/// GET /api/v1/roles
pub async fn list_roles(State(state): State<Arc<AppState>>) -> ListResponse<Role> {
    ListResponse::new(state.catalog.all_roles().to_vec())
}

/// GET /api/v1/focus-areas
pub async fn list_focus_areas(State(state): State<Arc<AppState>>) -> Json<Vec<FocusAreaInfo>> {
    Json(state.catalog.focus_areas())
}
