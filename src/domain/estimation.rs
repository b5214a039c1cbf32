//! Estimation request / result DTOs.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

use super::catalog::{ComplexityLevel, FocusArea};

/// Itemized other direct cost
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OdcItem {
    pub description: String,
    #[serde(default = "one")]
    pub quantity: f64,
    pub unit_cost: f64,
}

fn one() -> f64 {
    1.0
}

impl OdcItem {
    pub fn total(&self) -> f64 {
        self.quantity * self.unit_cost
    }
}

/// Hours actually spent on a module in a past engagement
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoricalActual {
    pub module_id: String,
    pub actual_hours: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EstimationInput {
    pub modules: Vec<String>,
    pub complexity: ComplexityLevel,
    #[serde(default = "default_environment")]
    pub environment: String,
    #[serde(default = "default_integration")]
    pub integration_level: String,
    #[serde(default = "default_geography")]
    pub geography: String,
    #[serde(default = "default_clearance")]
    pub clearance_level: String,
    #[serde(default = "default_true")]
    pub is_prime_contractor: bool,
    #[serde(default = "default_sites")]
    pub sites: u32,
    #[serde(default)]
    pub overtime: bool,
    /// Hours multiplier per role
    #[serde(default)]
    pub custom_role_overrides: HashMap<String, f64>,
    /// Replacement base hourly rate per role
    #[serde(default)]
    pub role_rate_overrides: HashMap<String, f64>,
    #[serde(default)]
    pub odc_items: Vec<OdcItem>,
    /// Share of total contract value held as reserve plus margin
    #[serde(default)]
    pub management_reserve_target: Option<f64>,
    #[serde(default)]
    pub historical_actuals: Vec<HistoricalActual>,
    #[serde(default)]
    pub actuals_weight: Option<f64>,
}

fn default_environment() -> String {
    "production".to_string()
}

fn default_integration() -> String {
    "moderate_integration".to_string()
}

fn default_geography() -> String {
    "dc_metro".to_string()
}

fn default_clearance() -> String {
    "secret".to_string()
}

fn default_true() -> bool {
    true
}

fn default_sites() -> u32 {
    1
}

impl EstimationInput {
    pub fn new(modules: Vec<String>, complexity: ComplexityLevel) -> Self {
        Self {
            modules,
            complexity,
            environment: default_environment(),
            integration_level: default_integration(),
            geography: default_geography(),
            clearance_level: default_clearance(),
            is_prime_contractor: true,
            sites: 1,
            overtime: false,
            custom_role_overrides: HashMap::new(),
            role_rate_overrides: HashMap::new(),
            odc_items: Vec::new(),
            management_reserve_target: None,
            historical_actuals: Vec::new(),
            actuals_weight: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RoleBreakdown {
    pub role_name: String,
    pub hours: f64,
    pub effective_rate: f64,
    pub cost: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ModuleBreakdown {
    pub module_name: String,
    pub focus_area: FocusArea,
    pub hours: f64,
    pub cost: f64,
    /// Hours per role after all adjustments
    pub hours_by_role: BTreeMap<String, f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HistoricalAdjustment {
    pub module_id: String,
    pub estimated_hours: f64,
    pub actual_average: f64,
    pub sample_count: usize,
    pub blended_hours: f64,
    pub scale: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EstimationResult {
    pub total_labor_hours: f64,
    pub total_labor_cost: f64,
    pub risk_reserve: f64,
    pub overhead_cost: f64,
    pub odc_total: f64,
    pub subtotal: f64,
    pub prime_margin: f64,
    pub management_reserve: f64,
    /// Share of total cost held as reserve plus margin
    pub management_reserve_pct: f64,
    pub total_cost: f64,
    pub effective_hourly_rate: f64,
    pub fte_years: f64,
    pub breakdown_by_module: BTreeMap<String, ModuleBreakdown>,
    pub breakdown_by_role: BTreeMap<String, RoleBreakdown>,
    #[serde(default)]
    pub odc_items: Vec<OdcItem>,
    #[serde(default)]
    pub historical_adjustments: Vec<HistoricalAdjustment>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InputSummary {
    pub complexity: ComplexityLevel,
    pub module_count: usize,
    pub sites: u32,
    pub is_prime_contractor: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub project_name: Option<String>,
}

impl InputSummary {
    pub fn from_input(input: &EstimationInput, project_name: Option<String>) -> Self {
        Self {
            complexity: input.complexity,
            module_count: input.modules.len(),
            sites: input.sites,
            is_prime_contractor: input.is_prime_contractor,
            project_name,
        }
    }
}

/// POST /api/v1/estimate body
#[derive(Debug, Clone, Deserialize)]
pub struct EstimateRequest {
    #[serde(flatten)]
    pub input: EstimationInput,
    #[serde(default)]
    pub project_name: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EstimateResponse {
    pub estimation_result: EstimationResult,
    pub input_summary: InputSummary,
    pub warnings: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ValidationResponse {
    pub valid: bool,
    pub warnings: Vec<String>,
}

/// POST /api/v1/calculate body (single-figure quick estimate)
#[derive(Debug, Clone, Deserialize)]
pub struct QuickCalculateRequest {
    #[serde(default = "default_base_hours")]
    pub base_hours: f64,
    #[serde(default)]
    pub complexity: ComplexityLevel,
}

fn default_base_hours() -> f64 {
    100.0
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct QuickCalculateResponse {
    pub total_hours: f64,
    pub hourly_rate: f64,
    pub total_cost: f64,
    pub complexity: ComplexityLevel,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_complexity_is_required() {
        let missing = serde_json::from_value::<EstimationInput>(json!({"modules": ["dt_discovery"]}));
        assert!(missing.is_err());

        let input: EstimationInput = serde_json::from_value(json!({
            "modules": ["dt_discovery"],
            "complexity": "L",
            "odc_items": [{"description": "Travel", "unit_cost": 1200.0}]
        }))
        .unwrap();
        assert_eq!(input.complexity, ComplexityLevel::Large);
        assert_eq!(
            input.odc_items,
            vec![OdcItem {
                description: "Travel".to_string(),
                quantity: 1.0,
                unit_cost: 1200.0,
            }]
        );
        assert_eq!(input.sites, 1);
    }
}
