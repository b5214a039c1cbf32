//! Cost-estimation engine.
//!
//! Hours: `base × complexity × environment × integration × sites × role override`,
//! optionally rescaled per module by historical actuals. Rates: base (or override)
//! × geography × clearance × overtime premium. On top of labor: risk reserve,
//! overhead, ODCs, prime margin and a management reserve solved so that
//! reserve + margin equal the requested share of total contract value.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;
use thiserror::Error;

use crate::domain::catalog::{
    ComplexityLevel, ComplexityMatrix, EstimationRules, Module, Role,
};
use crate::domain::estimation::{
    EstimationInput, EstimationResult, HistoricalAdjustment, ModuleBreakdown,
    QuickCalculateResponse, RoleBreakdown,
};
use crate::services::catalog::Catalog;

/// Blended rate used by the single-figure quick calculator
pub const QUICK_CALC_HOURLY_RATE: f64 = 150.0;

#[derive(Debug, Error, PartialEq)]
pub enum CalculationError {
    #[error("At least one module must be selected")]
    NoModules,

    #[error("Module {0} not found")]
    UnknownModule(String),

    #[error("sites must be at least 1")]
    InvalidSites,

    #[error("management_reserve_target must be at least 0 and below 1 (got {0})")]
    InvalidReserveTarget(f64),

    #[error("actuals_weight must be between 0 and 1 (got {0})")]
    InvalidActualsWeight(f64),

    #[error("ODC item '{0}' has a negative quantity or unit cost")]
    NegativeOdc(String),

    #[error("Override for role '{0}' must be a non-negative number")]
    InvalidOverride(String),

    #[error("Historical actual for module '{0}' must be non-negative")]
    InvalidActual(String),
}

#[derive(Debug, Clone)]
pub struct Calculator {
    catalog: Arc<Catalog>,
    matrix: ComplexityMatrix,
    rules: EstimationRules,
}

impl Calculator {
    pub fn new(catalog: Arc<Catalog>) -> Self {
        Self::with_rules(catalog, EstimationRules::default())
    }

    pub fn with_rules(catalog: Arc<Catalog>, rules: EstimationRules) -> Self {
        Self {
            catalog,
            matrix: ComplexityMatrix::default(),
            rules,
        }
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    pub fn calculate(&self, input: &EstimationInput) -> Result<EstimationResult, CalculationError> {
        self.check(input)?;

        let modules = self.resolve_modules(input)?;
        let multiplier = self.hours_multiplier(input);
        let weight = input
            .actuals_weight
            .unwrap_or(self.rules.default_actuals_weight);

        let mut actuals: HashMap<&str, Vec<f64>> = HashMap::new();
        for actual in &input.historical_actuals {
            actuals
                .entry(actual.module_id.as_str())
                .or_default()
                .push(actual.actual_hours);
        }

        let rates: HashMap<&str, f64> = self
            .catalog
            .all_roles()
            .iter()
            .map(|role| (role.id.as_str(), self.effective_rate(role, input)))
            .collect();

        let mut breakdown_by_module = BTreeMap::new();
        let mut hours_per_role: BTreeMap<String, f64> = BTreeMap::new();
        let mut historical_adjustments = Vec::new();

        for module in modules {
            let mut hours_by_role = self.module_role_hours(module, input, multiplier);

            let estimated: f64 = hours_by_role.values().sum();
            if let Some(samples) = actuals.get(module.id.as_str()) {
                if estimated > 0.0 && !samples.is_empty() {
                    let actual_average = samples.iter().sum::<f64>() / samples.len() as f64;
                    let blended = (1.0 - weight) * estimated + weight * actual_average;
                    let scale = blended / estimated;
                    for hours in hours_by_role.values_mut() {
                        *hours *= scale;
                    }
                    historical_adjustments.push(HistoricalAdjustment {
                        module_id: module.id.clone(),
                        estimated_hours: estimated,
                        actual_average,
                        sample_count: samples.len(),
                        blended_hours: blended,
                        scale,
                    });
                }
            }

            let mut module_cost = 0.0;
            for (role_id, hours) in &hours_by_role {
                let Some(rate) = rates.get(role_id.as_str()) else {
                    tracing::warn!(module_id = %module.id, role_id = %role_id, "Module references unknown role");
                    continue;
                };
                module_cost += hours * rate;
                *hours_per_role.entry(role_id.clone()).or_default() += hours;
            }

            breakdown_by_module.insert(
                module.id.clone(),
                ModuleBreakdown {
                    module_name: module.name.clone(),
                    focus_area: module.focus_area,
                    hours: hours_by_role.values().sum(),
                    cost: module_cost,
                    hours_by_role,
                },
            );
        }

        let mut breakdown_by_role = BTreeMap::new();
        let mut total_labor_hours = 0.0;
        let mut total_labor_cost = 0.0;
        for (role_id, hours) in hours_per_role {
            let Some(role) = self.catalog.get_role(&role_id) else {
                continue;
            };
            if hours <= 0.0 {
                continue;
            }
            let effective_rate = rates[role_id.as_str()];
            let cost = hours * effective_rate;
            total_labor_hours += hours;
            total_labor_cost += cost;
            breakdown_by_role.insert(
                role_id,
                RoleBreakdown {
                    role_name: role.name.clone(),
                    hours,
                    effective_rate,
                    cost,
                },
            );
        }

        let risk_reserve = total_labor_cost * self.rules.risk_reserve_percentage;
        let overhead_cost = total_labor_cost * (self.rules.overhead_multiplier - 1.0);
        let odc_total: f64 = input.odc_items.iter().map(|item| item.total()).sum();
        let subtotal = total_labor_cost + risk_reserve + overhead_cost + odc_total;

        let prime_margin = if input.is_prime_contractor {
            subtotal * self.rules.prime_contractor_margin
        } else {
            0.0
        };

        let (management_reserve, total_cost) =
            solve_management_reserve(subtotal, prime_margin, input.management_reserve_target);

        let management_reserve_pct = if total_cost > 0.0 {
            (management_reserve + prime_margin) / total_cost
        } else {
            0.0
        };

        let effective_hourly_rate = if total_labor_hours > 0.0 {
            total_cost / total_labor_hours
        } else {
            0.0
        };

        let fte_years = total_labor_hours / (self.rules.annual_hours * self.rules.utilization_rate);

        Ok(EstimationResult {
            total_labor_hours,
            total_labor_cost,
            risk_reserve,
            overhead_cost,
            odc_total,
            subtotal,
            prime_margin,
            management_reserve,
            management_reserve_pct,
            total_cost,
            effective_hourly_rate,
            fte_years,
            breakdown_by_module,
            breakdown_by_role,
            odc_items: input.odc_items.clone(),
            historical_adjustments,
        })
    }

    /// Soft checks on an input; hard errors are reported as warnings too.
    pub fn validate(&self, input: &EstimationInput) -> Vec<String> {
        let mut warnings = Vec::new();

        for module_id in &input.modules {
            if self.catalog.get_module(module_id).is_none() {
                warnings.push(format!("Module {} not found", module_id));
            }
        }

        let selected: HashSet<&str> = input.modules.iter().map(String::as_str).collect();
        for module in input
            .modules
            .iter()
            .filter_map(|id| self.catalog.get_module(id))
        {
            for prereq in &module.prerequisites {
                if !selected.contains(prereq.as_str()) {
                    let prereq_name = self
                        .catalog
                        .get_module(prereq)
                        .map(|m| m.name.as_str())
                        .unwrap_or(prereq.as_str());
                    warnings.push(format!(
                        "Module '{}' requires prerequisite '{}'",
                        module.name, prereq_name
                    ));
                }
            }
        }

        if input.modules.len() > 10 && input.complexity == ComplexityLevel::Small {
            warnings.push("Small complexity with many modules may be unrealistic".to_string());
        }

        if !self.matrix.environment_factor.contains_key(&input.environment) {
            warnings.push(format!(
                "Unknown environment '{}', using multiplier 1.0",
                input.environment
            ));
        }
        if !self
            .matrix
            .integration_complexity
            .contains_key(&input.integration_level)
        {
            warnings.push(format!(
                "Unknown integration level '{}', using multiplier 1.0",
                input.integration_level
            ));
        }
        if let Some(role) = self.catalog.all_roles().first() {
            if !role.geography_multiplier.contains_key(&input.geography) {
                warnings.push(format!(
                    "Unknown geography '{}', using multiplier 1.0",
                    input.geography
                ));
            }
            if !role.clearance_multiplier.contains_key(&input.clearance_level) {
                warnings.push(format!(
                    "Unknown clearance level '{}', using multiplier 1.0",
                    input.clearance_level
                ));
            }
        }

        let mut override_roles: Vec<&String> = input
            .custom_role_overrides
            .keys()
            .chain(input.role_rate_overrides.keys())
            .collect();
        override_roles.sort();
        override_roles.dedup();
        for role_id in override_roles {
            if self.catalog.get_role(role_id).is_none() {
                warnings.push(format!("Unknown role '{}' in overrides", role_id));
            }
        }

        match self.calculate(input) {
            Ok(result) => {
                if result.total_labor_hours < self.rules.min_project_hours {
                    warnings.push(format!(
                        "Estimated {:.1} hours is below the {:.0} hour project minimum",
                        result.total_labor_hours, self.rules.min_project_hours
                    ));
                }
                for module in result.breakdown_by_module.values() {
                    if module.hours > self.rules.max_single_module_hours {
                        warnings.push(format!(
                            "Module '{}' estimate of {:.1} hours exceeds the {:.0} hour single-module limit",
                            module.module_name, module.hours, self.rules.max_single_module_hours
                        ));
                    }
                }
            }
            // Unknown modules were already reported above
            Err(CalculationError::UnknownModule(_)) => {}
            Err(e) => warnings.push(e.to_string()),
        }

        warnings
    }

    pub fn quick_calculate(&self, base_hours: f64, complexity: ComplexityLevel) -> QuickCalculateResponse {
        let total_hours = base_hours * ComplexityMatrix::base_multiplier(complexity);
        QuickCalculateResponse {
            total_hours,
            hourly_rate: QUICK_CALC_HOURLY_RATE,
            total_cost: total_hours * QUICK_CALC_HOURLY_RATE,
            complexity,
        }
    }

    /// Combined hours multiplier for complexity, environment, integration and sites.
    pub fn hours_multiplier(&self, input: &EstimationInput) -> f64 {
        let base = ComplexityMatrix::base_multiplier(input.complexity);
        let environment = self
            .matrix
            .environment_factor
            .get(&input.environment)
            .copied()
            .unwrap_or(1.0);
        let integration = self
            .matrix
            .integration_complexity
            .get(&input.integration_level)
            .copied()
            .unwrap_or(1.0);
        let sites = 1.0 + self.rules.site_multiplier_step * (input.sites.max(1) - 1) as f64;
        base * environment * integration * sites
    }

    pub fn effective_rate(&self, role: &Role, input: &EstimationInput) -> f64 {
        let base_rate = input
            .role_rate_overrides
            .get(&role.id)
            .copied()
            .unwrap_or(role.base_hourly_rate);
        let geography = role
            .geography_multiplier
            .get(&input.geography)
            .copied()
            .unwrap_or(1.0);
        let clearance = role
            .clearance_multiplier
            .get(&input.clearance_level)
            .copied()
            .unwrap_or(1.0);
        let overtime = if input.overtime {
            self.rules.overtime_rate_premium
        } else {
            1.0
        };
        base_rate * geography * clearance * overtime
    }

    fn module_role_hours(
        &self,
        module: &Module,
        input: &EstimationInput,
        multiplier: f64,
    ) -> BTreeMap<String, f64> {
        module
            .base_hours_by_role
            .iter()
            .filter_map(|(role_id, base)| {
                let over = input.custom_role_overrides.get(role_id).copied().unwrap_or(1.0);
                let hours = base * multiplier * over;
                (hours > 0.0).then(|| (role_id.clone(), hours))
            })
            .collect()
    }

    fn resolve_modules(&self, input: &EstimationInput) -> Result<Vec<&Module>, CalculationError> {
        let mut seen = HashSet::new();
        let mut modules = Vec::with_capacity(input.modules.len());
        for module_id in &input.modules {
            if !seen.insert(module_id.as_str()) {
                continue;
            }
            let module = self
                .catalog
                .get_module(module_id)
                .ok_or_else(|| CalculationError::UnknownModule(module_id.clone()))?;
            modules.push(module);
        }
        Ok(modules)
    }

    fn check(&self, input: &EstimationInput) -> Result<(), CalculationError> {
        if input.modules.is_empty() {
            return Err(CalculationError::NoModules);
        }
        if input.sites < 1 {
            return Err(CalculationError::InvalidSites);
        }
        if let Some(target) = input.management_reserve_target {
            if !(0.0..1.0).contains(&target) {
                return Err(CalculationError::InvalidReserveTarget(target));
            }
        }
        if let Some(weight) = input.actuals_weight {
            if !(0.0..=1.0).contains(&weight) {
                return Err(CalculationError::InvalidActualsWeight(weight));
            }
        }
        for item in &input.odc_items {
            if item.quantity < 0.0 || item.unit_cost < 0.0 {
                return Err(CalculationError::NegativeOdc(item.description.clone()));
            }
        }
        for (role_id, value) in input
            .custom_role_overrides
            .iter()
            .chain(input.role_rate_overrides.iter())
        {
            if !value.is_finite() || *value < 0.0 {
                return Err(CalculationError::InvalidOverride(role_id.clone()));
            }
        }
        for actual in &input.historical_actuals {
            if !actual.actual_hours.is_finite() || actual.actual_hours < 0.0 {
                return Err(CalculationError::InvalidActual(actual.module_id.clone()));
            }
        }
        Ok(())
    }
}

/// Returns `(management_reserve, total_cost)`.
///
/// With target share `p`, total `T = subtotal / (1 - p)` and reserve
/// `MR = p·T - margin`, so `(MR + margin) / T = p`. When the margin alone
/// already meets the target no reserve is added.
pub fn solve_management_reserve(subtotal: f64, margin: f64, target: Option<f64>) -> (f64, f64) {
    let without_reserve = (0.0, subtotal + margin);
    let Some(p) = target else {
        return without_reserve;
    };
    if p <= 0.0 || subtotal <= 0.0 {
        return without_reserve;
    }
    let total = subtotal / (1.0 - p);
    let reserve = p * total - margin;
    if reserve <= 0.0 {
        return without_reserve;
    }
    (reserve, total)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::estimation::{HistoricalActual, OdcItem};

    fn calculator() -> Calculator {
        Calculator::new(Arc::new(Catalog::new()))
    }

    /// Input with every multiplier at 1.0
    fn neutral(modules: &[&str]) -> EstimationInput {
        let mut input = EstimationInput::new(
            modules.iter().map(|m| m.to_string()).collect(),
            ComplexityLevel::Medium,
        );
        input.environment = "development".to_string();
        input.integration_level = "standalone".to_string();
        input.geography = "standard".to_string();
        input.clearance_level = "none".to_string();
        input.is_prime_contractor = false;
        input
    }

    fn assert_close(actual: f64, expected: f64) {
        assert!(
            (actual - expected).abs() < 1e-6,
            "expected {expected}, got {actual}"
        );
    }

    #[test]
    fn test_neutral_single_module() {
        let result = calculator().calculate(&neutral(&["dt_discovery"])).unwrap();

        assert_close(result.total_labor_hours, 210.0);
        // 40*175 + 80*125 + 60*135 + 30*140
        assert_close(result.total_labor_cost, 29_300.0);
        assert_close(result.risk_reserve, 4_395.0);
        assert_close(result.overhead_cost, 5_860.0);
        assert_close(result.subtotal, 39_555.0);
        assert_close(result.prime_margin, 0.0);
        assert_close(result.management_reserve, 0.0);
        assert_close(result.total_cost, 39_555.0);
        assert_close(result.effective_hourly_rate, 39_555.0 / 210.0);
        assert_eq!(result.breakdown_by_role.len(), 4);

        let module = &result.breakdown_by_module["dt_discovery"];
        assert_close(module.cost, 29_300.0);
        assert_close(module.hours, 210.0);
    }

    #[test]
    fn test_multiplier_chain_includes_sites() {
        let calc = calculator();
        let mut input = neutral(&["dt_discovery"]);
        input.complexity = ComplexityLevel::Large;
        input.environment = "production".to_string();
        input.integration_level = "heavy_integration".to_string();
        input.sites = 3;

        // 1.6 × 1.5 × 2.0 × (1 + 0.1 × 2)
        assert_close(calc.hours_multiplier(&input), 5.76);
        let result = calc.calculate(&input).unwrap();
        assert_close(result.total_labor_hours, 210.0 * 5.76);
    }

    #[test]
    fn test_unknown_context_keys_fall_back_to_one() {
        let calc = calculator();
        let mut input = neutral(&["dt_discovery"]);
        input.environment = "moon_base".to_string();
        input.geography = "atlantis".to_string();
        assert_close(calc.hours_multiplier(&input), 1.0);

        let warnings = calc.validate(&input);
        assert!(warnings.iter().any(|w| w.contains("moon_base")));
        assert!(warnings.iter().any(|w| w.contains("atlantis")));
    }

    #[test]
    fn test_effective_rate_adjustments() {
        let calc = calculator();
        let architect = calc.catalog().get_role("solution_architect").unwrap().clone();

        let mut input = neutral(&["dt_discovery"]);
        input.geography = "dc_metro".to_string();
        input.clearance_level = "secret".to_string();
        assert_close(calc.effective_rate(&architect, &input), 175.0 * 1.2 * 1.3);

        input.overtime = true;
        assert_close(calc.effective_rate(&architect, &input), 175.0 * 1.2 * 1.3 * 1.1);

        input
            .role_rate_overrides
            .insert("solution_architect".to_string(), 200.0);
        assert_close(calc.effective_rate(&architect, &input), 200.0 * 1.2 * 1.3 * 1.1);
    }

    #[test]
    fn test_role_hours_override_can_remove_role() {
        let mut input = neutral(&["dt_discovery"]);
        input
            .custom_role_overrides
            .insert("project_manager".to_string(), 0.0);
        input
            .custom_role_overrides
            .insert("business_analyst".to_string(), 1.5);

        let result = calculator().calculate(&input).unwrap();
        assert!(!result.breakdown_by_role.contains_key("project_manager"));
        assert_close(result.breakdown_by_role["business_analyst"].hours, 120.0);
        assert_close(result.total_labor_hours, 40.0 + 120.0 + 60.0);
    }

    #[test]
    fn test_role_totals_span_modules() {
        let result = calculator()
            .calculate(&neutral(&["dt_discovery", "dt_strategy"]))
            .unwrap();
        assert_close(result.breakdown_by_role["solution_architect"].hours, 100.0);
        assert_close(result.breakdown_by_role["business_analyst"].hours, 180.0);

        let module_cost: f64 = result.breakdown_by_module.values().map(|m| m.cost).sum();
        assert_close(module_cost, result.total_labor_cost);
    }

    #[test]
    fn test_duplicate_modules_counted_once() {
        let calc = calculator();
        let once = calc.calculate(&neutral(&["sa_audit"])).unwrap();
        let twice = calc.calculate(&neutral(&["sa_audit", "sa_audit"])).unwrap();
        assert_close(once.total_labor_hours, twice.total_labor_hours);
    }

    #[test]
    fn test_prime_margin_applies_to_subtotal() {
        let mut input = neutral(&["dt_discovery"]);
        input.is_prime_contractor = true;
        let result = calculator().calculate(&input).unwrap();
        assert_close(result.prime_margin, 39_555.0 * 0.15);
        assert_close(result.total_cost, 39_555.0 * 1.15);
    }

    #[test]
    fn test_management_reserve_hits_target_share() {
        let mut input = neutral(&["itm_network_refresh", "itm_server_migration"]);
        input.is_prime_contractor = true;
        input.management_reserve_target = Some(0.25);

        let result = calculator().calculate(&input).unwrap();
        assert!(result.management_reserve > 0.0);
        assert_close(
            (result.management_reserve + result.prime_margin) / result.total_cost,
            0.25,
        );
        assert_close(result.total_cost, result.subtotal / 0.75);
        assert_close(
            result.subtotal + result.prime_margin + result.management_reserve,
            result.total_cost,
        );
        assert_close(result.management_reserve_pct, 0.25);
    }

    #[test]
    fn test_management_reserve_back_solve_directly() {
        // Subtotal 100k, margin 10k, target 20%: total 125k, reserve 15k
        let (reserve, total) = solve_management_reserve(100_000.0, 10_000.0, Some(0.20));
        assert_close(total, 125_000.0);
        assert_close(reserve, 15_000.0);
    }

    #[test]
    fn test_management_reserve_not_negative_when_margin_exceeds_target() {
        let (reserve, total) = solve_management_reserve(100_000.0, 15_000.0, Some(0.10));
        assert_close(reserve, 0.0);
        assert_close(total, 115_000.0);

        let (reserve, total) = solve_management_reserve(100_000.0, 15_000.0, None);
        assert_close(reserve, 0.0);
        assert_close(total, 115_000.0);
    }

    #[test]
    fn test_odc_items_join_subtotal() {
        let mut input = neutral(&["dt_discovery"]);
        input.odc_items = vec![
            OdcItem {
                description: "Travel".to_string(),
                quantity: 4.0,
                unit_cost: 1_250.0,
            },
            OdcItem {
                description: "Licenses".to_string(),
                quantity: 1.0,
                unit_cost: 3_000.0,
            },
        ];
        let result = calculator().calculate(&input).unwrap();
        assert_close(result.odc_total, 8_000.0);
        assert_close(result.subtotal, 39_555.0 + 8_000.0);
        assert_close(result.total_cost, 47_555.0);
    }

    #[test]
    fn test_historical_weight_zero_is_identity() {
        let calc = calculator();
        let plain = calc.calculate(&neutral(&["dt_discovery"])).unwrap();

        let mut input = neutral(&["dt_discovery"]);
        input.historical_actuals = vec![HistoricalActual {
            module_id: "dt_discovery".to_string(),
            actual_hours: 500.0,
        }];
        input.actuals_weight = Some(0.0);
        let blended = calc.calculate(&input).unwrap();

        assert_close(blended.total_labor_hours, plain.total_labor_hours);
        assert_close(blended.total_cost, plain.total_cost);
        assert_eq!(blended.historical_adjustments.len(), 1);
    }

    #[test]
    fn test_historical_blending_rescales_module() {
        let calc = calculator();
        let mut input = neutral(&["dt_discovery", "sa_audit"]);
        input.historical_actuals = vec![
            HistoricalActual {
                module_id: "dt_discovery".to_string(),
                actual_hours: 300.0,
            },
            HistoricalActual {
                module_id: "dt_discovery".to_string(),
                actual_hours: 400.0,
            },
        ];

        input.actuals_weight = Some(1.0);
        let full = calc.calculate(&input).unwrap();
        assert_close(full.breakdown_by_module["dt_discovery"].hours, 350.0);
        // Modules without actuals are untouched
        assert_close(full.breakdown_by_module["sa_audit"].hours, 240.0);

        input.actuals_weight = None;
        let half = calc.calculate(&input).unwrap();
        assert_close(half.breakdown_by_module["dt_discovery"].hours, 280.0);

        let adjustment = &half.historical_adjustments[0];
        assert_eq!(adjustment.sample_count, 2);
        assert_close(adjustment.actual_average, 350.0);
        assert_close(adjustment.scale, 280.0 / 210.0);
    }

    #[test]
    fn test_rejects_invalid_inputs() {
        let calc = calculator();

        assert_eq!(calc.calculate(&neutral(&[])), Err(CalculationError::NoModules));
        assert_eq!(
            calc.calculate(&neutral(&["nope"])),
            Err(CalculationError::UnknownModule("nope".to_string()))
        );

        let mut input = neutral(&["dt_discovery"]);
        input.sites = 0;
        assert_eq!(calc.calculate(&input), Err(CalculationError::InvalidSites));

        let mut input = neutral(&["dt_discovery"]);
        input.management_reserve_target = Some(1.0);
        assert_eq!(
            calc.calculate(&input),
            Err(CalculationError::InvalidReserveTarget(1.0))
        );

        let mut input = neutral(&["dt_discovery"]);
        input.odc_items.push(OdcItem {
            description: "Refund".to_string(),
            quantity: 1.0,
            unit_cost: -10.0,
        });
        assert!(matches!(
            calc.calculate(&input),
            Err(CalculationError::NegativeOdc(_))
        ));
    }

    #[test]
    fn test_validate_reports_missing_prerequisites() {
        let warnings = calculator().validate(&neutral(&["dt_strategy", "unknown_mod"]));
        assert!(warnings.contains(&"Module unknown_mod not found".to_string()));
        assert!(warnings.contains(
            &"Module 'Digital Strategy Development' requires prerequisite 'Discovery & Current State Mapping'"
                .to_string()
        ));

        let warnings = calculator().validate(&neutral(&["dt_discovery", "dt_strategy"]));
        assert!(warnings.is_empty(), "unexpected warnings: {warnings:?}");
    }

    #[test]
    fn test_validate_small_complexity_with_many_modules() {
        let calc = calculator();
        let ids: Vec<&str> = calc.catalog().all_modules().iter().map(|m| m.id.as_str()).collect();
        let mut input = neutral(&ids);
        input.complexity = ComplexityLevel::Small;

        let warnings = calc.validate(&input);
        assert!(warnings
            .iter()
            .any(|w| w == "Small complexity with many modules may be unrealistic"));
    }

    #[test]
    fn test_validate_flags_oversized_module() {
        let calc = calculator();
        let mut input = neutral(&["cm_workload_migration"]);
        input.complexity = ComplexityLevel::ExtraLarge;
        input.environment = "classified".to_string();
        let warnings = calc.validate(&input);
        assert!(warnings.iter().any(|w| w.contains("single-module limit")));
    }

    #[test]
    fn test_quick_calculate() {
        let quick = calculator().quick_calculate(120.0, ComplexityLevel::Medium);
        assert_close(quick.total_hours, 120.0);
        assert_close(quick.total_cost, 18_000.0);

        let quick = calculator().quick_calculate(100.0, ComplexityLevel::ExtraLarge);
        assert_close(quick.total_hours, 230.0);
    }
}
