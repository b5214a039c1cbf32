//! Catalog domain types: labor roles, cost modules and the multiplier tables.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Project size band
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum ComplexityLevel {
    #[serde(rename = "S")]
    Small,
    #[serde(rename = "M")]
    Medium,
    #[serde(rename = "L")]
    Large,
    #[serde(rename = "XL")]
    ExtraLarge,
}

impl ComplexityLevel {
    pub fn code(&self) -> &'static str {
        match self {
            Self::Small => "S",
            Self::Medium => "M",
            Self::Large => "L",
            Self::ExtraLarge => "XL",
        }
    }
}

impl Default for ComplexityLevel {
    fn default() -> Self {
        Self::Medium
    }
}

impl std::fmt::Display for ComplexityLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.code())
    }
}

/// Practice area a module belongs to
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum FocusArea {
    #[serde(rename = "DT")]
    DigitalTransformation,
    #[serde(rename = "ITM")]
    ItModernization,
    #[serde(rename = "SA")]
    SecurityAssurance,
    #[serde(rename = "CM")]
    CloudMigration,
    #[serde(rename = "DA")]
    DataAnalytics,
}

impl FocusArea {
    pub const ALL: [FocusArea; 5] = [
        Self::DigitalTransformation,
        Self::ItModernization,
        Self::SecurityAssurance,
        Self::CloudMigration,
        Self::DataAnalytics,
    ];

    pub fn code(&self) -> &'static str {
        match self {
            Self::DigitalTransformation => "DT",
            Self::ItModernization => "ITM",
            Self::SecurityAssurance => "SA",
            Self::CloudMigration => "CM",
            Self::DataAnalytics => "DA",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::DigitalTransformation => "Digital Transformation",
            Self::ItModernization => "IT Modernization",
            Self::SecurityAssurance => "Security Assurance",
            Self::CloudMigration => "Cloud Migration",
            Self::DataAnalytics => "Data Analytics",
        }
    }
}

impl std::fmt::Display for FocusArea {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.code())
    }
}

/// Labor category with its rate adjustments
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Role {
    pub id: String,
    pub name: String,
    pub base_hourly_rate: f64,
    pub clearance_multiplier: BTreeMap<String, f64>,
    pub geography_multiplier: BTreeMap<String, f64>,
}

impl Role {
    pub fn new(id: &str, name: &str, base_hourly_rate: f64) -> Self {
        Self {
            id: id.to_string(),
            name: name.to_string(),
            base_hourly_rate,
            clearance_multiplier: [
                ("none", 1.0),
                ("public_trust", 1.1),
                ("secret", 1.3),
                ("top_secret", 1.6),
            ]
            .into_iter()
            .map(|(k, v)| (k.to_string(), v))
            .collect(),
            geography_multiplier: [
                ("dc_metro", 1.2),
                ("major_city", 1.1),
                ("standard", 1.0),
                ("rural", 0.9),
            ]
            .into_iter()
            .map(|(k, v)| (k.to_string(), v))
            .collect(),
        }
    }
}

/// Unit of estimable work with base hours per role
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Module {
    pub id: String,
    pub name: String,
    pub focus_area: FocusArea,
    /// Ordered by role id so breakdowns are deterministic
    pub base_hours_by_role: BTreeMap<String, f64>,
    #[serde(default)]
    pub prerequisites: Vec<String>,
    #[serde(default = "default_risk_factor")]
    pub risk_factor: f64,
}

fn default_risk_factor() -> f64 {
    1.0
}

impl Module {
    pub fn base_hours(&self) -> f64 {
        self.base_hours_by_role.values().sum()
    }
}

/// Hours multipliers keyed by delivery context
#[derive(Debug, Clone, Serialize)]
pub struct ComplexityMatrix {
    pub environment_factor: BTreeMap<String, f64>,
    pub integration_complexity: BTreeMap<String, f64>,
}

impl ComplexityMatrix {
    pub fn base_multiplier(level: ComplexityLevel) -> f64 {
        match level {
            ComplexityLevel::Small => 0.7,
            ComplexityLevel::Medium => 1.0,
            ComplexityLevel::Large => 1.6,
            ComplexityLevel::ExtraLarge => 2.3,
        }
    }
}

impl Default for ComplexityMatrix {
    fn default() -> Self {
        let table = |pairs: &[(&str, f64)]| {
            pairs
                .iter()
                .map(|(k, v)| (k.to_string(), *v))
                .collect::<BTreeMap<_, _>>()
        };
        Self {
            environment_factor: table(&[
                ("development", 1.0),
                ("staging", 1.2),
                ("production", 1.5),
                ("classified", 2.0),
            ]),
            integration_complexity: table(&[
                ("standalone", 1.0),
                ("light_integration", 1.2),
                ("moderate_integration", 1.5),
                ("heavy_integration", 2.0),
            ]),
        }
    }
}

/// Business rules applied on top of labor
#[derive(Debug, Clone, Serialize)]
pub struct EstimationRules {
    pub min_project_hours: f64,
    pub max_single_module_hours: f64,
    pub utilization_rate: f64,
    pub risk_reserve_percentage: f64,
    pub overhead_multiplier: f64,
    pub prime_contractor_margin: f64,
    /// Added to the hours multiplier for each site beyond the first
    pub site_multiplier_step: f64,
    pub overtime_rate_premium: f64,
    pub default_actuals_weight: f64,
    pub annual_hours: f64,
}

impl Default for EstimationRules {
    fn default() -> Self {
        Self {
            min_project_hours: 40.0,
            max_single_module_hours: 2000.0,
            utilization_rate: 0.85,
            risk_reserve_percentage: 0.15,
            overhead_multiplier: 1.2,
            prime_contractor_margin: 0.15,
            site_multiplier_step: 0.10,
            overtime_rate_premium: 1.10,
            default_actuals_weight: 0.5,
            annual_hours: 2080.0,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct FocusAreaInfo {
    pub code: FocusArea,
    pub label: &'static str,
    pub module_count: usize,
}
