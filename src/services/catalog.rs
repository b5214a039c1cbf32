//! Static role and module catalog.

use std::collections::BTreeMap;

use crate::domain::catalog::{FocusArea, FocusAreaInfo, Module, Role};

/// In-memory catalog of labor roles and estimable modules.
#[derive(Debug, Clone)]
pub struct Catalog {
    roles: Vec<Role>,
    modules: Vec<Module>,
}

fn module(
    id: &str,
    name: &str,
    focus_area: FocusArea,
    hours: &[(&str, f64)],
    prerequisites: &[&str],
) -> Module {
    Module {
        id: id.to_string(),
        name: name.to_string(),
        focus_area,
        base_hours_by_role: hours
            .iter()
            .map(|(role, h)| (role.to_string(), *h))
            .collect::<BTreeMap<_, _>>(),
        prerequisites: prerequisites.iter().map(|p| p.to_string()).collect(),
        risk_factor: 1.0,
    }
}

impl Catalog {
    pub fn new() -> Self {
        Self {
            roles: default_roles(),
            modules: default_modules(),
        }
    }

    pub fn get_module(&self, module_id: &str) -> Option<&Module> {
        self.modules.iter().find(|m| m.id == module_id)
    }

    pub fn get_modules_by_focus_area(&self, focus_area: FocusArea) -> Vec<&Module> {
        self.modules
            .iter()
            .filter(|m| m.focus_area == focus_area)
            .collect()
    }

    /// All modules in catalog order
    pub fn all_modules(&self) -> &[Module] {
        &self.modules
    }

    pub fn get_role(&self, role_id: &str) -> Option<&Role> {
        self.roles.iter().find(|r| r.id == role_id)
    }

    pub fn all_roles(&self) -> &[Role] {
        &self.roles
    }

    pub fn focus_areas(&self) -> Vec<FocusAreaInfo> {
        FocusArea::ALL
            .iter()
            .map(|fa| FocusAreaInfo {
                code: *fa,
                label: fa.label(),
                module_count: self.get_modules_by_focus_area(*fa).len(),
            })
            .collect()
    }
}

impl Default for Catalog {
    fn default() -> Self {
        Self::new()
    }
}

fn default_roles() -> Vec<Role> {
    vec![
        Role::new("solution_architect", "Solution Architect", 175.0),
        Role::new("technical_lead", "Technical Lead", 150.0),
        Role::new("senior_engineer", "Senior Engineer", 135.0),
        Role::new("engineer", "Engineer", 110.0),
        Role::new("junior_engineer", "Junior Engineer", 85.0),
        Role::new("project_manager", "Project Manager", 140.0),
        Role::new("business_analyst", "Business Analyst", 125.0),
        Role::new("security_specialist", "Security Specialist", 160.0),
        Role::new("data_engineer", "Data Engineer", 145.0),
        Role::new("cloud_architect", "Cloud Architect", 165.0),
    ]
}

fn default_modules() -> Vec<Module> {
    use FocusArea::*;
    vec![
        module(
            "dt_discovery",
            "Discovery & Current State Mapping",
            DigitalTransformation,
            &[
                ("solution_architect", 40.0),
                ("business_analyst", 80.0),
                ("senior_engineer", 60.0),
                ("project_manager", 30.0),
            ],
            &[],
        ),
        module(
            "dt_strategy",
            "Digital Strategy Development",
            DigitalTransformation,
            &[
                ("solution_architect", 60.0),
                ("business_analyst", 100.0),
                ("project_manager", 40.0),
            ],
            &["dt_discovery"],
        ),
        module(
            "itm_assessment",
            "Legacy System Assessment",
            ItModernization,
            &[
                ("solution_architect", 50.0),
                ("technical_lead", 80.0),
                ("senior_engineer", 120.0),
                ("security_specialist", 40.0),
            ],
            &[],
        ),
        module(
            "itm_network_refresh",
            "Network Core Refresh",
            ItModernization,
            &[
                ("technical_lead", 100.0),
                ("senior_engineer", 200.0),
                ("engineer", 150.0),
                ("project_manager", 50.0),
            ],
            &[],
        ),
        module(
            "itm_server_migration",
            "Server Infrastructure Migration",
            ItModernization,
            &[
                ("solution_architect", 60.0),
                ("technical_lead", 80.0),
                ("senior_engineer", 160.0),
                ("engineer", 200.0),
                ("project_manager", 60.0),
            ],
            &[],
        ),
        module(
            "sa_audit",
            "Security Audit & Assessment",
            SecurityAssurance,
            &[
                ("security_specialist", 120.0),
                ("senior_engineer", 80.0),
                ("business_analyst", 40.0),
            ],
            &[],
        ),
        module(
            "sa_compliance",
            "Compliance Framework Implementation",
            SecurityAssurance,
            &[
                ("security_specialist", 160.0),
                ("solution_architect", 40.0),
                ("business_analyst", 80.0),
                ("project_manager", 60.0),
            ],
            &["sa_audit"],
        ),
        module(
            "sa_license_audit",
            "License Audit & Rightsizing",
            SecurityAssurance,
            &[
                ("business_analyst", 60.0),
                ("senior_engineer", 40.0),
                ("project_manager", 20.0),
            ],
            &[],
        ),
        module(
            "cm_assessment",
            "Cloud Readiness Assessment",
            CloudMigration,
            &[
                ("cloud_architect", 80.0),
                ("solution_architect", 40.0),
                ("security_specialist", 60.0),
                ("business_analyst", 40.0),
            ],
            &[],
        ),
        module(
            "cm_migration_plan",
            "Cloud Migration Planning",
            CloudMigration,
            &[
                ("cloud_architect", 100.0),
                ("solution_architect", 60.0),
                ("project_manager", 80.0),
            ],
            &["cm_assessment"],
        ),
        module(
            "cm_workload_migration",
            "Workload Migration Execution",
            CloudMigration,
            &[
                ("cloud_architect", 60.0),
                ("technical_lead", 100.0),
                ("senior_engineer", 200.0),
                ("engineer", 240.0),
                ("project_manager", 80.0),
            ],
            &["cm_migration_plan"],
        ),
        module(
            "da_discovery",
            "Data Landscape Discovery",
            DataAnalytics,
            &[
                ("data_engineer", 80.0),
                ("business_analyst", 100.0),
                ("solution_architect", 40.0),
            ],
            &[],
        ),
        module(
            "da_pipeline",
            "Data Pipeline Development",
            DataAnalytics,
            &[
                ("data_engineer", 160.0),
                ("senior_engineer", 120.0),
                ("engineer", 100.0),
                ("project_manager", 40.0),
            ],
            &["da_discovery"],
        ),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_module_role_exists() {
        let catalog = Catalog::new();
        for module in catalog.all_modules() {
            for role_id in module.base_hours_by_role.keys() {
                assert!(
                    catalog.get_role(role_id).is_some(),
                    "module {} references unknown role {}",
                    module.id,
                    role_id
                );
            }
        }
    }

    #[test]
    fn test_every_prerequisite_exists() {
        let catalog = Catalog::new();
        for module in catalog.all_modules() {
            for prereq in &module.prerequisites {
                assert!(catalog.get_module(prereq).is_some());
            }
        }
    }

    #[test]
    fn test_focus_area_lookup() {
        let catalog = Catalog::new();
        let cloud = catalog.get_modules_by_focus_area(FocusArea::CloudMigration);
        assert_eq!(cloud.len(), 3);
        assert_eq!(catalog.all_roles().len(), 10);

        let total: usize = catalog.focus_areas().iter().map(|f| f.module_count).sum();
        assert_eq!(total, catalog.all_modules().len());
    }

    #[test]
    fn test_module_base_hours() {
        let catalog = Catalog::new();
        let discovery = catalog.get_module("dt_discovery").unwrap();
        assert_eq!(discovery.base_hours(), 210.0);
    }
}
