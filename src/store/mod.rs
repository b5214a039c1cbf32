//! Persistence layer.
//!
//! Every store is a trait with a Postgres implementation (used when
//! `DATABASE_URL` is set) and an in-memory one for local development and
//! tests.

pub mod contracts;
pub mod proposals;
pub mod report_jobs;
pub mod reports;

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use rand::RngCore;
use serde::Serialize;
use sqlx::PgPool;
use std::sync::Arc;
use thiserror::Error;

pub use contracts::{ContractStore, MemoryContractStore, PgContractStore};
pub use proposals::{MemoryProposalStore, PgProposalStore, ProposalStore};
pub use report_jobs::{MemoryReportJobStore, PgReportJobStore, ReportJobStore};
pub use reports::{MemoryReportRegistry, PgReportRegistry, ReportRegistry};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("{0}")]
    NotFound(String),

    #[error("{0} is not configured")]
    NotConfigured(&'static str),

    #[error("Database error: {0}")]
    Backend(#[from] sqlx::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type StoreResult<T> = Result<T, StoreError>;

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum StoreMode {
    Postgres,
    Memory,
}

impl std::fmt::Display for StoreMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StoreMode::Postgres => write!(f, "postgres"),
            StoreMode::Memory => write!(f, "memory"),
        }
    }
}

/// URL-safe random token of `bytes` random bytes
pub fn random_token(bytes: usize) -> String {
    let mut buf = vec![0u8; bytes];
    rand::thread_rng().fill_bytes(&mut buf);
    URL_SAFE_NO_PAD.encode(buf)
}

/// `prefix_` followed by an 8-byte token, e.g. `prop_Xb3kQ9aLw2s`
pub fn new_id(prefix: &str) -> String {
    format!("{}_{}", prefix, random_token(8))
}

pub fn new_public_id() -> String {
    random_token(12)
}

/// All stores behind trait objects
#[derive(Clone)]
pub struct Stores {
    pub proposals: Arc<dyn ProposalStore>,
    pub contracts: Arc<dyn ContractStore>,
    pub report_jobs: Arc<dyn ReportJobStore>,
    pub reports: Arc<dyn ReportRegistry>,
    pub mode: StoreMode,
    /// Kept for health checks; None in memory mode
    pub pool: Option<PgPool>,
}

impl Stores {
    pub fn postgres(pool: PgPool) -> Self {
        Self {
            proposals: Arc::new(PgProposalStore::new(pool.clone())),
            contracts: Arc::new(PgContractStore::new(pool.clone())),
            report_jobs: Arc::new(PgReportJobStore::new(pool.clone())),
            reports: Arc::new(PgReportRegistry::new(pool.clone())),
            mode: StoreMode::Postgres,
            pool: Some(pool),
        }
    }

    pub fn memory() -> Self {
        Self {
            proposals: Arc::new(MemoryProposalStore::default()),
            contracts: Arc::new(MemoryContractStore::default()),
            report_jobs: Arc::new(MemoryReportJobStore::default()),
            reports: Arc::new(MemoryReportRegistry::default()),
            mode: StoreMode::Memory,
            pool: None,
        }
    }

    pub fn from_pool(pool: Option<PgPool>) -> Self {
        match pool {
            Some(pool) => Self::postgres(pool),
            None => Self::memory(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ids_are_prefixed_and_url_safe() {
        let id = new_id("prop");
        assert!(id.starts_with("prop_"));
        // 8 bytes encode to 11 unpadded base64 chars
        assert_eq!(id.len(), "prop_".len() + 11);
        assert!(id[5..]
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_'));
        assert_ne!(new_id("prop"), new_id("prop"));
        assert_eq!(new_public_id().len(), 16);
    }
}
