//! Service layer: estimation logic and clients for external integrations.
//!
//! Contains the catalog and calculator, the LLM-backed narrative service,
//! PDF export, S3 storage, Redis caching, SAM.gov sync and the web scraper.

pub mod ai_client;
pub mod cache;
pub mod calculation;
pub mod catalog;
pub mod contract_sync;
pub mod export;
pub mod narrative;
pub mod reports;
pub mod sam;
pub mod scraper;
pub mod storage;

pub use ai_client::LlmClient;
pub use cache::RedisCache;
pub use calculation::Calculator;
pub use catalog::Catalog;
pub use contract_sync::ContractSync;
pub use narrative::NarrativeService;
pub use reports::ReportBuilder;
pub use sam::SamClient;
pub use scraper::WebScraper;
pub use storage::ObjectStorage;
