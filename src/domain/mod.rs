//! Domain types and DTOs
//!
//! Catalog and estimation types, proposals, contracts, report jobs and the
//! request/response shapes of the AI and scraping endpoints.

pub mod auth;
pub mod catalog;
pub mod contracts;
pub mod estimation;
pub mod jobs;
pub mod narrative;
pub mod proposals;
pub mod reports;
pub mod scrape;
