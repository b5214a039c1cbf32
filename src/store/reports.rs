//! Registry of generated reports kept in object storage

use async_trait::async_trait;
use parking_lot::Mutex;
use sqlx::types::Json;
use sqlx::PgPool;
use std::collections::HashMap;

use super::StoreResult;
use crate::domain::reports::ReportRecord;

#[async_trait]
pub trait ReportRegistry: Send + Sync {
    async fn save_report(&self, record: &ReportRecord) -> StoreResult<()>;

    async fn get_report(&self, owner_email: &str, report_id: &str)
        -> StoreResult<Option<ReportRecord>>;

    /// True when a record was removed
    async fn delete_report(&self, owner_email: &str, report_id: &str) -> StoreResult<bool>;

    /// Newest first
    async fn list_reports(
        &self,
        owner_email: &str,
        proposal_id: Option<&str>,
        limit: usize,
    ) -> StoreResult<Vec<ReportRecord>>;
}

#[derive(Default)]
pub struct MemoryReportRegistry {
    reports: Mutex<HashMap<(String, String), ReportRecord>>,
}

#[async_trait]
impl ReportRegistry for MemoryReportRegistry {
    async fn save_report(&self, record: &ReportRecord) -> StoreResult<()> {
        self.reports.lock().insert(
            (record.owner_email.clone(), record.report_id.clone()),
            record.clone(),
        );
        Ok(())
    }

    async fn get_report(
        &self,
        owner_email: &str,
        report_id: &str,
    ) -> StoreResult<Option<ReportRecord>> {
        Ok(self
            .reports
            .lock()
            .get(&(owner_email.to_string(), report_id.to_string()))
            .cloned())
    }

    async fn delete_report(&self, owner_email: &str, report_id: &str) -> StoreResult<bool> {
        Ok(self
            .reports
            .lock()
            .remove(&(owner_email.to_string(), report_id.to_string()))
            .is_some())
    }

    async fn list_reports(
        &self,
        owner_email: &str,
        proposal_id: Option<&str>,
        limit: usize,
    ) -> StoreResult<Vec<ReportRecord>> {
        let mut rows: Vec<ReportRecord> = self
            .reports
            .lock()
            .values()
            .filter(|r| r.owner_email == owner_email)
            .filter(|r| proposal_id.is_none() || r.proposal_id.as_deref() == proposal_id)
            .cloned()
            .collect();
        rows.sort_by(|a, b| {
            b.updated_at
                .cmp(&a.updated_at)
                .then_with(|| b.created_at.cmp(&a.created_at))
        });
        rows.truncate(limit);
        Ok(rows)
    }
}

pub struct PgReportRegistry {
    pool: PgPool,
}

impl PgReportRegistry {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ReportRegistry for PgReportRegistry {
    async fn save_report(&self, record: &ReportRecord) -> StoreResult<()> {
        sqlx::query(
            "INSERT INTO reports (owner_email, report_id, proposal_id, updated_at, body) \
             VALUES ($1, $2, $3, $4, $5) \
             ON CONFLICT (owner_email, report_id) DO UPDATE SET \
               proposal_id = EXCLUDED.proposal_id, updated_at = EXCLUDED.updated_at, body = EXCLUDED.body",
        )
        .bind(&record.owner_email)
        .bind(&record.report_id)
        .bind(&record.proposal_id)
        .bind(record.updated_at)
        .bind(Json(record))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_report(
        &self,
        owner_email: &str,
        report_id: &str,
    ) -> StoreResult<Option<ReportRecord>> {
        let row: Option<(Json<ReportRecord>,)> =
            sqlx::query_as("SELECT body FROM reports WHERE owner_email = $1 AND report_id = $2")
                .bind(owner_email)
                .bind(report_id)
                .fetch_optional(&self.pool)
                .await?;
        Ok(row.map(|(Json(r),)| r))
    }

    async fn delete_report(&self, owner_email: &str, report_id: &str) -> StoreResult<bool> {
        let result = sqlx::query("DELETE FROM reports WHERE owner_email = $1 AND report_id = $2")
            .bind(owner_email)
            .bind(report_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn list_reports(
        &self,
        owner_email: &str,
        proposal_id: Option<&str>,
        limit: usize,
    ) -> StoreResult<Vec<ReportRecord>> {
        let rows: Vec<(Json<ReportRecord>,)> = sqlx::query_as(
            "SELECT body FROM reports \
             WHERE owner_email = $1 AND ($2::TEXT IS NULL OR proposal_id = $2) \
             ORDER BY updated_at DESC LIMIT $3",
        )
        .bind(owner_email)
        .bind(proposal_id)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(|(Json(r),)| r).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};
    use serde_json::Value;

    fn record(owner: &str, id: &str, proposal: Option<&str>, age_minutes: i64) -> ReportRecord {
        let at = Utc::now() - Duration::minutes(age_minutes);
        ReportRecord {
            owner_email: owner.to_string(),
            report_id: id.to_string(),
            filename: format!("{id}.pdf"),
            content_type: "application/pdf".to_string(),
            bucket: "reports".to_string(),
            key: format!("reports/{id}.pdf"),
            size_bytes: 1024,
            created_by: owner.to_string(),
            tool_version: Some("test".to_string()),
            proposal_id: proposal.map(str::to_string),
            proposal_title: None,
            proposal_public_id: None,
            proposal_version: None,
            total_cost: Some(1000.0),
            total_hours: Some(10.0),
            module_count: Some(1),
            complexity: Some("M".to_string()),
            period_of_performance: None,
            estimating_method: None,
            tone: None,
            include_ai: false,
            report_label: None,
            payload: Value::Null,
            created_at: at,
            updated_at: at,
        }
    }

    #[tokio::test]
    async fn test_list_scoped_to_owner_newest_first() {
        let registry = MemoryReportRegistry::default();
        registry.save_report(&record("a@x.gov", "rep_old", Some("prop_1"), 30)).await.unwrap();
        registry.save_report(&record("a@x.gov", "rep_new", None, 1)).await.unwrap();
        registry.save_report(&record("b@x.gov", "rep_other", None, 5)).await.unwrap();

        let ids: Vec<String> = registry
            .list_reports("a@x.gov", None, 10)
            .await
            .unwrap()
            .into_iter()
            .map(|r| r.report_id)
            .collect();
        assert_eq!(ids, vec!["rep_new", "rep_old"]);

        let linked = registry.list_reports("a@x.gov", Some("prop_1"), 10).await.unwrap();
        assert_eq!(linked.len(), 1);

        assert!(registry.get_report("b@x.gov", "rep_old").await.unwrap().is_none());
        assert!(registry.delete_report("a@x.gov", "rep_old").await.unwrap());
        assert!(!registry.delete_report("a@x.gov", "rep_old").await.unwrap());
    }
}
