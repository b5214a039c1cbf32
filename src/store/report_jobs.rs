//! Async report job persistence

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use serde_json::Value;
use sqlx::types::Json;
use sqlx::PgPool;
use std::collections::HashMap;

use super::{new_id, StoreResult};
use crate::domain::jobs::{JobKind, JobStatus, ReportJob};

#[async_trait]
pub trait ReportJobStore: Send + Sync {
    async fn get_job(&self, job_id: &str) -> StoreResult<Option<ReportJob>>;

    async fn save_job(&self, job: &ReportJob) -> StoreResult<()>;

    /// New job in `queued`
    async fn create_job(
        &self,
        owner_email: &str,
        job_kind: JobKind,
        request_payload: Value,
    ) -> StoreResult<ReportJob> {
        let job = ReportJob::new(new_id("job"), owner_email, job_kind, request_payload);
        self.save_job(&job).await?;
        Ok(job)
    }

    /// None when the job does not exist
    async fn update_status(
        &self,
        job_id: &str,
        status: JobStatus,
        error: Option<String>,
        result: Option<Value>,
    ) -> StoreResult<Option<ReportJob>> {
        let Some(mut job) = self.get_job(job_id).await? else {
            return Ok(None);
        };
        job.transition(status, error, result, Utc::now());
        self.save_job(&job).await?;
        Ok(Some(job))
    }
}

#[derive(Default)]
pub struct MemoryReportJobStore {
    jobs: Mutex<HashMap<String, ReportJob>>,
}

#[async_trait]
impl ReportJobStore for MemoryReportJobStore {
    async fn get_job(&self, job_id: &str) -> StoreResult<Option<ReportJob>> {
        Ok(self.jobs.lock().get(job_id).cloned())
    }

    async fn save_job(&self, job: &ReportJob) -> StoreResult<()> {
        self.jobs.lock().insert(job.job_id.clone(), job.clone());
        Ok(())
    }
}

pub struct PgReportJobStore {
    pool: PgPool,
}

impl PgReportJobStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ReportJobStore for PgReportJobStore {
    async fn get_job(&self, job_id: &str) -> StoreResult<Option<ReportJob>> {
        let row: Option<(Json<ReportJob>,)> =
            sqlx::query_as("SELECT body FROM report_jobs WHERE job_id = $1")
                .bind(job_id)
                .fetch_optional(&self.pool)
                .await?;
        Ok(row.map(|(Json(job),)| job))
    }

    async fn save_job(&self, job: &ReportJob) -> StoreResult<()> {
        sqlx::query(
            "INSERT INTO report_jobs (job_id, owner_email, body) VALUES ($1, $2, $3) \
             ON CONFLICT (job_id) DO UPDATE SET body = EXCLUDED.body",
        )
        .bind(&job.job_id)
        .bind(&job.owner_email)
        .bind(Json(job))
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_job_lifecycle() {
        let store = MemoryReportJobStore::default();
        let job = store
            .create_job("a@x.gov", JobKind::Report, json!({"modules": ["sa_audit"]}))
            .await
            .unwrap();
        assert!(job.job_id.starts_with("job_"));
        assert_eq!(job.status, JobStatus::Queued);

        let running = store
            .update_status(&job.job_id, JobStatus::Running, None, None)
            .await
            .unwrap()
            .unwrap();
        assert!(running.started_at.is_some());
        assert!(running.finished_at.is_none());

        let done = store
            .update_status(
                &job.job_id,
                JobStatus::Completed,
                None,
                Some(json!({"filename": "x.pdf"})),
            )
            .await
            .unwrap()
            .unwrap();
        assert_eq!(done.started_at, running.started_at);
        assert!(done.finished_at.is_some());
        assert_eq!(done.result_payload, Some(json!({"filename": "x.pdf"})));

        let stored = store.get_job(&job.job_id).await.unwrap().unwrap();
        assert_eq!(stored.status, JobStatus::Completed);

        assert!(store
            .update_status("job_missing", JobStatus::Running, None, None)
            .await
            .unwrap()
            .is_none());
    }
}
