//! Async report job domain types
//!
//! Long-running report and subtask generation runs in the background; clients
//! poll the job record.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Job status
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Queued,
    Running,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            JobStatus::Queued => write!(f, "queued"),
            JobStatus::Running => write!(f, "running"),
            JobStatus::Completed => write!(f, "completed"),
            JobStatus::Failed => write!(f, "failed"),
        }
    }
}

/// What the job produces
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum JobKind {
    Report,
    Subtasks,
}

impl std::fmt::Display for JobKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            JobKind::Report => write!(f, "report"),
            JobKind::Subtasks => write!(f, "subtasks"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ReportJob {
    pub job_id: String,
    pub owner_email: String,
    pub job_kind: JobKind,
    pub status: JobStatus,
    pub request_payload: Value,
    #[serde(default)]
    pub result_payload: Option<Value>,
    #[serde(default)]
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub finished_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

impl ReportJob {
    pub fn new(job_id: String, owner_email: &str, job_kind: JobKind, request_payload: Value) -> Self {
        let now = Utc::now();
        Self {
            job_id,
            owner_email: owner_email.to_string(),
            job_kind,
            status: JobStatus::Queued,
            request_payload,
            result_payload: None,
            error: None,
            created_at: now,
            started_at: None,
            finished_at: None,
            updated_at: now,
        }
    }

    /// `running` stamps `started_at` once; terminal states stamp `finished_at`.
    pub fn transition(
        &mut self,
        status: JobStatus,
        error: Option<String>,
        result: Option<Value>,
        now: DateTime<Utc>,
    ) {
        self.status = status;
        self.updated_at = now;
        if status == JobStatus::Running && self.started_at.is_none() {
            self.started_at = Some(now);
        }
        if status.is_terminal() {
            self.finished_at = Some(now);
        }
        if error.is_some() {
            self.error = error;
        }
        if result.is_some() {
            self.result_payload = result;
        }
    }
}

/// Response to a job submission
#[derive(Debug, Clone, Serialize)]
pub struct JobAccepted {
    pub job_id: String,
    pub status: JobStatus,
    pub job_kind: JobKind,
}

impl From<&ReportJob> for JobAccepted {
    fn from(job: &ReportJob) -> Self {
        Self {
            job_id: job.job_id.clone(),
            status: job.status,
            job_kind: job.job_kind,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_status_transitions_stamp_times() {
        let mut job = ReportJob::new("job_1".into(), "a@x.gov", JobKind::Report, Value::Null);
        assert_eq!(job.status, JobStatus::Queued);
        assert!(job.started_at.is_none());

        let t1 = Utc::now();
        job.transition(JobStatus::Running, None, None, t1);
        assert_eq!(job.started_at, Some(t1));
        assert!(job.finished_at.is_none());

        // A second running update keeps the first start time
        let t2 = t1 + Duration::seconds(5);
        job.transition(JobStatus::Running, None, None, t2);
        assert_eq!(job.started_at, Some(t1));

        let t3 = t2 + Duration::seconds(5);
        job.transition(JobStatus::Failed, Some("boom".into()), None, t3);
        assert_eq!(job.finished_at, Some(t3));
        assert_eq!(job.error.as_deref(), Some("boom"));
        assert_eq!(job.updated_at, t3);
    }

    #[test]
    fn test_status_serializes_snake_case() {
        assert_eq!(serde_json::to_value(JobStatus::Completed).unwrap(), "completed");
        assert_eq!(serde_json::to_value(JobKind::Subtasks).unwrap(), "subtasks");
    }
}
