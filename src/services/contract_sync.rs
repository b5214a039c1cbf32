//! SAM.gov contract sync.
//!
//! One run at a time per process; a second caller gets `already_running`
//! instead of waiting. Each run spends one request from a daily quota that
//! resets at UTC midnight. Records are upserted by (source, source_id) so
//! user tracking on existing contracts survives a refresh.

use anyhow::Result;
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{error, info, instrument, warn};

use super::sam::{normalize_record, OpportunitySource, MAX_DAYS_BACK, MAX_PAGE_SIZE};
use crate::config::Settings;
use crate::domain::contracts::{
    SyncOutcome, SyncReport, SyncRequest, SyncState, SyncStatus, SAM_SOURCE,
};
use crate::store::{ContractStore, StoreResult};

pub struct ContractSync {
    source: Option<Arc<dyn OpportunitySource>>,
    store: Arc<dyn ContractStore>,
    run_lock: Mutex<()>,
    enabled: bool,
    daily_quota: u32,
    interval: Duration,
    days_back: u32,
    page_size: u32,
    default_query: Option<String>,
}

struct Counts {
    fetched: usize,
    created: usize,
    updated: usize,
}

impl ContractSync {
    pub fn new(
        settings: &Settings,
        source: Option<Arc<dyn OpportunitySource>>,
        store: Arc<dyn ContractStore>,
    ) -> Self {
        Self {
            source,
            store,
            run_lock: Mutex::new(()),
            enabled: settings.sam_sync_enabled,
            daily_quota: settings.sam_daily_request_quota,
            interval: Duration::from_secs(settings.sam_sync_interval_seconds.max(60)),
            days_back: settings.sam_sync_days_back.max(1),
            page_size: settings.sam_sync_page_size.clamp(1, MAX_PAGE_SIZE),
            default_query: settings.sam_sync_query.clone(),
        }
    }

    pub fn is_configured(&self) -> bool {
        self.source.is_some()
    }

    pub async fn status(&self) -> StoreResult<SyncStatus> {
        Ok(SyncStatus {
            enabled: self.enabled,
            configured: self.is_configured(),
            running: self.run_lock.try_lock().is_err(),
            daily_request_quota: self.daily_quota,
            interval_seconds: self.interval.as_secs(),
            state: self.store.get_sync_state(SAM_SOURCE).await?,
        })
    }

    #[instrument(skip(self, request))]
    pub async fn run_once(&self, trigger: &str, request: SyncRequest) -> SyncReport {
        let Some(source) = self.source.as_ref() else {
            return SyncReport::empty(SyncOutcome::NotConfigured, trigger);
        };
        let Ok(_guard) = self.run_lock.try_lock() else {
            info!("Contract sync already running");
            return SyncReport::empty(SyncOutcome::AlreadyRunning, trigger);
        };

        let mut state = match self.store.get_sync_state(SAM_SOURCE).await {
            Ok(state) => state.unwrap_or_else(|| SyncState::new(SAM_SOURCE, Utc::now())),
            Err(e) => {
                error!(error = %e, "Failed to load sync state");
                let mut report = SyncReport::empty(SyncOutcome::Failed, trigger);
                report.error = Some(e.to_string());
                return report;
            }
        };

        let now = Utc::now();
        state.roll_quota(now);
        if state.requests_today >= self.daily_quota {
            warn!(
                requests_today = state.requests_today,
                quota = self.daily_quota,
                "SAM.gov daily quota exhausted, skipping run"
            );
            state.updated_at = now;
            if let Err(e) = self.store.save_sync_state(&state).await {
                warn!(error = %e, "Failed to save sync state");
            }
            let mut report = SyncReport::empty(SyncOutcome::QuotaExhausted, trigger);
            report.state = Some(state);
            return report;
        }

        // The request is counted before it is made
        state.requests_today += 1;
        state.last_run_at = Some(now);
        state.updated_at = now;
        if let Err(e) = self.store.save_sync_state(&state).await {
            warn!(error = %e, "Failed to save sync state");
        }

        let result = self.fetch_and_upsert(source.as_ref(), &request).await;
        let finished = Utc::now();
        state.updated_at = finished;

        let mut report = match result {
            Ok(counts) => {
                state.last_success_at = Some(finished);
                state.last_error = None;
                state.last_fetched = counts.fetched;
                state.last_created = counts.created;
                state.last_updated = counts.updated;
                info!(
                    fetched = counts.fetched,
                    created = counts.created,
                    updated = counts.updated,
                    "Contract sync completed"
                );
                SyncReport {
                    fetched: counts.fetched,
                    created: counts.created,
                    updated: counts.updated,
                    ..SyncReport::empty(SyncOutcome::Completed, trigger)
                }
            }
            Err(e) => {
                error!(error = %e, "Contract sync failed");
                state.last_error = Some(e.to_string());
                let mut report = SyncReport::empty(SyncOutcome::Failed, trigger);
                report.error = Some(e.to_string());
                report
            }
        };

        if let Err(e) = self.store.save_sync_state(&state).await {
            warn!(error = %e, "Failed to save sync state");
        }
        report.state = Some(state);
        report
    }

    async fn fetch_and_upsert(
        &self,
        source: &dyn OpportunitySource,
        request: &SyncRequest,
    ) -> Result<Counts> {
        let query = request
            .query
            .as_deref()
            .or(self.default_query.as_deref());
        let days_back = request
            .days_back
            .unwrap_or(self.days_back)
            .clamp(1, MAX_DAYS_BACK);
        let limit = request.limit.unwrap_or(self.page_size);

        let records = source.search(query, days_back, limit, 0).await?;
        let mut counts = Counts {
            fetched: records.len(),
            created: 0,
            updated: 0,
        };

        for record in &records {
            let fresh = normalize_record(record);
            let Some(source_id) = fresh.source_id.clone() else {
                continue;
            };
            let now = Utc::now();
            match self.store.find_by_source_id(SAM_SOURCE, &source_id).await? {
                Some(mut existing) => {
                    existing.refresh_from_source(fresh, now);
                    self.store.save_contract(&existing).await?;
                    counts.updated += 1;
                }
                None => {
                    let mut fresh = fresh;
                    fresh.last_seen_at = Some(now);
                    self.store.create_contract(fresh).await?;
                    counts.created += 1;
                }
            }
        }
        Ok(counts)
    }

    /// Background loop, started only when sync is enabled and a key is set.
    pub fn spawn_poller(self: Arc<Self>) -> Option<JoinHandle<()>> {
        if !self.enabled || !self.is_configured() {
            return None;
        }
        info!(interval_secs = self.interval.as_secs(), "Starting SAM.gov poller");
        Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(self.interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                let report = self.run_once("poller", SyncRequest::default()).await;
                tracing::debug!(outcome = ?report.outcome, "Poller run finished");
            }
        }))
    }
}
