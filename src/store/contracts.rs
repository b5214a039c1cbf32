//! Contract opportunity and sync-state persistence

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use parking_lot::Mutex;
use sqlx::types::Json;
use sqlx::PgPool;
use std::collections::HashMap;

use super::{new_id, StoreResult};
use crate::domain::contracts::{
    sort_contracts, Contract, ContractFilter, ContractPatch, ContractStats, NewContract,
    StatusTally, SyncState,
};

#[async_trait]
pub trait ContractStore: Send + Sync {
    async fn create_contract(&self, new: NewContract) -> StoreResult<Contract>;

    async fn get_contract(&self, contract_id: &str) -> StoreResult<Option<Contract>>;

    /// Insert or replace by contract id
    async fn save_contract(&self, contract: &Contract) -> StoreResult<()>;

    /// None when the contract does not exist
    async fn update_contract(
        &self,
        contract_id: &str,
        patch: ContractPatch,
    ) -> StoreResult<Option<Contract>> {
        let Some(mut contract) = self.get_contract(contract_id).await? else {
            return Ok(None);
        };
        contract.apply_patch(patch, Utc::now());
        self.save_contract(&contract).await?;
        Ok(Some(contract))
    }

    /// Newest posted first
    async fn list_contracts(&self, filter: &ContractFilter) -> StoreResult<Vec<Contract>>;

    async fn find_by_source_id(
        &self,
        source: &str,
        source_id: &str,
    ) -> StoreResult<Option<Contract>>;

    /// Pipeline totals over every stored contract
    async fn contract_stats(&self, now: DateTime<Utc>) -> StoreResult<ContractStats>;

    async fn get_sync_state(&self, source: &str) -> StoreResult<Option<SyncState>>;

    async fn save_sync_state(&self, state: &SyncState) -> StoreResult<()>;
}

// ============================================================================
// In-memory
// ============================================================================

#[derive(Default)]
pub struct MemoryContractStore {
    contracts: Mutex<HashMap<String, Contract>>,
    sync: Mutex<HashMap<String, SyncState>>,
}

#[async_trait]
impl ContractStore for MemoryContractStore {
    async fn create_contract(&self, new: NewContract) -> StoreResult<Contract> {
        let contract = Contract::from_new(new_id("con"), new, Utc::now());
        self.contracts
            .lock()
            .insert(contract.contract_id.clone(), contract.clone());
        Ok(contract)
    }

    async fn get_contract(&self, contract_id: &str) -> StoreResult<Option<Contract>> {
        Ok(self.contracts.lock().get(contract_id).cloned())
    }

    async fn save_contract(&self, contract: &Contract) -> StoreResult<()> {
        self.contracts
            .lock()
            .insert(contract.contract_id.clone(), contract.clone());
        Ok(())
    }

    async fn list_contracts(&self, filter: &ContractFilter) -> StoreResult<Vec<Contract>> {
        let mut rows: Vec<Contract> = self
            .contracts
            .lock()
            .values()
            .filter(|c| filter.matches(c))
            .cloned()
            .collect();
        sort_contracts(&mut rows);
        Ok(rows
            .into_iter()
            .skip(filter.offset)
            .take(ContractFilter::clamp_limit(filter.limit))
            .collect())
    }

    async fn contract_stats(&self, now: DateTime<Utc>) -> StoreResult<ContractStats> {
        Ok(ContractStats::compute(self.contracts.lock().values(), now))
    }

    async fn find_by_source_id(
        &self,
        source: &str,
        source_id: &str,
    ) -> StoreResult<Option<Contract>> {
        Ok(self
            .contracts
            .lock()
            .values()
            .find(|c| c.source == source && c.source_id.as_deref() == Some(source_id))
            .cloned())
    }

    async fn get_sync_state(&self, source: &str) -> StoreResult<Option<SyncState>> {
        Ok(self.sync.lock().get(source).cloned())
    }

    async fn save_sync_state(&self, state: &SyncState) -> StoreResult<()> {
        self.sync.lock().insert(state.source.clone(), state.clone());
        Ok(())
    }
}

// ============================================================================
// Postgres
// ============================================================================

pub struct PgContractStore {
    pool: PgPool,
}

impl PgContractStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

/// `%needle%` with LIKE metacharacters escaped
fn like_pattern(q: &str) -> String {
    let escaped = q
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_");
    format!("%{}%", escaped)
}

#[async_trait]
impl ContractStore for PgContractStore {
    async fn create_contract(&self, new: NewContract) -> StoreResult<Contract> {
        let contract = Contract::from_new(new_id("con"), new, Utc::now());
        self.save_contract(&contract).await?;
        Ok(contract)
    }

    async fn get_contract(&self, contract_id: &str) -> StoreResult<Option<Contract>> {
        let row: Option<(Json<Contract>,)> =
            sqlx::query_as("SELECT body FROM contracts WHERE contract_id = $1")
                .bind(contract_id)
                .fetch_optional(&self.pool)
                .await?;
        Ok(row.map(|(Json(c),)| c))
    }

    async fn save_contract(&self, contract: &Contract) -> StoreResult<()> {
        sqlx::query(
            "INSERT INTO contracts (contract_id, source, source_id, status, posted_at, created_at, body) \
             VALUES ($1, $2, $3, $4, $5, $6, $7) \
             ON CONFLICT (contract_id) DO UPDATE SET \
               source = EXCLUDED.source, source_id = EXCLUDED.source_id, status = EXCLUDED.status, \
               posted_at = EXCLUDED.posted_at, body = EXCLUDED.body",
        )
        .bind(&contract.contract_id)
        .bind(&contract.source)
        .bind(&contract.source_id)
        .bind(contract.status.as_str())
        .bind(contract.posted_at)
        .bind(contract.created_at)
        .bind(Json(contract))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn list_contracts(&self, filter: &ContractFilter) -> StoreResult<Vec<Contract>> {
        let statuses: Vec<String> = filter
            .statuses
            .iter()
            .map(|s| s.as_str().to_string())
            .collect();
        let pattern = filter
            .q
            .as_deref()
            .map(str::trim)
            .filter(|q| !q.is_empty())
            .map(like_pattern);

        let rows: Vec<(Json<Contract>,)> = sqlx::query_as(
            "SELECT body FROM contracts \
             WHERE (cardinality($1::TEXT[]) = 0 OR status = ANY($1)) \
               AND ($2::TEXT IS NULL OR source = $2) \
               AND ($3::TEXT IS NULL OR body->>'title' ILIKE $3 OR body->>'agency' ILIKE $3 OR body->>'naics' ILIKE $3) \
             ORDER BY posted_at DESC NULLS LAST, created_at DESC \
             LIMIT $4 OFFSET $5",
        )
        .bind(&statuses)
        .bind(&filter.source)
        .bind(pattern)
        .bind(ContractFilter::clamp_limit(filter.limit) as i64)
        .bind(filter.offset as i64)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(|(Json(c),)| c).collect())
    }

    async fn find_by_source_id(
        &self,
        source: &str,
        source_id: &str,
    ) -> StoreResult<Option<Contract>> {
        let row: Option<(Json<Contract>,)> =
            sqlx::query_as("SELECT body FROM contracts WHERE source = $1 AND source_id = $2 LIMIT 1")
                .bind(source)
                .bind(source_id)
                .fetch_optional(&self.pool)
                .await?;
        Ok(row.map(|(Json(c),)| c))
    }

    async fn contract_stats(&self, now: DateTime<Utc>) -> StoreResult<ContractStats> {
        let (from, to) = ContractStats::due_window(now);
        let rows: Vec<(String, i64, Decimal, i64)> = sqlx::query_as(
            "SELECT status, \
                    COUNT(*), \
                    COALESCE(SUM((body->>'award_amount')::NUMERIC), 0), \
                    COUNT(*) FILTER (WHERE (body->>'due_at')::TIMESTAMPTZ BETWEEN $1 AND $2) \
             FROM contracts GROUP BY status",
        )
        .bind(from)
        .bind(to)
        .fetch_all(&self.pool)
        .await?;

        Ok(ContractStats::from_tallies(rows.into_iter().map(
            |(status, count, award_amount, due_soon)| {
                (
                    status,
                    StatusTally {
                        count: count as usize,
                        award_amount,
                        due_soon: due_soon as usize,
                    },
                )
            },
        )))
    }

    async fn get_sync_state(&self, source: &str) -> StoreResult<Option<SyncState>> {
        let row: Option<(Json<SyncState>,)> =
            sqlx::query_as("SELECT body FROM contract_sync_state WHERE source = $1")
                .bind(source)
                .fetch_optional(&self.pool)
                .await?;
        Ok(row.map(|(Json(s),)| s))
    }

    async fn save_sync_state(&self, state: &SyncState) -> StoreResult<()> {
        sqlx::query(
            "INSERT INTO contract_sync_state (source, body) VALUES ($1, $2) \
             ON CONFLICT (source) DO UPDATE SET body = EXCLUDED.body",
        )
        .bind(&state.source)
        .bind(Json(state))
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}
