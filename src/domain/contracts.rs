//! Contract opportunity tracking and sync-state types

use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::str::FromStr;

pub const SAM_SOURCE: &str = "sam.gov";
pub const MANUAL_SOURCE: &str = "manual";
pub const MAX_EXCERPT_CHARS: usize = 4000;

/// Pipeline position of an opportunity
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum ContractStatus {
    New,
    Reviewing,
    Bidding,
    Submitted,
    Won,
    Lost,
    NoBid,
    Archived,
}

impl ContractStatus {
    pub const ALL: [ContractStatus; 8] = [
        Self::New,
        Self::Reviewing,
        Self::Bidding,
        Self::Submitted,
        Self::Won,
        Self::Lost,
        Self::NoBid,
        Self::Archived,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::New => "new",
            Self::Reviewing => "reviewing",
            Self::Bidding => "bidding",
            Self::Submitted => "submitted",
            Self::Won => "won",
            Self::Lost => "lost",
            Self::NoBid => "no_bid",
            Self::Archived => "archived",
        }
    }

    /// Still worth working on
    pub fn is_open(&self) -> bool {
        matches!(
            self,
            Self::New | Self::Reviewing | Self::Bidding | Self::Submitted
        )
    }
}

impl Default for ContractStatus {
    fn default() -> Self {
        Self::New
    }
}

impl std::fmt::Display for ContractStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ContractStatus {
    type Err = String;

    /// Accepts `No Bid`, `no-bid`, `NO_BID` and so on
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_lowercase().replace(['-', ' '], "_");
        Self::ALL
            .into_iter()
            .find(|status| status.as_str() == normalized)
            .ok_or_else(|| format!("Unknown contract status '{}'", s))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Contract {
    pub contract_id: String,
    pub source: String,
    pub source_id: Option<String>,
    pub title: Option<String>,
    pub agency: Option<String>,
    pub sub_agency: Option<String>,
    pub office: Option<String>,
    pub naics: Option<String>,
    pub psc: Option<String>,
    pub set_aside: Option<String>,
    pub posted_at: Option<DateTime<Utc>>,
    pub due_at: Option<DateTime<Utc>>,
    /// Value as published by the source
    pub value: Option<String>,
    pub estimated_value: Option<Decimal>,
    pub location: Option<String>,
    pub url: Option<String>,
    pub synopsis: Option<String>,
    pub contract_excerpt: Option<String>,
    #[serde(default)]
    pub raw_payload: Option<Value>,
    #[serde(default)]
    pub status: ContractStatus,
    #[serde(default)]
    pub tags: Vec<String>,
    pub analysis_notes: Option<String>,
    pub proposal_id: Option<String>,
    pub report_submitted_at: Option<DateTime<Utc>>,
    pub decision_date: Option<DateTime<Utc>>,
    pub award_amount: Option<Decimal>,
    pub last_seen_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Contract {
    pub fn from_new(contract_id: String, new: NewContract, now: DateTime<Utc>) -> Self {
        let excerpt = new
            .contract_excerpt
            .or_else(|| new.synopsis.as_deref().map(excerpt));
        Self {
            contract_id,
            source: new.source.unwrap_or_else(|| MANUAL_SOURCE.to_string()),
            source_id: new.source_id,
            title: new.title,
            agency: new.agency,
            sub_agency: new.sub_agency,
            office: new.office,
            naics: new.naics,
            psc: new.psc,
            set_aside: new.set_aside,
            posted_at: new.posted_at,
            due_at: new.due_at,
            value: new.value,
            estimated_value: new.estimated_value,
            location: new.location,
            url: new.url,
            synopsis: new.synopsis,
            contract_excerpt: excerpt,
            raw_payload: new.raw_payload,
            status: new.status.unwrap_or_default(),
            tags: new.tags,
            analysis_notes: new.analysis_notes,
            proposal_id: new.proposal_id,
            report_submitted_at: None,
            decision_date: None,
            award_amount: None,
            last_seen_at: new.last_seen_at,
            created_at: now,
            updated_at: now,
        }
    }

    /// Overwrite source-owned fields, leaving user tracking untouched
    pub fn refresh_from_source(&mut self, fresh: NewContract, now: DateTime<Utc>) {
        macro_rules! take {
            ($($field:ident),*) => {
                $( if fresh.$field.is_some() { self.$field = fresh.$field; } )*
            };
        }
        take!(
            title, agency, sub_agency, office, naics, psc, set_aside, posted_at, due_at, value,
            estimated_value, location, url, synopsis, contract_excerpt, raw_payload
        );
        self.last_seen_at = Some(now);
        self.updated_at = now;
    }

    pub fn apply_patch(&mut self, patch: ContractPatch, now: DateTime<Utc>) {
        macro_rules! set {
            ($($field:ident),*) => {
                $( if let Some(v) = patch.$field { self.$field = Some(v); } )*
            };
        }
        set!(
            title, agency, naics, due_at, estimated_value, url, analysis_notes, proposal_id,
            report_submitted_at, decision_date, award_amount
        );
        if let Some(status) = patch.status {
            self.status = status;
        }
        if let Some(tags) = patch.tags {
            self.tags = tags;
        }
        self.updated_at = now;
    }
}

/// Truncates on a char boundary
pub fn excerpt(text: &str) -> String {
    text.chars().take(MAX_EXCERPT_CHARS).collect()
}

/// Create body and sync normalization target
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct NewContract {
    #[serde(default)]
    pub source: Option<String>,
    #[serde(default)]
    pub source_id: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub agency: Option<String>,
    #[serde(default)]
    pub sub_agency: Option<String>,
    #[serde(default)]
    pub office: Option<String>,
    #[serde(default)]
    pub naics: Option<String>,
    #[serde(default)]
    pub psc: Option<String>,
    #[serde(default)]
    pub set_aside: Option<String>,
    #[serde(default)]
    pub posted_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub due_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub value: Option<String>,
    #[serde(default)]
    pub estimated_value: Option<Decimal>,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub synopsis: Option<String>,
    #[serde(default)]
    pub contract_excerpt: Option<String>,
    #[serde(default)]
    pub raw_payload: Option<Value>,
    #[serde(default)]
    pub status: Option<ContractStatus>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub analysis_notes: Option<String>,
    #[serde(default)]
    pub proposal_id: Option<String>,
    #[serde(default)]
    pub last_seen_at: Option<DateTime<Utc>>,
}

/// PATCH /api/v1/contracts/:id body
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ContractPatch {
    #[serde(default, deserialize_with = "deserialize_status")]
    pub status: Option<ContractStatus>,
    pub title: Option<String>,
    pub agency: Option<String>,
    pub naics: Option<String>,
    pub due_at: Option<DateTime<Utc>>,
    pub estimated_value: Option<Decimal>,
    pub url: Option<String>,
    pub tags: Option<Vec<String>>,
    pub analysis_notes: Option<String>,
    pub proposal_id: Option<String>,
    pub report_submitted_at: Option<DateTime<Utc>>,
    pub decision_date: Option<DateTime<Utc>>,
    pub award_amount: Option<Decimal>,
}

fn deserialize_status<'de, D>(deserializer: D) -> Result<Option<ContractStatus>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let raw: Option<String> = Option::deserialize(deserializer)?;
    raw.map(|s| s.parse().map_err(serde::de::Error::custom))
        .transpose()
}

/// GET /api/v1/contracts query
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ContractListQuery {
    /// Comma-separated statuses
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub source: Option<String>,
    #[serde(default)]
    pub q: Option<String>,
    #[serde(default)]
    pub limit: Option<usize>,
    #[serde(default)]
    pub offset: Option<usize>,
}

#[derive(Debug, Clone, Default)]
pub struct ContractFilter {
    pub statuses: Vec<ContractStatus>,
    pub source: Option<String>,
    pub q: Option<String>,
    pub limit: usize,
    pub offset: usize,
}

impl ContractFilter {
    pub const DEFAULT_LIMIT: usize = 100;
    pub const MAX_LIMIT: usize = 5000;

    pub fn clamp_limit(limit: usize) -> usize {
        limit.clamp(1, Self::MAX_LIMIT)
    }

    /// Case-insensitive match on title, agency and NAICS
    pub fn matches(&self, contract: &Contract) -> bool {
        if !self.statuses.is_empty() && !self.statuses.contains(&contract.status) {
            return false;
        }
        if let Some(source) = &self.source {
            if &contract.source != source {
                return false;
            }
        }
        if let Some(q) = self.q.as_deref().map(str::trim).filter(|q| !q.is_empty()) {
            let needle = q.to_lowercase();
            let hit = [&contract.title, &contract.agency, &contract.naics]
                .into_iter()
                .flatten()
                .any(|field| field.to_lowercase().contains(&needle));
            if !hit {
                return false;
            }
        }
        true
    }
}

impl TryFrom<ContractListQuery> for ContractFilter {
    type Error = String;

    fn try_from(query: ContractListQuery) -> Result<Self, Self::Error> {
        let statuses = query
            .status
            .as_deref()
            .unwrap_or_default()
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(ContractStatus::from_str)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self {
            statuses,
            source: query.source.filter(|s| !s.is_empty()),
            q: query.q,
            limit: Self::clamp_limit(query.limit.unwrap_or(Self::DEFAULT_LIMIT)),
            offset: query.offset.unwrap_or(0),
        })
    }
}

/// Newest posted first, then newest created
pub fn sort_contracts(contracts: &mut [Contract]) {
    contracts.sort_by(|a, b| {
        b.posted_at
            .cmp(&a.posted_at)
            .then_with(|| b.created_at.cmp(&a.created_at))
    });
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ContractStats {
    pub total: usize,
    pub by_status: BTreeMap<String, usize>,
    pub won: usize,
    pub lost: usize,
    /// `won / (won + lost)`; none before any decision
    pub win_rate: Option<f64>,
    pub total_award_amount: Decimal,
    pub due_soon: usize,
}

/// Aggregates for one status, as a store can compute them in a single pass
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StatusTally {
    pub count: usize,
    pub award_amount: Decimal,
    /// Due inside [`ContractStats::due_window`]
    pub due_soon: usize,
}

impl ContractStats {
    pub const DUE_SOON_DAYS: i64 = 14;

    /// Inclusive `(from, to)` range counted as due soon
    pub fn due_window(now: DateTime<Utc>) -> (DateTime<Utc>, DateTime<Utc>) {
        (now, now + Duration::days(Self::DUE_SOON_DAYS))
    }

    pub fn compute<'a>(contracts: impl IntoIterator<Item = &'a Contract>, now: DateTime<Utc>) -> Self {
        let (from, to) = Self::due_window(now);
        let mut tallies: BTreeMap<String, StatusTally> = BTreeMap::new();
        for contract in contracts {
            let tally = tallies.entry(contract.status.as_str().to_string()).or_default();
            tally.count += 1;
            tally.award_amount += contract.award_amount.unwrap_or_default();
            if contract.due_at.is_some_and(|due| due >= from && due <= to) {
                tally.due_soon += 1;
            }
        }
        Self::from_tallies(tallies)
    }

    /// Award value counts for won contracts only, due-soon for open ones only.
    pub fn from_tallies(tallies: impl IntoIterator<Item = (String, StatusTally)>) -> Self {
        let mut by_status: BTreeMap<String, usize> = ContractStatus::ALL
            .iter()
            .map(|s| (s.as_str().to_string(), 0))
            .collect();
        let mut total = 0;
        let mut total_award_amount = Decimal::ZERO;
        let mut due_soon = 0;

        for (status, tally) in tallies {
            total += tally.count;
            let parsed = ContractStatus::from_str(&status).ok();
            if parsed == Some(ContractStatus::Won) {
                total_award_amount += tally.award_amount;
            }
            if parsed.is_some_and(|s| s.is_open()) {
                due_soon += tally.due_soon;
            }
            *by_status.entry(status).or_default() += tally.count;
        }

        let won = by_status[ContractStatus::Won.as_str()];
        let lost = by_status[ContractStatus::Lost.as_str()];
        let win_rate = (won + lost > 0).then(|| won as f64 / (won + lost) as f64);

        Self {
            total,
            by_status,
            won,
            lost,
            win_rate,
            total_award_amount,
            due_soon,
        }
    }
}

/// Per-source poller bookkeeping
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SyncState {
    pub source: String,
    #[serde(default)]
    pub requests_today: u32,
    /// UTC day the request counter applies to
    #[serde(default)]
    pub quota_date: Option<chrono::NaiveDate>,
    #[serde(default)]
    pub last_run_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub last_success_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub last_error: Option<String>,
    #[serde(default)]
    pub last_fetched: usize,
    #[serde(default)]
    pub last_created: usize,
    #[serde(default)]
    pub last_updated: usize,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl SyncState {
    pub fn new(source: &str, now: DateTime<Utc>) -> Self {
        Self {
            source: source.to_string(),
            requests_today: 0,
            quota_date: Some(now.date_naive()),
            last_run_at: None,
            last_success_at: None,
            last_error: None,
            last_fetched: 0,
            last_created: 0,
            last_updated: 0,
            created_at: now,
            updated_at: now,
        }
    }

    /// Reset the request counter when the UTC day changed
    pub fn roll_quota(&mut self, now: DateTime<Utc>) {
        let today = now.date_naive();
        if self.quota_date != Some(today) {
            self.quota_date = Some(today);
            self.requests_today = 0;
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SyncOutcome {
    Completed,
    AlreadyRunning,
    QuotaExhausted,
    NotConfigured,
    Failed,
}

#[derive(Debug, Clone, Serialize)]
pub struct SyncReport {
    pub outcome: SyncOutcome,
    pub trigger: String,
    pub fetched: usize,
    pub created: usize,
    pub updated: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state: Option<SyncState>,
}

impl SyncReport {
    pub fn empty(outcome: SyncOutcome, trigger: &str) -> Self {
        Self {
            outcome,
            trigger: trigger.to_string(),
            fetched: 0,
            created: 0,
            updated: 0,
            error: None,
            state: None,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SyncStatus {
    pub enabled: bool,
    pub configured: bool,
    pub running: bool,
    pub daily_request_quota: u32,
    pub interval_seconds: u64,
    pub state: Option<SyncState>,
}

/// POST /api/v1/contracts/sam/sync body
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SyncRequest {
    #[serde(default)]
    pub query: Option<String>,
    #[serde(default)]
    pub days_back: Option<u32>,
    #[serde(default)]
    pub limit: Option<u32>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use pretty_assertions::assert_eq;

    fn contract(status: ContractStatus) -> Contract {
        let now = Utc::now();
        let mut c = Contract::from_new("con_1".to_string(), NewContract::default(), now);
        c.status = status;
        c
    }

    #[test]
    fn test_status_parsing_normalizes() {
        assert_eq!("No Bid".parse::<ContractStatus>(), Ok(ContractStatus::NoBid));
        assert_eq!("no-bid".parse::<ContractStatus>(), Ok(ContractStatus::NoBid));
        assert_eq!(" WON ".parse::<ContractStatus>(), Ok(ContractStatus::Won));
        assert!("pending".parse::<ContractStatus>().is_err());
    }

    #[test]
    fn test_patch_accepts_loose_status() {
        let patch: ContractPatch =
            serde_json::from_value(serde_json::json!({"status": "No-Bid", "tags": ["cloud"]})).unwrap();
        assert_eq!(patch.status, Some(ContractStatus::NoBid));

        let mut c = contract(ContractStatus::New);
        c.apply_patch(patch, Utc::now());
        assert_eq!(c.status, ContractStatus::NoBid);
        assert_eq!(c.tags, vec!["cloud".to_string()]);
    }

    #[test]
    fn test_refresh_keeps_user_fields() {
        let mut c = contract(ContractStatus::Bidding);
        c.tags = vec!["priority".to_string()];
        c.analysis_notes = Some("good fit".to_string());
        c.proposal_id = Some("prop_1".to_string());

        let fresh = NewContract {
            title: Some("Updated title".to_string()),
            status: Some(ContractStatus::New),
            ..Default::default()
        };
        c.refresh_from_source(fresh, Utc::now());

        assert_eq!(c.title.as_deref(), Some("Updated title"));
        assert_eq!(c.status, ContractStatus::Bidding);
        assert_eq!(c.tags, vec!["priority".to_string()]);
        assert_eq!(c.analysis_notes.as_deref(), Some("good fit"));
        assert_eq!(c.proposal_id.as_deref(), Some("prop_1"));
        assert!(c.last_seen_at.is_some());
    }

    #[test]
    fn test_filter_from_query() {
        let filter = ContractFilter::try_from(ContractListQuery {
            status: Some("won, no bid".to_string()),
            limit: Some(10_000),
            ..Default::default()
        })
        .unwrap();
        assert_eq!(filter.statuses, vec![ContractStatus::Won, ContractStatus::NoBid]);
        assert_eq!(filter.limit, 5000);

        let filter = ContractFilter::try_from(ContractListQuery {
            limit: Some(0),
            ..Default::default()
        })
        .unwrap();
        assert_eq!(filter.limit, 1);

        assert!(ContractFilter::try_from(ContractListQuery {
            status: Some("bogus".to_string()),
            ..Default::default()
        })
        .is_err());
    }

    #[test]
    fn test_filter_text_search() {
        let mut c = contract(ContractStatus::New);
        c.agency = Some("Department of Energy".to_string());
        c.naics = Some("541512".to_string());

        let filter = |q: &str| ContractFilter {
            q: Some(q.to_string()),
            limit: 10,
            ..Default::default()
        };
        assert!(filter("energy").matches(&c));
        assert!(filter("5415").matches(&c));
        assert!(!filter("defense").matches(&c));
    }

    #[test]
    fn test_stats() {
        let now = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        let mut won = contract(ContractStatus::Won);
        won.award_amount = Some(Decimal::new(250_000, 0));
        let mut won2 = contract(ContractStatus::Won);
        won2.award_amount = Some(Decimal::new(50_000, 0));
        let lost = contract(ContractStatus::Lost);
        let mut due = contract(ContractStatus::Bidding);
        due.due_at = Some(now + Duration::days(3));
        let mut later = contract(ContractStatus::Reviewing);
        later.due_at = Some(now + Duration::days(30));
        let mut closed = contract(ContractStatus::NoBid);
        closed.due_at = Some(now + Duration::days(2));

        let stats = ContractStats::compute(&[won, won2, lost, due, later, closed], now);
        assert_eq!(stats.total, 6);
        assert_eq!(stats.won, 2);
        assert_eq!(stats.lost, 1);
        assert_eq!(stats.win_rate, Some(2.0 / 3.0));
        assert_eq!(stats.total_award_amount, Decimal::new(300_000, 0));
        assert_eq!(stats.due_soon, 1);
        assert_eq!(stats.by_status["archived"], 0);
    }

    #[test]
    fn test_stats_from_tallies_filter_by_status() {
        let tally = |count, award, due_soon| StatusTally {
            count,
            award_amount: Decimal::new(award, 0),
            due_soon,
        };
        let stats = ContractStats::from_tallies([
            ("won".to_string(), tally(2, 500, 3)),
            ("new".to_string(), tally(4, 900, 2)),
            ("lost".to_string(), tally(2, 0, 0)),
        ]);
        assert_eq!(stats.total, 8);
        assert_eq!(stats.total_award_amount, Decimal::new(500, 0));
        assert_eq!(stats.due_soon, 2);
        assert_eq!(stats.win_rate, Some(0.5));
        assert_eq!(stats.by_status["bidding"], 0);
    }

    #[test]
    fn test_quota_rolls_over_on_new_day() {
        let day1 = Utc.with_ymd_and_hms(2024, 5, 1, 23, 0, 0).unwrap();
        let mut state = SyncState::new(SAM_SOURCE, day1);
        state.requests_today = 7;

        state.roll_quota(day1 + Duration::minutes(30));
        assert_eq!(state.requests_today, 7);

        state.roll_quota(day1 + Duration::hours(2));
        assert_eq!(state.requests_today, 0);
        assert_eq!(state.quota_date, Some((day1 + Duration::hours(2)).date_naive()));
    }

    #[test]
    fn test_excerpt_is_bounded() {
        let long = "é".repeat(5000);
        assert_eq!(excerpt(&long).chars().count(), MAX_EXCERPT_CHARS);
    }
}
