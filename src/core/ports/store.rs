use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::core::task::state::RunStatus;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("a result for {provider} on {date} already exists")]
    DuplicateKey { provider: String, date: NaiveDate },
    #[error("unknown run {0}")]
    UnknownRun(String),
    #[error("run {run_id} already finished as {status}")]
    AlreadyTerminal { run_id: String, status: RunStatus },
    #[error("status {0} is not a terminal run status")]
    InvalidStatus(RunStatus),
    #[error("invalid result record: {0}")]
    InvalidRecord(String),
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("payload encoding error: {0}")]
    Json(#[from] serde_json::Error),
}

impl StoreError {
    /// Contract violations point at a bug in the caller rather than the storage.
    pub fn is_contract_violation(&self) -> bool {
        matches!(
            self,
            StoreError::UnknownRun(_)
                | StoreError::AlreadyTerminal { .. }
                | StoreError::InvalidStatus(_)
        )
    }
}

pub struct ResultRecord<'a> {
    pub run_id: &'a str,
    pub provider: &'a str,
    pub date: NaiveDate,
    pub usage: u64,
    pub cost: f64,
    pub raw_payload: &'a Value,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct UsageResult {
    pub id: i64,
    pub run_id: String,
    pub provider: String,
    pub date: NaiveDate,
    pub usage: u64,
    pub cost: f64,
    pub raw_payload: Value,
    pub created_at: String,
}

#[derive(Debug, Clone, Default)]
pub struct ResultQuery {
    pub provider: Option<String>,
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct RunSummary {
    pub id: String,
    pub task_name: String,
    pub status: RunStatus,
    pub started_at: String,
    pub finished_at: Option<String>,
    pub error: Option<String>,
}

#[derive(Debug, Clone)]
pub struct RunQuery {
    pub status: Option<RunStatus>,
    pub task_name: Option<String>,
    pub limit: usize,
}

impl Default for RunQuery {
    fn default() -> Self {
        Self {
            status: None,
            task_name: None,
            limit: 20,
        }
    }
}

/// Deduplicated usage results keyed by `(provider, date)`.
pub trait ResultStorePort: Send + Sync {
    /// Fails with [`StoreError::DuplicateKey`] when the key is already taken.
    fn put(&self, record: ResultRecord<'_>) -> Result<i64, StoreError>;
    fn exists(&self, provider: &str, date: NaiveDate) -> Result<bool, StoreError>;
    /// Ordered by date descending, then provider.
    fn query(&self, filter: &ResultQuery) -> Result<Vec<UsageResult>, StoreError>;
}

/// One row per execution attempt of a named task.
pub trait RunLedgerPort: Send + Sync {
    fn begin(&self, task_name: &str) -> Result<String, StoreError>;
    fn complete(
        &self,
        run_id: &str,
        status: RunStatus,
        error: Option<&str>,
    ) -> Result<(), StoreError>;
    /// Newest first.
    fn query(&self, filter: &RunQuery) -> Result<Vec<RunSummary>, StoreError>;
}
