use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use chrono::NaiveDate;
use futures::future::BoxFuture;
use serde_json::{json, Value};
use tokio::sync::Barrier;

use crate::adapters::collectors::{required_cost, required_u64};
use crate::adapters::emitter::RecordingEmitter;
use crate::adapters::store::{SqliteResultStore, SqliteRunLedger};
use crate::core::ports::collector::{Collector, CollectorError, FetchRequest, NormalizedUsage};

use super::TaskRunner;

pub(crate) enum Script {
    Usage { tokens: u64, cost: f64 },
    Payload(Value),
    Transient,
    Auth,
}

/// Collector that replays a fixed response without touching the network.
pub(crate) struct ScriptedCollector {
    provider: String,
    script: Script,
    fetch_calls: AtomicUsize,
    barrier: Option<Arc<Barrier>>,
}

impl ScriptedCollector {
    pub(crate) fn new(provider: &str, script: Script) -> Self {
        Self {
            provider: provider.to_string(),
            script,
            fetch_calls: AtomicUsize::new(0),
            barrier: None,
        }
    }

    /// Holds every fetch until `barrier` releases, so concurrent runners interleave.
    pub(crate) fn with_barrier(mut self, barrier: Arc<Barrier>) -> Self {
        self.barrier = Some(barrier);
        self
    }

    pub(crate) fn fetch_calls(&self) -> usize {
        self.fetch_calls.load(Ordering::SeqCst)
    }
}

impl Collector for ScriptedCollector {
    fn provider(&self) -> &str {
        &self.provider
    }

    fn fetch<'a>(&'a self, _request: FetchRequest<'a>) -> BoxFuture<'a, Result<Value, CollectorError>> {
        Box::pin(async move {
            self.fetch_calls.fetch_add(1, Ordering::SeqCst);
            if let Some(barrier) = &self.barrier {
                barrier.wait().await;
            }
            match &self.script {
                Script::Usage { tokens, cost } => {
                    Ok(json!({ "total_tokens": tokens, "total_cost": cost }))
                }
                Script::Payload(payload) => Ok(payload.clone()),
                Script::Transient => Err(CollectorError::TransientFetch {
                    provider: self.provider.clone(),
                    detail: "network down".to_string(),
                }),
                Script::Auth => Err(CollectorError::Auth {
                    provider: self.provider.clone(),
                    detail: "HTTP 401 Unauthorized: invalid api key".to_string(),
                }),
            }
        })
    }

    fn normalize(&self, raw: &Value, date: NaiveDate) -> Result<NormalizedUsage, CollectorError> {
        Ok(NormalizedUsage {
            provider: self.provider.clone(),
            date,
            usage: required_u64(&self.provider, raw, "total_tokens")?,
            cost: required_cost(&self.provider, raw, "total_cost")?,
            raw_payload: raw.clone(),
        })
    }
}

pub(crate) struct SqliteHarness {
    pub db_path: PathBuf,
    pub runner: TaskRunner,
    pub results: Arc<SqliteResultStore>,
    pub ledger: Arc<SqliteRunLedger>,
    pub emitter: Arc<RecordingEmitter>,
}

impl SqliteHarness {
    pub(crate) fn new() -> Self {
        let db_path = std::env::temp_dir().join(format!("agent-os-runner-{}.db", uuid::Uuid::new_v4()));
        Self::at(&db_path)
    }

    /// Another runner sharing the same database file.
    pub(crate) fn at(db_path: &Path) -> Self {
        let results = Arc::new(SqliteResultStore::new(db_path.to_path_buf()));
        let ledger = Arc::new(SqliteRunLedger::new(db_path.to_path_buf()));
        let emitter = Arc::new(RecordingEmitter::default());
        let runner = TaskRunner::new(results.clone(), ledger.clone(), emitter.clone());
        Self {
            db_path: db_path.to_path_buf(),
            runner,
            results,
            ledger,
            emitter,
        }
    }

    pub(crate) fn cleanup(self) {
        let _ = std::fs::remove_file(&self.db_path);
        let _ = std::fs::remove_file(self.db_path.with_extension("db-wal"));
        let _ = std::fs::remove_file(self.db_path.with_extension("db-shm"));
    }
}

pub(crate) fn day(value: &str) -> NaiveDate {
    NaiveDate::parse_from_str(value, "%Y-%m-%d").expect("valid date")
}
