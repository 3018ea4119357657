use chrono::{NaiveDate, SecondsFormat, Utc};
use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, ValueRef};
use rusqlite::{params, Connection, ErrorCode, OptionalExtension};
use serde_json::Value as JsonValue;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::core::ports::store::{
    ResultQuery, ResultRecord, ResultStorePort, RunLedgerPort, RunQuery, RunSummary, StoreError,
    UsageResult,
};
use crate::core::task::state::RunStatus;

const SCHEMA: &str = "
    PRAGMA journal_mode = WAL;
    PRAGMA synchronous = NORMAL;

    CREATE TABLE IF NOT EXISTS runs (
        id TEXT PRIMARY KEY,
        task_name TEXT NOT NULL,
        status TEXT NOT NULL,
        started_at TEXT NOT NULL,
        finished_at TEXT,
        error TEXT
    );

    CREATE TABLE IF NOT EXISTS results (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        run_id TEXT NOT NULL,
        provider TEXT NOT NULL,
        date TEXT NOT NULL,
        usage INTEGER NOT NULL,
        cost REAL NOT NULL,
        raw_payload TEXT NOT NULL,
        created_at TEXT NOT NULL,
        UNIQUE(provider, date)
    );

    CREATE INDEX IF NOT EXISTS idx_runs_status ON runs(status);
    CREATE INDEX IF NOT EXISTS idx_runs_task ON runs(task_name);
    CREATE INDEX IF NOT EXISTS idx_results_run ON results(run_id);
";

pub struct Database {
    conn: Connection,
}

/// Result store backed by a SQLite file. Each call opens its own connection,
/// so several instances may share one file across tasks or processes.
pub struct SqliteResultStore {
    db_path: PathBuf,
}

impl SqliteResultStore {
    pub fn new(db_path: PathBuf) -> Self {
        Self { db_path }
    }
}

pub struct SqliteRunLedger {
    db_path: PathBuf,
}

impl SqliteRunLedger {
    pub fn new(db_path: PathBuf) -> Self {
        Self { db_path }
    }
}

impl ResultStorePort for SqliteResultStore {
    fn put(&self, record: ResultRecord<'_>) -> Result<i64, StoreError> {
        Database::open(&self.db_path)?.insert_result(&record)
    }

    fn exists(&self, provider: &str, date: NaiveDate) -> Result<bool, StoreError> {
        Database::open(&self.db_path)?.result_exists(provider, date)
    }

    fn query(&self, filter: &ResultQuery) -> Result<Vec<UsageResult>, StoreError> {
        Database::open(&self.db_path)?.list_results(filter)
    }
}

impl RunLedgerPort for SqliteRunLedger {
    fn begin(&self, task_name: &str) -> Result<String, StoreError> {
        let run_id = uuid::Uuid::new_v4().to_string();
        Database::open(&self.db_path)?.create_run(&run_id, task_name, &timestamp())?;
        Ok(run_id)
    }

    fn complete(
        &self,
        run_id: &str,
        status: RunStatus,
        error: Option<&str>,
    ) -> Result<(), StoreError> {
        if !status.is_terminal() {
            return Err(StoreError::InvalidStatus(status));
        }
        Database::open(&self.db_path)?.finish_run(run_id, status, &timestamp(), error)
    }

    fn query(&self, filter: &RunQuery) -> Result<Vec<RunSummary>, StoreError> {
        Database::open(&self.db_path)?.list_runs(filter)
    }
}

impl Database {
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        let conn = Connection::open(path)?;
        conn.busy_timeout(Duration::from_secs(5))?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self { conn })
    }

    // ── Result methods ─────────────────────────────────

    pub fn insert_result(&mut self, record: &ResultRecord<'_>) -> Result<i64, StoreError> {
        let usage = i64::try_from(record.usage).map_err(|_| {
            StoreError::InvalidRecord(format!("usage {} exceeds storable range", record.usage))
        })?;
        if !record.cost.is_finite() {
            return Err(StoreError::InvalidRecord(format!(
                "cost {} is not a finite number",
                record.cost
            )));
        }
        let raw_payload = serde_json::to_string(record.raw_payload)?;

        let inserted = self.conn.execute(
            "INSERT INTO results (run_id, provider, date, usage, cost, raw_payload, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                record.run_id,
                record.provider,
                record.date,
                usage,
                record.cost,
                raw_payload,
                timestamp()
            ],
        );

        match inserted {
            Ok(_) => Ok(self.conn.last_insert_rowid()),
            Err(rusqlite::Error::SqliteFailure(err, _))
                if err.code == ErrorCode::ConstraintViolation
                    && err.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE =>
            {
                Err(StoreError::DuplicateKey {
                    provider: record.provider.to_string(),
                    date: record.date,
                })
            }
            Err(e) => Err(e.into()),
        }
    }

    pub fn result_exists(&self, provider: &str, date: NaiveDate) -> Result<bool, StoreError> {
        let found: Option<i64> = self
            .conn
            .query_row(
                "SELECT id FROM results WHERE provider = ?1 AND date = ?2",
                params![provider, date],
                |row| row.get(0),
            )
            .optional()?;
        Ok(found.is_some())
    }

    pub fn list_results(&self, filter: &ResultQuery) -> Result<Vec<UsageResult>, StoreError> {
        let mut stmt = self.conn.prepare(
            "SELECT id, run_id, provider, date, usage, cost, raw_payload, created_at
             FROM results
             WHERE (?1 IS NULL OR provider = ?1)
               AND (?2 IS NULL OR date >= ?2)
               AND (?3 IS NULL OR date <= ?3)
             ORDER BY date DESC, provider ASC",
        )?;

        let rows = stmt.query_map(
            params![filter.provider.as_deref(), filter.from, filter.to],
            |row| {
                let usage: i64 = row.get(4)?;
                let raw_payload: String = row.get(6)?;
                Ok(UsageResult {
                    id: row.get(0)?,
                    run_id: row.get(1)?,
                    provider: row.get(2)?,
                    date: row.get(3)?,
                    usage: usage.max(0) as u64,
                    cost: row.get(5)?,
                    raw_payload: parse_payload(raw_payload),
                    created_at: row.get(7)?,
                })
            },
        )?;

        let mut results = Vec::new();
        for row in rows {
            results.push(row?);
        }
        Ok(results)
    }

    // ── Run methods ────────────────────────────────────

    pub fn create_run(
        &mut self,
        run_id: &str,
        task_name: &str,
        started_at: &str,
    ) -> Result<(), StoreError> {
        self.conn.execute(
            "INSERT INTO runs (id, task_name, status, started_at) VALUES (?1, ?2, ?3, ?4)",
            params![run_id, task_name, RunStatus::Running, started_at],
        )?;
        Ok(())
    }

    /// Moves a pending or running run to `status`. Error text is kept only for failures.
    pub fn finish_run(
        &mut self,
        run_id: &str,
        status: RunStatus,
        finished_at: &str,
        error: Option<&str>,
    ) -> Result<(), StoreError> {
        let error = match status {
            RunStatus::Failed => Some(
                error
                    .map(str::trim)
                    .filter(|detail| !detail.is_empty())
                    .unwrap_or("unspecified failure"),
            ),
            _ => None,
        };

        let changed = self.conn.execute(
            "UPDATE runs
             SET status = ?2, finished_at = ?3, error = ?4
             WHERE id = ?1 AND status IN (?5, ?6)",
            params![
                run_id,
                status,
                finished_at,
                error,
                RunStatus::Pending,
                RunStatus::Running
            ],
        )?;
        if changed == 1 {
            return Ok(());
        }

        match self.run_status(run_id)? {
            None => Err(StoreError::UnknownRun(run_id.to_string())),
            Some(current) => Err(StoreError::AlreadyTerminal {
                run_id: run_id.to_string(),
                status: current,
            }),
        }
    }

    fn run_status(&self, run_id: &str) -> Result<Option<RunStatus>, StoreError> {
        let status = self
            .conn
            .query_row(
                "SELECT status FROM runs WHERE id = ?1",
                params![run_id],
                |row| row.get(0),
            )
            .optional()?;
        Ok(status)
    }

    pub fn list_runs(&self, filter: &RunQuery) -> Result<Vec<RunSummary>, StoreError> {
        let limit = i64::try_from(filter.limit).unwrap_or(i64::MAX);
        let mut stmt = self.conn.prepare(
            "SELECT id, task_name, status, started_at, finished_at, error
             FROM runs
             WHERE (?1 IS NULL OR status = ?1)
               AND (?2 IS NULL OR task_name = ?2)
             ORDER BY started_at DESC, rowid DESC
             LIMIT ?3",
        )?;

        let rows = stmt.query_map(
            params![filter.status, filter.task_name.as_deref(), limit],
            |row| {
                Ok(RunSummary {
                    id: row.get(0)?,
                    task_name: row.get(1)?,
                    status: row.get(2)?,
                    started_at: row.get(3)?,
                    finished_at: row.get(4)?,
                    error: row.get(5)?,
                })
            },
        )?;

        let mut runs = Vec::new();
        for row in rows {
            runs.push(row?);
        }
        Ok(runs)
    }
}

impl ToSql for RunStatus {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.as_str()))
    }
}

impl FromSql for RunStatus {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        let text = value.as_str()?;
        RunStatus::parse(text).ok_or_else(|| {
            FromSqlError::Other(format!("unknown run status '{text}'").into())
        })
    }
}

fn timestamp() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_payload(raw: String) -> JsonValue {
    serde_json::from_str::<JsonValue>(&raw).unwrap_or(JsonValue::String(raw))
}
