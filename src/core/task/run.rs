use std::time::Instant;

use chrono::NaiveDate;
use log::Level;
use serde_json::{json, Value};
use thiserror::Error;

use crate::core::ports::collector::{Collector, CollectorError, FetchRequest, NormalizedUsage};
use crate::core::ports::store::{ResultRecord, StoreError};

use super::ledger::{close_run, open_run};
use super::state::RunStatus;
use super::TaskRunner;

/// Failures that abort the whole invocation instead of a single run.
#[derive(Debug, Error)]
pub enum RunnerError {
    #[error("run ledger unavailable: {0}")]
    LedgerUnavailable(#[source] StoreError),
    #[error("run ledger contract violated: {0}")]
    LedgerContract(#[source] StoreError),
    #[error("result store unavailable: {0}")]
    StoreUnavailable(#[source] StoreError),
}

#[derive(Debug, Clone, PartialEq)]
pub struct RunOutcome {
    pub run_id: String,
    pub task_name: String,
    pub provider: String,
    pub date: NaiveDate,
    pub status: RunStatus,
    pub error: Option<String>,
    pub result_id: Option<i64>,
    pub duration_ms: u64,
}

impl RunOutcome {
    pub fn is_failed(&self) -> bool {
        self.status == RunStatus::Failed
    }
}

struct ActiveRun<'a> {
    run_id: String,
    task_name: &'a str,
    provider: &'a str,
    date: NaiveDate,
    started: Instant,
}

impl TaskRunner {
    /// Executes one collection attempt for `(collector.provider(), date)`.
    ///
    /// Collector failures end the run as `failed` and are returned in the
    /// outcome. Only ledger contract violations and storage outages escape as
    /// `Err`.
    pub async fn execute(
        &self,
        task_name: &str,
        collector: &dyn Collector,
        credential: &str,
        date: NaiveDate,
    ) -> Result<RunOutcome, RunnerError> {
        let provider = collector.provider();
        let run_id = open_run(self.ledger.as_ref(), task_name)?;
        let run = ActiveRun {
            run_id,
            task_name,
            provider,
            date,
            started: Instant::now(),
        };

        self.emitter.emit(
            Level::Info,
            "run:started",
            &json!({
                "run_id": run.run_id,
                "task": task_name,
                "provider": collector.display_name(),
                "date": date.to_string(),
            }),
        );

        match self.results.exists(provider, date) {
            Ok(true) => return self.finish(&run, RunStatus::Skipped, None, None, "already_collected"),
            Ok(false) => {}
            Err(error) => return Err(self.abort(&run, error)),
        }

        let normalized = match collect(collector, credential, date).await {
            Ok(normalized) => normalized,
            Err(error) => {
                let detail = error.to_string();
                return self.finish(&run, RunStatus::Failed, Some(detail), None, error.kind());
            }
        };

        let stored = self.results.put(ResultRecord {
            run_id: &run.run_id,
            provider,
            date,
            usage: normalized.usage,
            cost: normalized.cost,
            raw_payload: &normalized.raw_payload,
        });

        match stored {
            Ok(result_id) => {
                self.emitter.emit(
                    Level::Info,
                    "run:collected",
                    &json!({
                        "run_id": run.run_id,
                        "provider": collector.display_name(),
                        "usage": normalized.usage,
                        "cost": normalized.cost,
                    }),
                );
                self.finish(&run, RunStatus::Success, None, Some(result_id), "stored")
            }
            // Another runner stored the same key between our check and insert.
            Err(StoreError::DuplicateKey { .. }) => {
                self.finish(&run, RunStatus::Skipped, None, None, "duplicate_key")
            }
            Err(StoreError::InvalidRecord(detail)) => {
                self.finish(&run, RunStatus::Failed, Some(detail), None, "invalid_record")
            }
            Err(error) => Err(self.abort(&run, error)),
        }
    }

    fn finish(
        &self,
        run: &ActiveRun<'_>,
        status: RunStatus,
        error: Option<String>,
        result_id: Option<i64>,
        reason: &str,
    ) -> Result<RunOutcome, RunnerError> {
        close_run(self.ledger.as_ref(), &run.run_id, status, error.as_deref())?;

        let duration_ms = run.started.elapsed().as_millis() as u64;
        let (level, channel) = match status {
            RunStatus::Failed => (Level::Error, "run:failed"),
            RunStatus::Skipped => (Level::Info, "run:skipped"),
            _ => (Level::Info, "run:succeeded"),
        };
        self.emitter.emit(
            level,
            channel,
            &json!({
                "run_id": run.run_id,
                "task": run.task_name,
                "provider": run.provider,
                "date": run.date.to_string(),
                "status": status.as_str(),
                "reason": reason,
                "error": error,
                "duration_ms": duration_ms,
            }),
        );

        Ok(RunOutcome {
            run_id: run.run_id.clone(),
            task_name: run.task_name.to_string(),
            provider: run.provider.to_string(),
            date: run.date,
            status,
            error,
            result_id,
            duration_ms,
        })
    }

    /// Closes the run as failed on a best-effort basis before surfacing a storage outage.
    fn abort(&self, run: &ActiveRun<'_>, error: StoreError) -> RunnerError {
        let detail = format!("result store unavailable: {error}");
        if let Err(close_error) =
            close_run(self.ledger.as_ref(), &run.run_id, RunStatus::Failed, Some(&detail))
        {
            self.emitter.emit(
                Level::Warn,
                "run:unclosed",
                &json!({ "run_id": run.run_id, "error": close_error.to_string() }),
            );
        }
        self.emitter.emit(
            Level::Error,
            "run:aborted",
            &json!({ "run_id": run.run_id, "task": run.task_name, "error": detail }),
        );
        RunnerError::StoreUnavailable(error)
    }
}

async fn collect(
    collector: &dyn Collector,
    credential: &str,
    date: NaiveDate,
) -> Result<NormalizedUsage, CollectorError> {
    let raw = collector.fetch(FetchRequest { credential, date }).await?;
    let normalized = collector
        .normalize(&raw, date)
        .map_err(|error| with_discarded_payload(error, &raw))?;

    if normalized.provider != collector.provider() || normalized.date != date {
        return Err(CollectorError::normalization(
            collector.provider(),
            format!(
                "normalized key ({}, {}) does not match requested ({}, {})",
                normalized.provider,
                normalized.date,
                collector.provider(),
                date
            ),
        ));
    }

    Ok(normalized)
}

fn with_discarded_payload(error: CollectorError, raw: &Value) -> CollectorError {
    match error {
        CollectorError::Normalization { provider, detail } => {
            let size = serde_json::to_string(raw).map(|text| text.len()).unwrap_or(0);
            CollectorError::Normalization {
                provider,
                detail: format!("{detail} (raw payload of {size} bytes discarded)"),
            }
        }
        other => other,
    }
}
