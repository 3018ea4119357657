use std::borrow::Cow;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Local};
use thiserror::Error;

use crate::core::ports::store::{
    ResultQuery, ResultStorePort, RunLedgerPort, RunQuery, StoreError,
};

/// Tables that may be exported. Anything else is rejected before touching the store.
pub const ALLOWED_TABLES: [&str; 2] = ["results", "runs"];

const RESULT_COLUMNS: &[&str] = &[
    "id",
    "run_id",
    "provider",
    "date",
    "usage",
    "cost",
    "raw_payload",
    "created_at",
];

const RUN_COLUMNS: &[&str] = &[
    "id",
    "task_name",
    "status",
    "started_at",
    "finished_at",
    "error",
];

#[derive(Debug, Error)]
pub enum ExportError {
    #[error("Invalid table name: '{0}'. Must be one of: results, runs")]
    InvalidTable(String),
    #[error("failed to write {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error(transparent)]
    Store(#[from] StoreError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportTable {
    Results,
    Runs,
}

impl ExportTable {
    pub fn parse(name: &str) -> Result<Self, ExportError> {
        match name {
            "results" => Ok(ExportTable::Results),
            "runs" => Ok(ExportTable::Runs),
            other => Err(ExportError::InvalidTable(other.to_string())),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ExportTable::Results => "results",
            ExportTable::Runs => "runs",
        }
    }
}

pub fn default_export_path(dir: &Path, table: ExportTable, now: DateTime<Local>) -> PathBuf {
    dir.join(format!(
        "export_{}_{}.csv",
        table.as_str(),
        now.format("%Y%m%d_%H%M%S")
    ))
}

/// Writes `table` as CSV to `output` and returns the number of data rows.
pub fn export_table(
    table: ExportTable,
    results: &dyn ResultStorePort,
    ledger: &dyn RunLedgerPort,
    output: &Path,
) -> Result<usize, ExportError> {
    let (header, rows): (&[&str], Vec<Vec<String>>) = match table {
        ExportTable::Results => (
            RESULT_COLUMNS,
            results
                .query(&ResultQuery::default())?
                .into_iter()
                .map(|result| {
                    vec![
                        result.id.to_string(),
                        result.run_id,
                        result.provider,
                        result.date.to_string(),
                        result.usage.to_string(),
                        result.cost.to_string(),
                        result.raw_payload.to_string(),
                        result.created_at,
                    ]
                })
                .collect(),
        ),
        ExportTable::Runs => (
            RUN_COLUMNS,
            ledger
                .query(&RunQuery {
                    limit: usize::MAX,
                    ..RunQuery::default()
                })?
                .into_iter()
                .map(|run| {
                    vec![
                        run.id,
                        run.task_name,
                        run.status.to_string(),
                        run.started_at,
                        run.finished_at.unwrap_or_default(),
                        run.error.unwrap_or_default(),
                    ]
                })
                .collect(),
        ),
    };

    let io_error = |source| ExportError::Io {
        path: output.to_path_buf(),
        source,
    };
    if let Some(parent) = output.parent().filter(|parent| !parent.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(io_error)?;
    }
    let file = File::create(output).map_err(io_error)?;
    let mut writer = BufWriter::new(file);
    write_csv(&mut writer, header, &rows).map_err(io_error)?;
    writer.flush().map_err(io_error)?;
    Ok(rows.len())
}

fn write_csv<W: Write>(writer: &mut W, header: &[&str], rows: &[Vec<String>]) -> std::io::Result<()> {
    write_record(writer, header.iter().copied())?;
    for row in rows {
        write_record(writer, row.iter().map(String::as_str))?;
    }
    Ok(())
}

fn write_record<'a, W: Write>(
    writer: &mut W,
    fields: impl Iterator<Item = &'a str>,
) -> std::io::Result<()> {
    let line = fields.map(csv_field).collect::<Vec<_>>().join(",");
    writer.write_all(line.as_bytes())?;
    writer.write_all(b"\r\n")
}

fn csv_field(value: &str) -> Cow<'_, str> {
    if value.contains([',', '"', '\n', '\r']) {
        Cow::Owned(format!("\"{}\"", value.replace('"', "\"\"")))
    } else {
        Cow::Borrowed(value)
    }
}
