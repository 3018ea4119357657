use std::path::{Path, PathBuf};

use chrono::Local;

use crate::adapters::export::{default_export_path, export_table, ExportError, ExportTable};
use crate::core::ports::store::{ResultStorePort, RunLedgerPort};
use crate::runtime::AppContext;

use super::{CommandResult, CommandStatus};

/// Validates the table name, then writes the CSV. Returns the file written and its row count.
pub fn export_to(
    table: &str,
    output: Option<&Path>,
    export_dir: &Path,
    results: &dyn ResultStorePort,
    ledger: &dyn RunLedgerPort,
) -> Result<(PathBuf, usize), ExportError> {
    let table = ExportTable::parse(table)?;
    let path = match output {
        Some(path) => path.to_path_buf(),
        None => default_export_path(export_dir, table, Local::now()),
    };
    let rows = export_table(table, results, ledger, &path)?;
    Ok((path, rows))
}

pub fn run_export(ctx: &AppContext, table: &str, output: Option<&Path>) -> CommandResult {
    match export_to(
        table,
        output,
        &ctx.settings.export_dir,
        ctx.results.as_ref(),
        ctx.ledger.as_ref(),
    ) {
        Ok((path, rows)) => {
            log::info!("Exported {rows} row(s) from {table} to {}", path.display());
            println!("{}", path.display());
            Ok(CommandStatus::Clean)
        }
        Err(error @ ExportError::InvalidTable(_)) => {
            log::error!("{error}");
            Ok(CommandStatus::Failed)
        }
        Err(error) => Err(error.into()),
    }
}
