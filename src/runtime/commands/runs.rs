use std::error::Error;

use crate::core::ports::store::{RunLedgerPort, RunQuery, RunSummary};
use crate::core::task::RunStatus;
use crate::runtime::AppContext;

use super::{CommandResult, CommandStatus};

pub fn recent_runs(
    ledger: &dyn RunLedgerPort,
    status: Option<&str>,
    task_name: Option<&str>,
    limit: usize,
) -> Result<Vec<RunSummary>, Box<dyn Error>> {
    let status = status
        .map(|raw| {
            RunStatus::parse(raw).ok_or_else(|| {
                format!("Unknown run status: '{raw}'. Must be one of: pending, running, success, failed, skipped")
            })
        })
        .transpose()?;
    let task_name = task_name
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .map(str::to_string);

    Ok(ledger.query(&RunQuery {
        status,
        task_name,
        limit,
    })?)
}

pub fn format_run(run: &RunSummary) -> String {
    let mut line = format!(
        "{}  {:<22} {:<8} {}",
        run.started_at,
        run.task_name,
        run.status.as_str(),
        run.id
    );
    if let Some(finished_at) = &run.finished_at {
        line.push_str(&format!("  finished {finished_at}"));
    }
    if let Some(error) = &run.error {
        line.push_str(&format!("  error: {error}"));
    }
    line
}

pub fn print_runs(
    ctx: &AppContext,
    status: Option<&str>,
    task_name: Option<&str>,
    limit: usize,
) -> CommandResult {
    let runs = recent_runs(ctx.ledger.as_ref(), status, task_name, limit)?;
    if runs.is_empty() {
        log::info!("No runs recorded yet");
    }
    for run in &runs {
        println!("{}", format_run(run));
    }
    Ok(CommandStatus::Clean)
}
