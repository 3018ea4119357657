use crate::core::ports::store::{RunLedgerPort, StoreError};

use super::run::RunnerError;
use super::state::RunStatus;

pub(super) fn open_run(ledger: &dyn RunLedgerPort, task_name: &str) -> Result<String, RunnerError> {
    ledger
        .begin(task_name)
        .map_err(RunnerError::LedgerUnavailable)
}

pub(super) fn close_run(
    ledger: &dyn RunLedgerPort,
    run_id: &str,
    status: RunStatus,
    error: Option<&str>,
) -> Result<(), RunnerError> {
    ledger
        .complete(run_id, status, error)
        .map_err(ledger_error)
}

fn ledger_error(error: StoreError) -> RunnerError {
    if error.is_contract_violation() {
        RunnerError::LedgerContract(error)
    } else {
        RunnerError::LedgerUnavailable(error)
    }
}
