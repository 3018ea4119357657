mod ledger;
pub mod run;
pub mod state;

use std::sync::Arc;

use crate::core::ports::{
    emitter::EmitterPort,
    store::{ResultStorePort, RunLedgerPort},
};

pub use run::{RunOutcome, RunnerError};
pub use state::RunStatus;

/// Runs one collector invocation at a time against the shared stores.
pub struct TaskRunner {
    pub(crate) results: Arc<dyn ResultStorePort>,
    pub(crate) ledger: Arc<dyn RunLedgerPort>,
    pub(crate) emitter: Arc<dyn EmitterPort>,
}

impl TaskRunner {
    pub fn new(
        results: Arc<dyn ResultStorePort>,
        ledger: Arc<dyn RunLedgerPort>,
        emitter: Arc<dyn EmitterPort>,
    ) -> Self {
        Self {
            results,
            ledger,
            emitter,
        }
    }
}

#[cfg(test)]
pub(crate) mod fixtures;
