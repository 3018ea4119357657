use std::error::Error;
use std::sync::Arc;

use crate::adapters::collectors::CollectorRegistry;
use crate::adapters::config::Settings;
use crate::adapters::store::{Database, SqliteResultStore, SqliteRunLedger};
use crate::core::ports::emitter::EmitterPort;
use crate::core::task::TaskRunner;

/// Everything a command needs, wired once per invocation.
pub struct AppContext {
    pub settings: Settings,
    pub results: Arc<SqliteResultStore>,
    pub ledger: Arc<SqliteRunLedger>,
    pub runner: TaskRunner,
    pub collectors: CollectorRegistry,
}

impl AppContext {
    pub fn new(settings: Settings, emitter: Arc<dyn EmitterPort>) -> Result<Self, Box<dyn Error>> {
        // Creates the schema up front so a bad db_path fails before any run starts.
        Database::open(&settings.db_path)?;

        let results = Arc::new(SqliteResultStore::new(settings.db_path.clone()));
        let ledger = Arc::new(SqliteRunLedger::new(settings.db_path.clone()));
        let runner = TaskRunner::new(results.clone(), ledger.clone(), emitter.clone());
        let collectors = CollectorRegistry::from_settings(&settings, emitter)?;

        Ok(Self {
            settings,
            results,
            ledger,
            runner,
            collectors,
        })
    }
}
