use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use chrono::{NaiveDate, Utc};
use clap::{Parser, ValueEnum};

use crate::adapters::config::Settings;
use crate::adapters::emitter::LogEmitter;

use super::commands::{collect, export, runs, CommandResult, CommandStatus};
use super::{logging, AppContext};

const EXIT_FATAL: u8 = 2;

#[derive(Parser, Debug)]
#[command(name = "agent-os")]
#[command(about = "Collects daily AI provider usage into a local SQLite ledger")]
#[command(version)]
#[command(arg_required_else_help = true)]
pub struct Cli {
    /// Task to run
    #[arg(long, value_enum)]
    pub task: Task,

    /// Usage date to collect (YYYY-MM-DD). Defaults to yesterday in UTC
    #[arg(long)]
    pub date: Option<NaiveDate>,

    /// Config file (defaults to ~/.agent-os/config.toml)
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Table to export: results or runs
    #[arg(long, default_value = "results")]
    pub table: String,

    /// Export destination (defaults to export_<table>_<timestamp>.csv in export_dir)
    #[arg(long)]
    pub output: Option<PathBuf>,

    /// Only list runs with this status
    #[arg(long)]
    pub status: Option<String>,

    /// Only list runs of this task, e.g. openai_collector
    #[arg(long)]
    pub task_name: Option<String>,

    /// Maximum number of runs to list
    #[arg(long, default_value_t = 20)]
    pub limit: usize,
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum Task {
    #[value(name = "fetch_openai")]
    FetchOpenai,
    #[value(name = "fetch_anthropic")]
    FetchAnthropic,
    #[value(name = "run_all")]
    RunAll,
    #[value(name = "export")]
    Export,
    #[value(name = "runs")]
    Runs,
}

pub async fn run() -> ExitCode {
    // Secrets may live in a local .env; a missing file is fine.
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();

    let config_path = cli
        .config
        .clone()
        .unwrap_or_else(Settings::global_config_path);
    let (mut settings, load_error) = match Settings::load(&config_path) {
        Ok(settings) => (settings, None),
        Err(error) => (Settings::default(), Some(error)),
    };
    let upgraded = if load_error.is_none() {
        settings.upgrade_if_needed(&config_path)
    } else {
        Ok(false)
    };
    settings.apply_env_overrides(std::env::vars());

    let log_file_error = logging::init(settings.log_file.as_deref()).err();
    if let Some(error) = load_error {
        log::warn!("{error}. Using default settings");
    }
    if let Some(error) = log_file_error {
        log::warn!("Cannot open log file, logging to stderr: {error}");
    }
    match upgraded {
        Ok(true) => log::info!("Upgraded config at {}", config_path.display()),
        Ok(false) => {}
        Err(error) => log::warn!("Failed to upgrade config: {error}"),
    }
    log::info!("agent-os v{} task={:?}", env!("CARGO_PKG_VERSION"), cli.task);

    let ctx = match AppContext::new(settings, Arc::new(LogEmitter::default())) {
        Ok(ctx) => ctx,
        Err(error) => {
            log::error!("Failed to initialize: {error}");
            return ExitCode::from(EXIT_FATAL);
        }
    };

    exit_code(dispatch(&ctx, &cli).await)
}

async fn dispatch(ctx: &AppContext, cli: &Cli) -> CommandResult {
    let date = cli.date.unwrap_or_else(|| collect::default_target_date(Utc::now()));
    match cli.task {
        Task::FetchOpenai => collect::fetch_provider(ctx, "openai", date).await,
        Task::FetchAnthropic => collect::fetch_provider(ctx, "anthropic", date).await,
        Task::RunAll => collect::fetch_all(ctx, date).await,
        Task::Export => export::run_export(ctx, &cli.table, cli.output.as_deref()),
        Task::Runs => runs::print_runs(
            ctx,
            cli.status.as_deref(),
            cli.task_name.as_deref(),
            cli.limit,
        ),
    }
}

fn exit_code(result: CommandResult) -> ExitCode {
    match result {
        Ok(CommandStatus::Clean) => ExitCode::SUCCESS,
        Ok(CommandStatus::Failed) => ExitCode::FAILURE,
        Err(error) => {
            log::error!("Fatal: {error}");
            ExitCode::from(EXIT_FATAL)
        }
    }
}
