use chrono::{DateTime, Duration, NaiveDate, Utc};

use crate::adapters::config::Settings;
use crate::core::ports::collector::Collector;
use crate::core::task::{RunOutcome, RunStatus, RunnerError, TaskRunner};
use crate::runtime::AppContext;

use super::{CommandResult, CommandStatus};

/// Collections target the last full day in UTC unless a date is given.
pub fn default_target_date(now: DateTime<Utc>) -> NaiveDate {
    (now - Duration::days(1)).date_naive()
}

#[derive(Debug, Default)]
pub struct CollectionSummary {
    pub outcomes: Vec<RunOutcome>,
    pub missing_credentials: Vec<String>,
}

impl CollectionSummary {
    pub fn attempted(&self) -> usize {
        self.outcomes.len()
    }

    pub fn failed(&self) -> usize {
        self.outcomes.iter().filter(|outcome| outcome.is_failed()).count()
    }

    pub fn successful(&self) -> usize {
        self.attempted() - self.failed()
    }

    /// Failed when any run failed, or when nothing ran at all.
    pub fn status(&self) -> CommandStatus {
        if self.attempted() == 0 || self.failed() > 0 {
            CommandStatus::Failed
        } else {
            CommandStatus::Clean
        }
    }

    pub fn headline(&self) -> String {
        format!(
            "{}/{} successful ({} skipped: no credential)",
            self.successful(),
            self.attempted(),
            self.missing_credentials.len()
        )
    }
}

/// Runs each collector that has a credential, in order.
pub async fn collect_with<'a, I>(
    runner: &TaskRunner,
    settings: &Settings,
    collectors: I,
    date: NaiveDate,
) -> Result<CollectionSummary, RunnerError>
where
    I: IntoIterator<Item = &'a dyn Collector>,
{
    let mut summary = CollectionSummary::default();

    for collector in collectors {
        let Some(credential) = settings.api_key_for_provider(collector.provider()) else {
            log::warn!(
                "Skipping {}: no API key configured for '{}'",
                collector.display_name(),
                collector.provider()
            );
            summary
                .missing_credentials
                .push(collector.provider().to_string());
            continue;
        };

        let outcome = runner
            .execute(&collector.task_name(), collector, credential, date)
            .await?;
        log_outcome(collector, &outcome);
        summary.outcomes.push(outcome);
    }

    Ok(summary)
}

fn log_outcome(collector: &dyn Collector, outcome: &RunOutcome) {
    match outcome.status {
        RunStatus::Failed => log::error!(
            "{} collection for {} failed: {}",
            collector.display_name(),
            outcome.date,
            outcome.error.as_deref().unwrap_or("unknown error")
        ),
        RunStatus::Skipped => log::info!(
            "{} usage for {} already collected, skipping",
            collector.display_name(),
            outcome.date
        ),
        _ => log::info!(
            "{} usage for {} stored in {} ms",
            collector.display_name(),
            outcome.date,
            outcome.duration_ms
        ),
    }
}

pub async fn fetch_provider(ctx: &AppContext, provider: &str, date: NaiveDate) -> CommandResult {
    let collector = ctx.collectors.resolve(provider)?;
    let summary = collect_with(&ctx.runner, &ctx.settings, [collector], date).await?;
    if summary.attempted() == 0 {
        log::error!(
            "{} API key not configured. Set {}_API_KEY or add it to config.toml",
            collector.display_name(),
            collector.provider().to_ascii_uppercase()
        );
    }
    Ok(summary.status())
}

pub async fn fetch_all(ctx: &AppContext, date: NaiveDate) -> CommandResult {
    log::info!(
        "Collecting usage for {date} from {} provider(s)",
        ctx.collectors.len()
    );
    let summary = collect_with(&ctx.runner, &ctx.settings, ctx.collectors.iter(), date).await?;
    log::info!("Collection complete: {}", summary.headline());
    if summary.attempted() == 0 {
        log::error!("No provider has a configured API key; nothing was collected");
    }
    Ok(summary.status())
}

#[cfg(test)]
mod tests {
    use super::{collect_with, default_target_date, CollectionSummary};
    use crate::adapters::collectors::CollectorRegistry;
    use crate::adapters::config::Settings;
    use crate::core::ports::store::{RunLedgerPort, RunQuery};
    use crate::core::task::fixtures::{day, Script, ScriptedCollector, SqliteHarness};
    use crate::core::task::RunStatus;
    use crate::runtime::commands::CommandStatus;
    use chrono::{TimeZone, Utc};

    fn registry() -> CollectorRegistry {
        let mut registry = CollectorRegistry::empty();
        registry.register(Box::new(ScriptedCollector::new(
            "openai",
            Script::Usage {
                tokens: 1000,
                cost: 10.5,
            },
        )));
        registry.register(Box::new(ScriptedCollector::new(
            "anthropic",
            Script::Transient,
        )));
        registry
    }

    #[test]
    fn default_date_is_yesterday_in_utc() {
        let now = Utc
            .with_ymd_and_hms(2025, 12, 14, 0, 30, 0)
            .single()
            .expect("utc time");
        assert_eq!(default_target_date(now), day("2025-12-13"));

        let new_year = Utc
            .with_ymd_and_hms(2026, 1, 1, 23, 59, 59)
            .single()
            .expect("utc time");
        assert_eq!(default_target_date(new_year), day("2025-12-31"));
    }

    #[test]
    fn empty_summary_counts_as_failure() {
        let summary = CollectionSummary::default();
        assert_eq!(summary.status(), CommandStatus::Failed);
        assert_eq!(summary.headline(), "0/0 successful (0 skipped: no credential)");
    }

    #[tokio::test]
    async fn providers_without_credentials_are_not_attempted() {
        let harness = SqliteHarness::new();
        let registry = registry();
        let mut settings = Settings::default();
        settings.set_api_key("openai", "sk-test");

        let summary = collect_with(&harness.runner, &settings, registry.iter(), day("2025-12-13"))
            .await
            .expect("collect");

        assert_eq!(summary.attempted(), 1);
        assert_eq!(summary.missing_credentials, vec!["anthropic".to_string()]);
        assert_eq!(summary.status(), CommandStatus::Clean);
        assert_eq!(summary.headline(), "1/1 successful (1 skipped: no credential)");

        let runs = harness
            .ledger
            .query(&RunQuery::default())
            .expect("query runs");
        assert_eq!(runs.len(), 1);
        assert_eq!(runs[0].task_name, "openai_collector");

        harness.cleanup();
    }

    #[tokio::test]
    async fn one_failed_provider_fails_the_batch_without_stopping_it() {
        let harness = SqliteHarness::new();
        let registry = registry();
        let mut settings = Settings::default();
        settings.set_api_key("openai", "sk-test");
        settings.set_api_key("anthropic", "sk-ant");

        let summary = collect_with(&harness.runner, &settings, registry.iter(), day("2025-12-13"))
            .await
            .expect("collect");

        assert_eq!(summary.attempted(), 2);
        assert_eq!(summary.failed(), 1);
        assert_eq!(summary.status(), CommandStatus::Failed);
        assert_eq!(summary.outcomes[0].status, RunStatus::Success);
        assert_eq!(summary.outcomes[1].status, RunStatus::Failed);
        assert_eq!(summary.outcomes[1].task_name, "anthropic_collector");

        harness.cleanup();
    }

    #[tokio::test]
    async fn rerun_after_success_is_clean() {
        let harness = SqliteHarness::new();
        let registry = registry();
        let mut settings = Settings::default();
        settings.set_api_key("openai", "sk-test");
        let openai = registry.resolve("openai").expect("openai");

        for _ in 0..2 {
            let summary = collect_with(&harness.runner, &settings, [openai], day("2025-12-13"))
                .await
                .expect("collect");
            assert_eq!(summary.status(), CommandStatus::Clean);
        }

        let runs = harness
            .ledger
            .query(&RunQuery::default())
            .expect("query runs");
        assert_eq!(runs[0].status, RunStatus::Skipped);

        harness.cleanup();
    }
}
