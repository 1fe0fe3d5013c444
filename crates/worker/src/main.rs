use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use kartiquo_core::config::Settings;
use kartiquo_core::domain::expense::{retain_filled, ExpenseInput};
use kartiquo_core::domain::summary::{deterministic_explanation, FinancialSummary};
use kartiquo_core::llm::anthropic::AnthropicClient;
use kartiquo_core::llm::fallback::explain_budget;
use kartiquo_core::llm::offline::OfflineAdvisor;
use kartiquo_core::llm::{AdviceClient, FLOW_BUDGET};
use kartiquo_core::storage::lock::{release_user_lock, try_acquire_user_lock};
use kartiquo_core::storage::postgres::PgStore;
use kartiquo_core::storage::{AdviceRun, RunStatus, Store};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug, Parser)]
#[command(name = "kartiquo_worker")]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Compute a summary locally and print it as JSON. No database or AI calls.
    Summary {
        #[arg(long)]
        income: f64,

        /// Mandatory expense as NAME=AMOUNT. Repeatable.
        #[arg(long = "expense", value_parser = parse_expense)]
        expenses: Vec<ExpenseInput>,
    },

    /// Rebuild one stored summary from its income and expense list.
    Recompute {
        #[arg(long)]
        user_id: String,

        /// Do everything except writing to the database.
        #[arg(long)]
        dry_run: bool,

        /// Ask the advice service for a fresh explanation.
        #[arg(long)]
        with_advice: bool,
    },

    /// Rebuild every stored summary.
    RecomputeAll {
        #[arg(long)]
        dry_run: bool,

        #[arg(long)]
        with_advice: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let settings = Settings::from_env()?;
    let _sentry_guard = init_sentry(&settings);

    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env())
        .with(tracing_subscriber::fmt::layer())
        .with(sentry_tracing::layer())
        .init();

    let args = Args::parse();

    match args.command {
        Command::Summary { income, expenses } => {
            let summary = local_summary(income, expenses)?;
            println!("{}", serde_json::to_string_pretty(&summary)?);
            Ok(())
        }
        Command::Recompute {
            user_id,
            dry_run,
            with_advice,
        } => {
            let store = PgStore::connect(settings.require_database_url()?).await?;
            let advisor = with_advice.then(|| build_advisor(&settings)).transpose()?;
            let outcome = recompute_locked(&store, advisor.as_deref(), &user_id, dry_run).await?;
            tracing::info!(%user_id, ?outcome, dry_run, "recompute finished");
            Ok(())
        }
        Command::RecomputeAll {
            dry_run,
            with_advice,
        } => {
            let store = PgStore::connect(settings.require_database_url()?).await?;
            let advisor = with_advice.then(|| build_advisor(&settings)).transpose()?;
            let user_ids = store.list_user_ids().await?;

            let mut failed = 0usize;
            for user_id in &user_ids {
                match recompute_locked(&store, advisor.as_deref(), user_id, dry_run).await {
                    Ok(outcome) => {
                        tracing::info!(%user_id, ?outcome, dry_run, "recompute finished")
                    }
                    Err(err) => {
                        failed += 1;
                        sentry_anyhow::capture_anyhow(&err);
                        tracing::error!(%user_id, error = %format!("{err:#}"), "recompute failed");
                    }
                }
            }

            tracing::info!(total = user_ids.len(), failed, dry_run, "recompute-all finished");
            anyhow::ensure!(failed == 0, "{failed} of {} recomputes failed", user_ids.len());
            Ok(())
        }
    }
}

fn parse_expense(raw: &str) -> Result<ExpenseInput, String> {
    let (name, amount) = raw
        .rsplit_once('=')
        .ok_or_else(|| format!("expected NAME=AMOUNT, got {raw}"))?;
    let amount: f64 = amount
        .trim()
        .parse()
        .map_err(|e| format!("invalid amount in {raw}: {e}"))?;
    Ok(ExpenseInput::new(name.trim(), amount))
}

fn local_summary(income: f64, expenses: Vec<ExpenseInput>) -> anyhow::Result<FinancialSummary> {
    let summary = FinancialSummary::onboard(income, retain_filled(expenses))?;
    let explanation = deterministic_explanation(&summary.allocation());
    Ok(summary.with_explanation(explanation))
}

fn build_advisor(settings: &Settings) -> anyhow::Result<Arc<dyn AdviceClient>> {
    if settings.anthropic_api_key.is_none() {
        tracing::warn!("ANTHROPIC_API_KEY not set; using offline advisor");
        return Ok(Arc::new(OfflineAdvisor::new()));
    }
    Ok(Arc::new(AnthropicClient::from_settings(settings)?))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Outcome {
    NotOnboarded,
    LockBusy,
    Unchanged,
    Updated,
}

async fn recompute_locked(
    store: &PgStore,
    advisor: Option<&dyn AdviceClient>,
    user_id: &str,
    dry_run: bool,
) -> anyhow::Result<Outcome> {
    let mut conn = store
        .pool()
        .acquire()
        .await
        .context("acquire lock connection failed")?;
    if !try_acquire_user_lock(&mut conn, user_id).await? {
        tracing::warn!(%user_id, "user lock not acquired; another recompute in progress");
        return Ok(Outcome::LockBusy);
    }

    let result = recompute_user(store, advisor, user_id, dry_run).await;

    if let Err(e) = release_user_lock(&mut conn, user_id).await {
        tracing::warn!(%user_id, error = %e, "failed to release user lock");
    }
    result
}

/// Rebuilds the stored summary. The explanation is kept unless an advisor is
/// given; a transport failure from the advisor leaves the stored record as is.
async fn recompute_user(
    store: &dyn Store,
    advisor: Option<&dyn AdviceClient>,
    user_id: &str,
    dry_run: bool,
) -> anyhow::Result<Outcome> {
    let Some(current) = store.get_summary(user_id).await? else {
        return Ok(Outcome::NotOnboarded);
    };

    let mut next = current.recompute();
    if let Some(advisor) = advisor {
        let provider = advisor.provider().as_str();
        match explain_budget(advisor, &next).await {
            Ok(advised) => {
                let mut run = AdviceRun::new(
                    user_id,
                    FLOW_BUDGET,
                    provider,
                    if advised.is_fallback() {
                        RunStatus::Fallback
                    } else {
                        RunStatus::Success
                    },
                );
                if let Some(reason) = &advised.fallback_reason {
                    run = run.with_error(reason);
                }
                if !dry_run {
                    store.record_advice_run(&run).await?;
                }
                next = next.with_explanation(advised.value);
            }
            Err(err) => {
                if !dry_run {
                    let run = AdviceRun::new(user_id, FLOW_BUDGET, provider, RunStatus::Error)
                        .with_error(&err);
                    store.record_advice_run(&run).await?;
                }
                return Err(err.context(format!("budget explanation failed for user {user_id}")));
            }
        }
    }

    let drift = next.allocation().max_deviation(&current.allocation());
    let unchanged = drift == 0.0
        && next.total_mandatory_expenses == current.total_mandatory_expenses
        && next.explanation == current.explanation;
    if unchanged {
        return Ok(Outcome::Unchanged);
    }

    tracing::info!(
        %user_id,
        drift,
        disposable_income = next.disposable_income,
        daily_spending_limit = next.daily_spending_limit,
        previous_daily_spending_limit = current.daily_spending_limit,
        dry_run,
        "summary changed"
    );
    if !dry_run {
        store.put_summary(user_id, &next).await?;
    }
    Ok(Outcome::Updated)
}

fn init_sentry(settings: &Settings) -> Option<sentry::ClientInitGuard> {
    let dsn = settings.sentry_dsn.as_deref()?;
    Some(sentry::init((
        dsn,
        sentry::ClientOptions {
            release: sentry::release_name!(),
            ..Default::default()
        },
    )))
}

#[cfg(test)]
mod tests {
    use super::*;
    use kartiquo_core::storage::memory::MemoryStore;

    #[test]
    fn parses_expense_arguments() {
        assert_eq!(
            parse_expense("Rent=15000").unwrap(),
            ExpenseInput::new("Rent", 15000.0)
        );
        assert_eq!(
            parse_expense(" Car loan = 8000.5").unwrap(),
            ExpenseInput::new("Car loan", 8000.5)
        );
        assert!(parse_expense("Rent").is_err());
        assert!(parse_expense("Rent=lots").is_err());
    }

    #[test]
    fn local_summary_matches_worked_example() {
        let s = local_summary(
            50000.0,
            vec![
                ExpenseInput::new("Rent", 15000.0),
                ExpenseInput::new("EMI", 8000.0),
                ExpenseInput::new("Electricity", 1200.0),
            ],
        )
        .unwrap();
        assert_eq!(s.total_mandatory_expenses, 24200.0);
        assert_eq!(s.disposable_income, 25800.0);
        assert!(s.explanation.is_some());
        assert!(local_summary(0.0, vec![]).is_err());
    }

    #[tokio::test]
    async fn recompute_resets_override_unless_dry_run() {
        let store = MemoryStore::new();
        assert_eq!(
            recompute_user(&store, None, "u1", false).await.unwrap(),
            Outcome::NotOnboarded
        );

        let s = local_summary(50000.0, vec![ExpenseInput::new("Rent", 15000.0)]).unwrap();
        let derived_limit = s.daily_spending_limit;
        store
            .put_summary("u1", &s.with_daily_limit(100.0).unwrap())
            .await
            .unwrap();

        assert_eq!(
            recompute_user(&store, None, "u1", true).await.unwrap(),
            Outcome::Updated
        );
        let stored = store.get_summary("u1").await.unwrap().unwrap();
        assert_eq!(stored.daily_spending_limit, 100.0);

        assert_eq!(
            recompute_user(&store, None, "u1", false).await.unwrap(),
            Outcome::Updated
        );
        let stored = store.get_summary("u1").await.unwrap().unwrap();
        assert_eq!(stored.daily_spending_limit, derived_limit);

        assert_eq!(
            recompute_user(&store, None, "u1", false).await.unwrap(),
            Outcome::Unchanged
        );
    }

    #[tokio::test]
    async fn recompute_with_advice_records_run() {
        let store = MemoryStore::new();
        let s = FinancialSummary::onboard(
            3000.0,
            retain_filled(vec![ExpenseInput::new("Rent", 1200.0)]),
        )
        .unwrap();
        store.put_summary("u1", &s).await.unwrap();

        let advisor = OfflineAdvisor::new();
        assert_eq!(
            recompute_user(&store, Some(&advisor), "u1", false).await.unwrap(),
            Outcome::Updated
        );
        let stored = store.get_summary("u1").await.unwrap().unwrap();
        assert!(stored.explanation.is_some());
        let runs = store.advice_runs().await;
        assert_eq!(runs.len(), 1);
        assert_eq!(runs[0].status, RunStatus::Success);
    }
}
