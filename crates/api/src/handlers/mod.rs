pub mod advice;
pub mod budget;
pub mod goals;
pub mod transactions;

use kartiquo_core::domain::summary::FinancialSummary;
use kartiquo_core::llm::fallback::{explain_budget, Advised};
use kartiquo_core::llm::FLOW_BUDGET;
use kartiquo_core::storage::{AdviceRun, RunStatus, Store};

use crate::error::AppError;
use crate::AppState;

async fn load_summary(store: &dyn Store, user_id: &str) -> Result<FinancialSummary, AppError> {
    store
        .get_summary(user_id)
        .await?
        .ok_or_else(|| {
            AppError::not_found("financial profile not found; complete onboarding first")
        })
}

/// The audit log is best effort: a failed insert is logged and the request carries on.
async fn record_run(store: &dyn Store, run: AdviceRun) {
    if let Err(err) = store.record_advice_run(&run).await {
        tracing::warn!(
            user_id = %run.user_id,
            flow = run.flow,
            error = %format!("{err:#}"),
            "failed to record advice run"
        );
    }
}

fn advised_run<T>(
    state: &AppState,
    user_id: &str,
    flow: &'static str,
    advised: &Advised<T>,
) -> AdviceRun {
    let provider = state.advisor.provider().as_str();
    match &advised.fallback_reason {
        Some(reason) => {
            AdviceRun::new(user_id, flow, provider, RunStatus::Fallback).with_error(reason)
        }
        None => AdviceRun::new(user_id, flow, provider, RunStatus::Success),
    }
}

fn failed_run(
    state: &AppState,
    user_id: &str,
    flow: &'static str,
    err: &anyhow::Error,
) -> AdviceRun {
    let provider = state.advisor.provider().as_str();
    AdviceRun::new(user_id, flow, provider, RunStatus::Error).with_error(err)
}

/// Attaches the budget explanation to a freshly assembled summary. A
/// transport failure aborts the caller before anything is written.
async fn explain(
    state: &AppState,
    store: &dyn Store,
    user_id: &str,
    summary: FinancialSummary,
) -> Result<FinancialSummary, AppError> {
    match explain_budget(state.advisor.as_ref(), &summary).await {
        Ok(advised) => {
            record_run(store, advised_run(state, user_id, FLOW_BUDGET, &advised)).await;
            Ok(summary.with_explanation(advised.value))
        }
        Err(err) => {
            record_run(store, failed_run(state, user_id, FLOW_BUDGET, &err)).await;
            Err(AppError::bad_gateway(err))
        }
    }
}
