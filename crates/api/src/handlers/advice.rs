use std::collections::BTreeMap;

use axum::extract::State;
use chrono::{Duration, Utc};
use kartiquo_core::domain::contract::{
    CategoryAmount, ExpenseForecast, FinancialAdvice, SafetyNetPlan,
};
use kartiquo_core::domain::report::spending_by_category;
use kartiquo_core::domain::transaction::Transaction;
use kartiquo_core::llm::fallback::forecast_or_fallback;
use kartiquo_core::llm::{
    AdviceInput, ForecastInput, SafetyNetInput, FLOW_ADVICE, FLOW_FORECAST, FLOW_SAFETY_NET,
};
use kartiquo_core::storage::{AdviceRun, RunStatus, Store};
use serde::Deserialize;

use super::{advised_run, failed_run, record_run};
use crate::error::AppError;
use crate::extract::{Json, Path};
use crate::AppState;

/// Window of spending used when a safety-net request omits its expenses.
const SAFETY_NET_LOOKBACK_DAYS: i64 = 30;

#[derive(Debug, Deserialize)]
pub struct AdviceRequest {
    pub query: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct ForecastRequest {
    #[serde(default)]
    pub seasonal_trends: BTreeMap<String, String>,
}

#[derive(Debug, Deserialize)]
pub struct SafetyNetRequest {
    pub income: Option<f64>,
    pub expenses: Option<Vec<CategoryAmount>>,
    #[serde(default)]
    pub essential_categories: Vec<String>,
}

async fn past_expenses(store: &dyn Store, user_id: &str) -> anyhow::Result<Vec<Transaction>> {
    Ok(store
        .list_transactions(user_id)
        .await?
        .into_iter()
        .filter(|t| t.is_expense())
        .collect())
}

pub async fn advise(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
    Json(req): Json<AdviceRequest>,
) -> Result<Json<FinancialAdvice>, AppError> {
    let store = state.store()?;
    let profile = store.get_summary(&user_id).await?;
    let past = past_expenses(store.as_ref(), &user_id).await?;
    let input = AdviceInput::try_new(&req.query, profile, past)?;

    match state.advisor.financial_advice(&input).await {
        Ok(advice) => {
            let run = AdviceRun::new(
                &user_id,
                FLOW_ADVICE,
                state.advisor.provider().as_str(),
                RunStatus::Success,
            );
            record_run(store.as_ref(), run).await;
            Ok(Json(advice))
        }
        Err(err) => {
            record_run(store.as_ref(), failed_run(&state, &user_id, FLOW_ADVICE, &err)).await;
            Err(AppError::bad_gateway(err))
        }
    }
}

/// Falls back to an empty breakdown at the stored daily limit when the
/// answer breaks its contract.
pub async fn forecast(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
    Json(req): Json<ForecastRequest>,
) -> Result<Json<ExpenseForecast>, AppError> {
    let store = state.store()?;
    let daily_limit = store
        .get_summary(&user_id)
        .await?
        .map(|s| s.daily_spending_limit)
        .unwrap_or(0.0);
    let input = ForecastInput {
        past_expenses: past_expenses(store.as_ref(), &user_id).await?,
        seasonal_trends: req.seasonal_trends,
    };

    match forecast_or_fallback(state.advisor.as_ref(), &input, daily_limit).await {
        Ok(advised) => {
            let run = advised_run(&state, &user_id, FLOW_FORECAST, &advised);
            record_run(store.as_ref(), run).await;
            Ok(Json(advised.value))
        }
        Err(err) => {
            record_run(store.as_ref(), failed_run(&state, &user_id, FLOW_FORECAST, &err)).await;
            Err(AppError::bad_gateway(err))
        }
    }
}

/// Income defaults to the stored profile and expenses to the last 30 days
/// of spending by category.
pub async fn safety_net(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
    Json(req): Json<SafetyNetRequest>,
) -> Result<Json<SafetyNetPlan>, AppError> {
    let store = state.store()?;

    let income = match req.income {
        Some(income) => income,
        None => store
            .get_summary(&user_id)
            .await?
            .map(|s| s.total_income)
            .ok_or_else(|| {
                AppError::bad_request("income is required until onboarding is complete")
            })?,
    };

    let expenses = match req.expenses {
        Some(expenses) => expenses,
        None => {
            let since = Utc::now() - Duration::days(SAFETY_NET_LOOKBACK_DAYS);
            let txs = store.list_transactions(&user_id).await?;
            spending_by_category(txs.iter().filter(|t| t.date >= since))
                .into_iter()
                .map(|c| CategoryAmount {
                    category: c.category.to_string(),
                    amount: c.amount,
                })
                .collect()
        }
    };

    let input = SafetyNetInput::try_new(income, expenses, req.essential_categories)?;
    match state.advisor.safety_net(&input).await {
        Ok(plan) => {
            let run = AdviceRun::new(
                &user_id,
                FLOW_SAFETY_NET,
                state.advisor.provider().as_str(),
                RunStatus::Success,
            );
            record_run(store.as_ref(), run).await;
            Ok(Json(plan))
        }
        Err(err) => {
            record_run(store.as_ref(), failed_run(&state, &user_id, FLOW_SAFETY_NET, &err)).await;
            Err(AppError::bad_gateway(err))
        }
    }
}
