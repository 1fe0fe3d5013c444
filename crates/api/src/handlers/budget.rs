use axum::extract::State;
use axum::http::StatusCode;
use kartiquo_core::domain::expense::{retain_filled, ExpenseInput};
use kartiquo_core::domain::scenario::{simulate, ScenarioInput, ScenarioOutcome};
use kartiquo_core::domain::summary::FinancialSummary;
use serde::Deserialize;
use uuid::Uuid;

use super::{explain, load_summary};
use crate::error::AppError;
use crate::extract::{Json, Path};
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct OnboardingRequest {
    pub total_income: f64,
    #[serde(default)]
    pub mandatory_expenses: Vec<ExpenseInput>,
}

#[derive(Debug, Deserialize)]
pub struct DailyLimitRequest {
    pub daily_spending_limit: f64,
}

/// Builds the first summary from income and fixed costs. Blank expense rows
/// are dropped; submitting again replaces the stored profile.
pub async fn onboard(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
    Json(req): Json<OnboardingRequest>,
) -> Result<(StatusCode, Json<FinancialSummary>), AppError> {
    let store = state.store()?;
    let summary =
        FinancialSummary::onboard(req.total_income, retain_filled(req.mandatory_expenses))?;
    let summary = explain(&state, store.as_ref(), &user_id, summary).await?;
    store.put_summary(&user_id, &summary).await?;

    tracing::info!(
        %user_id,
        disposable_income = summary.disposable_income,
        expenses = summary.mandatory_expenses.len(),
        "onboarding complete"
    );
    Ok((StatusCode::CREATED, Json(summary)))
}

pub async fn get_summary(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> Result<Json<FinancialSummary>, AppError> {
    let store = state.store()?;
    Ok(Json(load_summary(store.as_ref(), &user_id).await?))
}

pub async fn add_expense(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
    Json(input): Json<ExpenseInput>,
) -> Result<(StatusCode, Json<FinancialSummary>), AppError> {
    let store = state.store()?;
    let expense = input.validate()?;
    let current = load_summary(store.as_ref(), &user_id).await?;

    let mut expenses = current.mandatory_expenses.clone();
    expenses.push(expense);
    let next = current.recompute_with(expenses)?;
    let summary = explain(&state, store.as_ref(), &user_id, next).await?;
    store.put_summary(&user_id, &summary).await?;

    Ok((StatusCode::CREATED, Json(summary)))
}

pub async fn remove_expense(
    State(state): State<AppState>,
    Path((user_id, expense_id)): Path<(String, Uuid)>,
) -> Result<Json<FinancialSummary>, AppError> {
    let store = state.store()?;
    let current = load_summary(store.as_ref(), &user_id).await?;

    let mut expenses = current.mandatory_expenses.clone();
    let before = expenses.len();
    expenses.retain(|e| e.id != expense_id);
    if expenses.len() == before {
        return Err(AppError::not_found("expense not found"));
    }

    let next = current.recompute_with(expenses)?;
    let summary = explain(&state, store.as_ref(), &user_id, next).await?;
    store.put_summary(&user_id, &summary).await?;

    Ok(Json(summary))
}

/// Manual override. Holds until the next recompute (expense change or
/// re-onboarding) derives the limit again.
pub async fn set_daily_limit(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
    Json(req): Json<DailyLimitRequest>,
) -> Result<Json<FinancialSummary>, AppError> {
    let store = state.store()?;
    let summary = load_summary(store.as_ref(), &user_id)
        .await?
        .with_daily_limit(req.daily_spending_limit)?;
    store.put_summary(&user_id, &summary).await?;
    Ok(Json(summary))
}

pub async fn simulate_scenario(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
    Json(input): Json<ScenarioInput>,
) -> Result<Json<ScenarioOutcome>, AppError> {
    let store = state.store()?;
    let summary = load_summary(store.as_ref(), &user_id).await?;
    Ok(Json(simulate(&summary, &input)?))
}

pub async fn delete_user(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> Result<StatusCode, AppError> {
    let store = state.store()?;
    store.delete_user(&user_id).await?;
    tracing::info!(%user_id, "user data deleted");
    Ok(StatusCode::NO_CONTENT)
}
