use axum::extract::State;
use axum::http::StatusCode;
use chrono::{NaiveDate, Utc};
use kartiquo_core::domain::report::{
    build_report, daily_check_in, DailyCheckIn, Report, ReportRange, DEFAULT_DAILY_LIMIT,
};
use kartiquo_core::domain::transaction::{NewTransaction, Transaction};
use serde::Deserialize;

use crate::error::AppError;
use crate::extract::{Json, Path, Query};
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct CheckInQuery {
    pub date: Option<NaiveDate>,
}

#[derive(Debug, Deserialize)]
pub struct ReportQuery {
    #[serde(default)]
    pub range: ReportRange,
}

/// Newest first.
pub async fn list_transactions(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> Result<Json<Vec<Transaction>>, AppError> {
    let store = state.store()?;
    let mut txs = store.list_transactions(&user_id).await?;
    txs.reverse();
    Ok(Json(txs))
}

pub async fn create_transaction(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
    Json(input): Json<NewTransaction>,
) -> Result<(StatusCode, Json<Transaction>), AppError> {
    let store = state.store()?;
    let tx = input.validate(Utc::now())?;
    store.append_transaction(&user_id, &tx).await?;
    Ok((StatusCode::CREATED, Json(tx)))
}

/// Spending for one UTC day against the stored daily limit. Users who have
/// not onboarded yet are measured against the default limit.
pub async fn check_in(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
    Query(query): Query<CheckInQuery>,
) -> Result<Json<DailyCheckIn>, AppError> {
    let store = state.store()?;
    let date = query.date.unwrap_or_else(|| Utc::now().date_naive());
    let daily_limit = store
        .get_summary(&user_id)
        .await?
        .map(|s| s.daily_spending_limit)
        .unwrap_or(DEFAULT_DAILY_LIMIT);
    let txs = store.list_transactions(&user_id).await?;
    Ok(Json(daily_check_in(&txs, date, daily_limit)))
}

pub async fn report(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
    Query(query): Query<ReportQuery>,
) -> Result<Json<Report>, AppError> {
    let store = state.store()?;
    let txs = store.list_transactions(&user_id).await?;
    Ok(Json(build_report(&txs, query.range, Utc::now())?))
}
