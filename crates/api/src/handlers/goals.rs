use axum::extract::State;
use axum::http::StatusCode;
use kartiquo_core::domain::goal::{validate_contribution, GoalProgress, NewGoal};
use serde::Deserialize;
use uuid::Uuid;

use crate::error::AppError;
use crate::extract::{Json, Path};
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct ContributionRequest {
    pub amount: f64,
}

pub async fn list_goals(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> Result<Json<Vec<GoalProgress>>, AppError> {
    let store = state.store()?;
    let goals = store.list_goals(&user_id).await?;
    Ok(Json(goals.into_iter().map(GoalProgress::from).collect()))
}

pub async fn create_goal(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
    Json(input): Json<NewGoal>,
) -> Result<(StatusCode, Json<GoalProgress>), AppError> {
    let store = state.store()?;
    let goal = input.validate()?;
    store.insert_goal(&user_id, &goal).await?;
    tracing::info!(
        %user_id,
        goal_id = %goal.id,
        target_amount = goal.target_amount,
        "goal created"
    );
    Ok((StatusCode::CREATED, Json(goal.into())))
}

pub async fn delete_goal(
    State(state): State<AppState>,
    Path((user_id, goal_id)): Path<(String, Uuid)>,
) -> Result<StatusCode, AppError> {
    let store = state.store()?;
    if !store.delete_goal(&user_id, goal_id).await? {
        return Err(AppError::not_found("goal not found"));
    }
    Ok(StatusCode::NO_CONTENT)
}

pub async fn contribute(
    State(state): State<AppState>,
    Path((user_id, goal_id)): Path<(String, Uuid)>,
    Json(req): Json<ContributionRequest>,
) -> Result<Json<GoalProgress>, AppError> {
    let store = state.store()?;
    let amount = validate_contribution(req.amount)?;
    let goal = store
        .add_to_goal(&user_id, goal_id, amount)
        .await?
        .ok_or_else(|| AppError::not_found("goal not found"))?;
    Ok(Json(goal.into()))
}
