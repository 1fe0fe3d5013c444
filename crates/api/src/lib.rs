//! HTTP surface of the budget service.

pub mod error;
mod extract;
mod handlers;

#[cfg(test)]
mod tests;

use std::sync::Arc;

use axum::routing::{delete, get, post, put};
use axum::Router;
use kartiquo_core::llm::AdviceClient;
use kartiquo_core::storage::Store;
use tower_http::trace::TraceLayer;

use crate::error::AppError;

#[derive(Clone)]
pub struct AppState {
    /// `None` when the store could not be reached at startup; data routes answer 503.
    pub store: Option<Arc<dyn Store>>,
    pub advisor: Arc<dyn AdviceClient>,
}

impl AppState {
    pub fn new(store: Option<Arc<dyn Store>>, advisor: Arc<dyn AdviceClient>) -> Self {
        Self { store, advisor }
    }

    fn store(&self) -> Result<Arc<dyn Store>, AppError> {
        self.store
            .clone()
            .ok_or_else(|| AppError::unavailable("storage unavailable"))
    }
}

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/users/:user_id", delete(handlers::budget::delete_user))
        .route("/users/:user_id/onboarding", post(handlers::budget::onboard))
        .route("/users/:user_id/summary", get(handlers::budget::get_summary))
        .route("/users/:user_id/expenses", post(handlers::budget::add_expense))
        .route(
            "/users/:user_id/expenses/:expense_id",
            delete(handlers::budget::remove_expense),
        )
        .route(
            "/users/:user_id/daily-limit",
            put(handlers::budget::set_daily_limit),
        )
        .route(
            "/users/:user_id/scenarios",
            post(handlers::budget::simulate_scenario),
        )
        .route(
            "/users/:user_id/goals",
            get(handlers::goals::list_goals).post(handlers::goals::create_goal),
        )
        .route(
            "/users/:user_id/goals/:goal_id",
            delete(handlers::goals::delete_goal),
        )
        .route(
            "/users/:user_id/goals/:goal_id/contributions",
            post(handlers::goals::contribute),
        )
        .route(
            "/users/:user_id/transactions",
            get(handlers::transactions::list_transactions)
                .post(handlers::transactions::create_transaction),
        )
        .route(
            "/users/:user_id/check-in",
            get(handlers::transactions::check_in),
        )
        .route("/users/:user_id/reports", get(handlers::transactions::report))
        .route("/users/:user_id/advice", post(handlers::advice::advise))
        .route("/users/:user_id/forecast", post(handlers::advice::forecast))
        .route(
            "/users/:user_id/safety-net",
            post(handlers::advice::safety_net),
        )
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}

async fn healthz() -> &'static str {
    "ok"
}
