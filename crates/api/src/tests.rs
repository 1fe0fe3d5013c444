//! Router tests backed by the in-memory store and the offline advisor.

use super::*;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use http_body_util::BodyExt;
use kartiquo_core::domain::contract::{BudgetAdvice, ExpenseForecast, FinancialAdvice, SafetyNetPlan};
use kartiquo_core::llm::offline::OfflineAdvisor;
use kartiquo_core::llm::{AdviceInput, BudgetInput, ForecastInput, Provider, SafetyNetInput};
use kartiquo_core::storage::memory::MemoryStore;
use kartiquo_core::storage::RunStatus;
use serde_json::{json, Value};
use tower::ServiceExt;

fn setup_test_app() -> (Router, Arc<MemoryStore>) {
    let store = Arc::new(MemoryStore::new());
    let state = AppState::new(Some(store.clone()), Arc::new(OfflineAdvisor::new()));
    (create_router(state), store)
}

async fn send(app: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let builder = Request::builder().method(method).uri(uri);
    let request = match body {
        Some(body) => builder
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let json = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, json)
}

fn approx(v: &Value, expected: f64) -> bool {
    v.as_f64().is_some_and(|x| (x - expected).abs() < 1e-6)
}

async fn onboard(app: &Router, user: &str) -> Value {
    let (status, json) = send(
        app,
        "POST",
        &format!("/users/{user}/onboarding"),
        Some(json!({
            "total_income": 50000.0,
            "mandatory_expenses": [
                {"name": "Rent", "amount": 15000.0},
                {"name": "EMI", "amount": 8000.0},
                {"name": "Electricity", "amount": 1200.0},
                {"name": "  ", "amount": 500.0},
                {"name": "Gym", "amount": 0.0}
            ]
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    json
}

/// Fails every call the way a dropped connection would.
struct Unreachable;

#[async_trait::async_trait]
impl kartiquo_core::llm::AdviceClient for Unreachable {
    fn provider(&self) -> Provider {
        Provider::Anthropic
    }

    async fn calculate_disposable_income(&self, _: &BudgetInput) -> anyhow::Result<BudgetAdvice> {
        anyhow::bail!("Anthropic request failed: connection refused")
    }

    async fn financial_advice(&self, _: &AdviceInput) -> anyhow::Result<FinancialAdvice> {
        anyhow::bail!("Anthropic request failed: connection refused")
    }

    async fn forecast_expenses(&self, _: &ForecastInput) -> anyhow::Result<ExpenseForecast> {
        anyhow::bail!("Anthropic request failed: connection refused")
    }

    async fn safety_net(&self, _: &SafetyNetInput) -> anyhow::Result<SafetyNetPlan> {
        anyhow::bail!("Anthropic request failed: connection refused")
    }
}

#[tokio::test]
async fn test_healthz() {
    let (app, _) = setup_test_app();
    let response = app
        .oneshot(Request::builder().uri("/healthz").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_onboarding_worked_example() {
    let (app, store) = setup_test_app();
    let summary = onboard(&app, "u1").await;

    assert_eq!(summary["total_income"], 50000.0);
    assert_eq!(summary["total_mandatory_expenses"], 24200.0);
    assert_eq!(summary["disposable_income"], 25800.0);
    assert!(approx(&summary["daily_spending_limit"], 344.0));
    assert!(approx(&summary["goal_savings_suggestion"], 15480.0));
    assert_eq!(summary["mandatory_expenses"].as_array().unwrap().len(), 3);
    assert!(summary["explanation"].as_str().unwrap().contains("344.00"));

    let (status, stored) = send(&app, "GET", "/users/u1/summary", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(stored, summary);

    let runs = store.advice_runs().await;
    assert_eq!(runs.len(), 1);
    assert_eq!(runs[0].status, RunStatus::Success);
}

#[tokio::test]
async fn test_onboarding_rejects_non_positive_income() {
    let (app, _) = setup_test_app();
    let (status, json) = send(
        &app,
        "POST",
        "/users/u1/onboarding",
        Some(json!({"total_income": 0.0, "mandatory_expenses": []})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(json["error"].as_str().unwrap().contains("income"));

    let (status, _) = send(&app, "GET", "/users/u1/summary", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_expense_add_and_remove_recompute() {
    let (app, _) = setup_test_app();
    onboard(&app, "u1").await;

    let (status, summary) = send(
        &app,
        "POST",
        "/users/u1/expenses",
        Some(json!({"name": "Internet", "amount": 800.0})),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(summary["total_mandatory_expenses"], 25000.0);
    assert_eq!(summary["disposable_income"], 25000.0);

    let rent_id = summary["mandatory_expenses"][0]["id"].as_str().unwrap().to_string();
    let (status, summary) = send(&app, "DELETE", &format!("/users/u1/expenses/{rent_id}"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(summary["total_mandatory_expenses"], 10000.0);
    assert_eq!(summary["disposable_income"], 40000.0);
    assert!(approx(&summary["daily_spending_limit"], 40000.0 * 0.4 / 30.0));

    let (status, _) = send(&app, "DELETE", &format!("/users/u1/expenses/{rent_id}"), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = send(
        &app,
        "POST",
        "/users/u1/expenses",
        Some(json!({"name": "Water", "amount": -5.0})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_daily_limit_override() {
    let (app, _) = setup_test_app();
    onboard(&app, "u1").await;

    let (status, summary) = send(
        &app,
        "PUT",
        "/users/u1/daily-limit",
        Some(json!({"daily_spending_limit": 250.0})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(summary["daily_spending_limit"], 250.0);
    assert_eq!(summary["disposable_income"], 25800.0);

    let (status, _) = send(
        &app,
        "PUT",
        "/users/u1/daily-limit",
        Some(json!({"daily_spending_limit": -1.0})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_goal_lifecycle() {
    let (app, _) = setup_test_app();

    let (status, _) = send(
        &app,
        "POST",
        "/users/u1/goals",
        Some(json!({"name": "Vacation", "target_amount": 0.0, "deadline": "2027-06-01"})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, goal) = send(
        &app,
        "POST",
        "/users/u1/goals",
        Some(json!({"name": "Vacation", "target_amount": 2500.0, "deadline": "2027-06-01"})),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(goal["progress_percent"], 0);
    let goal_id = goal["id"].as_str().unwrap().to_string();

    let uri = format!("/users/u1/goals/{goal_id}/contributions");
    let (status, _) = send(&app, "POST", &uri, Some(json!({"amount": 0.0}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, goal) = send(&app, "POST", &uri, Some(json!({"amount": 1200.0}))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(goal["current_amount"], 1200.0);
    assert_eq!(goal["progress_percent"], 48);
    assert_eq!(goal["remaining"], 1300.0);
    assert_eq!(goal["reached"], false);

    let (_, goals) = send(&app, "GET", "/users/u1/goals", None).await;
    assert_eq!(goals.as_array().unwrap().len(), 1);

    let (status, _) = send(&app, "DELETE", &format!("/users/u1/goals/{goal_id}"), None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    let (status, _) = send(&app, "DELETE", &format!("/users/u1/goals/{goal_id}"), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_transactions_check_in_and_report() {
    let (app, _) = setup_test_app();
    onboard(&app, "u1").await;

    for body in [
        json!({"description": "Groceries", "category": "Food", "amount": 200.0, "type": "expense", "date": "2026-03-10T09:00:00Z"}),
        json!({"description": "Cinema", "category": "Entertainment", "amount": 180.0, "date": "2026-03-10T20:00:00Z"}),
        json!({"description": "Bus", "category": "Transport", "amount": 40.0, "type": "expense", "date": "2026-03-11T08:00:00Z"}),
    ] {
        let (status, _) = send(&app, "POST", "/users/u1/transactions", Some(body)).await;
        assert_eq!(status, StatusCode::CREATED);
    }

    let (status, _) = send(
        &app,
        "POST",
        "/users/u1/transactions",
        Some(json!({"description": "", "category": "Food", "amount": 5.0})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (_, listed) = send(&app, "GET", "/users/u1/transactions", None).await;
    assert_eq!(listed[0]["description"], "Bus");

    let (status, check_in) = send(&app, "GET", "/users/u1/check-in?date=2026-03-10", None).await;
    assert_eq!(status, StatusCode::OK);
    assert!(approx(&check_in["daily_limit"], 344.0));
    assert_eq!(check_in["spent"], 380.0);
    assert!(approx(&check_in["remaining"], -36.0));
    assert_eq!(check_in["over_limit"], true);

    let (status, _) = send(
        &app,
        "POST",
        "/users/u1/transactions",
        Some(json!({"description": "Salary", "category": "Income", "amount": 1000.0, "type": "income"})),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    let (status, report) = send(&app, "GET", "/users/u1/reports?range=30d", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(report["total_income"], 1000.0);
    assert_eq!(report["monthly"][0]["month"], "Last 30 Days");
}

#[tokio::test]
async fn test_check_in_uses_default_limit_before_onboarding() {
    let (app, _) = setup_test_app();
    let (status, check_in) = send(&app, "GET", "/users/u9/check-in?date=2026-03-10", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(check_in["daily_limit"], 300.0);
    assert_eq!(check_in["spent"], 0.0);
}

#[tokio::test]
async fn test_scenario_does_not_persist() {
    let (app, _) = setup_test_app();
    onboard(&app, "u1").await;

    let (status, outcome) = send(
        &app,
        "POST",
        "/users/u1/scenarios",
        Some(json!({"income_change": 5000.0, "expense_changes": [{"name": "rent", "amount_change": -3000.0}]})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(outcome["projected"]["disposable_income"], 33800.0);
    assert_eq!(outcome["delta"]["disposable_income"], 8000.0);

    let (_, summary) = send(&app, "GET", "/users/u1/summary", None).await;
    assert_eq!(summary["disposable_income"], 25800.0);
}

#[tokio::test]
async fn test_advice_flows_offline() {
    let (app, store) = setup_test_app();
    onboard(&app, "u1").await;

    let (status, advice) = send(&app, "POST", "/users/u1/advice", Some(json!({"query": "How do I save?"}))).await;
    assert_eq!(status, StatusCode::OK);
    assert!(!advice["advice"].as_str().unwrap().is_empty());

    let (status, _) = send(&app, "POST", "/users/u1/advice", Some(json!({"query": "   "}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, forecast) = send(&app, "POST", "/users/u1/forecast", Some(json!({}))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(forecast["generated"], true);

    let (status, plan) = send(
        &app,
        "POST",
        "/users/u1/safety-net",
        Some(json!({
            "expenses": [{"category": "Dining", "amount": 300.0}, {"category": "Rent", "amount": 15000.0}],
            "essential_categories": ["Rent"]
        })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(plan["prioritized_expenses"][0]["category"], "Rent");

    assert_eq!(store.advice_runs().await.len(), 4);
}

#[tokio::test]
async fn test_transport_failure_returns_bad_gateway_without_writing() {
    let store = Arc::new(MemoryStore::new());
    let app = create_router(AppState::new(Some(store.clone()), Arc::new(Unreachable)));

    let (status, json) = send(
        &app,
        "POST",
        "/users/u1/onboarding",
        Some(json!({"total_income": 50000.0, "mandatory_expenses": []})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert!(json["error"].is_string());

    assert!(store.get_summary("u1").await.unwrap().is_none());
    let runs = store.advice_runs().await;
    assert_eq!(runs.len(), 1);
    assert_eq!(runs[0].status, RunStatus::Error);
}

#[tokio::test]
async fn test_degraded_mode_returns_503() {
    let app = create_router(AppState::new(None, Arc::new(OfflineAdvisor::new())));
    let (status, _) = send(&app, "GET", "/users/u1/summary", None).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
}

#[tokio::test]
async fn test_delete_user() {
    let (app, _) = setup_test_app();
    onboard(&app, "u1").await;

    let (status, _) = send(&app, "DELETE", "/users/u1", None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    let (status, _) = send(&app, "GET", "/users/u1/summary", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_malformed_input_is_a_json_bad_request() {
    let (app, store) = setup_test_app();

    let (status, json) = send(
        &app,
        "POST",
        "/users/u1/onboarding",
        Some(json!({"mandatory_expenses": []})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(json["error"].as_str().unwrap().contains("total_income"));
    assert!(store.get_summary("u1").await.unwrap().is_none());

    onboard(&app, "u1").await;

    let (status, json) = send(
        &app,
        "POST",
        "/users/u1/expenses",
        Some(json!({"name": "Internet", "amount": "lots"})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(json["error"].is_string());

    let (status, json) = send(&app, "GET", "/users/u1/reports?range=week", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(json["error"].is_string());

    let (status, json) = send(&app, "GET", "/users/u1/check-in?date=yesterday", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(json["error"].is_string());

    let (status, json) = send(&app, "DELETE", "/users/u1/expenses/not-a-uuid", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(json["error"].is_string());

    let (status, json) = send(
        &app,
        "POST",
        "/users/u1/goals/not-a-uuid/contributions",
        Some(json!({"amount": 10.0})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(json["error"].is_string());
}

#[tokio::test]
async fn test_overflowing_expense_total_is_rejected() {
    let (app, store) = setup_test_app();

    let (status, json) = send(
        &app,
        "POST",
        "/users/u1/onboarding",
        Some(json!({
            "total_income": 1000.0,
            "mandatory_expenses": [
                {"name": "A", "amount": 1e308},
                {"name": "B", "amount": 1e308}
            ]
        })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(json["error"].as_str().unwrap().contains("finite"));
    assert!(store.get_summary("u1").await.unwrap().is_none());

    let (status, _) = send(
        &app,
        "POST",
        "/users/u1/onboarding",
        Some(json!({
            "total_income": 1000.0,
            "mandatory_expenses": [{"name": "A", "amount": 1e308}]
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, _) = send(
        &app,
        "POST",
        "/users/u1/expenses",
        Some(json!({"name": "B", "amount": 1e308})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    let stored = store.get_summary("u1").await.unwrap().unwrap();
    assert_eq!(stored.mandatory_expenses.len(), 1);
    assert!(stored.total_mandatory_expenses.is_finite());
}
