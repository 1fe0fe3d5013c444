pub mod lock;
pub mod memory;
pub mod postgres;

use crate::domain::goal::Goal;
use crate::domain::summary::FinancialSummary;
use crate::domain::transaction::Transaction;
use anyhow::Context;
use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

pub async fn migrate(pool: &sqlx::PgPool) -> anyhow::Result<()> {
    sqlx::migrate!("./migrations")
        .run(pool)
        .await
        .context("sqlx migrations failed")?;
    Ok(())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Success,
    Fallback,
    Error,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::Success => "success",
            RunStatus::Fallback => "fallback",
            RunStatus::Error => "error",
        }
    }
}

/// Audit row for one call to the AI advice service.
#[derive(Debug, Clone, Serialize)]
pub struct AdviceRun {
    pub id: Uuid,
    pub user_id: String,
    pub flow: &'static str,
    pub provider: &'static str,
    pub status: RunStatus,
    pub error: Option<String>,
    pub raw_response: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
}

impl AdviceRun {
    pub fn new(
        user_id: &str,
        flow: &'static str,
        provider: &'static str,
        status: RunStatus,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id: user_id.to_string(),
            flow,
            provider,
            status,
            error: None,
            raw_response: None,
            created_at: Utc::now(),
        }
    }

    pub fn with_error(mut self, err: &anyhow::Error) -> Self {
        self.error = Some(format!("{err:#}"));
        if let Some(diag) = err.downcast_ref::<crate::llm::error::LlmDiagnosticsError>() {
            self.raw_response = diag.raw_response_json.clone().or_else(|| {
                diag.raw_output
                    .as_deref()
                    .map(|raw| serde_json::json!({ "raw_text": raw }))
            });
        }
        self
    }
}

/// The single owner of persisted user state. Every write replaces or
/// appends whole records; there is no client-side mirror.
#[async_trait::async_trait]
pub trait Store: Send + Sync {
    async fn get_summary(&self, user_id: &str) -> anyhow::Result<Option<FinancialSummary>>;

    /// Overwrites the stored summary and its expense list in full.
    async fn put_summary(&self, user_id: &str, summary: &FinancialSummary) -> anyhow::Result<()>;

    async fn list_user_ids(&self) -> anyhow::Result<Vec<String>>;

    async fn list_goals(&self, user_id: &str) -> anyhow::Result<Vec<Goal>>;

    async fn insert_goal(&self, user_id: &str, goal: &Goal) -> anyhow::Result<()>;

    async fn delete_goal(&self, user_id: &str, goal_id: Uuid) -> anyhow::Result<bool>;

    /// Atomic increment; `None` when the goal does not exist.
    async fn add_to_goal(
        &self,
        user_id: &str,
        goal_id: Uuid,
        amount: f64,
    ) -> anyhow::Result<Option<Goal>>;

    /// Oldest first.
    async fn list_transactions(&self, user_id: &str) -> anyhow::Result<Vec<Transaction>>;

    async fn append_transaction(&self, user_id: &str, tx: &Transaction) -> anyhow::Result<()>;

    async fn record_advice_run(&self, run: &AdviceRun) -> anyhow::Result<Uuid>;

    /// Removes the profile, goals, transactions and advice history.
    async fn delete_user(&self, user_id: &str) -> anyhow::Result<()>;
}
