use crate::domain::goal::Goal;
use crate::domain::summary::FinancialSummary;
use crate::domain::transaction::Transaction;
use crate::storage::{AdviceRun, Store};
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

#[derive(Debug, Default)]
struct UserData {
    summary: Option<FinancialSummary>,
    goals: Vec<Goal>,
    transactions: Vec<Transaction>,
}

/// Process-local store for tests and `STORE_BACKEND=memory`. State is lost on exit.
#[derive(Debug, Default)]
pub struct MemoryStore {
    users: RwLock<HashMap<String, UserData>>,
    advice_runs: RwLock<Vec<AdviceRun>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn advice_runs(&self) -> Vec<AdviceRun> {
        self.advice_runs.read().await.clone()
    }
}

#[async_trait::async_trait]
impl Store for MemoryStore {
    async fn get_summary(&self, user_id: &str) -> anyhow::Result<Option<FinancialSummary>> {
        let users = self.users.read().await;
        Ok(users.get(user_id).and_then(|u| u.summary.clone()))
    }

    async fn put_summary(&self, user_id: &str, summary: &FinancialSummary) -> anyhow::Result<()> {
        let mut users = self.users.write().await;
        users.entry(user_id.to_string()).or_default().summary = Some(summary.clone());
        Ok(())
    }

    async fn list_user_ids(&self) -> anyhow::Result<Vec<String>> {
        let users = self.users.read().await;
        let mut ids: Vec<String> = users
            .iter()
            .filter(|(_, u)| u.summary.is_some())
            .map(|(id, _)| id.clone())
            .collect();
        ids.sort();
        Ok(ids)
    }

    async fn list_goals(&self, user_id: &str) -> anyhow::Result<Vec<Goal>> {
        let users = self.users.read().await;
        Ok(users.get(user_id).map(|u| u.goals.clone()).unwrap_or_default())
    }

    async fn insert_goal(&self, user_id: &str, goal: &Goal) -> anyhow::Result<()> {
        let mut users = self.users.write().await;
        users
            .entry(user_id.to_string())
            .or_default()
            .goals
            .push(goal.clone());
        Ok(())
    }

    async fn delete_goal(&self, user_id: &str, goal_id: Uuid) -> anyhow::Result<bool> {
        let mut users = self.users.write().await;
        let Some(user) = users.get_mut(user_id) else {
            return Ok(false);
        };
        let before = user.goals.len();
        user.goals.retain(|g| g.id != goal_id);
        Ok(user.goals.len() != before)
    }

    async fn add_to_goal(
        &self,
        user_id: &str,
        goal_id: Uuid,
        amount: f64,
    ) -> anyhow::Result<Option<Goal>> {
        let mut users = self.users.write().await;
        let goal = users
            .get_mut(user_id)
            .and_then(|u| u.goals.iter_mut().find(|g| g.id == goal_id));
        Ok(goal.map(|g| {
            g.current_amount += amount;
            g.clone()
        }))
    }

    async fn list_transactions(&self, user_id: &str) -> anyhow::Result<Vec<Transaction>> {
        let users = self.users.read().await;
        let mut out = users
            .get(user_id)
            .map(|u| u.transactions.clone())
            .unwrap_or_default();
        out.sort_by_key(|t| t.date);
        Ok(out)
    }

    async fn append_transaction(&self, user_id: &str, tx: &Transaction) -> anyhow::Result<()> {
        let mut users = self.users.write().await;
        users
            .entry(user_id.to_string())
            .or_default()
            .transactions
            .push(tx.clone());
        Ok(())
    }

    async fn record_advice_run(&self, run: &AdviceRun) -> anyhow::Result<Uuid> {
        self.advice_runs.write().await.push(run.clone());
        Ok(run.id)
    }

    async fn delete_user(&self, user_id: &str) -> anyhow::Result<()> {
        self.users.write().await.remove(user_id);
        self.advice_runs.write().await.retain(|r| r.user_id != user_id);
        Ok(())
    }
}
