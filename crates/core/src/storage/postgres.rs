use crate::domain::expense::Expense;
use crate::domain::goal::Goal;
use crate::domain::summary::FinancialSummary;
use crate::domain::transaction::Transaction;
use crate::storage::{AdviceRun, Store};
use anyhow::Context;
use chrono::{DateTime, NaiveDate, Utc};
use uuid::Uuid;

type GoalRow = (Uuid, String, f64, f64, NaiveDate, DateTime<Utc>);

const GOAL_COLUMNS: &str = "id, name, target_amount, current_amount, deadline, created_at";

fn goal_from_row((id, name, target_amount, current_amount, deadline, created_at): GoalRow) -> Goal {
    Goal {
        id,
        name,
        target_amount,
        current_amount,
        deadline,
        created_at,
    }
}

#[derive(Debug, Clone)]
pub struct PgStore {
    pool: sqlx::PgPool,
}

impl PgStore {
    pub fn new(pool: sqlx::PgPool) -> Self {
        Self { pool }
    }

    pub async fn connect(database_url: &str) -> anyhow::Result<Self> {
        let pool = sqlx::postgres::PgPoolOptions::new()
            .max_connections(5)
            .connect(database_url)
            .await
            .context("connect DATABASE_URL failed")?;
        super::migrate(&pool).await?;
        Ok(Self::new(pool))
    }

    pub fn pool(&self) -> &sqlx::PgPool {
        &self.pool
    }
}

async fn insert_expense(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    user_id: &str,
    position: i32,
    expense: &Expense,
) -> anyhow::Result<()> {
    sqlx::query(
        "INSERT INTO mandatory_expenses (id, user_id, position, name, amount) \
         VALUES ($1, $2, $3, $4, $5)",
    )
    .bind(expense.id)
    .bind(user_id)
    .bind(position)
    .bind(&expense.name)
    .bind(expense.amount)
    .execute(&mut **tx)
    .await
    .context("insert mandatory_expenses failed")?;
    Ok(())
}

#[async_trait::async_trait]
impl Store for PgStore {
    async fn get_summary(&self, user_id: &str) -> anyhow::Result<Option<FinancialSummary>> {
        // Profile and expense rows must come from one snapshot so the total
        // matches the list even while put_summary runs concurrently.
        let mut tx = self.pool.begin().await.context("begin transaction failed")?;
        sqlx::query("SET TRANSACTION ISOLATION LEVEL REPEATABLE READ READ ONLY")
            .execute(&mut *tx)
            .await
            .context("set isolation level failed")?;

        let row = sqlx::query_as::<_, (f64, f64, f64, f64, f64, Option<String>, DateTime<Utc>)>(
            "SELECT total_income, total_mandatory_expenses, disposable_income, \
                    daily_spending_limit, goal_savings_suggestion, explanation, updated_at \
             FROM financial_profiles \
             WHERE user_id = $1",
        )
        .bind(user_id)
        .fetch_optional(&mut *tx)
        .await
        .context("select financial_profiles failed")?;

        let Some((
            total_income,
            total_mandatory_expenses,
            disposable_income,
            daily_spending_limit,
            goal_savings_suggestion,
            explanation,
            updated_at,
        )) = row
        else {
            return Ok(None);
        };

        let mandatory_expenses = sqlx::query_as::<_, (Uuid, String, f64)>(
            "SELECT id, name, amount \
             FROM mandatory_expenses \
             WHERE user_id = $1 \
             ORDER BY position ASC",
        )
        .bind(user_id)
        .fetch_all(&mut *tx)
        .await
        .context("select mandatory_expenses failed")?
        .into_iter()
        .map(|(id, name, amount)| Expense { id, name, amount })
        .collect();
        tx.commit().await.context("commit transaction failed")?;

        Ok(Some(FinancialSummary {
            total_income,
            mandatory_expenses,
            total_mandatory_expenses,
            disposable_income,
            daily_spending_limit,
            goal_savings_suggestion,
            explanation,
            updated_at,
        }))
    }

    async fn put_summary(&self, user_id: &str, summary: &FinancialSummary) -> anyhow::Result<()> {
        let mut tx = self.pool.begin().await.context("begin transaction failed")?;

        sqlx::query(
            "INSERT INTO financial_profiles (user_id, total_income, total_mandatory_expenses, \
                 disposable_income, daily_spending_limit, goal_savings_suggestion, explanation, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8) \
             ON CONFLICT (user_id) DO UPDATE \
               SET total_income = EXCLUDED.total_income, \
                   total_mandatory_expenses = EXCLUDED.total_mandatory_expenses, \
                   disposable_income = EXCLUDED.disposable_income, \
                   daily_spending_limit = EXCLUDED.daily_spending_limit, \
                   goal_savings_suggestion = EXCLUDED.goal_savings_suggestion, \
                   explanation = EXCLUDED.explanation, \
                   updated_at = EXCLUDED.updated_at",
        )
        .bind(user_id)
        .bind(summary.total_income)
        .bind(summary.total_mandatory_expenses)
        .bind(summary.disposable_income)
        .bind(summary.daily_spending_limit)
        .bind(summary.goal_savings_suggestion)
        .bind(&summary.explanation)
        .bind(summary.updated_at)
        .execute(&mut *tx)
        .await
        .context("upsert financial_profiles failed")?;

        sqlx::query("DELETE FROM mandatory_expenses WHERE user_id = $1")
            .bind(user_id)
            .execute(&mut *tx)
            .await
            .context("clear mandatory_expenses failed")?;

        for (position, expense) in summary.mandatory_expenses.iter().enumerate() {
            insert_expense(&mut tx, user_id, position as i32, expense).await?;
        }

        tx.commit().await.context("commit transaction failed")?;
        Ok(())
    }

    async fn list_user_ids(&self) -> anyhow::Result<Vec<String>> {
        let ids = sqlx::query_scalar::<_, String>(
            "SELECT user_id FROM financial_profiles ORDER BY user_id ASC",
        )
        .fetch_all(&self.pool)
        .await
        .context("select financial_profiles user ids failed")?;
        Ok(ids)
    }

    async fn list_goals(&self, user_id: &str) -> anyhow::Result<Vec<Goal>> {
        let rows = sqlx::query_as::<_, GoalRow>(&format!(
            "SELECT {GOAL_COLUMNS} FROM goals WHERE user_id = $1 ORDER BY created_at ASC"
        ))
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
        .context("select goals failed")?;
        Ok(rows.into_iter().map(goal_from_row).collect())
    }

    async fn insert_goal(&self, user_id: &str, goal: &Goal) -> anyhow::Result<()> {
        sqlx::query(
            "INSERT INTO goals (id, user_id, name, target_amount, current_amount, deadline, created_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7)",
        )
        .bind(goal.id)
        .bind(user_id)
        .bind(&goal.name)
        .bind(goal.target_amount)
        .bind(goal.current_amount)
        .bind(goal.deadline)
        .bind(goal.created_at)
        .execute(&self.pool)
        .await
        .context("insert goals failed")?;
        Ok(())
    }

    async fn delete_goal(&self, user_id: &str, goal_id: Uuid) -> anyhow::Result<bool> {
        let res = sqlx::query("DELETE FROM goals WHERE user_id = $1 AND id = $2")
            .bind(user_id)
            .bind(goal_id)
            .execute(&self.pool)
            .await
            .context("delete goals failed")?;
        Ok(res.rows_affected() > 0)
    }

    async fn add_to_goal(
        &self,
        user_id: &str,
        goal_id: Uuid,
        amount: f64,
    ) -> anyhow::Result<Option<Goal>> {
        let row = sqlx::query_as::<_, GoalRow>(&format!(
            "UPDATE goals SET current_amount = current_amount + $3 \
             WHERE user_id = $1 AND id = $2 \
             RETURNING {GOAL_COLUMNS}"
        ))
        .bind(user_id)
        .bind(goal_id)
        .bind(amount)
        .fetch_optional(&self.pool)
        .await
        .context("update goals current_amount failed")?;
        Ok(row.map(goal_from_row))
    }

    async fn list_transactions(&self, user_id: &str) -> anyhow::Result<Vec<Transaction>> {
        let rows = sqlx::query_as::<_, (Uuid, String, String, f64, String, DateTime<Utc>)>(
            "SELECT id, description, category, amount, kind, occurred_at \
             FROM transactions \
             WHERE user_id = $1 \
             ORDER BY occurred_at ASC",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
        .context("select transactions failed")?;

        let mut out = Vec::with_capacity(rows.len());
        for (id, description, category, amount, kind, date) in rows {
            out.push(Transaction {
                id,
                description,
                category: category
                    .parse()
                    .with_context(|| format!("invalid category in DB for transaction {id}"))?,
                amount,
                kind: kind
                    .parse()
                    .with_context(|| format!("invalid kind in DB for transaction {id}"))?,
                date,
            });
        }
        Ok(out)
    }

    async fn append_transaction(&self, user_id: &str, tx: &Transaction) -> anyhow::Result<()> {
        sqlx::query(
            "INSERT INTO transactions (id, user_id, description, category, amount, kind, occurred_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7)",
        )
        .bind(tx.id)
        .bind(user_id)
        .bind(&tx.description)
        .bind(tx.category.as_str())
        .bind(tx.amount)
        .bind(tx.kind.as_str())
        .bind(tx.date)
        .execute(&self.pool)
        .await
        .context("insert transactions failed")?;
        Ok(())
    }

    async fn record_advice_run(&self, run: &AdviceRun) -> anyhow::Result<Uuid> {
        sqlx::query(
            "INSERT INTO advice_runs (id, user_id, flow, provider, status, error, raw_response, created_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8)",
        )
        .bind(run.id)
        .bind(&run.user_id)
        .bind(run.flow)
        .bind(run.provider)
        .bind(run.status.as_str())
        .bind(&run.error)
        .bind(&run.raw_response)
        .bind(run.created_at)
        .execute(&self.pool)
        .await
        .context("insert advice_runs failed")?;
        Ok(run.id)
    }

    async fn delete_user(&self, user_id: &str) -> anyhow::Result<()> {
        let mut tx = self.pool.begin().await.context("begin transaction failed")?;
        for table in ["advice_runs", "transactions", "goals", "financial_profiles"] {
            sqlx::query(&format!("DELETE FROM {table} WHERE user_id = $1"))
                .bind(user_id)
                .execute(&mut *tx)
                .await
                .with_context(|| format!("delete {table} failed"))?;
        }
        tx.commit().await.context("commit transaction failed")?;
        Ok(())
    }
}
