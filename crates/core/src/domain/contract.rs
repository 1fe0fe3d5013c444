//! Wire shapes the AI service must return, and their validation into
//! domain values. Anything that fails here is treated as a contract
//! violation, never patched up silently.

use crate::domain::budget::BudgetAllocation;
use anyhow::ensure;
use serde::{Deserialize, Serialize};

pub const NO_EXPLANATION: &str = "No explanation available.";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmBudgetAdvice {
    pub disposable_income: f64,
    pub daily_spending_limit: f64,
    pub goal_savings_suggestion: f64,
    pub explanation: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BudgetAdvice {
    pub allocation: BudgetAllocation,
    pub explanation: String,
}

impl LlmBudgetAdvice {
    pub fn validate_and_into_advice(self) -> anyhow::Result<BudgetAdvice> {
        for (field, v) in [
            ("disposable_income", self.disposable_income),
            ("daily_spending_limit", self.daily_spending_limit),
            ("goal_savings_suggestion", self.goal_savings_suggestion),
        ] {
            ensure!(v.is_finite(), "{field} must be a finite number (got {v})");
        }
        let explanation = non_empty("explanation", self.explanation)?;

        Ok(BudgetAdvice {
            allocation: BudgetAllocation {
                disposable_income: self.disposable_income,
                daily_spending_limit: self.daily_spending_limit,
                goal_savings_suggestion: self.goal_savings_suggestion,
            },
            explanation,
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmFinancialAdvice {
    pub advice: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FinancialAdvice {
    pub advice: String,
}

impl LlmFinancialAdvice {
    pub fn validate_and_into_advice(self) -> anyhow::Result<FinancialAdvice> {
        Ok(FinancialAdvice {
            advice: non_empty("advice", self.advice)?,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoryAmount {
    pub category: String,
    pub amount: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmExpenseForecast {
    pub forecasted_spending: Vec<CategoryAmount>,
    pub suggested_daily_limit: f64,
    pub explanation: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExpenseForecast {
    pub forecasted_spending: Vec<CategoryAmount>,
    pub suggested_daily_limit: f64,
    pub explanation: String,
    /// False when the values are the fallback, not model output.
    pub generated: bool,
}

impl ExpenseForecast {
    /// A user in deficit has a negative derived limit; the suggestion floors at zero.
    pub fn fallback(daily_limit: f64) -> Self {
        Self {
            forecasted_spending: Vec::new(),
            suggested_daily_limit: daily_limit.max(0.0),
            explanation: NO_EXPLANATION.to_string(),
            generated: false,
        }
    }
}

impl LlmExpenseForecast {
    pub fn validate_and_into_forecast(self) -> anyhow::Result<ExpenseForecast> {
        ensure!(
            self.suggested_daily_limit.is_finite() && self.suggested_daily_limit >= 0.0,
            "suggested_daily_limit must be a non-negative number (got {})",
            self.suggested_daily_limit
        );
        let forecasted_spending = validate_lines(self.forecasted_spending)?;
        Ok(ExpenseForecast {
            forecasted_spending,
            suggested_daily_limit: self.suggested_daily_limit,
            explanation: non_empty("explanation", self.explanation)?,
            generated: true,
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmSafetyNetPlan {
    pub prioritized_expenses: Vec<CategoryAmount>,
    pub recommendations: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SafetyNetPlan {
    pub prioritized_expenses: Vec<CategoryAmount>,
    pub recommendations: Vec<String>,
}

impl LlmSafetyNetPlan {
    pub fn validate_and_into_plan(self) -> anyhow::Result<SafetyNetPlan> {
        let prioritized_expenses = validate_lines(self.prioritized_expenses)?;
        let recommendations: Vec<String> = self
            .recommendations
            .into_iter()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();
        ensure!(
            !recommendations.is_empty(),
            "recommendations must contain at least one entry"
        );
        Ok(SafetyNetPlan {
            prioritized_expenses,
            recommendations,
        })
    }
}

fn non_empty(field: &str, s: String) -> anyhow::Result<String> {
    let s = s.trim().to_string();
    ensure!(!s.is_empty(), "{field} must be non-empty");
    Ok(s)
}

fn validate_lines(lines: Vec<CategoryAmount>) -> anyhow::Result<Vec<CategoryAmount>> {
    let mut out = Vec::with_capacity(lines.len());
    for line in lines {
        let category = non_empty("category", line.category)?;
        ensure!(
            line.amount.is_finite() && line.amount >= 0.0,
            "amount for {category} must be a non-negative number (got {})",
            line.amount
        );
        out.push(CategoryAmount {
            category,
            amount: line.amount,
        });
    }
    Ok(out)
}
