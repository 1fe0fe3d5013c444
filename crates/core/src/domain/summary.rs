use crate::domain::budget::{round2, BudgetAllocation};
use crate::domain::expense::{total_mandatory_expenses, Expense};
use crate::domain::validation::{ensure_finite, is_positive_amount, ValidationError};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The derived budget record stored per user. Always rebuilt as a whole from
/// income and the expense list; the store replaces the previous record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FinancialSummary {
    pub total_income: f64,
    pub mandatory_expenses: Vec<Expense>,
    pub total_mandatory_expenses: f64,
    pub disposable_income: f64,
    pub daily_spending_limit: f64,
    pub goal_savings_suggestion: f64,
    pub explanation: Option<String>,
    pub updated_at: DateTime<Utc>,
}

impl FinancialSummary {
    pub fn assemble(total_income: f64, mandatory_expenses: Vec<Expense>) -> Self {
        let total_mandatory_expenses = total_mandatory_expenses(&mandatory_expenses);
        let allocation = BudgetAllocation::compute(total_income, total_mandatory_expenses);
        Self {
            total_income,
            mandatory_expenses,
            total_mandatory_expenses,
            disposable_income: allocation.disposable_income,
            daily_spending_limit: allocation.daily_spending_limit,
            goal_savings_suggestion: allocation.goal_savings_suggestion,
            explanation: None,
            updated_at: Utc::now(),
        }
    }

    /// Onboarding entry point: income must be positive.
    pub fn onboard(
        total_income: f64,
        mandatory_expenses: Vec<Expense>,
    ) -> Result<Self, ValidationError> {
        if !is_positive_amount(total_income) {
            return Err(ValidationError::InvalidIncome);
        }
        Self::assemble(total_income, mandatory_expenses).ensure_finite_totals()
    }

    /// Rebuilds from the stored income with a new expense list. The previous
    /// explanation is discarded since it described the old numbers.
    pub fn recompute_with(
        &self,
        mandatory_expenses: Vec<Expense>,
    ) -> Result<Self, ValidationError> {
        Self::assemble(self.total_income, mandatory_expenses).ensure_finite_totals()
    }

    /// Each expense is finite on its own but the sum can still overflow.
    fn ensure_finite_totals(self) -> Result<Self, ValidationError> {
        ensure_finite("total_mandatory_expenses", self.total_mandatory_expenses)?;
        ensure_finite("disposable_income", self.disposable_income)?;
        Ok(self)
    }

    /// Stored records passed the totals check when they were written.
    pub fn recompute(&self) -> Self {
        let mut next = Self::assemble(self.total_income, self.mandatory_expenses.clone());
        next.explanation = self.explanation.clone();
        next
    }

    pub fn with_explanation(mut self, explanation: impl Into<String>) -> Self {
        self.explanation = Some(explanation.into());
        self
    }

    pub fn with_daily_limit(mut self, daily_spending_limit: f64) -> Result<Self, ValidationError> {
        let limit = ensure_finite("daily_spending_limit", daily_spending_limit)?;
        if limit < 0.0 {
            return Err(ValidationError::InvalidDailyLimit(limit));
        }
        self.daily_spending_limit = limit;
        self.updated_at = Utc::now();
        Ok(self)
    }

    pub fn allocation(&self) -> BudgetAllocation {
        BudgetAllocation {
            disposable_income: self.disposable_income,
            daily_spending_limit: self.daily_spending_limit,
            goal_savings_suggestion: self.goal_savings_suggestion,
        }
    }
}

/// Plain-language account of the allocation. Used whenever the AI
/// explanation is unavailable.
pub fn deterministic_explanation(allocation: &BudgetAllocation) -> String {
    if allocation.disposable_income < 0.0 {
        return format!(
            "Your mandatory expenses exceed your income by {:.2}. There is nothing left for \
             daily spending or savings until income rises or fixed costs come down.",
            round2(-allocation.disposable_income)
        );
    }
    format!(
        "After mandatory expenses you have {:.2} left each month. 40% of it, spread over \
         30 days, gives a daily spending limit of {:.2}; the remaining 60% ({:.2}) goes \
         towards your savings goals.",
        round2(allocation.disposable_income),
        round2(allocation.daily_spending_limit),
        round2(allocation.goal_savings_suggestion),
    )
}
