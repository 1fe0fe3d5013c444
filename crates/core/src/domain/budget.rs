use serde::{Deserialize, Serialize};

/// Share of disposable income set aside for day-to-day discretionary spend.
pub const DISCRETIONARY_SHARE: f64 = 0.4;
/// Share of disposable income suggested for savings goals.
pub const SAVINGS_SHARE: f64 = 0.6;
pub const DAYS_PER_MONTH: f64 = 30.0;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BudgetAllocation {
    pub disposable_income: f64,
    pub daily_spending_limit: f64,
    pub goal_savings_suggestion: f64,
}

impl BudgetAllocation {
    /// Splits what is left after mandatory expenses 40/60 between daily
    /// spending (spread over a 30 day month) and savings.
    ///
    /// A deficit is passed through unclamped: expenses above income give a
    /// negative disposable income and negative daily limit.
    pub fn compute(total_income: f64, total_mandatory_expenses: f64) -> Self {
        let disposable_income = total_income - total_mandatory_expenses;
        Self {
            disposable_income,
            daily_spending_limit: DISCRETIONARY_SHARE * disposable_income / DAYS_PER_MONTH,
            goal_savings_suggestion: SAVINGS_SHARE * disposable_income,
        }
    }

    pub fn monthly_discretionary(&self) -> f64 {
        self.daily_spending_limit * DAYS_PER_MONTH
    }

    /// Largest absolute difference between the three figures of two allocations.
    pub fn max_deviation(&self, other: &BudgetAllocation) -> f64 {
        [
            (self.disposable_income - other.disposable_income).abs(),
            (self.daily_spending_limit - other.daily_spending_limit).abs(),
            (self.goal_savings_suggestion - other.goal_savings_suggestion).abs(),
        ]
        .into_iter()
        .fold(0.0, f64::max)
    }

    pub fn delta(&self, baseline: &BudgetAllocation) -> BudgetAllocation {
        BudgetAllocation {
            disposable_income: self.disposable_income - baseline.disposable_income,
            daily_spending_limit: self.daily_spending_limit - baseline.daily_spending_limit,
            goal_savings_suggestion: self.goal_savings_suggestion
                - baseline.goal_savings_suggestion,
        }
    }
}

pub fn round2(v: f64) -> f64 {
    (v * 100.0).round() / 100.0
}
