use crate::domain::budget::BudgetAllocation;
use crate::domain::expense::{total_mandatory_expenses, Expense};
use crate::domain::summary::FinancialSummary;
use crate::domain::validation::{ensure_finite, ValidationError};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ScenarioInput {
    #[serde(default)]
    pub income_change: f64,
    #[serde(default)]
    pub expense_changes: Vec<ExpenseChange>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ExpenseChange {
    pub name: String,
    pub amount_change: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct ScenarioOutcome {
    pub projected_income: f64,
    pub projected_expenses: Vec<Expense>,
    pub projected_total_mandatory_expenses: f64,
    pub baseline: BudgetAllocation,
    pub projected: BudgetAllocation,
    pub delta: BudgetAllocation,
}

/// Re-runs the allocator on a hypothetical income and expense list. The
/// stored summary is left untouched.
pub fn simulate(
    summary: &FinancialSummary,
    input: &ScenarioInput,
) -> Result<ScenarioOutcome, ValidationError> {
    let income_change = ensure_finite("income_change", input.income_change)?;
    let mut expenses = summary.mandatory_expenses.clone();

    for change in &input.expense_changes {
        let name = change.name.trim();
        if name.is_empty() {
            return Err(ValidationError::EmptyExpenseName);
        }
        let delta = ensure_finite("amount_change", change.amount_change)?;

        match expenses
            .iter_mut()
            .find(|e| e.name.trim().eq_ignore_ascii_case(name))
        {
            Some(existing) => existing.amount = (existing.amount + delta).max(0.0),
            None => expenses.push(Expense {
                id: Uuid::new_v4(),
                name: name.to_string(),
                amount: delta.max(0.0),
            }),
        }
    }

    let baseline =
        BudgetAllocation::compute(summary.total_income, summary.total_mandatory_expenses);
    let projected_income = summary.total_income + income_change;
    let projected_total = total_mandatory_expenses(&expenses);
    let projected = BudgetAllocation::compute(projected_income, projected_total);

    Ok(ScenarioOutcome {
        projected_income,
        projected_expenses: expenses,
        projected_total_mandatory_expenses: projected_total,
        delta: projected.delta(&baseline),
        baseline,
        projected,
    })
}
