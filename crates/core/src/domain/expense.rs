use crate::domain::validation::{is_positive_amount, ValidationError};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A fixed, recurring monthly cost (rent, loan EMI, utilities).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Expense {
    pub id: Uuid,
    pub name: String,
    pub amount: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExpenseInput {
    pub name: String,
    pub amount: f64,
}

impl ExpenseInput {
    pub fn new(name: impl Into<String>, amount: f64) -> Self {
        Self {
            name: name.into(),
            amount,
        }
    }

    /// Strict check used when a single expense is added on its own.
    pub fn validate(self) -> Result<Expense, ValidationError> {
        let name = self.name.trim().to_string();
        if name.is_empty() {
            return Err(ValidationError::EmptyExpenseName);
        }
        if !is_positive_amount(self.amount) {
            return Err(ValidationError::InvalidExpenseAmount(self.amount));
        }
        Ok(Expense {
            id: Uuid::new_v4(),
            name,
            amount: self.amount,
        })
    }
}

/// Onboarding keeps only rows that have a name and a positive amount; blank
/// form rows are dropped silently instead of failing the whole submission.
pub fn retain_filled(inputs: Vec<ExpenseInput>) -> Vec<Expense> {
    inputs
        .into_iter()
        .filter_map(|input| input.validate().ok())
        .collect()
}

pub fn total_mandatory_expenses(expenses: &[Expense]) -> f64 {
    expenses.iter().map(|e| e.amount).sum()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_list_sums_to_zero() {
        assert_eq!(total_mandatory_expenses(&[]), 0.0);
    }

    #[test]
    fn sums_in_order() {
        let expenses = retain_filled(vec![
            ExpenseInput::new("Rent", 15000.0),
            ExpenseInput::new("EMI", 8000.0),
            ExpenseInput::new("Electricity", 1200.0),
        ]);
        assert_eq!(expenses.len(), 3);
        assert_eq!(total_mandatory_expenses(&expenses), 24200.0);
    }

    #[test]
    fn retain_filled_drops_blank_rows() {
        let expenses = retain_filled(vec![
            ExpenseInput::new("", 500.0),
            ExpenseInput::new("   ", 500.0),
            ExpenseInput::new("Internet", 0.0),
            ExpenseInput::new("Gym", -10.0),
            ExpenseInput::new("Phone", f64::NAN),
            ExpenseInput::new(" Rent ", 12000.0),
        ]);
        assert_eq!(expenses.len(), 1);
        assert_eq!(expenses[0].name, "Rent");
    }

    #[test]
    fn validate_reports_the_failing_rule() {
        assert_eq!(
            ExpenseInput::new(" ", 10.0).validate(),
            Err(ValidationError::EmptyExpenseName)
        );
        assert_eq!(
            ExpenseInput::new("Water", 0.0).validate(),
            Err(ValidationError::InvalidExpenseAmount(0.0))
        );
    }
}
