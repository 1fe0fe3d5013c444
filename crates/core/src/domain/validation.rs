//! Input rules enforced before any computation or write.

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    #[error("monthly income must be a positive number")]
    InvalidIncome,

    #[error("expense name must be non-empty")]
    EmptyExpenseName,

    #[error("expense amount must be a positive number (got {0})")]
    InvalidExpenseAmount(f64),

    #[error("daily spending limit must be zero or more (got {0})")]
    InvalidDailyLimit(f64),

    #[error("goal name must be non-empty")]
    EmptyGoalName,

    #[error("goal target amount must be greater than zero (got {0})")]
    InvalidTargetAmount(f64),

    #[error("contribution amount must be a positive number (got {0})")]
    InvalidContribution(f64),

    #[error("transaction description must be non-empty")]
    EmptyDescription,

    #[error("transaction amount must be a positive number (got {0})")]
    InvalidTransactionAmount(f64),

    #[error("query must be non-empty")]
    EmptyQuery,

    #[error("{field} must be a finite number")]
    NotFinite { field: &'static str },
}

/// Finite and strictly positive.
pub fn is_positive_amount(v: f64) -> bool {
    v.is_finite() && v > 0.0
}

pub fn ensure_finite(field: &'static str, v: f64) -> Result<f64, ValidationError> {
    if v.is_finite() {
        Ok(v)
    } else {
        Err(ValidationError::NotFinite { field })
    }
}
