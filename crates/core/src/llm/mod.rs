pub mod anthropic;
pub mod error;
pub mod fallback;
pub mod json;
pub mod offline;

use crate::domain::contract::{
    BudgetAdvice, CategoryAmount, ExpenseForecast, FinancialAdvice, SafetyNetPlan,
};
use crate::domain::expense::ExpenseInput;
use crate::domain::summary::FinancialSummary;
use crate::domain::transaction::Transaction;
use crate::domain::validation::{ensure_finite, ValidationError};
use serde::Serialize;
use std::collections::BTreeMap;

// Flow names recorded in the advice audit log.
pub const FLOW_BUDGET: &str = "budget";
pub const FLOW_ADVICE: &str = "advice";
pub const FLOW_FORECAST: &str = "forecast";
pub const FLOW_SAFETY_NET: &str = "safety_net";

#[derive(Debug, Clone, Serialize)]
pub struct BudgetInput {
    pub total_income: f64,
    pub mandatory_expenses: Vec<ExpenseInput>,
}

impl BudgetInput {
    pub fn from_summary(summary: &FinancialSummary) -> Self {
        Self {
            total_income: summary.total_income,
            mandatory_expenses: summary
                .mandatory_expenses
                .iter()
                .map(|e| ExpenseInput::new(e.name.clone(), e.amount))
                .collect(),
        }
    }

    pub fn total_mandatory_expenses(&self) -> f64 {
        self.mandatory_expenses.iter().map(|e| e.amount).sum()
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct AdviceInput {
    pub query: String,
    pub user_profile: Option<FinancialSummary>,
    pub past_expenses: Vec<Transaction>,
}

impl AdviceInput {
    pub fn try_new(
        query: &str,
        user_profile: Option<FinancialSummary>,
        past_expenses: Vec<Transaction>,
    ) -> Result<Self, ValidationError> {
        let query = query.trim();
        if query.is_empty() {
            return Err(ValidationError::EmptyQuery);
        }
        Ok(Self {
            query: query.to_string(),
            user_profile,
            past_expenses,
        })
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ForecastInput {
    pub past_expenses: Vec<Transaction>,
    /// Month name → free-text note, e.g. "December" → "gifts and travel".
    pub seasonal_trends: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SafetyNetInput {
    pub income: f64,
    pub expenses: Vec<CategoryAmount>,
    pub essential_categories: Vec<String>,
}

impl SafetyNetInput {
    pub fn try_new(
        income: f64,
        expenses: Vec<CategoryAmount>,
        essential_categories: Vec<String>,
    ) -> Result<Self, ValidationError> {
        ensure_finite("income", income)?;
        for e in &expenses {
            ensure_finite("amount", e.amount)?;
        }
        Ok(Self {
            income,
            expenses,
            essential_categories: essential_categories
                .into_iter()
                .map(|c| c.trim().to_string())
                .filter(|c| !c.is_empty())
                .collect(),
        })
    }

    pub fn is_essential(&self, category: &str) -> bool {
        self.essential_categories
            .iter()
            .any(|c| c.eq_ignore_ascii_case(category.trim()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Provider {
    Anthropic,
    Offline,
}

impl Provider {
    pub fn as_str(&self) -> &'static str {
        match self {
            Provider::Anthropic => "anthropic",
            Provider::Offline => "offline",
        }
    }
}

#[async_trait::async_trait]
pub trait AdviceClient: Send + Sync {
    fn provider(&self) -> Provider;

    async fn calculate_disposable_income(&self, input: &BudgetInput)
        -> anyhow::Result<BudgetAdvice>;

    async fn financial_advice(&self, input: &AdviceInput) -> anyhow::Result<FinancialAdvice>;

    async fn forecast_expenses(&self, input: &ForecastInput) -> anyhow::Result<ExpenseForecast>;

    async fn safety_net(&self, input: &SafetyNetInput) -> anyhow::Result<SafetyNetPlan>;
}
