use crate::domain::validation::{is_positive_amount, ValidationError};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Category {
    Income,
    Housing,
    Food,
    Transport,
    Entertainment,
    Other,
}

impl Category {
    pub const ALL: [Category; 6] = [
        Category::Income,
        Category::Housing,
        Category::Food,
        Category::Transport,
        Category::Entertainment,
        Category::Other,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Income => "Income",
            Category::Housing => "Housing",
            Category::Food => "Food",
            Category::Transport => "Transport",
            Category::Entertainment => "Entertainment",
            Category::Other => "Other",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Category {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Category::ALL
            .into_iter()
            .find(|c| c.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| anyhow::anyhow!("unknown transaction category: {s}"))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionKind {
    Income,
    Expense,
}

impl TransactionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionKind::Income => "income",
            TransactionKind::Expense => "expense",
        }
    }
}

impl FromStr for TransactionKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "income" => Ok(TransactionKind::Income),
            "expense" => Ok(TransactionKind::Expense),
            other => anyhow::bail!("unknown transaction type: {other}"),
        }
    }
}

/// One entry of the append-only spending log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    pub id: Uuid,
    pub description: String,
    pub category: Category,
    pub amount: f64,
    #[serde(rename = "type")]
    pub kind: TransactionKind,
    pub date: DateTime<Utc>,
}

impl Transaction {
    pub fn is_expense(&self) -> bool {
        self.kind == TransactionKind::Expense
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewTransaction {
    pub description: String,
    pub category: Category,
    pub amount: f64,
    #[serde(rename = "type", default = "default_kind")]
    pub kind: TransactionKind,
    #[serde(default)]
    pub date: Option<DateTime<Utc>>,
}

fn default_kind() -> TransactionKind {
    TransactionKind::Expense
}

impl NewTransaction {
    pub fn validate(self, now: DateTime<Utc>) -> Result<Transaction, ValidationError> {
        let description = self.description.trim().to_string();
        if description.is_empty() {
            return Err(ValidationError::EmptyDescription);
        }
        if !is_positive_amount(self.amount) {
            return Err(ValidationError::InvalidTransactionAmount(self.amount));
        }
        Ok(Transaction {
            id: Uuid::new_v4(),
            description,
            category: self.category,
            amount: self.amount,
            kind: self.kind,
            date: self.date.unwrap_or(now),
        })
    }
}
