use crate::domain::transaction::{Category, Transaction, TransactionKind};
use crate::time::period;
use anyhow::Context;
use chrono::{DateTime, Duration, NaiveDate, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Daily limit shown before the user has onboarded.
pub const DEFAULT_DAILY_LIMIT: f64 = 300.0;

const OVERVIEW_MONTHS: u32 = 6;
const LAST_30_DAYS_LABEL: &str = "Last 30 Days";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ReportRange {
    #[serde(rename = "30d")]
    Last30Days,
    #[serde(rename = "90d")]
    Last90Days,
    #[serde(rename = "6m")]
    Last6Months,
    #[default]
    #[serde(rename = "all")]
    All,
}

impl ReportRange {
    pub fn start(&self, now: DateTime<Utc>) -> anyhow::Result<DateTime<Utc>> {
        Ok(match self {
            ReportRange::Last30Days => now - Duration::days(30),
            ReportRange::Last90Days => now - Duration::days(90),
            ReportRange::Last6Months => period::sub_months(now, 6)?,
            ReportRange::All => Utc
                .timestamp_opt(0, 0)
                .single()
                .context("unix epoch out of range")?,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MonthlyTotals {
    pub month: String,
    pub income: f64,
    pub expenses: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CategoryTotal {
    pub category: Category,
    pub amount: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct Report {
    pub range: ReportRange,
    pub start: DateTime<Utc>,
    pub total_income: f64,
    pub total_expenses: f64,
    pub monthly: Vec<MonthlyTotals>,
    pub by_category: Vec<CategoryTotal>,
}

fn totals<'a>(txs: impl Iterator<Item = &'a Transaction>) -> (f64, f64) {
    txs.fold((0.0, 0.0), |(income, expenses), t| match t.kind {
        TransactionKind::Income => (income + t.amount, expenses),
        TransactionKind::Expense => (income, expenses + t.amount),
    })
}

pub fn build_report(
    transactions: &[Transaction],
    range: ReportRange,
    now: DateTime<Utc>,
) -> anyhow::Result<Report> {
    let start = range.start(now)?;
    let filtered: Vec<&Transaction> = transactions.iter().filter(|t| t.date >= start).collect();
    let (total_income, total_expenses) = totals(filtered.iter().copied());

    let monthly = if range == ReportRange::Last30Days {
        vec![MonthlyTotals {
            month: LAST_30_DAYS_LABEL.to_string(),
            income: total_income,
            expenses: total_expenses,
        }]
    } else {
        let mut out = Vec::with_capacity(OVERVIEW_MONTHS as usize);
        for back in (0..OVERVIEW_MONTHS).rev() {
            let anchor = period::sub_months(now, back)?.date_naive();
            let (from, to) = period::month_bounds(anchor)?;
            let (income, expenses) = totals(
                filtered
                    .iter()
                    .copied()
                    .filter(|t| t.date >= from && t.date < to),
            );
            out.push(MonthlyTotals {
                month: period::month_label(anchor),
                income,
                expenses,
            });
        }
        out
    };

    Ok(Report {
        range,
        start,
        total_income,
        total_expenses,
        monthly,
        by_category: spending_by_category(filtered.iter().copied()),
    })
}

/// Expense totals per category, largest first.
pub fn spending_by_category<'a>(txs: impl Iterator<Item = &'a Transaction>) -> Vec<CategoryTotal> {
    let mut sums = BTreeMap::<Category, f64>::new();
    for t in txs.filter(|t| t.is_expense()) {
        *sums.entry(t.category).or_insert(0.0) += t.amount;
    }
    let mut out: Vec<CategoryTotal> = sums
        .into_iter()
        .map(|(category, amount)| CategoryTotal { category, amount })
        .collect();
    out.sort_by(|a, b| {
        b.amount
            .partial_cmp(&a.amount)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.category.cmp(&b.category))
    });
    out
}

#[derive(Debug, Clone, Serialize)]
pub struct DailyCheckIn {
    pub date: NaiveDate,
    pub daily_limit: f64,
    pub spent: f64,
    pub remaining: f64,
    pub over_limit: bool,
    pub expenses: Vec<Transaction>,
    pub by_category: Vec<CategoryTotal>,
}

pub fn daily_check_in(
    transactions: &[Transaction],
    date: NaiveDate,
    daily_limit: f64,
) -> DailyCheckIn {
    let (from, to) = period::day_bounds(date);
    let expenses: Vec<Transaction> = transactions
        .iter()
        .filter(|t| t.is_expense() && t.date >= from && t.date < to)
        .cloned()
        .collect();
    let spent: f64 = expenses.iter().map(|t| t.amount).sum();
    let remaining = daily_limit - spent;
    DailyCheckIn {
        date,
        daily_limit,
        spent,
        remaining,
        over_limit: remaining < 0.0,
        by_category: spending_by_category(expenses.iter()),
        expenses,
    }
}
