//! Network-free advisor. Serves deployments without an AI key and gives
//! tests predictable answers: budget figures come straight from the
//! allocator, the other flows are simple rules over the same inputs.

use crate::domain::budget::{round2, BudgetAllocation, DAYS_PER_MONTH};
use crate::domain::contract::{
    BudgetAdvice, CategoryAmount, ExpenseForecast, FinancialAdvice, SafetyNetPlan,
};
use crate::domain::summary::deterministic_explanation;
use crate::llm::{AdviceClient, AdviceInput, BudgetInput, ForecastInput, Provider, SafetyNetInput};
use chrono::Datelike;
use std::collections::{BTreeMap, BTreeSet};

#[derive(Debug, Clone, Default)]
pub struct OfflineAdvisor;

impl OfflineAdvisor {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait::async_trait]
impl AdviceClient for OfflineAdvisor {
    fn provider(&self) -> Provider {
        Provider::Offline
    }

    async fn calculate_disposable_income(
        &self,
        input: &BudgetInput,
    ) -> anyhow::Result<BudgetAdvice> {
        let allocation =
            BudgetAllocation::compute(input.total_income, input.total_mandatory_expenses());
        Ok(BudgetAdvice {
            explanation: deterministic_explanation(&allocation),
            allocation,
        })
    }

    async fn financial_advice(&self, input: &AdviceInput) -> anyhow::Result<FinancialAdvice> {
        let mut lines = Vec::new();

        match &input.user_profile {
            Some(profile) if profile.disposable_income < 0.0 => lines.push(format!(
                "Your mandatory expenses are {:.2} above your income. Review the largest fixed \
                 costs first; {} is the biggest at the moment.",
                round2(-profile.disposable_income),
                profile
                    .mandatory_expenses
                    .iter()
                    .max_by(|a, b| a.amount.total_cmp(&b.amount))
                    .map(|e| e.name.as_str())
                    .unwrap_or("none"),
            )),
            Some(profile) => lines.push(format!(
                "Keep daily spending under {:.2} and move {:.2} into your goals each month.",
                round2(profile.daily_spending_limit),
                round2(profile.goal_savings_suggestion),
            )),
            None => lines.push(
                "Complete onboarding with your income and fixed costs to get a personal daily \
                 limit."
                    .to_string(),
            ),
        }

        let top = top_category(input);
        if let Some((category, amount)) = top {
            lines.push(format!(
                "Most of your recent spending went to {category} ({amount:.2}); that is the \
                 first place to look for savings."
            ));
        }

        lines.push(format!(
            "Regarding \"{}\": an AI advisor is not configured, so this answer is rule-based.",
            input.query
        ));

        Ok(FinancialAdvice {
            advice: lines.join(" "),
        })
    }

    async fn forecast_expenses(&self, input: &ForecastInput) -> anyhow::Result<ExpenseForecast> {
        let mut by_category = BTreeMap::<String, f64>::new();
        let mut months = BTreeSet::<(i32, u32)>::new();
        for t in input.past_expenses.iter().filter(|t| t.is_expense()) {
            *by_category.entry(t.category.to_string()).or_insert(0.0) += t.amount;
            months.insert((t.date.year(), t.date.month()));
        }
        let month_count = months.len().max(1) as f64;

        let forecasted_spending: Vec<CategoryAmount> = by_category
            .into_iter()
            .map(|(category, total)| CategoryAmount {
                category,
                amount: round2(total / month_count),
            })
            .collect();
        let monthly_total: f64 = forecasted_spending.iter().map(|c| c.amount).sum();

        Ok(ExpenseForecast {
            suggested_daily_limit: round2(monthly_total / DAYS_PER_MONTH),
            explanation: format!(
                "Average monthly spending per category over {} month(s) of history, with \
                 {} seasonal note(s) not applied.",
                month_count as u32,
                input.seasonal_trends.len()
            ),
            forecasted_spending,
            generated: true,
        })
    }

    async fn safety_net(&self, input: &SafetyNetInput) -> anyhow::Result<SafetyNetPlan> {
        let (mut essential, mut other): (Vec<CategoryAmount>, Vec<CategoryAmount>) = input
            .expenses
            .iter()
            .cloned()
            .partition(|e| input.is_essential(&e.category));
        essential.sort_by(|a, b| b.amount.total_cmp(&a.amount));
        other.sort_by(|a, b| b.amount.total_cmp(&a.amount));

        let total: f64 = input.expenses.iter().map(|e| e.amount).sum();
        let mut recommendations = Vec::new();
        if total > input.income {
            recommendations.push(format!(
                "Your expenses exceed your income by {:.2}; cut discretionary spending first.",
                round2(total - input.income)
            ));
        }
        for e in other.iter().filter(|e| e.amount > 0.0) {
            recommendations.push(format!(
                "Reduce {} (currently {:.2}) until your income recovers.",
                e.category,
                round2(e.amount)
            ));
        }
        if recommendations.is_empty() {
            recommendations.push(
                "Your spending is already limited to essentials; keep an emergency buffer and \
                 avoid new commitments."
                    .to_string(),
            );
        }

        essential.extend(other);
        Ok(SafetyNetPlan {
            prioritized_expenses: essential,
            recommendations,
        })
    }
}

fn top_category(input: &AdviceInput) -> Option<(String, f64)> {
    let mut sums = BTreeMap::<String, f64>::new();
    for t in input.past_expenses.iter().filter(|t| t.is_expense()) {
        *sums.entry(t.category.to_string()).or_insert(0.0) += t.amount;
    }
    sums.into_iter().max_by(|a, b| a.1.total_cmp(&b.1))
}
