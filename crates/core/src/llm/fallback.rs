//! Explicit fallbacks when the AI answer breaks its contract. Transport
//! failures still propagate so callers abort without writing anything.

use crate::domain::contract::ExpenseForecast;
use crate::domain::summary::{deterministic_explanation, FinancialSummary};
use crate::llm::error::is_contract_violation;
use crate::llm::{AdviceClient, BudgetInput, ForecastInput};

/// Deviation tolerated between the AI figures and the allocator before a warning.
const RELATIVE_TOLERANCE: f64 = 0.01;
const ABSOLUTE_TOLERANCE: f64 = 1.0;

/// A value from the advice service, or the fallback used in its place along
/// with the contract violation that caused it.
#[derive(Debug)]
pub struct Advised<T> {
    pub value: T,
    pub fallback_reason: Option<anyhow::Error>,
}

impl<T> Advised<T> {
    fn answered(value: T) -> Self {
        Self {
            value,
            fallback_reason: None,
        }
    }

    fn fallback(value: T, reason: anyhow::Error) -> Self {
        Self {
            value,
            fallback_reason: Some(reason),
        }
    }

    pub fn is_fallback(&self) -> bool {
        self.fallback_reason.is_some()
    }
}

/// Explanation for the summary's figures. The figures themselves always come
/// from the allocator; the AI only contributes prose.
pub async fn explain_budget(
    client: &dyn AdviceClient,
    summary: &FinancialSummary,
) -> anyhow::Result<Advised<String>> {
    let reference = summary.allocation();
    match client
        .calculate_disposable_income(&BudgetInput::from_summary(summary))
        .await
    {
        Ok(advice) => {
            let deviation = advice.allocation.max_deviation(&reference);
            let tolerance =
                (reference.disposable_income.abs() * RELATIVE_TOLERANCE).max(ABSOLUTE_TOLERANCE);
            if deviation > tolerance {
                tracing::warn!(
                    provider = client.provider().as_str(),
                    deviation,
                    ai_disposable_income = advice.allocation.disposable_income,
                    disposable_income = reference.disposable_income,
                    "AI budget figures disagree with the allocator; keeping allocator figures"
                );
            }
            Ok(Advised::answered(advice.explanation))
        }
        Err(err) if is_contract_violation(&err) => {
            tracing::warn!(
                provider = client.provider().as_str(),
                error = %err,
                "AI budget response broke its contract; using deterministic explanation"
            );
            Ok(Advised::fallback(deterministic_explanation(&reference), err))
        }
        Err(err) => Err(err),
    }
}

pub async fn forecast_or_fallback(
    client: &dyn AdviceClient,
    input: &ForecastInput,
    daily_limit: f64,
) -> anyhow::Result<Advised<ExpenseForecast>> {
    match client.forecast_expenses(input).await {
        Ok(forecast) => Ok(Advised::answered(forecast)),
        Err(err) if is_contract_violation(&err) => {
            tracing::warn!(
                provider = client.provider().as_str(),
                error = %err,
                "AI forecast response broke its contract; returning fallback forecast"
            );
            Ok(Advised::fallback(ExpenseForecast::fallback(daily_limit), err))
        }
        Err(err) => Err(err),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::budget::BudgetAllocation;
    use crate::domain::contract::{BudgetAdvice, FinancialAdvice, SafetyNetPlan, NO_EXPLANATION};
    use crate::domain::expense::{retain_filled, ExpenseInput};
    use crate::llm::error::{LlmDiagnosticsError, STAGE_CONTRACT, STAGE_HTTP};
    use crate::llm::{AdviceInput, Provider, SafetyNetInput};
    use std::collections::BTreeMap;

    /// Fails every call at the configured stage, or answers with fixed figures.
    struct Scripted {
        fail_stage: Option<&'static str>,
        answer: BudgetAllocation,
    }

    impl Scripted {
        fn error(&self) -> anyhow::Error {
            match self.fail_stage {
                Some(stage) => LlmDiagnosticsError {
                    provider: Provider::Anthropic,
                    stage,
                    detail: "scripted".to_string(),
                    raw_output: None,
                    raw_response_json: None,
                }
                .into(),
                None => anyhow::anyhow!("unexpected call"),
            }
        }
    }

    #[async_trait::async_trait]
    impl AdviceClient for Scripted {
        fn provider(&self) -> Provider {
            Provider::Anthropic
        }

        async fn calculate_disposable_income(
            &self,
            _input: &BudgetInput,
        ) -> anyhow::Result<BudgetAdvice> {
            if self.fail_stage.is_some() {
                return Err(self.error());
            }
            Ok(BudgetAdvice {
                allocation: self.answer,
                explanation: "from the model".to_string(),
            })
        }

        async fn financial_advice(&self, _input: &AdviceInput) -> anyhow::Result<FinancialAdvice> {
            Err(self.error())
        }

        async fn forecast_expenses(
            &self,
            _input: &ForecastInput,
        ) -> anyhow::Result<ExpenseForecast> {
            Err(self.error())
        }

        async fn safety_net(&self, _input: &SafetyNetInput) -> anyhow::Result<SafetyNetPlan> {
            Err(self.error())
        }
    }

    fn summary() -> FinancialSummary {
        FinancialSummary::onboard(
            50000.0,
            retain_filled(vec![ExpenseInput::new("Rent", 15000.0)]),
        )
        .unwrap()
    }

    fn forecast_input() -> ForecastInput {
        ForecastInput {
            past_expenses: vec![],
            seasonal_trends: BTreeMap::new(),
        }
    }

    #[tokio::test]
    async fn uses_model_explanation_even_when_figures_drift() {
        let client = Scripted {
            fail_stage: None,
            answer: BudgetAllocation::compute(50000.0, 10000.0),
        };
        let text = explain_budget(&client, &summary()).await.unwrap();
        assert!(!text.is_fallback());
        assert_eq!(text.value, "from the model");
    }

    #[tokio::test]
    async fn contract_violation_falls_back_to_deterministic_text() {
        let client = Scripted {
            fail_stage: Some(STAGE_CONTRACT),
            answer: BudgetAllocation::compute(0.0, 0.0),
        };
        let s = summary();
        let text = explain_budget(&client, &s).await.unwrap();
        assert!(text.is_fallback());
        assert_eq!(text.value, deterministic_explanation(&s.allocation()));
    }

    #[tokio::test]
    async fn transport_failure_propagates() {
        let client = Scripted {
            fail_stage: Some(STAGE_HTTP),
            answer: BudgetAllocation::compute(0.0, 0.0),
        };
        assert!(explain_budget(&client, &summary()).await.is_err());
        assert!(forecast_or_fallback(&client, &forecast_input(), 344.0)
            .await
            .is_err());
    }

    #[tokio::test]
    async fn forecast_contract_violation_returns_fallback() {
        let client = Scripted {
            fail_stage: Some(STAGE_CONTRACT),
            answer: BudgetAllocation::compute(0.0, 0.0),
        };
        let advised = forecast_or_fallback(&client, &forecast_input(), 344.0)
            .await
            .unwrap();
        assert!(advised.is_fallback());
        let f = advised.value;
        assert!(!f.generated);
        assert_eq!(f.suggested_daily_limit, 344.0);
        assert_eq!(f.explanation, NO_EXPLANATION);
    }
}
