use crate::config::Settings;
use crate::domain::contract::{
    BudgetAdvice, ExpenseForecast, FinancialAdvice, LlmBudgetAdvice, LlmExpenseForecast,
    LlmFinancialAdvice, LlmSafetyNetPlan, SafetyNetPlan,
};
use crate::llm::error::{
    LlmDiagnosticsError, STAGE_CONTRACT, STAGE_DECODE, STAGE_HTTP, STAGE_PARSE_AFTER_REPAIR,
};
use crate::llm::json;
use crate::llm::{AdviceClient, AdviceInput, BudgetInput, ForecastInput, Provider, SafetyNetInput};
use anyhow::Context;
use reqwest::header::{HeaderMap, HeaderValue};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::time::Duration;

const ANTHROPIC_VERSION: &str = "2023-06-01";
const DEFAULT_BASE_URL: &str = "https://api.anthropic.com";
const DEFAULT_MODEL: &str = "claude-3-5-sonnet-latest";
const DEFAULT_MAX_TOKENS: u32 = 2048;
const DEFAULT_TIMEOUT_SECS: u64 = 60;
const REPAIR_ATTEMPTS: u32 = 2;

const SHARED_RULES: &[&str] = &[
    "Return ONLY valid JSON. Do not wrap in markdown. Do not include any extra keys.",
    "No trailing commas. No comments. Use double quotes for all JSON strings.",
    "All amounts are plain numbers in the user's currency (no symbols, no thousands separators).",
];

/// One structured call: a forced tool whose input schema is the response contract.
struct Flow {
    tool_name: &'static str,
    tool_description: &'static str,
    role: &'static str,
    schema: fn() -> serde_json::Value,
}

const BUDGET_FLOW: Flow = Flow {
    tool_name: "emit_budget",
    tool_description: "Emit the disposable income calculation as structured JSON",
    role: "You are a friendly financial assistant. Compute the user's disposable income \
           (income minus the sum of mandatory expenses), a daily spending limit (40% of \
           disposable income divided by 30) and a monthly savings suggestion (the remaining \
           60%), then add a brief, encouraging explanation.",
    schema: budget_schema,
};

const ADVICE_FLOW: Flow = Flow {
    tool_name: "emit_advice",
    tool_description: "Emit personalised financial advice as structured JSON",
    role: "You are a helpful financial advisor. Answer the user's query using their profile \
           and past expenses when provided.",
    schema: advice_schema,
};

const FORECAST_FLOW: Flow = Flow {
    tool_name: "emit_forecast",
    tool_description: "Emit next month's spending forecast as structured JSON",
    role: "You are a personal finance expert. Forecast next month's spending per category \
           from past expenses and seasonal trends, suggest a daily spending limit that keeps \
           the user within budget, and explain briefly how the forecast was made.",
    schema: forecast_schema,
};

const SAFETY_NET_FLOW: Flow = Flow {
    tool_name: "emit_safety_net",
    tool_description: "Emit prioritised expenses and spending cuts as structured JSON",
    role: "You are a financial advisor helping a user whose income has dropped. List their \
           expenses with the essential categories first, and recommend specific cuts in the \
           other categories.",
    schema: safety_net_schema,
};

fn budget_schema() -> serde_json::Value {
    serde_json::json!({
        "type": "object",
        "additionalProperties": false,
        "required": ["disposable_income", "daily_spending_limit", "goal_savings_suggestion", "explanation"],
        "properties": {
            "disposable_income": {"type": "number"},
            "daily_spending_limit": {"type": "number"},
            "goal_savings_suggestion": {"type": "number"},
            "explanation": {"type": "string"}
        }
    })
}

fn advice_schema() -> serde_json::Value {
    serde_json::json!({
        "type": "object",
        "additionalProperties": false,
        "required": ["advice"],
        "properties": {
            "advice": {"type": "string"}
        }
    })
}

fn category_amounts_schema() -> serde_json::Value {
    serde_json::json!({
        "type": "array",
        "items": {
            "type": "object",
            "additionalProperties": false,
            "required": ["category", "amount"],
            "properties": {
                "category": {"type": "string"},
                "amount": {"type": "number", "minimum": 0}
            }
        }
    })
}

fn forecast_schema() -> serde_json::Value {
    serde_json::json!({
        "type": "object",
        "additionalProperties": false,
        "required": ["forecasted_spending", "suggested_daily_limit", "explanation"],
        "properties": {
            "forecasted_spending": category_amounts_schema(),
            "suggested_daily_limit": {"type": "number", "minimum": 0},
            "explanation": {"type": "string"}
        }
    })
}

fn safety_net_schema() -> serde_json::Value {
    serde_json::json!({
        "type": "object",
        "additionalProperties": false,
        "required": ["prioritized_expenses", "recommendations"],
        "properties": {
            "prioritized_expenses": category_amounts_schema(),
            "recommendations": {
                "type": "array",
                "minItems": 1,
                "items": {"type": "string"}
            }
        }
    })
}

#[derive(Debug, Clone)]
pub struct AnthropicClient {
    http: reqwest::Client,
    api_key: String,
    base_url: String,
    model: String,
    max_tokens: u32,
}

impl AnthropicClient {
    pub fn from_settings(settings: &Settings) -> anyhow::Result<Self> {
        let api_key = settings.require_anthropic_api_key()?.to_string();
        let base_url = settings
            .anthropic_base_url
            .clone()
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string());
        let model = settings
            .anthropic_model
            .clone()
            .unwrap_or_else(|| DEFAULT_MODEL.to_string());
        let max_tokens = settings.anthropic_max_tokens.unwrap_or(DEFAULT_MAX_TOKENS);
        let timeout_secs = settings
            .anthropic_timeout_secs
            .unwrap_or(DEFAULT_TIMEOUT_SECS);

        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .context("failed to build reqwest client")?;

        Ok(Self {
            http,
            api_key,
            base_url,
            model,
            max_tokens,
        })
    }

    async fn create_message(
        &self,
        req: CreateMessageRequest,
    ) -> anyhow::Result<(serde_json::Value, CreateMessageResponse)> {
        let mut headers = HeaderMap::new();
        headers.insert("x-api-key", HeaderValue::from_str(&self.api_key)?);
        headers.insert(
            "anthropic-version",
            HeaderValue::from_static(ANTHROPIC_VERSION),
        );

        let url = format!("{}/v1/messages", self.base_url.trim_end_matches('/'));
        let res = self
            .http
            .post(url)
            .headers(headers)
            .json(&req)
            .send()
            .await
            .context("Anthropic request failed")?;

        let status = res.status();
        let text = res
            .text()
            .await
            .context("failed to read Anthropic response body")?;
        if !status.is_success() {
            let raw_response_json = serde_json::from_str::<serde_json::Value>(&text).ok();
            return Err(LlmDiagnosticsError {
                provider: Provider::Anthropic,
                stage: STAGE_HTTP,
                detail: format!("status={status}"),
                raw_output: Some(text),
                raw_response_json,
            }
            .into());
        }

        let raw_json = serde_json::from_str::<serde_json::Value>(&text)
            .with_context(|| format!("failed to parse Anthropic response JSON: {text}"))?;
        let parsed = serde_json::from_value::<CreateMessageResponse>(raw_json.clone())
            .context("failed to decode Anthropic response into CreateMessageResponse")?;
        Ok((raw_json, parsed))
    }

    fn request(&self, flow: &Flow, content: String, max_tokens: u32) -> CreateMessageRequest {
        CreateMessageRequest {
            model: self.model.clone(),
            max_tokens,
            system: Some(system_prompt(flow)),
            messages: vec![Message {
                role: "user",
                content,
            }],
            tools: Some(vec![Tool {
                name: flow.tool_name,
                description: flow.tool_description,
                input_schema: (flow.schema)(),
            }]),
            tool_choice: Some(ToolChoice::Tool {
                name: flow.tool_name,
            }),
        }
    }

    /// Runs one flow and decodes the forced tool call (or, failing that, the
    /// text answer after up to two repair prompts) into `T`.
    async fn run_flow<T: DeserializeOwned>(
        &self,
        flow: &Flow,
        user_prompt: String,
    ) -> anyhow::Result<(T, serde_json::Value)> {
        let (mut raw_json, mut res) = self
            .create_message(self.request(flow, user_prompt.clone(), self.max_tokens))
            .await?;

        // If the model hit max_tokens, retry once with a higher ceiling.
        if matches!(res.stop_reason.as_deref(), Some("max_tokens")) {
            let bumped = self.max_tokens.saturating_mul(2).max(4096);
            tracing::warn!(
                flow = flow.tool_name,
                from = self.max_tokens,
                to = bumped,
                "Anthropic stop_reason=max_tokens; retrying once with higher max_tokens"
            );
            let (rj, r) = self
                .create_message(self.request(flow, user_prompt, bumped))
                .await?;
            raw_json = rj;
            res = r;
        }

        if let Some(input) = response_tool_input(&res, flow.tool_name) {
            return match serde_json::from_value::<T>(input.clone()) {
                Ok(parsed) => Ok((parsed, raw_json)),
                Err(err) => Err(LlmDiagnosticsError {
                    provider: Provider::Anthropic,
                    stage: STAGE_DECODE,
                    detail: format!("tool_use.input does not match {}: {err}", flow.tool_name),
                    raw_output: Some(input.to_string()),
                    raw_response_json: Some(raw_json),
                }
                .into()),
            };
        }

        // Fallback to text (should be rare).
        let text = response_text(&res);
        self.try_parse_with_repairs(flow, text, raw_json).await
    }

    async fn try_parse_with_repairs<T: DeserializeOwned>(
        &self,
        flow: &Flow,
        initial_text: String,
        initial_raw_json: serde_json::Value,
    ) -> anyhow::Result<(T, serde_json::Value)> {
        let mut last_err = match json::parse_json::<T>(&initial_text) {
            Ok(parsed) => return Ok((parsed, initial_raw_json)),
            Err(err) => err,
        };
        let mut last_text = initial_text;
        let mut last_raw_json = initial_raw_json;

        for attempt in 1..=REPAIR_ATTEMPTS {
            let (repair_raw_json, repair_res) = self
                .create_message(self.request(
                    flow,
                    repair_prompt(flow, &last_text),
                    self.max_tokens,
                ))
                .await?;

            if let Some(input) = response_tool_input(&repair_res, flow.tool_name) {
                if let Ok(parsed) = serde_json::from_value::<T>(input.clone()) {
                    return Ok((parsed, repair_raw_json));
                }
            }

            let repair_text = response_text(&repair_res);
            match json::parse_json::<T>(&repair_text) {
                Ok(parsed) => return Ok((parsed, repair_raw_json)),
                Err(err) => {
                    tracing::warn!(
                        attempt,
                        flow = flow.tool_name,
                        error = %err,
                        "LLM output still invalid after repair attempt"
                    );
                    last_err = err;
                    last_text = repair_text;
                    last_raw_json = repair_raw_json;
                }
            }
        }

        Err(LlmDiagnosticsError {
            provider: Provider::Anthropic,
            stage: STAGE_PARSE_AFTER_REPAIR,
            detail: format!("final_error={last_err}"),
            raw_output: Some(last_text),
            raw_response_json: Some(last_raw_json),
        }
        .into())
    }
}

fn contract_error(err: anyhow::Error, raw: serde_json::Value) -> anyhow::Error {
    LlmDiagnosticsError {
        provider: Provider::Anthropic,
        stage: STAGE_CONTRACT,
        detail: format!("{err:#}"),
        raw_output: None,
        raw_response_json: Some(raw),
    }
    .into()
}

fn system_prompt(flow: &Flow) -> String {
    let mut lines = vec![flow.role.to_string()];
    lines.extend(SHARED_RULES.iter().map(|s| s.to_string()));
    lines.push(format!(
        "Respond by calling the {} tool. Its input schema:",
        flow.tool_name
    ));
    lines.push((flow.schema)().to_string());
    lines.join("\n")
}

fn repair_prompt(flow: &Flow, previous_output: &str) -> String {
    format!(
        "Your previous message was NOT valid JSON for the required schema.\n\n\
TASK: Output ONLY a single JSON object that exactly matches the schema.\n\
- Do NOT include any markdown, prose, or code fences.\n\
- Do NOT include trailing commas or comments.\n\
- Every required key MUST be present.\n\n\
SCHEMA:\n{}\n\n\
INVALID OUTPUT (for reference only; DO NOT copy verbatim):\n{previous_output}",
        (flow.schema)()
    )
}

fn pretty(value: &impl Serialize) -> String {
    serde_json::to_string_pretty(value).unwrap_or_else(|_| "null".to_string())
}

fn budget_prompt(input: &BudgetInput) -> String {
    let mut out = format!("Total income: {}\nMandatory expenses:\n", input.total_income);
    if input.mandatory_expenses.is_empty() {
        out.push_str("  (none)\n");
    }
    for e in &input.mandatory_expenses {
        out.push_str(&format!("  - {}: {}\n", e.name, e.amount));
    }
    out
}

fn advice_prompt(input: &AdviceInput) -> String {
    let mut out = format!("User query: {}\n", input.query);
    if let Some(profile) = &input.user_profile {
        out.push_str(&format!("\nUser profile JSON:\n{}\n", pretty(profile)));
    }
    if !input.past_expenses.is_empty() {
        out.push_str(&format!(
            "\nPast expenses JSON:\n{}\n",
            pretty(&input.past_expenses)
        ));
    }
    out
}

fn forecast_prompt(input: &ForecastInput) -> String {
    format!(
        "Past expenses JSON:\n{}\n\nSeasonal trends JSON:\n{}",
        pretty(&input.past_expenses),
        pretty(&input.seasonal_trends)
    )
}

fn safety_net_prompt(input: &SafetyNetInput) -> String {
    let mut out = format!(
        "Income: {}\nEssential categories: {}\nExpenses:\n",
        input.income,
        input.essential_categories.join(", ")
    );
    for e in &input.expenses {
        out.push_str(&format!("  - {}: {}\n", e.category, e.amount));
    }
    out
}

fn response_text(res: &CreateMessageResponse) -> String {
    let mut out = String::new();
    for block in &res.content {
        if let ContentBlock::Text { text } = block {
            if !out.is_empty() {
                out.push('\n');
            }
            out.push_str(text);
        }
    }
    out
}

fn response_tool_input<'a>(
    res: &'a CreateMessageResponse,
    tool_name: &str,
) -> Option<&'a serde_json::Value> {
    res.content.iter().find_map(|block| match block {
        ContentBlock::ToolUse { name, input, .. } if name == tool_name => Some(input),
        _ => None,
    })
}

#[async_trait::async_trait]
impl AdviceClient for AnthropicClient {
    fn provider(&self) -> Provider {
        Provider::Anthropic
    }

    async fn calculate_disposable_income(
        &self,
        input: &BudgetInput,
    ) -> anyhow::Result<BudgetAdvice> {
        let (parsed, raw) = self
            .run_flow::<LlmBudgetAdvice>(&BUDGET_FLOW, budget_prompt(input))
            .await?;
        parsed
            .validate_and_into_advice()
            .map_err(|e| contract_error(e, raw))
    }

    async fn financial_advice(&self, input: &AdviceInput) -> anyhow::Result<FinancialAdvice> {
        let (parsed, raw) = self
            .run_flow::<LlmFinancialAdvice>(&ADVICE_FLOW, advice_prompt(input))
            .await?;
        parsed
            .validate_and_into_advice()
            .map_err(|e| contract_error(e, raw))
    }

    async fn forecast_expenses(&self, input: &ForecastInput) -> anyhow::Result<ExpenseForecast> {
        let (parsed, raw) = self
            .run_flow::<LlmExpenseForecast>(&FORECAST_FLOW, forecast_prompt(input))
            .await?;
        parsed
            .validate_and_into_forecast()
            .map_err(|e| contract_error(e, raw))
    }

    async fn safety_net(&self, input: &SafetyNetInput) -> anyhow::Result<SafetyNetPlan> {
        let (parsed, raw) = self
            .run_flow::<LlmSafetyNetPlan>(&SAFETY_NET_FLOW, safety_net_prompt(input))
            .await?;
        parsed
            .validate_and_into_plan()
            .map_err(|e| contract_error(e, raw))
    }
}

#[derive(Debug, Clone, Serialize)]
struct CreateMessageRequest {
    model: String,
    max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<String>,
    messages: Vec<Message>,

    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<Vec<Tool>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_choice: Option<ToolChoice>,
}

#[derive(Debug, Clone, Serialize)]
struct Message {
    role: &'static str,
    content: String,
}

#[derive(Debug, Clone, Deserialize)]
struct CreateMessageResponse {
    content: Vec<ContentBlock>,

    #[serde(default)]
    stop_reason: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
struct Tool {
    name: &'static str,
    description: &'static str,
    input_schema: serde_json::Value,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type")]
enum ToolChoice {
    #[serde(rename = "tool")]
    Tool { name: &'static str },
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type")]
enum ContentBlock {
    #[serde(rename = "text")]
    Text { text: String },

    #[serde(rename = "tool_use")]
    ToolUse {
        #[serde(default)]
        #[allow(dead_code)]
        id: String,
        #[serde(default)]
        name: String,
        #[serde(default)]
        input: serde_json::Value,
    },

    #[serde(other)]
    Unknown,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::expense::ExpenseInput;
    use serde_json::json;

    fn response(value: serde_json::Value) -> CreateMessageResponse {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn decodes_tool_use_block() {
        let res = response(json!({
            "content": [
                {"type": "thinking", "thinking": "..."},
                {"type": "tool_use", "id": "toolu_1", "name": "emit_budget", "input": {
                    "disposable_income": 25800.0,
                    "daily_spending_limit": 344.0,
                    "goal_savings_suggestion": 15480.0,
                    "explanation": "Great start."
                }}
            ],
            "stop_reason": "tool_use"
        }));

        let input = response_tool_input(&res, BUDGET_FLOW.tool_name).unwrap();
        let parsed: LlmBudgetAdvice = serde_json::from_value(input.clone()).unwrap();
        let advice = parsed.validate_and_into_advice().unwrap();
        assert_eq!(advice.allocation.goal_savings_suggestion, 15480.0);
        assert_eq!(advice.explanation, "Great start.");
    }

    #[test]
    fn ignores_tool_calls_for_other_flows() {
        let res = response(json!({
            "content": [
                {"type": "tool_use", "id": "toolu_1", "name": "emit_advice", "input": {"advice": "x"}}
            ]
        }));
        assert!(response_tool_input(&res, BUDGET_FLOW.tool_name).is_none());
    }

    #[test]
    fn joins_text_blocks() {
        let res = response(json!({
            "content": [
                {"type": "text", "text": "first"},
                {"type": "redacted_thinking", "data": "..."},
                {"type": "text", "text": "second"}
            ]
        }));
        assert_eq!(response_text(&res), "first\nsecond");
    }

    #[test]
    fn request_forces_the_flow_tool() {
        let req = CreateMessageRequest {
            model: DEFAULT_MODEL.to_string(),
            max_tokens: DEFAULT_MAX_TOKENS,
            system: Some(system_prompt(&FORECAST_FLOW)),
            messages: vec![],
            tools: Some(vec![Tool {
                name: FORECAST_FLOW.tool_name,
                description: FORECAST_FLOW.tool_description,
                input_schema: forecast_schema(),
            }]),
            tool_choice: Some(ToolChoice::Tool {
                name: FORECAST_FLOW.tool_name,
            }),
        };
        let v = serde_json::to_value(&req).unwrap();
        assert_eq!(v["tool_choice"]["type"], "tool");
        assert_eq!(v["tool_choice"]["name"], "emit_forecast");
        assert_eq!(
            v["tools"][0]["input_schema"]["required"],
            json!(["forecasted_spending", "suggested_daily_limit", "explanation"])
        );
    }

    #[test]
    fn budget_prompt_lists_expenses() {
        let prompt = budget_prompt(&BudgetInput {
            total_income: 50000.0,
            mandatory_expenses: vec![ExpenseInput::new("Rent", 15000.0)],
        });
        assert!(prompt.contains("Total income: 50000"));
        assert!(prompt.contains("- Rent: 15000"));
    }

    #[test]
    fn contract_errors_are_tagged() {
        let err = contract_error(anyhow::anyhow!("explanation must be non-empty"), json!({}));
        assert!(crate::llm::error::is_contract_violation(&err));
    }
}
