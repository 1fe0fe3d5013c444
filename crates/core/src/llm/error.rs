use crate::llm::Provider;
use serde_json::Value;
use std::fmt;

pub const STAGE_HTTP: &str = "http";
pub const STAGE_DECODE: &str = "decode";
pub const STAGE_CONTRACT: &str = "contract";
pub const STAGE_PARSE_AFTER_REPAIR: &str = "parse_after_repair";

#[derive(Debug, Clone)]
pub struct LlmDiagnosticsError {
    pub provider: Provider,
    pub stage: &'static str,
    pub detail: String,
    pub raw_output: Option<String>,
    pub raw_response_json: Option<Value>,
}

impl LlmDiagnosticsError {
    /// The service answered but the answer broke the response contract.
    pub fn is_contract_violation(&self) -> bool {
        self.stage != STAGE_HTTP
    }
}

impl fmt::Display for LlmDiagnosticsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "LLM error (provider={:?}, stage={}): {}",
            self.provider, self.stage, self.detail
        )
    }
}

impl std::error::Error for LlmDiagnosticsError {}

/// True only for errors raised after a response arrived and failed to decode
/// or validate. Transport failures and anything else return false.
pub fn is_contract_violation(err: &anyhow::Error) -> bool {
    err.downcast_ref::<LlmDiagnosticsError>()
        .is_some_and(LlmDiagnosticsError::is_contract_violation)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn diag(stage: &'static str) -> anyhow::Error {
        LlmDiagnosticsError {
            provider: Provider::Anthropic,
            stage,
            detail: "x".to_string(),
            raw_output: None,
            raw_response_json: None,
        }
        .into()
    }

    #[test]
    fn classifies_stages() {
        assert!(!is_contract_violation(&diag(STAGE_HTTP)));
        assert!(is_contract_violation(&diag(STAGE_DECODE)));
        assert!(is_contract_violation(&diag(STAGE_CONTRACT)));
        assert!(is_contract_violation(&diag(STAGE_PARSE_AFTER_REPAIR)));
        assert!(!is_contract_violation(&anyhow::anyhow!("connection reset")));
    }

    #[test]
    fn survives_added_context() {
        let err = diag(STAGE_CONTRACT).context("budget flow failed");
        assert!(is_contract_violation(&err));
    }
}
