use anyhow::Context;
use serde::de::DeserializeOwned;

pub fn extract_json(text: &str) -> Option<String> {
    let trimmed = text.trim();
    if trimmed.starts_with("```") {
        // Remove Markdown fences (```json ... ``` or ``` ... ```).
        let mut inner = trimmed;
        if let Some(after_first) = inner.split_once('\n').map(|(_, rest)| rest) {
            inner = after_first;
        }
        if let Some(end) = inner.rfind("```") {
            inner = &inner[..end];
        }
        return Some(inner.trim().to_string());
    }

    // Best-effort extraction: first '{' to last '}'.
    let start = trimmed.find('{')?;
    let end = trimmed.rfind('}')?;
    if end <= start {
        return None;
    }
    Some(trimmed[start..=end].trim().to_string())
}

/// Decodes a model's text answer into `T`. Only structural decoding happens
/// here; value rules live on the contract types.
pub fn parse_json<T: DeserializeOwned>(text: &str) -> anyhow::Result<T> {
    let json_str = extract_json(text).unwrap_or_else(|| text.trim().to_string());
    serde_json::from_str::<T>(&json_str).with_context(|| {
        format!(
            "LLM output is not valid JSON for {}: {json_str}",
            std::any::type_name::<T>()
        )
    })
}
