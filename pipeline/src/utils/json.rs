//! Lenient JSON recovery for model output
//!
//! Reasoning models wrap JSON in prose or markdown fences often enough that a
//! strict parse throws away usable answers. `parse_lenient` tries three
//! strategies in order and reports which one succeeded; callers that exhaust
//! all three fall back to an empty record rather than failing the job.

use serde_json::Value as JsonValue;

/// Which recovery strategy produced a parse
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseStrategy {
    /// The raw text parsed as-is
    Raw,
    /// Parsed after stripping markdown code fences
    Fenced,
    /// Parsed the substring from the first `{` to the last `}`
    BraceSlice,
}

/// Parse model output as JSON using three fallback strategies in order:
/// raw, fence-stripped, first-brace-to-last-brace.
///
/// Returns `None` only when all three fail.
pub fn parse_lenient(text: &str) -> Option<(JsonValue, ParseStrategy)> {
    let trimmed = text.trim();

    if let Ok(value) = serde_json::from_str::<JsonValue>(trimmed) {
        return Some((value, ParseStrategy::Raw));
    }

    let unfenced = strip_code_fences(trimmed);
    if let Ok(value) = serde_json::from_str::<JsonValue>(unfenced.trim()) {
        return Some((value, ParseStrategy::Fenced));
    }

    if let Some(slice) = brace_slice(trimmed)
        && let Ok(value) = serde_json::from_str::<JsonValue>(slice)
    {
        return Some((value, ParseStrategy::BraceSlice));
    }

    None
}

/// Strip leading/trailing markdown code fences, including a language tag.
fn strip_code_fences(text: &str) -> &str {
    let mut out = text;
    if let Some(rest) = out.strip_prefix("```") {
        // Drop the language tag line if present ("```json\n...")
        out = match rest.find('\n') {
            Some(idx) => &rest[idx + 1..],
            None => rest,
        };
    }
    if let Some(rest) = out.trim_end().strip_suffix("```") {
        out = rest;
    }
    out
}

/// The substring from the first `{` to the last `}`, if both exist in order.
fn brace_slice(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    if end <= start {
        return None;
    }
    Some(&text[start..=end])
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_raw_json_parses() {
        let (value, strategy) = parse_lenient(r#"{"trust_score": 0.9}"#).unwrap();
        assert_eq!(value, json!({"trust_score": 0.9}));
        assert_eq!(strategy, ParseStrategy::Raw);
    }

    #[test]
    fn test_fenced_json_parses() {
        let text = "```json\n{\"relevance_score\": 0.4}\n```";
        let (value, strategy) = parse_lenient(text).unwrap();
        assert_eq!(value, json!({"relevance_score": 0.4}));
        assert_eq!(strategy, ParseStrategy::Fenced);
    }

    #[test]
    fn test_fence_without_language_tag() {
        let text = "```\n{\"a\": 1}\n```";
        let (value, _) = parse_lenient(text).unwrap();
        assert_eq!(value, json!({"a": 1}));
    }

    #[test]
    fn test_prose_wrapped_json_parses_via_brace_slice() {
        let text = "Here is the analysis you asked for: {\"automotive_domain\": \"obd\"} hope it helps";
        let (value, strategy) = parse_lenient(text).unwrap();
        assert_eq!(value, json!({"automotive_domain": "obd"}));
        assert_eq!(strategy, ParseStrategy::BraceSlice);
    }

    #[test]
    fn test_no_braces_fails() {
        assert!(parse_lenient("the chunk looks trustworthy to me").is_none());
    }

    #[test]
    fn test_mismatched_braces_fail() {
        assert!(parse_lenient("} nothing here {").is_none());
    }

    #[test]
    fn test_nested_object_via_brace_slice() {
        let text = "result: {\"outer\": {\"inner\": [1, 2]}}";
        let (value, _) = parse_lenient(text).unwrap();
        assert_eq!(value, json!({"outer": {"inner": [1, 2]}}));
    }
}
