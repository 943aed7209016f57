//! Lenient JSON extraction from model output.
//!
//! Models wrap JSON in Markdown fences, prose, or trailing commas. [`parse_json_lenient`] peels
//! those layers off in order and gives up with `None` rather than guessing further.

use regex::Regex;
use serde_json::Value;
use std::sync::LazyLock;

static OPEN_FENCE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)^```(?:json)?\s*").unwrap());
static CLOSE_FENCE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s*```$").unwrap());
static FIRST_SPAN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)(\{.*?\}|\[.*?\])").unwrap());
static TRAILING_COMMA: LazyLock<Regex> = LazyLock::new(|| Regex::new(r",\s*([}\]])").unwrap());

/// Parse JSON from noisy model output.
///
/// Tries, in order: the whole string with code fences removed, the first `{...}` or `[...]`
/// span, and that span with trailing commas dropped.
pub fn parse_json_lenient(raw: &str) -> Option<Value> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    let stripped = OPEN_FENCE.replace(raw, "");
    let stripped = CLOSE_FENCE.replace(&stripped, "");

    if let Ok(value) = serde_json::from_str(&stripped) {
        return Some(value);
    }

    let candidate = FIRST_SPAN.captures(&stripped)?.get(1)?.as_str();
    if let Ok(value) = serde_json::from_str(candidate) {
        return Some(value);
    }
    let repaired = TRAILING_COMMA.replace_all(candidate, "$1");
    serde_json::from_str(&repaired).ok()
}

/// Parse the whole output, falling back to the first line that parses on its own.
pub fn parse_model_json(raw: &str) -> Option<Value> {
    parse_json_lenient(raw).or_else(|| {
        raw.lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .find_map(parse_json_lenient)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_plain_json() {
        assert_eq!(parse_json_lenient(r#"{"a": 1}"#), Some(json!({"a": 1})));
    }

    #[test]
    fn strips_code_fences() {
        let raw = "```json\n{\"name\": \"Asha\"}\n```";
        assert_eq!(parse_json_lenient(raw), Some(json!({"name": "Asha"})));
    }

    #[test]
    fn extracts_embedded_object() {
        let raw = "Here you go: {\"issue_date\": null} hope this helps";
        assert_eq!(parse_json_lenient(raw), Some(json!({"issue_date": null})));
    }

    #[test]
    fn repairs_trailing_commas() {
        let raw = "Result: {\"a\": 1, \"b\": 2,}";
        assert_eq!(parse_json_lenient(raw), Some(json!({"a": 1, "b": 2})));
    }

    #[test]
    fn gives_up_on_prose() {
        assert_eq!(parse_json_lenient("no json here"), None);
        assert_eq!(parse_json_lenient("   "), None);
    }

    #[test]
    fn line_fallback_finds_later_json() {
        let raw = "Sure thing\n[1, 2, 3]";
        assert_eq!(parse_model_json(raw), Some(json!([1, 2, 3])));
    }
}
