//! Pull a JSON object out of free-form model output
//!
//! The fallback chain in [`extract_json`] is ordered and every stage matters:
//! planning and plan editing both depend on it behaving exactly this way.

use std::sync::LazyLock;

use regex::Regex;
use serde::de::DeserializeOwned;
use thiserror::Error;
use tracing::debug;

/// Balanced braces with at most one level of nesting
static OBJECT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\{(?:[^{}]|\{[^{}]*\})*\}").expect("object regex is valid"));

/// Length of raw-text excerpts carried in errors
pub const EXCERPT_LEN: usize = 200;

/// A reply that should have held a JSON object but did not parse
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("Malformed model response: {reason} (response began: {excerpt:?})")]
pub struct MalformedResponse {
    pub reason: String,
    pub excerpt: String,
}

impl MalformedResponse {
    pub fn new(reason: impl Into<String>, raw: &str) -> Self {
        Self {
            reason: reason.into(),
            excerpt: excerpt(raw),
        }
    }
}

/// First `EXCERPT_LEN` characters of `raw`, marked when cut
pub fn excerpt(raw: &str) -> String {
    let mut chars = raw.chars();
    let head: String = chars.by_ref().take(EXCERPT_LEN).collect();
    if chars.next().is_some() { format!("{}...", head) } else { head }
}

/// Extract the JSON object embedded in `raw`
///
/// 1. strip a leading ```` ```json ```` / ```` ``` ```` fence and a trailing ```` ``` ````
/// 2. trim
/// 3. return the first balanced-brace object if it parses
/// 4. return the text if it is brace-delimited
/// 5. return the trimmed text and let the caller's parse report the problem
pub fn extract_json(raw: &str) -> String {
    debug!(raw_len = raw.len(), "extract_json: called");
    let mut text = raw.trim();
    if let Some(rest) = text.strip_prefix("```json") {
        text = rest;
    } else if let Some(rest) = text.strip_prefix("```") {
        text = rest;
    }
    if let Some(rest) = text.strip_suffix("```") {
        text = rest;
    }
    let text = text.trim();

    if let Some(m) = OBJECT_RE.find(text) {
        let candidate = m.as_str();
        if serde_json::from_str::<serde_json::Value>(candidate).is_ok() {
            debug!("extract_json: balanced object found");
            return candidate.to_string();
        }
        debug!("extract_json: balanced candidate did not parse");
    }

    if text.starts_with('{') && text.ends_with('}') {
        debug!("extract_json: returning brace-delimited text");
        return text.to_string();
    }

    debug!("extract_json: no object found, returning trimmed text");
    text.to_string()
}

/// Run [`extract_json`] and deserialize the result
pub fn parse_json_response<T: DeserializeOwned>(raw: &str) -> Result<T, MalformedResponse> {
    let json = extract_json(raw);
    serde_json::from_str(&json).map_err(|e| MalformedResponse::new(e.to_string(), raw))
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use serde_json::{Value, json};

    #[test]
    fn test_pure_json() {
        assert_eq!(extract_json(r#"{"a": 1}"#), r#"{"a": 1}"#);
    }

    #[test]
    fn test_json_fence() {
        let raw = "```json\n{\"title\": \"T\", \"steps\": [{\"id\": 1}]}\n```";
        let value: Value = serde_json::from_str(&extract_json(raw)).unwrap();
        assert_eq!(value["steps"][0]["id"], 1);
    }

    #[test]
    fn test_bare_fence() {
        let raw = "```\n{\"a\": true}\n```";
        assert_eq!(extract_json(raw), r#"{"a": true}"#);
    }

    #[test]
    fn test_embedded_in_prose() {
        let raw = "Sure! Here is the plan you asked for: {\"title\": \"X\"} Let me know.";
        assert_eq!(extract_json(raw), r#"{"title": "X"}"#);
    }

    #[test]
    fn test_deep_nesting_yields_first_parseable_inner_object() {
        // Two levels defeat the match at the outer brace; the first balanced
        // substring that parses is the inner object
        let raw = r#"{"a": {"b": {"c": 1}}}"#;
        assert_eq!(extract_json(raw), r#"{"b": {"c": 1}}"#);
    }

    #[test]
    fn test_unparseable_braces_returned_as_is() {
        assert_eq!(extract_json("```\n{title: 'no quotes'}\n```"), "{title: 'no quotes'}");
    }

    #[test]
    fn test_no_json_returns_trimmed_text() {
        assert_eq!(extract_json("  no json here  "), "no json here");
    }

    #[test]
    fn test_parse_json_response_error_has_excerpt() {
        #[derive(Debug, serde::Deserialize)]
        struct Plan {
            #[allow(dead_code)]
            title: String,
        }
        let raw = "I could not come up with a plan. ".repeat(20);
        let err = parse_json_response::<Plan>(&raw).unwrap_err();
        assert!(err.excerpt.ends_with("..."));
        assert_eq!(err.excerpt.chars().count(), EXCERPT_LEN + 3);
    }

    #[test]
    fn test_parse_json_response_typed() {
        let value: Value = parse_json_response("```json\n{\"ok\": 1}\n```").unwrap();
        assert_eq!(value, json!({"ok": 1}));
    }

    fn flat_object() -> impl Strategy<Value = Value> {
        prop::collection::btree_map("[a-z]{1,8}", prop_oneof![
            "[a-z ]{0,12}".prop_map(Value::from),
            any::<i32>().prop_map(Value::from),
            any::<bool>().prop_map(Value::from),
        ], 0..6)
        .prop_map(|m| Value::Object(m.into_iter().collect()))
    }

    fn object_with_one_nested_level() -> impl Strategy<Value = Value> {
        (flat_object(), "[a-z]{1,8}", flat_object()).prop_map(|(mut outer, key, inner)| {
            outer[key] = inner;
            outer
        })
    }

    proptest! {
        #[test]
        fn prop_recovers_object_from_wrappers(
            value in object_with_one_nested_level(),
            prose in "[A-Za-z ,.]{0,40}",
            wrapper in 0usize..4,
        ) {
            let json = serde_json::to_string(&value).unwrap();
            let raw = match wrapper {
                0 => json.clone(),
                1 => format!("```json\n{}\n```", json),
                2 => format!("```\n{}\n```", json),
                _ => format!("{} {} {}", prose, json, prose),
            };

            let out = extract_json(&raw);
            let parsed: Value = serde_json::from_str(&out).unwrap();
            prop_assert_eq!(&parsed, &value);

            // Idempotent on its own output
            prop_assert_eq!(extract_json(&out), out);
        }
    }
}
