//! Tolerant JSON extraction from model responses.

use serde_json::Value;

use crate::output_parser::error::{truncate, ParseError};
use crate::output_parser::extract::{
    extract_any_code_block, extract_code_block_for, find_first_bracketed,
};

/// Extract a JSON value from a model response.
///
/// Strategies, first success wins:
/// 1. The whole trimmed response
/// 2. The first `` ```json `` fenced block, then any fenced block
/// 3. The first balanced `{...}` span
///
/// # Examples
///
/// ```
/// use intelligence_pipeline::output_parser::extract_json;
/// use serde_json::json;
///
/// let response = "Here you go:\n```json\n{\"result\": \"ok\"}\n```";
/// assert_eq!(extract_json(response).unwrap(), json!({"result": "ok"}));
/// ```
pub fn extract_json(response: &str) -> Result<Value, ParseError> {
    let text = response.trim();
    if text.is_empty() {
        return Err(ParseError::EmptyResponse);
    }

    if let Ok(value) = serde_json::from_str(text) {
        return Ok(value);
    }

    let fenced = extract_code_block_for(text, "json").or_else(|| extract_any_code_block(text));
    if let Some(value) = fenced.and_then(|block| serde_json::from_str(block).ok()) {
        return Ok(value);
    }

    if let Some(value) =
        find_first_bracketed(text, '{', '}').and_then(|span| serde_json::from_str(span).ok())
    {
        return Ok(value);
    }

    Err(ParseError::NoJson {
        text: truncate(text, 200),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn direct_json() {
        assert_eq!(extract_json(r#" {"a": 1} "#).unwrap(), json!({"a": 1}));
        assert_eq!(extract_json("[1, 2]").unwrap(), json!([1, 2]));
    }

    #[test]
    fn fenced_json_block() {
        let response = "Here you go:\n```json\n{\"result\":\"ok\"}\n```\nAnything else?";
        assert_eq!(extract_json(response).unwrap(), json!({"result": "ok"}));
    }

    #[test]
    fn bare_fence() {
        let response = "```\n{\"a\": true}\n```";
        assert_eq!(extract_json(response).unwrap(), json!({"a": true}));
    }

    #[test]
    fn embedded_object_in_prose() {
        let response = r#"The answer is {"score": 7, "tags": ["x"]} as requested. {"ignored": 1}"#;
        assert_eq!(
            extract_json(response).unwrap(),
            json!({"score": 7, "tags": ["x"]})
        );
    }

    #[test]
    fn broken_fence_falls_back_to_braces() {
        let response = "```json\nnot json\n```\nactually: {\"ok\": 1}";
        assert_eq!(extract_json(response).unwrap(), json!({"ok": 1}));
    }

    #[test]
    fn empty_response() {
        assert_eq!(extract_json("   \n"), Err(ParseError::EmptyResponse));
    }

    #[test]
    fn no_json() {
        let err = extract_json("I cannot help with that.").unwrap_err();
        assert!(matches!(err, ParseError::NoJson { ref text } if text.contains("cannot help")));
    }
}
