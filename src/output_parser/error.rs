//! Error types for model output parsing.

/// Errors returned while extracting JSON from model text.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseError {
    /// The model returned nothing but whitespace.
    #[error("empty LLM response")]
    EmptyResponse,

    /// No extraction strategy produced valid JSON.
    #[error("no JSON found in LLM response: {text}")]
    NoJson {
        /// A truncated copy of the response (max 200 chars).
        text: String,
    },
}

/// Truncate to at most `max_chars` characters, appending "..." if cut.
pub(crate) fn truncate(s: &str, max_chars: usize) -> String {
    match s.char_indices().nth(max_chars) {
        Some((idx, _)) => format!("{}...", &s[..idx]),
        None => s.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truncate_respects_char_boundaries() {
        assert_eq!(truncate("short", 10), "short");
        assert_eq!(truncate("ééééé", 2), "éé...");
    }
}
