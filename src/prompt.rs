//! Prompt construction for a process version.

use serde_json::Value;

use crate::types::ProcessConfig;

/// Substitute placeholders in a template from a JSON input.
///
/// `{input}` becomes the whole input as pretty JSON. When the input is an
/// object, `{key}` becomes the value of its top-level member `key`: strings
/// are inserted verbatim, everything else as compact JSON. Unknown
/// placeholders are left untouched.
///
/// Use `{{` to insert a literal `{` and `}}` to insert a literal `}`.
///
/// # Example
///
/// ```
/// use intelligence_pipeline::prompt::render;
/// use serde_json::json;
///
/// let input = json!({"name": "Alice", "age": 31});
/// let result = render("Hello {name} ({age}), reply as {{\"ok\": true}}", &input);
/// assert_eq!(result, r#"Hello Alice (31), reply as {"ok": true}"#);
/// ```
pub fn render(template: &str, input: &Value) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    // Single left-to-right pass; substituted text is never rescanned.
    while let Some(pos) = rest.find(['{', '}']) {
        out.push_str(&rest[..pos]);
        let tail = &rest[pos..];

        if tail.starts_with("{{") {
            out.push('{');
            rest = &tail[2..];
            continue;
        }
        if tail.starts_with("}}") {
            out.push('}');
            rest = &tail[2..];
            continue;
        }
        if let Some((name, after)) = placeholder(tail) {
            if let Some(text) = lookup(name, input) {
                out.push_str(&text);
                rest = after;
                continue;
            }
        }
        out.push_str(&tail[..1]);
        rest = &tail[1..];
    }
    out.push_str(rest);
    out
}

/// Split `{name}...` into `name` and the text after the closing brace.
fn placeholder(tail: &str) -> Option<(&str, &str)> {
    let body = tail.strip_prefix('{')?;
    let end = body.find(['{', '}'])?;
    if !body[end..].starts_with('}') || end == 0 {
        return None;
    }
    Some((&body[..end], &body[end + 1..]))
}

fn lookup(name: &str, input: &Value) -> Option<String> {
    if name == "input" {
        return Some(pretty(input));
    }
    match input.as_object()?.get(name)? {
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

/// Wrap text in a labeled section for structured prompts.
pub fn section(label: &str, content: &str) -> String {
    format!("## {}\n{}", label, content)
}

/// System and user prompts for one generation request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuiltPrompt {
    pub system: String,
    pub user: String,
}

/// Build the prompts for `config` applied to `input`.
///
/// The system prompt is the rendered template followed by a JSON-only output
/// instruction (with the output schema when one is declared). The user
/// prompt carries the goal and the input.
pub fn build_prompt(config: &ProcessConfig, input: &Value) -> BuiltPrompt {
    let mut system = render(&config.system_prompt, input);

    let format_rules = match config.output_schema {
        Some(ref schema) if schema.as_object().is_some_and(|o| !o.is_empty()) => format!(
            "Respond with a single JSON value matching this JSON schema and nothing else:\n{}",
            pretty(schema)
        ),
        _ => "Respond with a single JSON value and nothing else.".to_string(),
    };
    if !system.is_empty() {
        system.push_str("\n\n");
    }
    system.push_str(&section("Output format", &format_rules));

    let mut parts = Vec::with_capacity(2);
    if !config.goal.trim().is_empty() {
        parts.push(section("Goal", config.goal.trim()));
    }
    parts.push(section("Input", &pretty(input)));

    BuiltPrompt {
        system,
        user: parts.join("\n\n"),
    }
}

fn pretty(value: &Value) -> String {
    serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string())
}
