//! Locating JSON candidates inside free-form model text.

/// Content of the first fenced code block tagged with `lang`
/// (case-insensitive), trimmed.
///
/// # Examples
///
/// ```
/// use intelligence_pipeline::output_parser::extract::extract_code_block_for;
///
/// let input = "Sure:\n```json\n{\"a\": 1}\n```";
/// assert_eq!(extract_code_block_for(input, "json"), Some("{\"a\": 1}"));
/// ```
pub fn extract_code_block_for<'a>(text: &'a str, lang: &str) -> Option<&'a str> {
    fenced_blocks(text)
        .find(|(hint, _)| hint.is_some_and(|h| h.eq_ignore_ascii_case(lang)))
        .map(|(_, content)| content)
}

/// Content of the first fenced code block, whatever its language hint.
pub fn extract_any_code_block(text: &str) -> Option<&str> {
    fenced_blocks(text).next().map(|(_, content)| content)
}

/// Iterate `(language_hint, content)` for each closed ``` fence in order.
fn fenced_blocks(text: &str) -> impl Iterator<Item = (Option<&str>, &str)> {
    let mut cursor = 0;
    std::iter::from_fn(move || {
        let open = cursor + text.get(cursor..)?.find("```")?;
        let after = open + 3;
        let line_end = after + text[after..].find('\n')?;
        let body = line_end + 1;
        let close = body + text[body..].find("```")?;
        cursor = close + 3;

        let hint = text[after..line_end].trim();
        let hint = (!hint.is_empty()).then_some(hint);
        Some((hint, text[body..close].trim()))
    })
}

/// The first balanced `open`...`close` span, skipping delimiters inside
/// JSON string literals.
///
/// # Examples
///
/// ```
/// use intelligence_pipeline::output_parser::extract::find_first_bracketed;
///
/// let input = r#"a {"x": {"y": 1}} then {"z": 2}"#;
/// assert_eq!(find_first_bracketed(input, '{', '}'), Some(r#"{"x": {"y": 1}}"#));
/// ```
pub fn find_first_bracketed(text: &str, open: char, close: char) -> Option<&str> {
    let start = text.find(open)?;
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (i, ch) in text[start..].char_indices() {
        if escaped {
            escaped = false;
            continue;
        }
        match ch {
            '\\' if in_string => escaped = true,
            '"' => in_string = !in_string,
            _ if in_string => {}
            c if c == open => depth += 1,
            c if c == close => {
                depth -= 1;
                if depth == 0 {
                    let end = start + i + ch.len_utf8();
                    return Some(&text[start..end]);
                }
            }
            _ => {}
        }
    }
    None
}
