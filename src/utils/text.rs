// Helpers for cleaning model output

/// Return the body of the first fenced code block, or the trimmed input if
/// there is none. An unterminated fence yields everything after it.
pub fn strip_code_fence(text: &str) -> &str {
    let trimmed = text.trim();
    let Some(start) = trimmed.find("```") else {
        return trimmed;
    };
    let after = &trimmed[start + 3..];
    // Skip the info string (```json, ```markdown, ...)
    let body = match after.find('\n') {
        Some(nl) if !after[..nl].trim().contains(' ') => &after[nl + 1..],
        _ => after,
    };
    match body.find("```") {
        Some(end) => body[..end].trim(),
        None => body.trim(),
    }
}

/// Prepare a markdown answer for rendering: unwrap a whole-answer
/// ```` ```markdown ```` fence and trim. Anything else is left as produced.
pub fn normalize_markdown(text: &str) -> String {
    let mut content = text.trim();
    if let Some(rest) = content.strip_prefix("```markdown").or_else(|| content.strip_prefix("```md")) {
        content = rest.trim_start();
        if let Some(inner) = content.strip_suffix("```") {
            content = inner;
        }
    }
    content.trim().to_string()
}
