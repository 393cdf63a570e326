//! Defensive parsing of model output into typed JSON.

use serde::de::DeserializeOwned;

/// Tries, in order: the whole text, the body of a fenced code block, and the
/// outermost `{...}` span. Returns `None` if none of them deserialize.
pub fn parse_json_response<T: DeserializeOwned>(raw: &str) -> Option<T> {
    let text = raw.trim();

    if let Ok(value) = serde_json::from_str(text) {
        return Some(value);
    }

    if let Some(fenced) = strip_json_fences(text) {
        if let Ok(value) = serde_json::from_str(fenced) {
            return Some(value);
        }
    }

    let start = text.find('{')?;
    let end = text.rfind('}')?;
    if end <= start {
        return None;
    }
    serde_json::from_str(&text[start..=end]).ok()
}

/// Returns the contents of the first ```json ... ``` or ``` ... ``` block.
fn strip_json_fences(text: &str) -> Option<&str> {
    let open = text.find("```")?;
    let after_fence = &text[open + 3..];
    // Skip an optional language tag up to the end of the line.
    let body_start = match after_fence.find('\n') {
        Some(newline) if !after_fence[..newline].trim().contains('{') => newline + 1,
        _ => 0,
    };
    let body = &after_fence[body_start..];
    let close = body.find("```").unwrap_or(body.len());
    Some(body[..close].trim())
}
