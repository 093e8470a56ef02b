//! Locating JSON inside free-form model replies

/// First balanced `[...]` in `text`.
///
/// Brackets inside JSON strings are ignored. Returns `None` when there is
/// no `[` or the first array never closes.
pub fn extract_json_array(text: &str) -> Option<&str> {
    balanced(text, b'[', b']')
}

/// Substring from the first `{` to the last `}`, if both exist in order.
pub fn extract_json_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    (end > start).then(|| &text[start..=end])
}

/// Trims whitespace and a surrounding ``` fence (with optional language tag).
pub fn strip_code_fences(text: &str) -> String {
    let mut body = text.trim();
    if let Some(rest) = body.strip_prefix("```") {
        body = match rest.find('\n') {
            Some(newline) if rest[..newline].trim().chars().all(|c| c.is_ascii_alphanumeric()) => {
                &rest[newline + 1..]
            }
            _ => strip_inline_tag(rest),
        };
    }
    if let Some(rest) = body.trim_end().strip_suffix("```") {
        body = rest;
    }
    body.trim().to_string()
}

const FENCE_TAGS: &[&str] = &["sql", "postgres", "postgresql", "json", "yaml", "sh", "bash"];

/// Drops a language tag on a one-line fence such as ```` ```sql SELECT 1``` ````.
fn strip_inline_tag(rest: &str) -> &str {
    match rest.split_once(char::is_whitespace) {
        Some((tag, after)) if FENCE_TAGS.iter().any(|t| tag.eq_ignore_ascii_case(t)) => after,
        _ => rest,
    }
}

fn balanced(text: &str, open: u8, close: u8) -> Option<&str> {
    let bytes = text.as_bytes();
    let start = bytes.iter().position(|&b| b == open)?;

    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (offset, &b) in bytes[start..].iter().enumerate() {
        if in_string {
            match b {
                _ if escaped => escaped = false,
                b'\\' => escaped = true,
                b'"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match b {
            b'"' => in_string = true,
            _ if b == open => depth += 1,
            _ if b == close => {
                depth -= 1;
                if depth == 0 {
                    return Some(&text[start..=start + offset]);
                }
            }
            _ => {}
        }
    }
    None
}
