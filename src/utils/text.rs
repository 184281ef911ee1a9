//! Small string helpers.

/// Truncate to at most `max_chars` characters, never splitting a code point.
///
/// An ellipsis is appended when anything was cut, and counts toward the limit.
pub fn truncate_chars(text: &str, max_chars: usize) -> String {
    let text = text.trim();
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    if max_chars == 0 {
        return String::new();
    }
    let mut out: String = text.chars().take(max_chars - 1).collect();
    out.push('…');
    out
}
