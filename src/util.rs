//! Shared utility functions

/// Truncate a string to at most `max_chars` characters, appending "..." if truncated.
pub fn truncate_str(s: &str, max_chars: usize) -> String {
    if s.chars().count() <= max_chars {
        return s.to_string();
    }
    let suffix = "...";
    if max_chars < suffix.len() {
        return s.chars().take(max_chars).collect();
    }
    let keep = max_chars.saturating_sub(suffix.len());
    let mut out: String = s.chars().take(keep).collect();
    out.push_str(suffix);
    out
}

/// Escape text for Telegram's HTML parse mode
pub fn escape_html(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            _ => out.push(c),
        }
    }
    out
}
