//! Logging utilities for sanitizing user-supplied strings (mail bodies, pigeon
//! names) so every log record stays on a single line.

use std::fmt::Write;

const MAX_PREVIEW: usize = 300;

/// Escape a string for single-line logging:
/// - `\n` => `\\n`
/// - `\r` => `\\r`
/// - `\t` => `\\t`
/// - backslash => `\\\\`
///   Other control characters become `\xNN`. Strings longer than the preview
///   limit are cut with an ellipsis.
pub fn escape_log(s: &str) -> String {
    escape_with_limit(s, MAX_PREVIEW)
}

/// Short form for chat replies and status lines.
pub fn preview(s: &str, max_chars: usize) -> String {
    escape_with_limit(s, max_chars)
}

fn escape_with_limit(s: &str, limit: usize) -> String {
    let mut out = String::with_capacity(s.len().min(limit) + 8);
    for (count, ch) in s.chars().enumerate() {
        if count >= limit {
            out.push('…');
            break;
        }
        match ch {
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c if c.is_control() => {
                let _ = write!(&mut out, "\\x{:02X}", c as u32);
            }
            c => out.push(c),
        }
    }
    out
}
