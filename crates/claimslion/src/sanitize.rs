//! Helpers for sanitizing data before it enters logs and tracing spans.
//!
//! Uploaded filenames come from the client and may carry directory parts;
//! upstream error bodies can be large. Neither goes into a span verbatim.

/// Longest upstream body excerpt kept in an error message.
pub const MAX_BODY_EXCERPT: usize = 200;

/// Returns only the final path component of a client-supplied filename.
///
/// Handles both `/` and `\` separators since browsers on Windows may send
/// full paths.
pub fn redact_filename(filename: &str) -> String {
    let last = filename
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or(filename)
        .trim();
    if last.is_empty() {
        "<unknown>".to_string()
    } else {
        last.to_string()
    }
}

/// Truncates text to at most `max_chars` characters, appending `...` when cut.
pub fn truncate(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => format!("{}...", &text[..idx]),
        None => text.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_redact_filename_strips_directories() {
        assert_eq!(redact_filename("/home/user/claims.csv"), "claims.csv");
        assert_eq!(redact_filename("C:\\Users\\me\\claims.xlsx"), "claims.xlsx");
        assert_eq!(redact_filename("claims.csv"), "claims.csv");
    }

    #[test]
    fn test_redact_filename_empty() {
        assert_eq!(redact_filename(""), "<unknown>");
        assert_eq!(redact_filename("dir/"), "<unknown>");
    }

    #[test]
    fn test_truncate() {
        assert_eq!(truncate("short", 10), "short");
        assert_eq!(truncate("abcdefghij", 4), "abcd...");
        // Multi-byte characters are never split.
        assert_eq!(truncate("ééééé", 2), "éé...");
    }
}
