//! Helpers for sanitizing data before it enters log lines and span attributes.
//!
//! Upload paths live under the service's temp directory and model output can
//! contain a candidate's personal details, so neither is logged verbatim.

use std::path::Path;

/// Maximum number of characters of raw model output kept in a log excerpt.
pub const EXCERPT_CHARS: usize = 200;

/// Returns only the filename component of a path (no directory).
pub fn redact_path(path: &Path) -> String {
    path.file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("<unknown>")
        .to_string()
}

/// Returns at most `max_chars` characters of `text`, marking the cut.
///
/// Counts Unicode scalar values, so the cut never lands inside a code point.
pub fn excerpt(text: &str, max_chars: usize) -> String {
    let mut chars = text.char_indices();
    match chars.nth(max_chars) {
        Some((byte_idx, _)) => format!("{}… ({} chars total)", &text[..byte_idx], text.chars().count()),
        None => text.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_redact_path_returns_filename() {
        assert_eq!(
            redact_path(Path::new("/tmp/resume-ingest/resume-1234.pdf")),
            "resume-1234.pdf"
        );
    }

    #[test]
    fn test_redact_path_no_filename() {
        assert_eq!(redact_path(Path::new("/")), "<unknown>");
    }

    #[test]
    fn test_excerpt_short_text_unchanged() {
        assert_eq!(excerpt("{\"name\": \"A\"}", 50), "{\"name\": \"A\"}");
    }

    #[test]
    fn test_excerpt_truncates_long_text() {
        let text = "x".repeat(500);
        let cut = excerpt(&text, 10);
        assert!(cut.starts_with("xxxxxxxxxx…"));
        assert!(cut.contains("500 chars total"));
    }

    #[test]
    fn test_excerpt_respects_char_boundaries() {
        let text = "ééééé";
        let cut = excerpt(text, 2);
        assert!(cut.starts_with("éé…"));
    }
}
