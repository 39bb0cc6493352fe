//! Helpers for keeping receipt data out of span attributes and error strings.
//!
//! Receipts carry names, card digits and home addresses in their paths and
//! OCR output; only filenames and bounded excerpts are allowed into logs.

use std::path::Path;

/// Returns only the filename component of a path (no directory).
pub fn redact_path(path: &Path) -> String {
    path.file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("<unknown>")
        .to_string()
}

/// Cuts `text` to at most `max_chars` characters, marking the cut.
pub fn excerpt(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => format!("{}…", &text[..idx]),
        None => text.to_string(),
    }
}

/// Lossy UTF-8 excerpt of subprocess or HTTP output.
pub fn excerpt_bytes(bytes: &[u8], max_chars: usize) -> String {
    excerpt(String::from_utf8_lossy(bytes).trim(), max_chars)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_redact_path_returns_filename() {
        assert_eq!(
            redact_path(Path::new("/home/user/Receipts/2024/costco.pdf")),
            "costco.pdf"
        );
    }

    #[test]
    fn test_redact_path_no_filename() {
        assert_eq!(redact_path(Path::new("/")), "<unknown>");
    }

    #[test]
    fn test_excerpt_short_text_unchanged() {
        assert_eq!(excerpt("total 12.00", 50), "total 12.00");
    }

    #[test]
    fn test_excerpt_respects_char_boundaries() {
        let text = "€€€€€€";
        assert_eq!(excerpt(text, 3), "€€€…");
    }

    #[test]
    fn test_excerpt_bytes_trims_and_handles_invalid_utf8() {
        let out = excerpt_bytes(b"  error: bad\xff input \n", 100);
        assert!(out.starts_with("error: bad"));
        assert!(out.ends_with("input"));
    }
}
