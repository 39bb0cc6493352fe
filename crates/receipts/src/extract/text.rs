use std::path::Path;

use crate::error::ExtractError;

use super::confidence::heuristic_confidence;
use super::normalize::normalize;
use super::{Extracted, ExtractionMethod};

/// Plain-text receipts (email bodies, exported notes).
pub async fn extract_text_file(path: &Path) -> Result<Extracted, ExtractError> {
    let bytes = tokio::fs::read(path)
        .await
        .map_err(|e| ExtractError::io(path, e))?;
    let text = normalize(&String::from_utf8_lossy(&bytes));
    let confidence = heuristic_confidence(&text);

    Ok(Extracted {
        text,
        pages: 1,
        method: ExtractionMethod::PlainText,
        confidence,
        warnings: Vec::new(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_reads_and_normalizes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("order.txt");
        std::fs::write(&path, "Order   #123\r\n\r\n\r\n\r\nTotal: $42.10\r\n").unwrap();

        let result = extract_text_file(&path).await.unwrap();
        assert_eq!(result.text, "Order #123\n\nTotal: $42.10");
        assert_eq!(result.pages, 1);
        assert_eq!(result.method, ExtractionMethod::PlainText);
        assert!((result.confidence - 0.5).abs() < 1e-6);
    }

    #[tokio::test]
    async fn test_missing_file_is_io_error() {
        let err = extract_text_file(Path::new("/nonexistent/receipt.txt"))
            .await
            .unwrap_err();
        assert!(matches!(err, ExtractError::Io { .. }));
    }
}
