//! Confidence scoring for extracted receipt text.

use std::sync::LazyLock;

use regex::Regex;

/// Images scoring below this are flagged for review and may be sent to the
/// model as pixels instead of OCR text.
pub const IMAGE_CONFIDENCE_THRESHOLD: f32 = 0.6;

const OCR_WEIGHT: f32 = 0.7;
const HEURISTIC_WEIGHT: f32 = 0.3;

static RE_DATE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\b(19|20)\d{2}[-/.]\d{1,2}[-/.]\d{1,2}\b|\b\d{1,2}[-/.]\d{1,2}[-/.](19|20)\d{2}\b|\b(jan|feb|mar|apr|may|jun|jul|aug|sep|oct|nov|dec)[a-z]*\.?\s+\d{1,2},?\s+(19|20)\d{2}\b",
    )
    .unwrap()
});
static RE_CURRENCY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(usd|eur|gbp|cad|aud|chf|inr|jpy|ngn)\b|[$£€¥₹]").unwrap()
});
static RE_AMOUNT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b\d{1,3}(,\d{3})+\.\d{2}\b|\b\d+\.\d{2}\b").unwrap());

/// Scores text by the receipt-like signals it contains.
///
/// Starts at 0.2 and adds 0.2 for a dated line, 0.15 for a currency marker,
/// 0.15 for a decimal amount and 0.1 for text longer than 120 characters.
pub fn heuristic_confidence(text: &str) -> f32 {
    let mut score: f32 = 0.2;
    if RE_DATE.is_match(text) {
        score += 0.2;
    }
    if RE_CURRENCY.is_match(text) {
        score += 0.15;
    }
    if RE_AMOUNT.is_match(text) {
        score += 0.15;
    }
    if text.chars().count() > 120 {
        score += 0.1;
    }
    score.clamp(0.0, 1.0)
}

/// Combines an engine-reported confidence with the heuristic.
///
/// A non-positive `ocr` means the engine reported nothing usable.
pub fn blend(ocr: f32, heuristic: f32) -> f32 {
    let heuristic = heuristic.clamp(0.0, 1.0);
    if ocr > 0.0 {
        (OCR_WEIGHT * ocr.min(1.0) + HEURISTIC_WEIGHT * heuristic).clamp(0.0, 1.0)
    } else {
        heuristic
    }
}

/// Mean word confidence from `tesseract … tsv` output, scaled to 0..1.
///
/// Uses the header's `conf` column when present, otherwise the last column.
/// Rows with fewer than 12 columns, empty values or `-1` are skipped.
/// Returns `None` when no row carries a usable confidence.
pub fn tsv_mean_confidence(tsv: &str) -> Option<f32> {
    let mut lines = tsv.lines();
    let header = lines.next()?;
    let conf_index = header.split('\t').position(|h| h.trim() == "conf");

    let mut sum = 0.0_f64;
    let mut count = 0_u32;

    for line in lines {
        let cols: Vec<&str> = line.split('\t').collect();
        if cols.len() < 12 {
            continue;
        }
        let raw = cols
            .get(conf_index.unwrap_or(cols.len() - 1))
            .map_or("", |c| c.trim());
        if raw.is_empty() || raw == "-1" {
            continue;
        }
        if let Ok(value) = raw.parse::<f64>() {
            if value >= 0.0 {
                sum += value;
                count += 1;
            }
        }
    }

    if count == 0 {
        return None;
    }
    Some(((sum / count as f64) / 100.0).clamp(0.0, 1.0) as f32)
}
