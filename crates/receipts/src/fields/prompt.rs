//! System and user prompt composition.

use crate::category::Category;
use crate::sanitize::excerpt;

use super::ExtractRequest;

pub const MAX_PROMPT_OCR_CHARS: usize = 3000;
const DEFAULT_CURRENCY: &str = "USD";

pub fn system_prompt(req: &ExtractRequest) -> String {
    let currency = match req.default_currency.trim() {
        "" => DEFAULT_CURRENCY,
        c => c,
    };

    let mut parts = vec![
        "You are a receipts parser. Return ONLY a JSON object that matches the provided JSON Schema."
            .to_string(),
        "Use ISO-8601 dates (YYYY-MM-DD).".to_string(),
        format!(
            "Currency must be a 3-letter ISO 4217 code; default to {} if uncertain.",
            currency
        ),
    ];

    if req.allowed_categories.is_empty() {
        parts.push("Category must be a short, sensible label.".to_string());
    } else {
        parts.push(format!(
            "Allowed categories (enum): {}.",
            req.allowed_categories.join(", ")
        ));
        let rubric: Vec<String> = Category::ALL
            .iter()
            .filter(|c| req.allowed_categories.iter().any(|a| a == c.as_str()))
            .map(|c| format!("- {}: {}", c.as_str(), c.rubric()))
            .collect();
        if !rubric.is_empty() {
            parts.push(format!("Category guide:\n{}", rubric.join("\n")));
        }
    }

    let context = business_context(req);
    if !context.is_empty() {
        parts.push(format!("Business context: {}", context));
    }

    parts.extend(
        [
            "For 'description', write a concise, tax-appropriate business purpose of 8 to 16 words without personal names, addresses or timestamps.",
            "If taxes appear, put them in 'tax' and never in 'other_fees'.",
            "Sum non-tax, non-tip surcharges (shipping, booking, airport, regulatory) into 'other_fees'.",
            "If a tip appears, put it in 'tip'.",
            "If a discount is visible, report it in 'discount' as a positive amount.",
            "Never output null. If a field is not present, omit it.",
        ]
        .map(String::from),
    );

    if let Some(tz) = req.timezone.as_deref().map(str::trim).filter(|t| !t.is_empty()) {
        parts.push(format!("If dates are ambiguous, prefer timezone {}.", tz));
    }

    parts.join("\n")
}

fn business_context(req: &ExtractRequest) -> String {
    let profile = &req.profile;
    [
        ("Profile", profile.name.trim()),
        ("Job Title", profile.job_title.trim()),
        ("Job Description", profile.job_description.trim()),
    ]
    .iter()
    .filter(|(_, value)| !value.is_empty())
    .map(|(label, value)| format!("{}: {}.", label, value))
    .collect::<Vec<_>>()
    .join(" ")
}

/// Filename and folder hints followed by the OCR text, or a note that the
/// receipt image is attached instead.
pub fn user_prompt(req: &ExtractRequest, image_attached: bool) -> String {
    let mut prompt = String::new();
    let filename = req.filename_hint.trim();
    if !filename.is_empty() {
        prompt.push_str(&format!("Filename: {}\n", filename));
    }
    let folder = req.folder_hint.trim();
    if !folder.is_empty() {
        prompt.push_str(&format!("Folder path: {}\n", folder));
    }

    if image_attached {
        prompt.push_str("\nThe receipt image is attached; read the fields from it.");
        let ocr = req.ocr_text.trim();
        if !ocr.is_empty() {
            prompt.push_str("\nLow-confidence OCR text for reference:\n");
            prompt.push_str(&truncate_ocr(ocr));
        }
    } else {
        prompt.push_str(&format!(
            "\nOCR text (first {} chars):\n",
            MAX_PROMPT_OCR_CHARS
        ));
        prompt.push_str(&truncate_ocr(req.ocr_text.trim()));
    }
    prompt
}

fn truncate_ocr(text: &str) -> String {
    if text.chars().count() <= MAX_PROMPT_OCR_CHARS {
        return text.to_string();
    }
    // `excerpt` marks the cut with a bare ellipsis
    format!("{}(truncated)", excerpt(text, MAX_PROMPT_OCR_CHARS))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::category::all_labels;
    use crate::fields::ProfileContext;

    fn request() -> ExtractRequest {
        ExtractRequest {
            ocr_text: "COSTCO\nTOTAL 12.00".to_string(),
            filename_hint: "2024-07-21-costco.pdf".to_string(),
            folder_hint: "Receipts/2024".to_string(),
            allowed_categories: all_labels(),
            default_currency: "CAD".to_string(),
            profile: ProfileContext {
                name: "Consulting".to_string(),
                job_title: "Software Engineer".to_string(),
                job_description: String::new(),
            },
            ..ExtractRequest::default()
        }
    }

    #[test]
    fn test_system_prompt_contents() {
        let prompt = system_prompt(&request());
        assert!(prompt.contains("default to CAD"));
        assert!(prompt.contains("Allowed categories (enum): Cell Phone Service, Home Office"));
        assert!(prompt.contains("- Meals: "));
        assert!(prompt.contains("Business context: Profile: Consulting. Job Title: Software Engineer."));
        assert!(!prompt.contains("Job Description"));
        assert!(prompt.contains("Never output null"));
        assert!(!prompt.contains("timezone"));
    }

    #[test]
    fn test_system_prompt_defaults_and_timezone() {
        let req = ExtractRequest {
            timezone: Some("America/Chicago".to_string()),
            ..ExtractRequest::default()
        };
        let prompt = system_prompt(&req);
        assert!(prompt.contains("default to USD"));
        assert!(prompt.contains("short, sensible label"));
        assert!(!prompt.contains("Business context"));
        assert!(prompt.contains("prefer timezone America/Chicago"));
    }

    #[test]
    fn test_user_prompt_with_text() {
        let prompt = user_prompt(&request(), false);
        assert!(prompt.starts_with("Filename: 2024-07-21-costco.pdf\nFolder path: Receipts/2024\n"));
        assert!(prompt.ends_with("COSTCO\nTOTAL 12.00"));
    }

    #[test]
    fn test_user_prompt_truncates_on_char_boundary() {
        let req = ExtractRequest {
            ocr_text: "€".repeat(MAX_PROMPT_OCR_CHARS + 10),
            ..ExtractRequest::default()
        };
        let prompt = user_prompt(&req, false);
        assert!(prompt.ends_with("…(truncated)"));
        assert_eq!(prompt.matches('€').count(), MAX_PROMPT_OCR_CHARS);
    }

    #[test]
    fn test_user_prompt_with_image() {
        let prompt = user_prompt(&request(), true);
        assert!(prompt.contains("image is attached"));
        assert!(!prompt.contains("OCR text (first"));
    }
}
