//! Builders for extractor outputs.

#![allow(dead_code)]

use std::time::Duration;

use receipts::extract::ExtractionMethod;
use receipts::{ExtractionResult, FileFormat, ReceiptFields};

/// Builder for `ExtractionResult` values returned by fake text extractors.
pub struct ExtractionBuilder {
    result: ExtractionResult,
}

impl ExtractionBuilder {
    /// A clean single-page PDF with a text layer.
    pub fn pdf_text(text: &str) -> Self {
        Self {
            result: ExtractionResult {
                text: text.to_string(),
                pages: 1,
                source_type: FileFormat::Pdf,
                method: ExtractionMethod::PdfText,
                language: None,
                confidence: 0.9,
                warnings: vec![],
                duration: Duration::from_millis(12),
            },
        }
    }

    /// A photo recognized by tesseract.
    pub fn image_ocr(text: &str, confidence: f32) -> Self {
        Self {
            result: ExtractionResult {
                text: text.to_string(),
                pages: 1,
                source_type: FileFormat::Image,
                method: ExtractionMethod::ImageOcr,
                language: Some("eng".to_string()),
                confidence,
                warnings: vec![],
                duration: Duration::from_millis(40),
            },
        }
    }

    pub fn warning(mut self, warning: &str) -> Self {
        self.result.warnings.push(warning.to_string());
        self
    }

    pub fn build(self) -> ExtractionResult {
        self.result
    }
}

/// Builder for model output.
pub struct FieldsBuilder {
    fields: ReceiptFields,
}

impl FieldsBuilder {
    /// A complete, valid receipt.
    pub fn costco() -> Self {
        Self {
            fields: ReceiptFields {
                merchant_name: "Costco Wholesale".to_string(),
                tx_date: "2024-07-21".to_string(),
                subtotal: Some("40.00".to_string()),
                tax: Some("2.50".to_string()),
                total: "42.50".to_string(),
                currency_code: "USD".to_string(),
                category: "Office Supplies".to_string(),
                payment_method: Some("VISA".to_string()),
                payment_last4: Some("4242".to_string()),
                description: Some("Printer paper and toner".to_string()),
                confidence: Some(0.92),
                ..ReceiptFields::default()
            },
        }
    }

    pub fn merchant(mut self, merchant: &str) -> Self {
        self.fields.merchant_name = merchant.to_string();
        self
    }

    pub fn category(mut self, category: &str) -> Self {
        self.fields.category = category.to_string();
        self
    }

    pub fn total(mut self, total: &str) -> Self {
        self.fields.total = total.to_string();
        self
    }

    pub fn confidence(mut self, confidence: Option<f32>) -> Self {
        self.fields.confidence = confidence;
        self
    }

    pub fn build(self) -> ReceiptFields {
        self.fields
    }
}
