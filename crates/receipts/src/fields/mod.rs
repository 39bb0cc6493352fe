//! Structured field extraction from OCR text with a language model.

pub mod attach;
pub mod openai;
pub mod prompt;
pub mod sanitize;
pub mod schema;

use std::path::PathBuf;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::FieldError;

pub use attach::attachable_image;
pub use openai::OpenAiExtractor;
pub use schema::{build_schema, ReceiptSchema};

/// Receipt fields as returned by the model. Money values are decimal strings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReceiptFields {
    #[serde(default)]
    pub merchant_name: String,
    #[serde(default)]
    pub tx_date: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subtotal: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub discount: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub other_fees: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tip: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tax: Option<String>,
    #[serde(default)]
    pub total: String,
    #[serde(default)]
    pub currency_code: String,
    #[serde(default)]
    pub category: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payment_method: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payment_last4: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Model self-reported confidence in 0..1.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f32>,
}

/// Business context of the profile a receipt is filed under.
#[derive(Debug, Clone, Default)]
pub struct ProfileContext {
    pub name: String,
    pub job_title: String,
    pub job_description: String,
}

#[derive(Debug, Clone, Default)]
pub struct ExtractRequest {
    pub ocr_text: String,
    pub filename_hint: String,
    pub folder_hint: String,
    /// Empty leaves `category` unconstrained.
    pub allowed_categories: Vec<String>,
    pub default_currency: String,
    pub timezone: Option<String>,
    pub ocr_confidence: f32,
    pub file_path: Option<PathBuf>,
    pub content_hash_hex: Option<String>,
    pub artifact_cache_dir: Option<PathBuf>,
    pub profile: ProfileContext,
}

#[derive(Debug, Clone)]
pub struct ExtractedFields {
    pub fields: ReceiptFields,
    /// The JSON the fields were decoded from, after any lenient repair.
    pub raw_json: Vec<u8>,
}

/// Model identity recorded on job rows.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelInfo {
    pub name: String,
    pub params: serde_json::Value,
}

#[async_trait]
pub trait FieldExtractor: Send + Sync {
    async fn extract_fields(&self, request: &ExtractRequest) -> Result<ExtractedFields, FieldError>;

    fn model_info(&self) -> ModelInfo;
}
