//! Scripted extractors standing in for tesseract and the inference API.

#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::json;

use receipts::fields::ModelInfo;
use receipts::{
    ExtractError, ExtractInput, ExtractRequest, ExtractedFields, ExtractionResult, FieldError,
    FieldExtractor, ReceiptFields, TextExtractor,
};

pub struct FakeTextExtractor {
    outcome: Result<ExtractionResult, String>,
    pub inputs: Mutex<Vec<ExtractInput>>,
}

impl FakeTextExtractor {
    pub fn returning(result: ExtractionResult) -> Arc<Self> {
        Arc::new(Self {
            outcome: Ok(result),
            inputs: Mutex::new(Vec::new()),
        })
    }

    /// Fails every call the way a crashing tesseract would.
    pub fn failing(stderr: &str) -> Arc<Self> {
        Arc::new(Self {
            outcome: Err(stderr.to_string()),
            inputs: Mutex::new(Vec::new()),
        })
    }

    pub fn calls(&self) -> usize {
        self.inputs.lock().unwrap().len()
    }
}

#[async_trait]
impl TextExtractor for FakeTextExtractor {
    async fn extract(&self, input: &ExtractInput) -> Result<ExtractionResult, ExtractError> {
        self.inputs.lock().unwrap().push(input.clone());
        match &self.outcome {
            Ok(result) => Ok(result.clone()),
            Err(stderr) => Err(ExtractError::ExternalTool {
                tool: "tesseract".to_string(),
                status: "exit status: 1".to_string(),
                stderr: stderr.clone(),
            }),
        }
    }
}

enum FieldOutcome {
    Fields(ReceiptFields),
    Invalid { errors: String, raw: Vec<u8> },
}

pub struct FakeFieldExtractor {
    outcome: FieldOutcome,
    pub requests: Mutex<Vec<ExtractRequest>>,
}

impl FakeFieldExtractor {
    pub fn returning(fields: ReceiptFields) -> Arc<Self> {
        Arc::new(Self {
            outcome: FieldOutcome::Fields(fields),
            requests: Mutex::new(Vec::new()),
        })
    }

    /// Fails schema validation, keeping `raw` as the model output.
    pub fn rejecting(errors: &str, raw: &[u8]) -> Arc<Self> {
        Arc::new(Self {
            outcome: FieldOutcome::Invalid {
                errors: errors.to_string(),
                raw: raw.to_vec(),
            },
            requests: Mutex::new(Vec::new()),
        })
    }

    pub fn last_request(&self) -> Option<ExtractRequest> {
        self.requests.lock().unwrap().last().cloned()
    }
}

#[async_trait]
impl FieldExtractor for FakeFieldExtractor {
    async fn extract_fields(&self, request: &ExtractRequest) -> Result<ExtractedFields, FieldError> {
        self.requests.lock().unwrap().push(request.clone());
        match &self.outcome {
            FieldOutcome::Fields(fields) => Ok(ExtractedFields {
                fields: fields.clone(),
                raw_json: serde_json::to_vec(fields).unwrap(),
            }),
            FieldOutcome::Invalid { errors, raw } => Err(FieldError::SchemaValidation {
                errors: errors.clone(),
                raw: raw.clone(),
            }),
        }
    }

    fn model_info(&self) -> ModelInfo {
        ModelInfo {
            name: "fake-model".to_string(),
            params: json!({ "temperature": 0.0 }),
        }
    }
}
