//! Field extraction through an OpenAI-compatible chat completions API.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::config::LlmConfig;
use crate::error::FieldError;
use crate::sanitize::excerpt_bytes;
use crate::secrets::resolve_api_key;

use super::attach::{attachable_image, load_attachment, ImageAttachment};
use super::prompt::{system_prompt, user_prompt};
use super::sanitize::sanitize;
use super::schema::ReceiptSchema;
use super::{ExtractRequest, ExtractedFields, FieldExtractor, ModelInfo, ReceiptFields};

const ERROR_BODY_EXCERPT_CHARS: usize = 2000;

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    temperature: f32,
    response_format: ResponseFormat,
    messages: Vec<Message>,
}

#[derive(Debug, Serialize)]
struct ResponseFormat {
    r#type: &'static str,
}

#[derive(Debug, Serialize)]
struct Message {
    role: &'static str,
    content: MessageContent,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
enum MessageContent {
    Text(String),
    Parts(Vec<ContentPart>),
}

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ContentPart {
    Text { text: String },
    ImageUrl { image_url: ImageUrl },
}

#[derive(Debug, Serialize)]
struct ImageUrl {
    url: String,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    #[serde(default)]
    content: Option<String>,
}

/// `FieldExtractor` backed by `POST {base_url}/chat/completions`.
pub struct OpenAiExtractor {
    client: reqwest::Client,
    endpoint: String,
    api_key: SecretString,
    config: LlmConfig,
}

impl OpenAiExtractor {
    /// Builds an extractor, resolving the API key from the configured file or env var.
    pub fn new(config: LlmConfig) -> Result<Self, FieldError> {
        let api_key = resolve_api_key(&config)?;
        Self::with_api_key(config, api_key)
    }

    pub fn with_api_key(config: LlmConfig, api_key: SecretString) -> Result<Self, FieldError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self::with_client(config, api_key, client))
    }

    /// Uses a caller-built HTTP client; its timeout and proxy settings apply as-is.
    pub fn with_client(config: LlmConfig, api_key: SecretString, client: reqwest::Client) -> Self {
        let endpoint = format!("{}/chat/completions", config.base_url.trim_end_matches('/'));
        Self {
            client,
            endpoint,
            api_key,
            config,
        }
    }

    async fn attachment(&self, request: &ExtractRequest, req_id: &str) -> Option<ImageAttachment> {
        let path = attachable_image(request, self.config.vision, self.config.max_image_bytes())?;
        match load_attachment(&path).await {
            Ok(attachment) => Some(attachment),
            Err(e) => {
                warn!(req_id, error = %e, "image attach failed, sending text only");
                None
            }
        }
    }

    fn build_body<'a>(
        &'a self,
        request: &ExtractRequest,
        schema: &ReceiptSchema,
        attachment: Option<&ImageAttachment>,
    ) -> ChatRequest<'a> {
        let user_text = user_prompt(request, attachment.is_some());
        let user_content = match attachment {
            Some(image) => MessageContent::Parts(vec![
                ContentPart::Text { text: user_text },
                ContentPart::ImageUrl {
                    image_url: ImageUrl {
                        url: image.data_url.clone(),
                    },
                },
            ]),
            None => MessageContent::Text(user_text),
        };

        ChatRequest {
            model: &self.config.model,
            temperature: self.config.temperature,
            response_format: ResponseFormat {
                r#type: "json_object",
            },
            messages: vec![
                Message {
                    role: "system",
                    content: MessageContent::Text(system_prompt(request)),
                },
                Message {
                    role: "system",
                    content: MessageContent::Text(format!(
                        "JSON Schema:\n{}",
                        serde_json::to_string_pretty(schema.as_value()).unwrap_or_default()
                    )),
                },
                Message {
                    role: "user",
                    content: user_content,
                },
            ],
        }
    }
}

#[async_trait]
impl FieldExtractor for OpenAiExtractor {
    async fn extract_fields(&self, request: &ExtractRequest) -> Result<ExtractedFields, FieldError> {
        let req_id = Uuid::new_v4().to_string();
        let started = Instant::now();
        let elapsed_ms = || started.elapsed().as_millis() as u64;

        let schema = ReceiptSchema::new(&request.allowed_categories)?;
        let attachment = self.attachment(request, &req_id).await;
        info!(
            req_id = %req_id,
            model = %self.config.model,
            text_len = request.ocr_text.len(),
            ocr_confidence = request.ocr_confidence,
            attach = attachment.is_some(),
            mime = attachment.as_ref().map_or("", |a| a.mime.as_str()),
            "field extraction started"
        );

        let body = self.build_body(request, &schema, attachment.as_ref());
        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(self.api_key.expose_secret())
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                error!(req_id = %req_id, elapsed_ms = elapsed_ms(), error = %e, "inference request failed");
                FieldError::Transport(e)
            })?;

        let status = response.status();
        let raw = response.bytes().await?.to_vec();
        if !status.is_success() {
            error!(req_id = %req_id, status = status.as_u16(), elapsed_ms = elapsed_ms(), "inference API error");
            return Err(FieldError::Status {
                status: status.as_u16(),
                body: excerpt_bytes(&raw, ERROR_BODY_EXCERPT_CHARS),
            });
        }

        let content = message_content(&raw).inspect_err(|e| {
            error!(req_id = %req_id, raw_bytes = raw.len(), elapsed_ms = elapsed_ms(), error = %e, "undecodable inference response");
        })?;

        let extracted = validate_content(
            &content,
            &schema,
            self.config.lenient,
            &request.allowed_categories,
        )
        .inspect_err(|e| {
            error!(req_id = %req_id, elapsed_ms = elapsed_ms(), error = %e, "model output rejected");
        })?;

        info!(
            req_id = %req_id,
            category = %extracted.fields.category,
            currency = %extracted.fields.currency_code,
            elapsed_ms = elapsed_ms(),
            "field extraction finished"
        );
        Ok(extracted)
    }

    fn model_info(&self) -> ModelInfo {
        ModelInfo {
            name: self.config.model.clone(),
            params: json!({
                "temperature": self.config.temperature,
                "lenient": self.config.lenient,
                "vision": self.config.vision,
            }),
        }
    }
}

/// Pulls `choices[0].message.content` out of a chat completion body.
pub(crate) fn message_content(raw: &[u8]) -> Result<String, FieldError> {
    let response: ChatResponse = serde_json::from_slice(raw).map_err(|e| FieldError::Decode {
        message: e.to_string(),
        raw: raw.to_vec(),
    })?;
    let choice = response
        .choices
        .into_iter()
        .next()
        .ok_or_else(|| FieldError::NoChoices { raw: raw.to_vec() })?;
    let content = choice.message.content.ok_or_else(|| FieldError::Decode {
        message: "message content is missing".to_string(),
        raw: raw.to_vec(),
    })?;
    Ok(strip_code_fences(&content).to_string())
}

/// Removes a surrounding Markdown code fence, with or without a language tag.
pub(crate) fn strip_code_fences(content: &str) -> &str {
    let trimmed = content.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let body = match rest.find('\n') {
        Some(newline) => &rest[newline + 1..],
        None => rest,
    };
    body.trim_end().strip_suffix("```").unwrap_or(body).trim()
}

/// Validates model output, applying the lenient repair when enabled.
pub(crate) fn validate_content(
    content: &str,
    schema: &ReceiptSchema,
    lenient: bool,
    allowed_categories: &[String],
) -> Result<ExtractedFields, FieldError> {
    let raw = content.as_bytes().to_vec();
    let doc: Value = serde_json::from_str(content).map_err(|e| FieldError::Decode {
        message: format!("model output is not JSON: {}", e),
        raw: raw.clone(),
    })?;

    let (doc, raw_json) = match schema.validate(&doc) {
        Ok(()) => (doc, raw),
        Err(errors) if !lenient => return Err(FieldError::SchemaValidation { errors, raw }),
        Err(errors) => {
            debug!(errors = %errors, "strict validation failed, sanitizing");
            let (clean, notes) = sanitize(doc, allowed_categories);
            if let Err(errors) = schema.validate(&clean) {
                return Err(FieldError::SchemaValidation { errors, raw });
            }
            warn!(changes = ?notes, "lenient sanitize applied to model output");
            let bytes = serde_json::to_vec(&clean).map_err(|e| FieldError::Decode {
                message: e.to_string(),
                raw: raw.clone(),
            })?;
            (clean, bytes)
        }
    };

    let fields: ReceiptFields =
        serde_json::from_value(doc).map_err(|e| FieldError::Decode {
            message: e.to_string(),
            raw: raw_json.clone(),
        })?;
    Ok(ExtractedFields { fields, raw_json })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::category::all_labels;

    fn schema() -> ReceiptSchema {
        ReceiptSchema::new(&all_labels()).unwrap()
    }

    fn completion(content: &str) -> Vec<u8> {
        serde_json::to_vec(&json!({
            "id": "chatcmpl-1",
            "choices": [{ "index": 0, "message": { "role": "assistant", "content": content } }]
        }))
        .unwrap()
    }

    const VALID: &str = r#"{"merchant_name":"Costco","tx_date":"2024-07-21","total":"12.50","currency_code":"USD","category":"Meals","confidence":0.92}"#;

    #[test]
    fn test_message_content_extracts_first_choice() {
        assert_eq!(message_content(&completion(VALID)).unwrap(), VALID);
    }

    #[test]
    fn test_message_content_errors_keep_raw() {
        let err = message_content(b"<html>oops</html>").unwrap_err();
        assert_eq!(err.raw_output(), Some(&b"<html>oops</html>"[..]));

        let raw = br#"{"choices":[]}"#;
        let err = message_content(raw).unwrap_err();
        assert!(matches!(err, FieldError::NoChoices { .. }));
        assert_eq!(err.raw_output(), Some(&raw[..]));
    }

    #[test]
    fn test_strip_code_fences() {
        assert_eq!(strip_code_fences("```json\n{\"a\":1}\n```"), "{\"a\":1}");
        assert_eq!(strip_code_fences("```\n{}\n```  "), "{}");
        assert_eq!(strip_code_fences("  {\"a\":1} "), "{\"a\":1}");
    }

    #[test]
    fn test_valid_content_decodes() {
        let extracted = validate_content(VALID, &schema(), true, &all_labels()).unwrap();
        assert_eq!(extracted.fields.merchant_name, "Costco");
        assert_eq!(extracted.fields.total, "12.50");
        assert_eq!(extracted.fields.confidence, Some(0.92));
        assert_eq!(extracted.raw_json, VALID.as_bytes());
    }

    #[test]
    fn test_lenient_repairs_and_returns_sanitized_json() {
        let content = r#"{"merchant_name":"UPS","tx_date":"05/01/2024","total":25,"currency_code":"usd","category":"Shipping Expenses","shipping_fee":5.0,"note":"x"}"#;
        let extracted = validate_content(content, &schema(), true, &all_labels()).unwrap();
        assert_eq!(extracted.fields.other_fees.as_deref(), Some("5.00"));
        assert_eq!(extracted.fields.tx_date, "2024-05-01");
        assert_eq!(extracted.fields.currency_code, "USD");

        let raw: Value = serde_json::from_slice(&extracted.raw_json).unwrap();
        assert!(raw.get("note").is_none());
        assert_eq!(raw["total"], json!("25.00"));
    }

    #[test]
    fn test_strict_mode_rejects_invalid() {
        let content = r#"{"merchant_name":"UPS","tx_date":"2024-05-01","total":25,"currency_code":"USD","category":"Other"}"#;
        let err = validate_content(content, &schema(), false, &all_labels()).unwrap_err();
        match err {
            FieldError::SchemaValidation { raw, .. } => assert_eq!(raw, content.as_bytes()),
            other => panic!("Expected SchemaValidation, got {:?}", other),
        }
    }

    #[test]
    fn test_unrepairable_output_fails_with_raw() {
        let content = r#"{"merchant_name":"UPS","total":"25.00","currency_code":"USD","category":"Other"}"#;
        let err = validate_content(content, &schema(), true, &all_labels()).unwrap_err();
        assert!(matches!(err, FieldError::SchemaValidation { .. }));
        assert_eq!(err.raw_output(), Some(content.as_bytes()));
    }

    #[test]
    fn test_non_json_content_is_decode_error() {
        let err = validate_content("Sorry, I can't read this.", &schema(), true, &[]).unwrap_err();
        assert!(matches!(err, FieldError::Decode { .. }));
    }

    #[test]
    fn test_request_body_layout() {
        let extractor =
            OpenAiExtractor::with_api_key(LlmConfig::default(), SecretString::from("sk-test".to_string())).unwrap();
        let request = ExtractRequest {
            ocr_text: "TOTAL 1.00".to_string(),
            ..ExtractRequest::default()
        };
        let schema = schema();
        let body = serde_json::to_value(extractor.build_body(&request, &schema, None)).unwrap();

        assert_eq!(body["model"], json!("gpt-4o-mini"));
        assert_eq!(body["response_format"], json!({ "type": "json_object" }));
        let messages = body["messages"].as_array().unwrap();
        assert_eq!(messages.len(), 3);
        assert_eq!(messages[0]["role"], json!("system"));
        assert!(messages[1]["content"].as_str().unwrap().starts_with("JSON Schema:\n{"));
        assert_eq!(messages[2]["role"], json!("user"));
        assert!(messages[2]["content"].as_str().unwrap().ends_with("TOTAL 1.00"));
    }

    #[test]
    fn test_request_body_with_image_is_multipart() {
        let extractor =
            OpenAiExtractor::with_api_key(LlmConfig::default(), SecretString::from("sk-test".to_string())).unwrap();
        let attachment = ImageAttachment {
            path: "/tmp/r.png".into(),
            mime: "image/png".to_string(),
            data_url: "data:image/png;base64,YWJj".to_string(),
        };
        let schema = schema();
        let body = serde_json::to_value(extractor.build_body(
            &ExtractRequest::default(),
            &schema,
            Some(&attachment),
        ))
        .unwrap();

        let parts = body["messages"][2]["content"].as_array().unwrap();
        assert_eq!(parts[0]["type"], json!("text"));
        assert_eq!(parts[1]["type"], json!("image_url"));
        assert_eq!(parts[1]["image_url"]["url"], json!("data:image/png;base64,YWJj"));
    }

    #[test]
    fn test_endpoint_trims_trailing_slash() {
        let config = LlmConfig {
            base_url: "http://localhost:8080/v1/".to_string(),
            ..LlmConfig::default()
        };
        let extractor = OpenAiExtractor::with_api_key(config, SecretString::from("k".to_string())).unwrap();
        assert_eq!(extractor.endpoint, "http://localhost:8080/v1/chat/completions");
    }
}
