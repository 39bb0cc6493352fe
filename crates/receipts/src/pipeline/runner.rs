use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde_json::{json, Value};
use tracing::{error, info, info_span, warn, Instrument};

use crate::category;
use crate::config::Config;
use crate::db::job_repo::{self, OcrSuccess, ParseSuccess};
use crate::db::receipt_repo::{self, NewReceipt};
use crate::db::Database;
use crate::error::{FieldError, ProcessError, StageError};
use crate::extract::{
    ExtractInput, ExtractionResult, FileFormat, OcrExtractor, TextExtractor,
    IMAGE_CONFIDENCE_THRESHOLD,
};
use crate::fields::{
    ExtractRequest, ExtractedFields, FieldExtractor, OpenAiExtractor, ProfileContext,
    ReceiptFields,
};
use crate::sanitize;

use super::config::PipelineConfig;
use super::lookup::{FileLookup, FileRecord, ProfileLookup};
use super::status::Stage;

/// Runs one extraction attempt per call: OCR, field extraction, then the
/// receipt upsert, recording every step on a fresh job row.
pub struct Pipeline {
    config: Arc<PipelineConfig>,
    db: Database,
    files: Arc<dyn FileLookup>,
    profiles: Arc<dyn ProfileLookup>,
    text: Arc<dyn TextExtractor>,
    fields: Arc<dyn FieldExtractor>,
}

/// Review flags gathered while resolving the model output.
#[derive(Debug, Clone, PartialEq)]
struct Resolved {
    category: String,
    needs_review: bool,
}

impl Pipeline {
    /// Builds a pipeline that reads files and profiles from `db`.
    pub fn new(
        config: Arc<PipelineConfig>,
        db: Database,
        text: Arc<dyn TextExtractor>,
        fields: Arc<dyn FieldExtractor>,
    ) -> Self {
        let lookups = Arc::new(db.clone());
        Self {
            config,
            db,
            files: lookups.clone(),
            profiles: lookups,
            text,
            fields,
        }
    }

    /// Replaces the file and profile sources.
    pub fn with_lookups(
        mut self,
        files: Arc<dyn FileLookup>,
        profiles: Arc<dyn ProfileLookup>,
    ) -> Self {
        self.files = files;
        self.profiles = profiles;
        self
    }

    /// Production constructor: OCR tools and the chat-completions extractor
    /// from `config`.
    pub fn from_config(config: &Config, db: Database) -> Result<Self, FieldError> {
        let text = Arc::new(OcrExtractor::new(config.ocr.clone()));
        let fields = Arc::new(OpenAiExtractor::new(config.llm.clone())?);
        Ok(Self::new(
            Arc::new(PipelineConfig::from_config(config)),
            db,
            text,
            fields,
        ))
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Processes a stored file end to end and returns the job id.
    ///
    /// Every call creates a new job row and, on success, a new current
    /// receipt version. Stage failures are recorded on the job before
    /// being returned.
    pub async fn process_file(&self, file_id: &str) -> Result<String, ProcessError> {
        let (file, format) = self.resolve_file(file_id)?;
        let span = info_span!(
            "pipeline",
            file_id = %file.id,
            filename = %sanitize::redact_path(Path::new(&file.source_path)),
            format = %format,
        );

        async {
            let job = job_repo::start(&self.db, &file.id, &file.profile_id, format)?;
            info!(job_id = %job.id, "extraction job started");

            let (_, ocr_review) = self
                .ocr_stage(&job.id, &file, format)
                .instrument(info_span!("ocr", job_id = %job.id))
                .await?;

            let receipt_id = self
                .parse_stage(&job.id, &file, ocr_review)
                .instrument(info_span!("parse", job_id = %job.id))
                .await?;

            info!(job_id = %job.id, receipt_id = %receipt_id, "extraction job complete");
            Ok::<_, ProcessError>(job.id)
        }
        .instrument(span)
        .await
    }

    /// Runs and persists only the OCR stage; the job stays in `OCR_COMPLETE`.
    pub async fn run_ocr_only(
        &self,
        file_id: &str,
    ) -> Result<(String, ExtractionResult), ProcessError> {
        let (file, format) = self.resolve_file(file_id)?;
        let span = info_span!(
            "ocr_only",
            file_id = %file.id,
            filename = %sanitize::redact_path(Path::new(&file.source_path)),
        );

        async {
            let job = job_repo::start(&self.db, &file.id, &file.profile_id, format)?;
            let (result, _) = self.ocr_stage(&job.id, &file, format).await?;
            Ok::<_, ProcessError>((job.id, result))
        }
        .instrument(span)
        .await
    }

    fn resolve_file(&self, file_id: &str) -> Result<(FileRecord, FileFormat), ProcessError> {
        let file = self
            .files
            .get_file(file_id)?
            .ok_or_else(|| ProcessError::FileNotFound(file_id.to_string()))?;
        let format = FileFormat::from_extension(&file.file_ext)
            .ok_or_else(|| ProcessError::UnsupportedFormat(file.file_ext.clone()))?;
        Ok((file, format))
    }

    fn extract_input(&self, file: &FileRecord) -> ExtractInput {
        let input = ExtractInput::new(&file.source_path).with_extension(&file.file_ext);
        match &self.config.artifact_cache_dir {
            Some(dir) if !file.content_hash.is_empty() => {
                input.with_cache(file.content_hash_hex(), dir.clone())
            }
            _ => input,
        }
    }

    /// Returns the extraction result and whether OCR already flagged the job.
    async fn ocr_stage(
        &self,
        job_id: &str,
        file: &FileRecord,
        format: FileFormat,
    ) -> Result<(ExtractionResult, bool), ProcessError> {
        let result = match self.text.extract(&self.extract_input(file)).await {
            Ok(result) => result,
            Err(e) => {
                let message = e.to_string();
                error!(error = %message, "text extraction failed");
                if let Err(db_err) = job_repo::finish_ocr_failure(&self.db, job_id, &message) {
                    error!(error = %db_err, "failed to record OCR failure");
                }
                return Err(stage_error(job_id, Stage::Ocr, e.into()));
            }
        };

        let needs_review = format == FileFormat::Image
            && result.confidence > 0.0
            && result.confidence < IMAGE_CONFIDENCE_THRESHOLD;
        if needs_review {
            warn!(confidence = result.confidence, "low image OCR confidence, flagged for review");
        }
        for warning in &result.warnings {
            warn!(warning = %warning, "extraction warning");
        }

        let outcome = OcrSuccess {
            text: result.text.clone(),
            confidence: result.confidence,
            needs_review,
            method: result.method.as_str().to_string(),
            params: json!({
                "language": result.language,
                "pages": result.pages,
                "warnings": result.warnings,
                "duration_ms": result.duration.as_millis() as u64,
            }),
        };
        if let Err(e) = job_repo::finish_ocr_success(&self.db, job_id, &outcome) {
            error!(error = %e, "failed to persist OCR result");
            if let Err(db_err) = job_repo::finish_ocr_failure(&self.db, job_id, &e.to_string()) {
                error!(error = %db_err, "failed to record OCR failure");
            }
            return Err(stage_error(job_id, Stage::Ocr, e.into()));
        }

        info!(
            method = %result.method,
            pages = result.pages,
            confidence = result.confidence,
            chars = result.text.len(),
            "OCR stage complete"
        );
        Ok((result, needs_review))
    }

    async fn parse_stage(
        &self,
        job_id: &str,
        file: &FileRecord,
        ocr_review: bool,
    ) -> Result<String, ProcessError> {
        match self.parse_and_store(job_id, file, ocr_review).await {
            Ok(receipt_id) => Ok(receipt_id),
            Err((source, raw)) => {
                let message = source.to_string();
                error!(error = %message, "parse stage failed");
                if let Err(db_err) =
                    job_repo::finish_parse_failure(&self.db, job_id, &message, raw.as_deref())
                {
                    error!(error = %db_err, "failed to record parse failure");
                }
                Err(stage_error(job_id, Stage::Parse, source))
            }
        }
    }

    /// On failure, also returns whatever model output should be kept on the job.
    async fn parse_and_store(
        &self,
        job_id: &str,
        file: &FileRecord,
        ocr_review: bool,
    ) -> Result<String, (StageError, Option<Vec<u8>>)> {
        let request = self.build_request(job_id, file).map_err(|e| (e, None))?;

        let extracted = match self.fields.extract_fields(&request).await {
            Ok(extracted) => extracted,
            Err(e) => {
                let raw = e.raw_output().map(<[u8]>::to_vec);
                return Err((e.into(), raw));
            }
        };
        let ExtractedFields { fields, raw_json } = extracted;

        let resolved = resolve_fields(&fields, ocr_review, self.config.min_confidence);
        let keep_raw = |e: crate::db::DatabaseError| (StageError::from(e), Some(raw_json.clone()));

        let receipt = receipt_repo::upsert(
            &self.db,
            &new_receipt(file, &fields, &resolved.category, &request.default_currency),
        )
        .map_err(keep_raw)?
        .receipt;

        let model = self.fields.model_info();
        let mut model_params = model.params;
        if let (Value::Object(map), Some(confidence)) = (&mut model_params, fields.confidence) {
            map.insert("model_confidence".to_string(), json!(confidence));
        }
        let outcome = ParseSuccess {
            needs_review: resolved.needs_review,
            extracted_json: raw_json.clone(),
            model_name: model.name,
            model_params,
        };
        job_repo::complete_parse(&self.db, job_id, &receipt.id, &outcome).map_err(keep_raw)?;

        info!(
            receipt_id = %receipt.id,
            category = %resolved.category,
            needs_review = resolved.needs_review,
            confidence = ?fields.confidence,
            "receipt stored"
        );
        Ok(receipt.id)
    }

    fn build_request(&self, job_id: &str, file: &FileRecord) -> Result<ExtractRequest, StageError> {
        let job = job_repo::find_by_id(&self.db, job_id)?.ok_or_else(|| {
            StageError::Persistence(crate::db::DatabaseError::NotFound {
                entity: "extract job",
                id: job_id.to_string(),
            })
        })?;
        let profile = self
            .profiles
            .get_profile(&file.profile_id)?
            .ok_or_else(|| StageError::ProfileNotFound(file.profile_id.clone()))?;

        let source = Path::new(&file.source_path);
        Ok(ExtractRequest {
            ocr_text: job.ocr_text.unwrap_or_default(),
            filename_hint: sanitize::redact_path(source),
            folder_hint: source
                .parent()
                .map(|p| p.display().to_string())
                .unwrap_or_default(),
            allowed_categories: self.config.allowed_categories(),
            default_currency: profile.default_currency,
            timezone: self.config.timezone.clone(),
            ocr_confidence: job.extraction_confidence.unwrap_or(0.0),
            file_path: Some(source.to_path_buf()),
            content_hash_hex: (!file.content_hash.is_empty()).then(|| file.content_hash_hex()),
            artifact_cache_dir: self.config.artifact_cache_dir.clone(),
            profile: ProfileContext {
                name: profile.name,
                job_title: profile.job_title.unwrap_or_default(),
                job_description: profile.job_description.unwrap_or_default(),
            },
        })
    }
}

fn stage_error(job_id: &str, stage: Stage, source: StageError) -> ProcessError {
    ProcessError::Stage {
        job_id: job_id.to_string(),
        stage,
        source,
    }
}

/// Canonical category plus the combined review flag.
fn resolve_fields(fields: &ReceiptFields, ocr_review: bool, min_confidence: f32) -> Resolved {
    let mut needs_review = ocr_review;

    let resolution = category::resolve(&fields.category);
    if !resolution.matched {
        warn!(label = %fields.category, "unknown category, using Other");
        needs_review = true;
    }

    if fields.merchant_name.trim().is_empty()
        || NaiveDate::parse_from_str(fields.tx_date.trim(), "%Y-%m-%d").is_err()
        || Decimal::from_str(fields.total.trim()).is_err()
    {
        needs_review = true;
    }

    if let Some(confidence) = fields.confidence {
        if confidence > 0.0 && confidence < min_confidence {
            needs_review = true;
        }
    }

    Resolved {
        category: resolution.category.as_str().to_string(),
        needs_review,
    }
}

fn new_receipt(
    file: &FileRecord,
    fields: &ReceiptFields,
    category: &str,
    default_currency: &str,
) -> NewReceipt {
    let currency = match fields.currency_code.trim() {
        "" => default_currency.to_string(),
        code => code.to_string(),
    };
    NewReceipt {
        profile_id: file.profile_id.clone(),
        file_id: Some(file.id.clone()),
        file_path: Some(file.source_path.clone()),
        merchant_name: fields.merchant_name.clone(),
        tx_date: fields.tx_date.clone(),
        subtotal: fields.subtotal.clone(),
        discount: fields.discount.clone(),
        other_fees: fields.other_fees.clone(),
        tip: fields.tip.clone(),
        tax: fields.tax.clone(),
        total: fields.total.clone(),
        currency_code: currency,
        category: category.to_string(),
        payment_method: fields.payment_method.clone(),
        payment_last4: fields.payment_last4.clone(),
        description: fields.description.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fields() -> ReceiptFields {
        ReceiptFields {
            merchant_name: "Costco".to_string(),
            tx_date: "2024-07-21".to_string(),
            total: "42.50".to_string(),
            currency_code: "USD".to_string(),
            category: "Meals".to_string(),
            confidence: Some(0.9),
            ..ReceiptFields::default()
        }
    }

    #[test]
    fn test_clean_fields_need_no_review() {
        let resolved = resolve_fields(&fields(), false, 0.6);
        assert_eq!(
            resolved,
            Resolved {
                category: "Meals".to_string(),
                needs_review: false,
            }
        );
    }

    #[test]
    fn test_synonym_category_resolves_without_review() {
        let mut f = fields();
        f.category = "uber".to_string();
        let resolved = resolve_fields(&f, false, 0.6);
        assert_eq!(resolved.category, "Travel Expenses");
        assert!(!resolved.needs_review);
    }

    #[test]
    fn test_unknown_category_falls_back_to_other() {
        let mut f = fields();
        f.category = "Gardening".to_string();
        let resolved = resolve_fields(&f, false, 0.6);
        assert_eq!(resolved.category, "Other");
        assert!(resolved.needs_review);
    }

    #[test]
    fn test_missing_or_invalid_core_fields_flag_review() {
        let mut empty_merchant = fields();
        empty_merchant.merchant_name = " ".to_string();
        assert!(resolve_fields(&empty_merchant, false, 0.6).needs_review);

        let mut bad_date = fields();
        bad_date.tx_date = "21/07/2024".to_string();
        assert!(resolve_fields(&bad_date, false, 0.6).needs_review);

        let mut bad_total = fields();
        bad_total.total = String::new();
        assert!(resolve_fields(&bad_total, false, 0.6).needs_review);
    }

    #[test]
    fn test_low_model_confidence_flags_review() {
        let mut f = fields();
        f.confidence = Some(0.4);
        assert!(resolve_fields(&f, false, 0.6).needs_review);
        assert!(!resolve_fields(&f, false, 0.3).needs_review);

        f.confidence = Some(0.0);
        assert!(!resolve_fields(&f, false, 0.6).needs_review);
    }

    #[test]
    fn test_ocr_flag_is_kept() {
        assert!(resolve_fields(&fields(), true, 0.6).needs_review);
    }

    #[test]
    fn test_new_receipt_falls_back_to_profile_currency() {
        let file = FileRecord {
            id: "f1".to_string(),
            profile_id: "p1".to_string(),
            source_path: "/in/a.pdf".to_string(),
            file_ext: "pdf".to_string(),
            content_hash: vec![1],
        };
        let mut f = fields();
        f.currency_code = String::new();
        let receipt = new_receipt(&file, &f, "Meals", "CAD");
        assert_eq!(receipt.currency_code, "CAD");
        assert_eq!(receipt.file_id.as_deref(), Some("f1"));
        assert_eq!(receipt.category, "Meals");
    }
}
