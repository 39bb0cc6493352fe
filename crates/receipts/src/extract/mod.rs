//! Text extraction from receipt files.
//!
//! PDFs use their text layer when it has one and are rasterized and OCR'd
//! otherwise. Images go straight to `tesseract`, HEIC photos after a PNG
//! conversion. Every result is normalized and carries a confidence in 0..1.

pub mod confidence;
pub mod format;
pub mod heic;
pub mod image;
pub mod normalize;
pub mod pdf;
pub mod runner;
pub mod text;

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde::Serialize;
use tracing::{debug, warn};

use crate::config::OcrConfig;
use crate::error::ExtractError;

pub use confidence::{blend, heuristic_confidence, IMAGE_CONFIDENCE_THRESHOLD};
pub use format::{is_heic_extension, normalize_extension, FileFormat};
pub use heic::{cached_png_path, ConvertedImage, HeicCache, HeicConverterTool};
pub use normalize::normalize;
pub use runner::{CommandOutput, CommandRunner, TokioRunner};

use self::image::TesseractOcr;
use self::pdf::PdfExtractor;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ExtractionMethod {
    PdfText,
    PdfOcr,
    ImageOcr,
    #[serde(rename = "text")]
    PlainText,
}

impl ExtractionMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PdfText => "pdf-text",
            Self::PdfOcr => "pdf-ocr",
            Self::ImageOcr => "image-ocr",
            Self::PlainText => "text",
        }
    }
}

impl fmt::Display for ExtractionMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of a successful extraction.
#[derive(Debug, Clone)]
pub struct ExtractionResult {
    pub text: String,
    pub pages: usize,
    pub source_type: FileFormat,
    pub method: ExtractionMethod,
    /// OCR language, when an OCR engine ran.
    pub language: Option<String>,
    pub confidence: f32,
    pub warnings: Vec<String>,
    pub duration: Duration,
}

/// What to extract, plus the HEIC cache coordinates for that file.
#[derive(Debug, Clone, Default)]
pub struct ExtractInput {
    pub path: PathBuf,
    /// Extension recorded at ingestion; overrides the one on `path`.
    pub extension: Option<String>,
    pub content_hash_hex: Option<String>,
    pub artifact_cache_dir: Option<PathBuf>,
}

impl ExtractInput {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            ..Self::default()
        }
    }

    pub fn with_extension(mut self, ext: &str) -> Self {
        self.extension = Some(normalize_extension(ext));
        self
    }

    /// Normalized extension that selects the strategy.
    pub fn effective_extension(&self) -> String {
        match &self.extension {
            Some(ext) => ext.clone(),
            None => self
                .path
                .extension()
                .and_then(|e| e.to_str())
                .map(normalize_extension)
                .unwrap_or_default(),
        }
    }

    pub fn with_cache(mut self, content_hash_hex: impl Into<String>, dir: impl Into<PathBuf>) -> Self {
        self.content_hash_hex = Some(content_hash_hex.into());
        self.artifact_cache_dir = Some(dir.into());
        self
    }

    fn heic_cache(&self) -> Option<HeicCache<'_>> {
        Some(HeicCache {
            dir: self.artifact_cache_dir.as_deref()?,
            content_hash_hex: self.content_hash_hex.as_deref()?,
        })
    }
}

/// Turns a receipt file into normalized text.
#[async_trait]
pub trait TextExtractor: Send + Sync {
    async fn extract(&self, input: &ExtractInput) -> Result<ExtractionResult, ExtractError>;
}

/// Per-strategy output before the dispatcher stamps format, language and timing.
#[derive(Debug, Clone)]
pub struct Extracted {
    pub text: String,
    pub pages: usize,
    pub method: ExtractionMethod,
    pub confidence: f32,
    pub warnings: Vec<String>,
}

/// Production extractor built on poppler-utils, tesseract and a HEIC converter.
#[derive(Clone)]
pub struct OcrExtractor {
    config: Arc<OcrConfig>,
    ocr: TesseractOcr,
    pdf: PdfExtractor,
    heic: HeicConverterTool,
}

impl OcrExtractor {
    pub fn new(config: OcrConfig) -> Self {
        Self::with_runner(config, Arc::new(TokioRunner))
    }

    pub fn with_runner(config: OcrConfig, runner: Arc<dyn CommandRunner>) -> Self {
        let config = Arc::new(config);
        let ocr = TesseractOcr::new(config.clone(), runner.clone());
        let pdf = PdfExtractor::new(config.clone(), runner.clone(), ocr.clone());
        let heic = HeicConverterTool::new(config.heic_converter, runner);
        Self {
            config,
            ocr,
            pdf,
            heic,
        }
    }

    async fn extract_image(&self, input: &ExtractInput, ext: &str) -> Result<Extracted, ExtractError> {
        if !is_heic_extension(ext) {
            return self.recognize(&input.path).await;
        }

        let converted = self.heic.convert(&input.path, input.heic_cache()).await?;
        let result = self.recognize(converted.path()).await;
        if let Err(e) = converted.cleanup() {
            warn!(error = %e, "failed to remove converted HEIC image");
        }
        result
    }

    async fn recognize(&self, image: &Path) -> Result<Extracted, ExtractError> {
        let page = self.ocr.recognize(image).await?;
        Ok(Extracted {
            text: page.text,
            pages: 1,
            method: ExtractionMethod::ImageOcr,
            confidence: page.confidence,
            warnings: page.warnings,
        })
    }
}

#[async_trait]
impl TextExtractor for OcrExtractor {
    async fn extract(&self, input: &ExtractInput) -> Result<ExtractionResult, ExtractError> {
        let started = Instant::now();
        let ext = input.effective_extension();
        let format = FileFormat::from_extension(&ext)
            .ok_or_else(|| ExtractError::UnsupportedFormat(ext.clone()))?;

        let extracted = match format {
            FileFormat::Pdf => self.pdf.extract(&input.path).await?,
            FileFormat::Image => self.extract_image(input, &ext).await?,
            FileFormat::Text => text::extract_text_file(&input.path).await?,
        };

        let language = match extracted.method {
            ExtractionMethod::PdfOcr | ExtractionMethod::ImageOcr => {
                Some(self.ocr.language().to_string())
            }
            ExtractionMethod::PdfText | ExtractionMethod::PlainText => None,
        };
        let duration = started.elapsed();
        debug!(
            method = %extracted.method,
            pages = extracted.pages,
            confidence = extracted.confidence,
            elapsed_ms = duration.as_millis() as u64,
            "text extracted"
        );

        Ok(ExtractionResult {
            text: extracted.text,
            pages: extracted.pages,
            source_type: format,
            method: extracted.method,
            language,
            confidence: extracted.confidence,
            warnings: extracted.warnings,
            duration,
        })
    }
}

impl fmt::Debug for OcrExtractor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OcrExtractor")
            .field("language", &self.config.language)
            .field("heic_converter", &self.config.heic_converter)
            .finish()
    }
}
