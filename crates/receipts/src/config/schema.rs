use std::path::PathBuf;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub version: String,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub ocr: OcrConfig,
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub pipeline: PipelineSettings,
    #[serde(default)]
    pub queue: QueueConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            version: "1.0".to_string(),
            database: DatabaseConfig::default(),
            ocr: OcrConfig::default(),
            llm: LlmConfig::default(),
            pipeline: PipelineSettings::default(),
            queue: QueueConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
}

impl DatabaseConfig {
    /// Configured path, or `~/.receipts/data/receipts.db`.
    pub fn resolved_path(&self) -> Option<PathBuf> {
        match &self.path {
            Some(p) => Some(PathBuf::from(p)),
            None => crate::db::default_database_path(),
        }
    }
}

/// External converter used to turn HEIC/HEIF photos into PNG.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum HeicConverter {
    HeifConvert,
    #[default]
    Magick,
    Sips,
}

impl HeicConverter {
    pub fn program(&self) -> &'static str {
        match self {
            Self::HeifConvert => "heif-convert",
            Self::Magick => "magick",
            Self::Sips => "sips",
        }
    }
}

impl FromStr for HeicConverter {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "heif-convert" => Ok(Self::HeifConvert),
            "magick" | "imagemagick" => Ok(Self::Magick),
            "sips" => Ok(Self::Sips),
            other => Err(format!("unknown HEIC converter '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OcrConfig {
    #[serde(default = "default_pdftotext")]
    pub pdftotext: String,
    #[serde(default = "default_pdftoppm")]
    pub pdftoppm: String,
    #[serde(default = "default_tesseract")]
    pub tesseract: String,
    #[serde(default = "default_language")]
    pub language: String,
    #[serde(default = "default_dpi")]
    pub dpi: u32,
    /// Upper bound on rasterized PDF pages sent to OCR; 0 means no limit.
    #[serde(default)]
    pub max_pages: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tessdata_dir: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub psm: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub oem: Option<u32>,
    #[serde(default = "default_true")]
    pub tsv_confidence: bool,
    #[serde(default)]
    pub heic_converter: HeicConverter,
}

fn default_pdftotext() -> String {
    "pdftotext".to_string()
}

fn default_pdftoppm() -> String {
    "pdftoppm".to_string()
}

fn default_tesseract() -> String {
    "tesseract".to_string()
}

fn default_language() -> String {
    "eng".to_string()
}

fn default_dpi() -> u32 {
    300
}

fn default_true() -> bool {
    true
}

impl Default for OcrConfig {
    fn default() -> Self {
        Self {
            pdftotext: default_pdftotext(),
            pdftoppm: default_pdftoppm(),
            tesseract: default_tesseract(),
            language: default_language(),
            dpi: default_dpi(),
            max_pages: 0,
            tessdata_dir: None,
            psm: None,
            oem: None,
            tsv_confidence: true,
            heic_converter: HeicConverter::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default)]
    pub temperature: f32,
    #[serde(default = "default_llm_timeout")]
    pub timeout_secs: u64,
    /// Attempt the sanitize-and-revalidate pass on schema failures.
    #[serde(default = "default_true")]
    pub lenient: bool,
    /// Allow attaching the source image for low-confidence photos.
    #[serde(default = "default_true")]
    pub vision: bool,
    #[serde(default = "default_max_image_mb")]
    pub max_image_mb: u64,
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key_file: Option<String>,
}

fn default_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_model() -> String {
    "gpt-4o-mini".to_string()
}

fn default_llm_timeout() -> u64 {
    45
}

fn default_max_image_mb() -> u64 {
    10
}

fn default_api_key_env() -> String {
    "OPENAI_API_KEY".to_string()
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            model: default_model(),
            temperature: 0.0,
            timeout_secs: default_llm_timeout(),
            lenient: true,
            vision: true,
            max_image_mb: default_max_image_mb(),
            api_key_env: default_api_key_env(),
            api_key_file: None,
        }
    }
}

impl LlmConfig {
    pub fn max_image_bytes(&self) -> u64 {
        self.max_image_mb.saturating_mul(1024 * 1024)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineSettings {
    /// Model confidence below this flags the receipt for review.
    #[serde(default = "default_min_confidence")]
    pub min_confidence: f32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub artifact_cache_dir: Option<String>,
    /// Pass the category taxonomy to the model as a schema enum.
    #[serde(default = "default_true")]
    pub constrain_categories: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timezone: Option<String>,
}

fn default_min_confidence() -> f32 {
    0.60
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            min_confidence: default_min_confidence(),
            artifact_cache_dir: None,
            constrain_categories: true,
            timezone: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueConfig {
    #[serde(default = "default_workers")]
    pub workers: usize,
    #[serde(default = "default_capacity")]
    pub capacity: usize,
    #[serde(default = "default_job_timeout")]
    pub job_timeout_secs: u64,
}

fn default_workers() -> usize {
    num_cpus::get().clamp(4, 6)
}

fn default_capacity() -> usize {
    256
}

fn default_job_timeout() -> u64 {
    180
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            workers: default_workers(),
            capacity: default_capacity(),
            job_timeout_secs: default_job_timeout(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_level")]
    pub level: String,
    #[serde(default)]
    pub json: bool,
}

fn default_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_level(),
            json: false,
        }
    }
}
