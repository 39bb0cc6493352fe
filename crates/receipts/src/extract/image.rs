use std::path::Path;
use std::sync::Arc;

use tracing::{debug, warn};

use crate::config::OcrConfig;
use crate::error::ExtractError;

use super::confidence::{blend, heuristic_confidence, tsv_mean_confidence};
use super::normalize::normalize;
use super::runner::CommandRunner;

/// OCR output for one image or rasterized page.
#[derive(Debug, Clone)]
pub struct PageOcr {
    pub text: String,
    /// Engine-reported mean word confidence, when TSV scoring succeeded.
    pub ocr_confidence: Option<f32>,
    /// Blend of the engine confidence and the text heuristic.
    pub confidence: f32,
    pub warnings: Vec<String>,
}

/// Runs `tesseract` on single images.
#[derive(Clone)]
pub struct TesseractOcr {
    config: Arc<OcrConfig>,
    runner: Arc<dyn CommandRunner>,
}

impl TesseractOcr {
    pub fn new(config: Arc<OcrConfig>, runner: Arc<dyn CommandRunner>) -> Self {
        Self { config, runner }
    }

    pub fn language(&self) -> &str {
        &self.config.language
    }

    pub async fn recognize(&self, image: &Path) -> Result<PageOcr, ExtractError> {
        let output = self
            .runner
            .run(&self.config.tesseract, &self.args(image, false))
            .await?;
        let text = normalize(&output.stdout_lossy());

        let mut warnings = Vec::new();
        let ocr_confidence = if self.config.tsv_confidence {
            self.word_confidence(image, &mut warnings).await
        } else {
            None
        };

        let heuristic = heuristic_confidence(&text);
        let confidence = blend(ocr_confidence.unwrap_or(0.0), heuristic);
        debug!(
            ocr_confidence = ocr_confidence.unwrap_or(-1.0),
            heuristic, confidence, "image OCR scored"
        );

        Ok(PageOcr {
            text,
            ocr_confidence,
            confidence,
            warnings,
        })
    }

    async fn word_confidence(&self, image: &Path, warnings: &mut Vec<String>) -> Option<f32> {
        match self
            .runner
            .run(&self.config.tesseract, &self.args(image, true))
            .await
        {
            Ok(output) => {
                let mean = tsv_mean_confidence(&output.stdout_lossy());
                if mean.is_none() {
                    warnings.push("tesseract reported no word confidences".to_string());
                }
                mean
            }
            Err(e) => {
                warn!(error = %e, "TSV confidence pass failed");
                warnings.push(format!("word confidence unavailable: {}", e));
                None
            }
        }
    }

    fn args(&self, image: &Path, tsv: bool) -> Vec<String> {
        let mut args = vec![
            image.to_string_lossy().into_owned(),
            "stdout".to_string(),
            "-l".to_string(),
            self.config.language.clone(),
        ];
        if let Some(psm) = self.config.psm {
            args.push("--psm".to_string());
            args.push(psm.to_string());
        }
        if let Some(oem) = self.config.oem {
            args.push("--oem".to_string());
            args.push(oem.to_string());
        }
        if let Some(dir) = self.config.tessdata_dir.as_deref().filter(|d| !d.is_empty()) {
            args.push("--tessdata-dir".to_string());
            args.push(dir.to_string());
        }
        if tsv {
            args.push("tsv".to_string());
        }
        args
    }
}
