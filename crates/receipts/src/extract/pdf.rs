use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, warn};

use crate::config::OcrConfig;
use crate::error::ExtractError;

use super::confidence::heuristic_confidence;
use super::image::TesseractOcr;
use super::normalize::normalize;
use super::runner::CommandRunner;
use super::{Extracted, ExtractionMethod};

/// Text layers shorter than this are treated as scans.
const MIN_TEXT_LAYER_CHARS: usize = 20;
const PAGE_SEPARATOR: &str = "\n\x0C\n";
const RASTER_PREFIX: &str = "page";

/// Reads the PDF text layer and falls back to rasterize-and-OCR.
#[derive(Clone)]
pub struct PdfExtractor {
    config: Arc<OcrConfig>,
    runner: Arc<dyn CommandRunner>,
    ocr: TesseractOcr,
}

impl PdfExtractor {
    pub fn new(config: Arc<OcrConfig>, runner: Arc<dyn CommandRunner>, ocr: TesseractOcr) -> Self {
        Self {
            config,
            runner,
            ocr,
        }
    }

    pub async fn extract(&self, path: &Path) -> Result<Extracted, ExtractError> {
        let mut warnings = Vec::new();

        match self.text_layer(path).await {
            Ok((text, pages)) if has_text_layer(&text) => {
                let text = normalize(&text);
                let confidence = heuristic_confidence(&text);
                return Ok(Extracted {
                    text,
                    pages,
                    method: ExtractionMethod::PdfText,
                    confidence,
                    warnings,
                });
            }
            Ok(_) => debug!("PDF has no usable text layer, rasterizing"),
            Err(e) => {
                warn!(error = %e, "pdftotext failed, rasterizing");
                warnings.push(format!("text layer unavailable: {}", e));
            }
        }

        self.ocr_pages(path, warnings).await
    }

    async fn text_layer(&self, path: &Path) -> Result<(String, usize), ExtractError> {
        let args = vec![
            "-layout".to_string(),
            "-enc".to_string(),
            "UTF-8".to_string(),
            "-eol".to_string(),
            "unix".to_string(),
            path.to_string_lossy().into_owned(),
            "-".to_string(),
        ];
        let output = self.runner.run(&self.config.pdftotext, &args).await?;
        let text = output.stdout_lossy();
        let pages = 1 + text.matches('\u{c}').count();
        Ok((text, pages))
    }

    async fn ocr_pages(
        &self,
        path: &Path,
        mut warnings: Vec<String>,
    ) -> Result<Extracted, ExtractError> {
        let workdir = tempfile::Builder::new()
            .prefix("receipts-pdf-")
            .tempdir()
            .map_err(|e| ExtractError::io(std::env::temp_dir(), e))?;
        let prefix = workdir.path().join(RASTER_PREFIX);

        let args = vec![
            "-r".to_string(),
            self.config.dpi.to_string(),
            "-png".to_string(),
            path.to_string_lossy().into_owned(),
            prefix.to_string_lossy().into_owned(),
        ];
        self.runner.run(&self.config.pdftoppm, &args).await?;

        let mut images = rasterized_pages(workdir.path())?;
        if images.is_empty() {
            return Err(ExtractError::MissingOutput {
                tool: self.config.pdftoppm.clone(),
                detail: "no page images were written".to_string(),
            });
        }
        if self.config.max_pages > 0 && images.len() > self.config.max_pages {
            warnings.push(format!(
                "OCR limited to {} of {} pages",
                self.config.max_pages,
                images.len()
            ));
            images.truncate(self.config.max_pages);
        }

        let mut texts = Vec::with_capacity(images.len());
        let mut scored = Vec::new();
        let mut first_error = None;

        for (index, image) in images.iter().enumerate() {
            match self.ocr.recognize(image).await {
                Ok(page) => {
                    if page.ocr_confidence.is_some() {
                        scored.push(page.confidence);
                    }
                    warnings.extend(page.warnings);
                    texts.push(page.text);
                }
                Err(e) => {
                    warn!(page = index + 1, error = %e, "page OCR failed");
                    warnings.push(format!("page {}: {}", index + 1, e));
                    first_error.get_or_insert(e);
                }
            }
        }

        if texts.is_empty() {
            if let Some(e) = first_error {
                return Err(e);
            }
        }

        let text = texts.join(PAGE_SEPARATOR);
        let confidence = if scored.is_empty() {
            heuristic_confidence(&text)
        } else {
            scored.iter().sum::<f32>() / scored.len() as f32
        };

        Ok(Extracted {
            text,
            pages: images.len(),
            method: ExtractionMethod::PdfOcr,
            confidence,
            warnings,
        })
    }
}

fn has_text_layer(text: &str) -> bool {
    text.chars().filter(|c| !c.is_whitespace()).count() >= MIN_TEXT_LAYER_CHARS
}

/// Finds `page-N.png` files written by `pdftoppm`, ordered by page number.
///
/// `pdftoppm` zero-pads N to the width of the page count, so ordering is
/// numeric rather than lexical.
fn rasterized_pages(dir: &Path) -> Result<Vec<PathBuf>, ExtractError> {
    let pattern = dir.join(format!("{}-*.png", RASTER_PREFIX));
    let pattern = pattern.to_string_lossy();
    let entries = glob::glob(&pattern).map_err(|e| ExtractError::MissingOutput {
        tool: "pdftoppm".to_string(),
        detail: e.to_string(),
    })?;

    let mut pages: Vec<(u32, PathBuf)> = entries
        .filter_map(|entry| entry.ok())
        .filter_map(|path| page_number(&path).map(|n| (n, path)))
        .collect();
    pages.sort_by_key(|(n, _)| *n);
    Ok(pages.into_iter().map(|(_, path)| path).collect())
}

fn page_number(path: &Path) -> Option<u32> {
    path.file_stem()?
        .to_str()?
        .strip_prefix(RASTER_PREFIX)?
        .strip_prefix('-')?
        .parse()
        .ok()
}
