use std::path::PathBuf;

use crate::config::Config;

/// Orchestrator settings derived from [`Config`].
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Model confidence below this flags the receipt for review.
    pub min_confidence: f32,
    /// Where converted HEIC images are cached, keyed by content hash.
    pub artifact_cache_dir: Option<PathBuf>,
    /// Pass the category taxonomy to the model as an enum.
    pub constrain_categories: bool,
    pub timezone: Option<String>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            min_confidence: 0.60,
            artifact_cache_dir: None,
            constrain_categories: true,
            timezone: None,
        }
    }
}

impl PipelineConfig {
    pub fn from_config(config: &Config) -> Self {
        let settings = &config.pipeline;
        Self {
            min_confidence: settings.min_confidence,
            artifact_cache_dir: settings.artifact_cache_dir.as_ref().map(PathBuf::from),
            constrain_categories: settings.constrain_categories,
            timezone: settings.timezone.clone(),
        }
    }

    /// Category labels offered to the model; empty leaves it unconstrained.
    pub fn allowed_categories(&self) -> Vec<String> {
        if self.constrain_categories {
            crate::category::all_labels()
        } else {
            Vec::new()
        }
    }
}
