use std::path::Path;

use crate::config::schema::Config;
use crate::error::ConfigError;

const SCHEMA_JSON: &str = include_str!("../../../../schema/config-v1.json");

pub fn load_config<P: AsRef<Path>>(path: P) -> Result<Config, ConfigError> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadFile {
        path: path.to_path_buf(),
        source: e,
    })?;

    let mut config = load_config_from_str(&content)?;
    apply_env_overrides(&mut config)?;
    Ok(config)
}

pub fn load_config_from_str(content: &str) -> Result<Config, ConfigError> {
    let json_value: serde_json::Value = serde_json::from_str(content)?;

    validate_schema(&json_value)?;

    let config: Config = serde_json::from_value(json_value)?;

    validate_config(&config)?;

    Ok(config)
}

/// Applies `RECEIPTS_*` environment overrides on top of a loaded config.
pub fn apply_env_overrides(config: &mut Config) -> Result<(), ConfigError> {
    if let Some(path) = env_value("RECEIPTS_DB_PATH") {
        config.database.path = Some(path);
    }
    if let Some(dir) = env_value("RECEIPTS_ARTIFACT_CACHE_DIR") {
        config.pipeline.artifact_cache_dir = Some(dir);
    }
    if let Some(name) = env_value("RECEIPTS_HEIC_CONVERTER") {
        config.ocr.heic_converter = name
            .parse()
            .map_err(|message| ConfigError::Validation { message })?;
    }
    if let Some(model) = env_value("RECEIPTS_LLM_MODEL") {
        config.llm.model = model;
    }
    if let Some(url) = env_value("RECEIPTS_LLM_BASE_URL") {
        config.llm.base_url = url;
    }
    if config.ocr.tessdata_dir.is_none() {
        config.ocr.tessdata_dir = env_value("TESSDATA_PREFIX");
    }
    validate_config(config)
}

fn env_value(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn validate_schema(json_value: &serde_json::Value) -> Result<(), ConfigError> {
    let schema: serde_json::Value =
        serde_json::from_str(SCHEMA_JSON).map_err(|e| ConfigError::Validation {
            message: format!("Invalid embedded schema JSON: {}", e),
        })?;

    let validator = jsonschema::validator_for(&schema).map_err(|e| ConfigError::Validation {
        message: format!("Failed to compile JSON schema: {}", e),
    })?;

    let error_messages: Vec<String> = validator
        .iter_errors(json_value)
        .map(|e| e.to_string())
        .collect();
    if !error_messages.is_empty() {
        return Err(ConfigError::SchemaValidation {
            errors: error_messages.join("; "),
        });
    }

    Ok(())
}

fn validate_config(config: &Config) -> Result<(), ConfigError> {
    if config.version != "1.0" {
        return Err(ConfigError::Validation {
            message: format!("Unsupported config version: {}", config.version),
        });
    }

    let min = config.pipeline.min_confidence;
    if !(0.0..=1.0).contains(&min) {
        return Err(ConfigError::Validation {
            message: format!("pipeline.min_confidence must be within [0, 1], got {}", min),
        });
    }

    if config.queue.workers == 0 {
        return Err(ConfigError::Validation {
            message: "queue.workers must be at least 1".to_string(),
        });
    }
    if config.queue.capacity == 0 {
        return Err(ConfigError::Validation {
            message: "queue.capacity must be at least 1".to_string(),
        });
    }
    if config.queue.job_timeout_secs == 0 {
        return Err(ConfigError::Validation {
            message: "queue.job_timeout_secs must be at least 1".to_string(),
        });
    }

    if config.llm.base_url.trim().is_empty() {
        return Err(ConfigError::Validation {
            message: "llm.base_url must not be empty".to_string(),
        });
    }

    Ok(())
}
