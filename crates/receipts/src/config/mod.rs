pub mod loader;
pub mod schema;

pub use loader::{apply_env_overrides, load_config, load_config_from_str};
pub use schema::{
    Config, DatabaseConfig, HeicConverter, LlmConfig, LoggingConfig, OcrConfig, PipelineSettings,
    QueueConfig,
};
