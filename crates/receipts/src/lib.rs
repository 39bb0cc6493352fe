pub mod category;
pub mod config;
pub mod db;
pub mod error;
pub mod extract;
pub mod fields;
pub mod logging;
pub mod pipeline;
pub mod sanitize;
pub mod secrets;
pub mod worker;

pub use category::{resolve as resolve_category, Category, CategoryResolution};
pub use config::{load_config, Config};
pub use db::Database;
pub use error::{
    ConfigError, ExtractError, FieldError, ProcessError, ReceiptsError, Result, StageError,
    WorkerError,
};
pub use extract::{ExtractInput, ExtractionResult, FileFormat, OcrExtractor, TextExtractor};
pub use fields::{ExtractRequest, ExtractedFields, FieldExtractor, OpenAiExtractor, ReceiptFields};
pub use pipeline::{JobStatus, Pipeline, PipelineConfig};
pub use secrets::{resolve_secret, SecretError, SecretSource};
pub use worker::{FileProcessor, JobOutcome, ProcessRequest, ShutdownOutcome, WorkerPool};
