use std::path::PathBuf;
use thiserror::Error;

use crate::pipeline::Stage;

#[derive(Error, Debug)]
pub enum ReceiptsError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Processing error: {0}")]
    Process(#[from] ProcessError),

    #[error("Extraction error: {0}")]
    Extract(#[from] ExtractError),

    #[error("Field extraction error: {0}")]
    Fields(#[from] FieldError),

    #[error("Worker error: {0}")]
    Worker(#[from] WorkerError),

    #[error("Database error: {0}")]
    Database(#[from] crate::db::DatabaseError),

    #[error("Secret error: {0}")]
    Secret(#[from] crate::secrets::SecretError),
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file '{path}': {source}")]
    ReadFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config JSON: {0}")]
    ParseJson(#[from] serde_json::Error),

    #[error("Config validation failed: {message}")]
    Validation { message: String },

    #[error("Schema validation failed: {errors}")]
    SchemaValidation { errors: String },
}

/// Failures of the text extraction stage.
#[derive(Error, Debug)]
pub enum ExtractError {
    #[error("Unsupported file format: '{0}'")]
    UnsupportedFormat(String),

    #[error("Failed to start '{tool}': {source}")]
    ToolSpawn {
        tool: String,
        #[source]
        source: std::io::Error,
    },

    #[error("'{tool}' exited with {status}: {stderr}")]
    ExternalTool {
        tool: String,
        status: String,
        stderr: String,
    },

    #[error("'{tool}' produced no output: {detail}")]
    MissingOutput { tool: String, detail: String },

    #[error("IO error for path '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl ExtractError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

/// Failures of the field extraction stage.
///
/// Variants that saw a response body keep it so the job row can record
/// what the model actually returned.
#[derive(Error, Debug)]
pub enum FieldError {
    #[error("Inference request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Inference API returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Failed to decode inference response: {message}")]
    Decode { message: String, raw: Vec<u8> },

    #[error("Inference response contained no choices")]
    NoChoices { raw: Vec<u8> },

    #[error("Extracted fields failed schema validation: {errors}")]
    SchemaValidation { errors: String, raw: Vec<u8> },

    #[error("Invalid receipt schema: {0}")]
    Schema(String),

    #[error("Failed to read image '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("No API key configured: {0}")]
    MissingApiKey(#[from] crate::secrets::SecretError),
}

impl FieldError {
    /// Raw model output captured before the failure, if any.
    pub fn raw_output(&self) -> Option<&[u8]> {
        match self {
            Self::Decode { raw, .. }
            | Self::NoChoices { raw }
            | Self::SchemaValidation { raw, .. } => Some(raw),
            Self::Status { body, .. } if !body.is_empty() => Some(body.as_bytes()),
            _ => None,
        }
    }
}

/// Errors raised by one stage after its job row exists.
#[derive(Error, Debug)]
pub enum StageError {
    #[error(transparent)]
    Extract(#[from] ExtractError),

    #[error(transparent)]
    Fields(#[from] FieldError),

    #[error("Profile not found: {0}")]
    ProfileNotFound(String),

    #[error(transparent)]
    Persistence(#[from] crate::db::DatabaseError),
}

#[derive(Error, Debug)]
pub enum ProcessError {
    #[error("File not found: {0}")]
    FileNotFound(String),

    #[error("Unsupported file format: '{0}'")]
    UnsupportedFormat(String),

    #[error("Persistence error: {0}")]
    Persistence(#[from] crate::db::DatabaseError),

    #[error("Job {job_id} failed during {stage}: {source}")]
    Stage {
        job_id: String,
        stage: Stage,
        #[source]
        source: StageError,
    },
}

impl ProcessError {
    /// Job id of the attempt that failed, when one was created.
    pub fn job_id(&self) -> Option<&str> {
        match self {
            Self::Stage { job_id, .. } => Some(job_id),
            _ => None,
        }
    }
}

#[derive(Error, Debug)]
pub enum WorkerError {
    #[error("Failed to spawn worker: {0}")]
    SpawnFailed(String),

    #[error("Worker channel closed unexpectedly")]
    ChannelClosed,

    #[error("Queue is shutting down; request for file {0} rejected")]
    ShuttingDown(String),
}

pub type Result<T> = std::result::Result<T, ReceiptsError>;
