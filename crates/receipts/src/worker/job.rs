use std::time::Duration;

use chrono::{DateTime, Utc};

/// A request to run the pipeline for one stored file.
#[derive(Debug, Clone, PartialEq)]
pub struct ProcessRequest {
    pub file_id: String,
    /// Set when the file was re-submitted even though ingestion deduplicated it.
    pub force: bool,
    pub submitted_at: DateTime<Utc>,
}

impl ProcessRequest {
    pub fn new(file_id: impl Into<String>) -> Self {
        Self {
            file_id: file_id.into(),
            force: false,
            submitted_at: Utc::now(),
        }
    }

    pub fn forced(mut self) -> Self {
        self.force = true;
        self
    }
}

/// How a single request ended.
#[derive(Debug, Clone, PartialEq)]
pub enum JobResult {
    Succeeded {
        job_id: String,
    },
    /// `job_id` is set when the failure happened after the job row existed.
    Failed {
        job_id: Option<String>,
        error: String,
    },
    TimedOut {
        after: Duration,
    },
    Panicked {
        message: String,
    },
}

impl JobResult {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Succeeded { .. })
    }

    pub fn job_id(&self) -> Option<&str> {
        match self {
            Self::Succeeded { job_id } => Some(job_id),
            Self::Failed { job_id, .. } => job_id.as_deref(),
            Self::TimedOut { .. } | Self::Panicked { .. } => None,
        }
    }
}

/// Emitted by a worker after every request it handled.
#[derive(Debug, Clone)]
pub struct JobOutcome {
    pub file_id: String,
    pub worker_id: usize,
    pub elapsed: Duration,
    pub result: JobResult,
}
