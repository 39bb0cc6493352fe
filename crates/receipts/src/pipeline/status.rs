use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Lifecycle of an extraction job row.
///
/// `RUNNING -> OCR_COMPLETE -> PARSE_COMPLETE`, with `FAILED` reachable from
/// either non-terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobStatus {
    Running,
    OcrComplete,
    ParseComplete,
    Failed,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Running => "RUNNING",
            Self::OcrComplete => "OCR_COMPLETE",
            Self::ParseComplete => "PARSE_COMPLETE",
            Self::Failed => "FAILED",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::ParseComplete | Self::Failed)
    }

    pub fn can_transition_to(&self, next: JobStatus) -> bool {
        matches!(
            (self, next),
            (Self::Running, Self::OcrComplete)
                | (Self::Running, Self::Failed)
                | (Self::OcrComplete, Self::ParseComplete)
                | (Self::OcrComplete, Self::Failed)
        )
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "RUNNING" => Ok(Self::Running),
            "OCR_COMPLETE" => Ok(Self::OcrComplete),
            "PARSE_COMPLETE" => Ok(Self::ParseComplete),
            "FAILED" => Ok(Self::Failed),
            other => Err(format!("unknown job status '{}'", other)),
        }
    }
}

/// Pipeline stage a failure is attributed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    Ocr,
    Parse,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ocr => f.write_str("ocr"),
            Self::Parse => f.write_str("parse"),
        }
    }
}
