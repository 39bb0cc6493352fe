//! Job repository for the `extract_jobs` table.
//!
//! Every status change is a guarded `UPDATE ... WHERE status = ?`; a
//! zero-row update is reported as [`DatabaseError::InvalidTransition`].

use rusqlite::{params, Connection, OptionalExtension, Row};
use serde_json::Value;

use super::{new_id, now_rfc3339, parse_column, Database, DatabaseError};
use crate::extract::FileFormat;
use crate::pipeline::JobStatus;

/// A job row from the database.
#[derive(Debug, Clone)]
pub struct JobRow {
    pub id: String,
    pub file_id: String,
    pub profile_id: String,
    pub receipt_id: Option<String>,
    pub format: FileFormat,
    pub status: JobStatus,
    pub started_at: String,
    pub finished_at: Option<String>,
    pub error_message: Option<String>,
    pub ocr_text: Option<String>,
    pub extraction_confidence: Option<f32>,
    pub needs_review: bool,
    pub model_name: Option<String>,
    pub model_params: Option<String>,
    pub extracted_json: Option<Vec<u8>>,
}

impl JobRow {
    fn from_row(row: &Row<'_>) -> Result<Self, rusqlite::Error> {
        Ok(Self {
            id: row.get("id")?,
            file_id: row.get("file_id")?,
            profile_id: row.get("profile_id")?,
            receipt_id: row.get("receipt_id")?,
            format: parse_column(row, "format")?,
            status: parse_column(row, "status")?,
            started_at: row.get("started_at")?,
            finished_at: row.get("finished_at")?,
            error_message: row.get("error_message")?,
            ocr_text: row.get("ocr_text")?,
            extraction_confidence: row
                .get::<_, Option<f64>>("extraction_confidence")?
                .map(|c| c as f32),
            needs_review: row.get("needs_review")?,
            model_name: row.get("model_name")?,
            model_params: row.get("model_params")?,
            extracted_json: row.get("extracted_json")?,
        })
    }

    /// `model_params` decoded as JSON.
    pub fn model_params_json(&self) -> Option<Value> {
        self.model_params
            .as_deref()
            .and_then(|p| serde_json::from_str(p).ok())
    }
}

/// What the OCR stage persists on success.
#[derive(Debug, Clone)]
pub struct OcrSuccess {
    pub text: String,
    pub confidence: f32,
    pub needs_review: bool,
    /// Extraction method, e.g. `pdf-text`.
    pub method: String,
    pub params: Value,
}

/// What the parse stage persists on success.
#[derive(Debug, Clone)]
pub struct ParseSuccess {
    pub needs_review: bool,
    pub extracted_json: Vec<u8>,
    pub model_name: String,
    pub model_params: Value,
}

/// Creates a job row in `RUNNING`.
pub fn start(
    db: &Database,
    file_id: &str,
    profile_id: &str,
    format: FileFormat,
) -> Result<JobRow, DatabaseError> {
    let id = new_id();
    let started_at = now_rfc3339();
    db.with_conn(|conn| {
        conn.execute(
            "INSERT INTO extract_jobs (id, file_id, profile_id, format, status, started_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                id,
                file_id,
                profile_id,
                format.as_str(),
                JobStatus::Running.as_str(),
                started_at
            ],
        )?;
        Ok(())
    })?;

    Ok(JobRow {
        id,
        file_id: file_id.to_string(),
        profile_id: profile_id.to_string(),
        receipt_id: None,
        format,
        status: JobStatus::Running,
        started_at,
        finished_at: None,
        error_message: None,
        ocr_text: None,
        extraction_confidence: None,
        needs_review: false,
        model_name: None,
        model_params: None,
        extracted_json: None,
    })
}

/// `RUNNING -> OCR_COMPLETE`, storing the OCR artifacts.
pub fn finish_ocr_success(
    db: &Database,
    job_id: &str,
    outcome: &OcrSuccess,
) -> Result<(), DatabaseError> {
    let (from, to) = guard(job_id, JobStatus::Running, JobStatus::OcrComplete)?;
    db.with_conn(|conn| {
        let changed = conn.execute(
            "UPDATE extract_jobs
             SET status = ?3, ocr_text = ?4, extraction_confidence = ?5, needs_review = ?6,
                 model_name = ?7, model_params = ?8
             WHERE id = ?1 AND status = ?2",
            params![
                job_id,
                from.as_str(),
                to.as_str(),
                outcome.text,
                f64::from(outcome.confidence.clamp(0.0, 1.0)),
                outcome.needs_review,
                outcome.method,
                outcome.params.to_string(),
            ],
        )?;
        check_changed(conn, changed, job_id, from, to)
    })
}

/// `RUNNING -> FAILED`.
pub fn finish_ocr_failure(db: &Database, job_id: &str, error: &str) -> Result<(), DatabaseError> {
    let (from, to) = guard(job_id, JobStatus::Running, JobStatus::Failed)?;
    db.with_conn(|conn| {
        let changed = conn.execute(
            "UPDATE extract_jobs SET status = ?3, error_message = ?4, finished_at = ?5
             WHERE id = ?1 AND status = ?2",
            params![job_id, from.as_str(), to.as_str(), error, now_rfc3339()],
        )?;
        check_changed(conn, changed, job_id, from, to)
    })
}

/// Links the job to its receipt and moves `OCR_COMPLETE -> PARSE_COMPLETE`
/// in one transaction. Re-linking the same receipt is a no-op.
pub fn complete_parse(
    db: &Database,
    job_id: &str,
    receipt_id: &str,
    outcome: &ParseSuccess,
) -> Result<(), DatabaseError> {
    let (from, to) = guard(job_id, JobStatus::OcrComplete, JobStatus::ParseComplete)?;
    db.with_transaction(|tx| {
        link_receipt(tx, job_id, receipt_id)?;
        let changed = tx.execute(
            "UPDATE extract_jobs
             SET status = ?3, needs_review = ?4, extracted_json = ?5, model_name = ?6,
                 model_params = ?7, finished_at = ?8, error_message = NULL
             WHERE id = ?1 AND status = ?2",
            params![
                job_id,
                from.as_str(),
                to.as_str(),
                outcome.needs_review,
                outcome.extracted_json,
                outcome.model_name,
                outcome.model_params.to_string(),
                now_rfc3339(),
            ],
        )?;
        check_changed(tx, changed, job_id, from, to)
    })
}

fn link_receipt(conn: &Connection, job_id: &str, receipt_id: &str) -> Result<(), DatabaseError> {
    let changed = conn.execute(
        "UPDATE extract_jobs SET receipt_id = ?2
         WHERE id = ?1 AND (receipt_id IS NULL OR receipt_id = ?2)",
        params![job_id, receipt_id],
    )?;
    if changed == 0 {
        return match current_status(conn, job_id)? {
            None => Err(not_found(job_id)),
            Some(_) => Err(DatabaseError::InvalidValue {
                field: "receipt_id",
                reason: format!("job {} is already linked to another receipt", job_id),
            }),
        };
    }
    Ok(())
}

/// `OCR_COMPLETE -> FAILED`, keeping whatever the model returned.
pub fn finish_parse_failure(
    db: &Database,
    job_id: &str,
    error: &str,
    raw_output: Option<&[u8]>,
) -> Result<(), DatabaseError> {
    let (from, to) = guard(job_id, JobStatus::OcrComplete, JobStatus::Failed)?;
    db.with_conn(|conn| {
        let changed = conn.execute(
            "UPDATE extract_jobs
             SET status = ?3, error_message = ?4, extracted_json = COALESCE(?5, extracted_json),
                 finished_at = ?6
             WHERE id = ?1 AND status = ?2",
            params![
                job_id,
                from.as_str(),
                to.as_str(),
                error,
                raw_output,
                now_rfc3339()
            ],
        )?;
        check_changed(conn, changed, job_id, from, to)
    })
}

/// Finds a job by its ID.
pub fn find_by_id(db: &Database, id: &str) -> Result<Option<JobRow>, DatabaseError> {
    db.with_conn(|conn| {
        Ok(conn
            .query_row(
                "SELECT * FROM extract_jobs WHERE id = ?1",
                params![id],
                JobRow::from_row,
            )
            .optional()?)
    })
}

/// All attempts for a file, oldest first.
pub fn list_by_file(db: &Database, file_id: &str) -> Result<Vec<JobRow>, DatabaseError> {
    db.with_conn(|conn| {
        let mut stmt = conn.prepare(
            "SELECT * FROM extract_jobs WHERE file_id = ?1 ORDER BY started_at ASC, rowid ASC",
        )?;
        let rows = stmt
            .query_map(params![file_id], JobRow::from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    })
}

/// Counts jobs with the given status.
pub fn count_by_status(db: &Database, status: JobStatus) -> Result<u64, DatabaseError> {
    db.with_conn(|conn| {
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM extract_jobs WHERE status = ?1",
            params![status.as_str()],
            |r| r.get(0),
        )?;
        Ok(count.max(0) as u64)
    })
}

fn guard(
    job_id: &str,
    from: JobStatus,
    to: JobStatus,
) -> Result<(JobStatus, JobStatus), DatabaseError> {
    if from.can_transition_to(to) {
        Ok((from, to))
    } else {
        Err(DatabaseError::InvalidTransition {
            job_id: job_id.to_string(),
            expected: from.to_string(),
            to: to.to_string(),
            found: from.to_string(),
        })
    }
}

fn check_changed(
    conn: &Connection,
    changed: usize,
    job_id: &str,
    from: JobStatus,
    to: JobStatus,
) -> Result<(), DatabaseError> {
    if changed > 0 {
        return Ok(());
    }
    match current_status(conn, job_id)? {
        None => Err(not_found(job_id)),
        Some(found) => {
            log::warn!(
                "Rejected transition of job {} to {} (status is {})",
                job_id,
                to,
                found
            );
            Err(DatabaseError::InvalidTransition {
                job_id: job_id.to_string(),
                expected: from.to_string(),
                to: to.to_string(),
                found,
            })
        }
    }
}

fn current_status(conn: &Connection, job_id: &str) -> Result<Option<String>, DatabaseError> {
    Ok(conn
        .query_row(
            "SELECT status FROM extract_jobs WHERE id = ?1",
            params![job_id],
            |r| r.get(0),
        )
        .optional()?)
}

fn not_found(job_id: &str) -> DatabaseError {
    DatabaseError::NotFound {
        entity: "extract job",
        id: job_id.to_string(),
    }
}
