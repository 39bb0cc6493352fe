//! Receipt file repository.

use std::fmt::Write;

use rusqlite::{params, OptionalExtension, Row};

use super::{new_id, now_rfc3339, Database, DatabaseError};
use crate::extract::normalize_extension;

#[derive(Debug, Clone, PartialEq)]
pub struct FileRow {
    pub id: String,
    pub profile_id: String,
    pub source_path: String,
    /// Lowercase, without the leading dot.
    pub file_ext: String,
    /// Raw SHA-256 digest of the file contents.
    pub content_hash: Vec<u8>,
    pub file_size: i64,
    pub uploaded_at: String,
}

impl FileRow {
    fn from_row(row: &Row<'_>) -> Result<Self, rusqlite::Error> {
        Ok(Self {
            id: row.get("id")?,
            profile_id: row.get("profile_id")?,
            source_path: row.get("source_path")?,
            file_ext: row.get("file_ext")?,
            content_hash: row.get("content_hash")?,
            file_size: row.get("file_size")?,
            uploaded_at: row.get("uploaded_at")?,
        })
    }

    pub fn content_hash_hex(&self) -> String {
        hex(&self.content_hash)
    }
}

pub fn hex(bytes: &[u8]) -> String {
    bytes.iter().fold(String::with_capacity(bytes.len() * 2), |mut out, b| {
        let _ = write!(out, "{:02x}", b);
        out
    })
}

#[derive(Debug, Clone, Default)]
pub struct NewFile {
    pub profile_id: String,
    pub source_path: String,
    pub file_ext: String,
    pub content_hash: Vec<u8>,
    pub file_size: i64,
}

pub fn insert(db: &Database, file: &NewFile) -> Result<FileRow, DatabaseError> {
    if file.content_hash.is_empty() {
        return Err(DatabaseError::InvalidValue {
            field: "content_hash",
            reason: "empty digest".to_string(),
        });
    }
    let row = FileRow {
        id: new_id(),
        profile_id: file.profile_id.clone(),
        source_path: file.source_path.clone(),
        file_ext: normalize_extension(&file.file_ext),
        content_hash: file.content_hash.clone(),
        file_size: file.file_size,
        uploaded_at: now_rfc3339(),
    };

    db.with_conn(|conn| {
        conn.execute(
            "INSERT INTO receipt_files (id, profile_id, source_path, file_ext, content_hash,
             file_size, uploaded_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                row.id,
                row.profile_id,
                row.source_path,
                row.file_ext,
                row.content_hash,
                row.file_size,
                row.uploaded_at,
            ],
        )?;
        Ok(())
    })?;
    Ok(row)
}

pub fn find_by_id(db: &Database, id: &str) -> Result<Option<FileRow>, DatabaseError> {
    db.with_conn(|conn| {
        Ok(conn
            .query_row(
                "SELECT * FROM receipt_files WHERE id = ?1",
                params![id],
                FileRow::from_row,
            )
            .optional()?)
    })
}
