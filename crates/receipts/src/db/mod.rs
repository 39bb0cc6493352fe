//! SQLite persistence for profiles, files, receipts and extraction jobs.
//!
//! Repositories are free functions over a shared [`Database`] handle. The
//! handle owns one connection behind a mutex, so callers on different worker
//! threads take turns.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use rusqlite::{Connection, Transaction, TransactionBehavior};

pub mod error;
pub mod file_repo;
pub mod job_repo;
pub mod migrations;
pub mod profile_repo;
pub mod receipt_repo;

pub use error::DatabaseError;

#[derive(Clone)]
pub struct Database {
    conn: Arc<Mutex<Connection>>,
}

impl Database {
    /// Opens the database file, creating parent directories, and brings the
    /// schema up to date. File databases use WAL.
    pub fn open(path: &Path) -> Result<Self, DatabaseError> {
        if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
            std::fs::create_dir_all(dir).map_err(|source| DatabaseError::Io {
                path: dir.to_path_buf(),
                source,
            })?;
        }

        let conn = Connection::open(path)?;
        let mode: String =
            conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get(0))?;
        log::debug!("SQLite journal mode: {}", mode);
        conn.busy_timeout(Duration::from_secs(5))?;
        let db = Self::configure(conn)?;
        log::info!("Opened receipts database at {}", path.display());
        Ok(db)
    }

    /// Private in-memory database with the full schema.
    pub fn open_in_memory() -> Result<Self, DatabaseError> {
        Self::configure(Connection::open_in_memory()?)
    }

    fn configure(conn: Connection) -> Result<Self, DatabaseError> {
        conn.pragma_update(None, "foreign_keys", "ON")?;
        migrations::run_all(&conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Runs `f` with the connection locked.
    pub fn with_conn<F, T>(&self, f: F) -> Result<T, DatabaseError>
    where
        F: FnOnce(&Connection) -> Result<T, DatabaseError>,
    {
        let guard = self.conn.lock().map_err(|_| DatabaseError::LockPoisoned)?;
        f(&guard)
    }

    /// Runs `f` inside an IMMEDIATE transaction.
    ///
    /// Commits when `f` returns `Ok`; any error rolls the transaction back.
    pub fn with_transaction<F, T>(&self, f: F) -> Result<T, DatabaseError>
    where
        F: FnOnce(&Transaction<'_>) -> Result<T, DatabaseError>,
    {
        let mut guard = self.conn.lock().map_err(|_| DatabaseError::LockPoisoned)?;
        let tx = guard.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let value = f(&tx)?;
        tx.commit()?;
        Ok(value)
    }

    pub fn schema_version(&self) -> Result<u32, DatabaseError> {
        self.with_conn(migrations::schema_version)
    }
}

/// Returns the canonical database path: `~/.receipts/data/receipts.db`.
pub fn default_database_path() -> Option<PathBuf> {
    dirs::home_dir().map(|h| h.join(".receipts").join("data").join("receipts.db"))
}

/// Current time as stored in every timestamp column.
pub(crate) fn now_rfc3339() -> String {
    chrono::Utc::now().to_rfc3339()
}

pub(crate) fn new_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// Reads a TEXT column through `FromStr`, reporting parse failures as
/// conversion errors.
pub(crate) fn parse_column<T>(row: &rusqlite::Row<'_>, column: &str) -> rusqlite::Result<T>
where
    T: std::str::FromStr<Err = String>,
{
    let raw: String = row.get(column)?;
    raw.parse().map_err(|e: String| {
        rusqlite::Error::FromSqlConversionFailure(
            0,
            rusqlite::types::Type::Text,
            Box::new(std::io::Error::new(std::io::ErrorKind::InvalidData, e)),
        )
    })
}
