use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum DatabaseError {
    #[error("sqlite: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// Creating the database directory failed.
    #[error("cannot create '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("schema v{version} failed to apply: {reason}")]
    Migration { version: u32, reason: String },

    /// A thread panicked while holding the connection.
    #[error("database connection lock poisoned")]
    LockPoisoned,

    /// A guarded status update matched no row in the expected state.
    #[error("Job {job_id} cannot move to {to}: expected {expected}, found {found}")]
    InvalidTransition {
        job_id: String,
        expected: String,
        to: String,
        found: String,
    },

    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    /// A value rejected before it reached SQLite.
    #[error("Invalid value for {field}: {reason}")]
    InvalidValue { field: &'static str, reason: String },
}
