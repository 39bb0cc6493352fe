//! Embedded schema steps, recorded in `_migrations` once applied.

use rusqlite::{params, Connection};

use super::error::DatabaseError;
use super::now_rfc3339;

struct Step {
    version: u32,
    name: &'static str,
    sql: &'static str,
}

const STEPS: &[Step] = &[
    Step {
        version: 1,
        name: "create_profiles",
        sql: include_str!("sql/001_create_profiles.sql"),
    },
    Step {
        version: 2,
        name: "create_receipt_files",
        sql: include_str!("sql/002_create_receipt_files.sql"),
    },
    Step {
        version: 3,
        name: "create_receipts",
        sql: include_str!("sql/003_create_receipts.sql"),
    },
    Step {
        version: 4,
        name: "create_extract_jobs",
        sql: include_str!("sql/004_create_extract_jobs.sql"),
    },
];

const TRACKING_TABLE: &str = "CREATE TABLE IF NOT EXISTS _migrations (
    version INTEGER PRIMARY KEY,
    name TEXT NOT NULL,
    applied_at TEXT NOT NULL
);";

/// Newest schema version this build knows about.
pub fn latest_version() -> u32 {
    STEPS.last().map_or(0, |step| step.version)
}

/// Highest version recorded on `conn`; 0 for a fresh database.
pub fn schema_version(conn: &Connection) -> Result<u32, DatabaseError> {
    conn.execute_batch(TRACKING_TABLE)?;
    let version = conn.query_row("SELECT IFNULL(MAX(version), 0) FROM _migrations", [], |r| {
        r.get(0)
    })?;
    Ok(version)
}

/// Applies every step newer than the recorded version and returns how many ran.
///
/// A failing step is rolled back on its own; earlier steps stay applied.
pub fn run_all(conn: &Connection) -> Result<usize, DatabaseError> {
    let recorded = schema_version(conn)?;
    let mut applied = 0;

    for step in STEPS.iter().filter(|step| step.version > recorded) {
        apply(conn, step).map_err(|e| DatabaseError::Migration {
            version: step.version,
            reason: e.to_string(),
        })?;
        log::info!("Applied schema v{} ({})", step.version, step.name);
        applied += 1;
    }

    if applied == 0 {
        log::debug!("Schema is current at v{}", recorded);
    }
    Ok(applied)
}

fn apply(conn: &Connection, step: &Step) -> rusqlite::Result<()> {
    let tx = conn.unchecked_transaction()?;
    tx.execute_batch(step.sql)?;
    tx.execute(
        "INSERT INTO _migrations (version, name, applied_at) VALUES (?1, ?2, ?3)",
        params![step.version, step.name, now_rfc3339()],
    )?;
    tx.commit()
}
