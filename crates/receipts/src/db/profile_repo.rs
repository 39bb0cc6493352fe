//! Profile repository.

use rusqlite::{params, OptionalExtension, Row};

use super::{new_id, now_rfc3339, Database, DatabaseError};

#[derive(Debug, Clone, PartialEq)]
pub struct ProfileRow {
    pub id: String,
    pub name: String,
    pub job_title: Option<String>,
    pub job_description: Option<String>,
    pub default_currency: String,
    pub created_at: String,
    pub updated_at: String,
}

impl ProfileRow {
    fn from_row(row: &Row<'_>) -> Result<Self, rusqlite::Error> {
        Ok(Self {
            id: row.get("id")?,
            name: row.get("name")?,
            job_title: row.get("job_title")?,
            job_description: row.get("job_description")?,
            default_currency: row.get("default_currency")?,
            created_at: row.get("created_at")?,
            updated_at: row.get("updated_at")?,
        })
    }
}

#[derive(Debug, Clone, Default)]
pub struct NewProfile {
    pub name: String,
    pub job_title: Option<String>,
    pub job_description: Option<String>,
    /// ISO 4217 code; empty means USD.
    pub default_currency: String,
}

pub fn insert(db: &Database, profile: &NewProfile) -> Result<ProfileRow, DatabaseError> {
    let currency = match profile.default_currency.trim() {
        "" => "USD".to_string(),
        c if c.len() == 3 && c.chars().all(|ch| ch.is_ascii_alphabetic()) => c.to_uppercase(),
        other => {
            return Err(DatabaseError::InvalidValue {
                field: "default_currency",
                reason: format!("'{}' is not a 3-letter code", other),
            })
        }
    };
    let now = now_rfc3339();
    let row = ProfileRow {
        id: new_id(),
        name: profile.name.trim().to_string(),
        job_title: profile.job_title.clone(),
        job_description: profile.job_description.clone(),
        default_currency: currency,
        created_at: now.clone(),
        updated_at: now,
    };

    db.with_conn(|conn| {
        conn.execute(
            "INSERT INTO profiles (id, name, job_title, job_description, default_currency,
             created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                row.id,
                row.name,
                row.job_title,
                row.job_description,
                row.default_currency,
                row.created_at,
                row.updated_at,
            ],
        )?;
        Ok(())
    })?;
    Ok(row)
}

pub fn find_by_id(db: &Database, id: &str) -> Result<Option<ProfileRow>, DatabaseError> {
    db.with_conn(|conn| {
        Ok(conn
            .query_row(
                "SELECT * FROM profiles WHERE id = ?1",
                params![id],
                ProfileRow::from_row,
            )
            .optional()?)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_and_find() {
        let db = Database::open_in_memory().unwrap();
        let inserted = insert(
            &db,
            &NewProfile {
                name: " Consulting ".to_string(),
                job_title: Some("Engineer".to_string()),
                default_currency: "cad".to_string(),
                ..NewProfile::default()
            },
        )
        .unwrap();

        let found = find_by_id(&db, &inserted.id).unwrap().unwrap();
        assert_eq!(found, inserted);
        assert_eq!(found.name, "Consulting");
        assert_eq!(found.default_currency, "CAD");
    }

    #[test]
    fn test_default_currency_is_usd() {
        let db = Database::open_in_memory().unwrap();
        let row = insert(&db, &NewProfile::default()).unwrap();
        assert_eq!(row.default_currency, "USD");
    }

    #[test]
    fn test_invalid_currency_rejected() {
        let db = Database::open_in_memory().unwrap();
        let err = insert(
            &db,
            &NewProfile {
                default_currency: "dollars".to_string(),
                ..NewProfile::default()
            },
        )
        .unwrap_err();
        assert!(matches!(err, DatabaseError::InvalidValue { .. }));
    }

    #[test]
    fn test_find_nonexistent() {
        let db = Database::open_in_memory().unwrap();
        assert!(find_by_id(&db, "missing").unwrap().is_none());
    }
}
