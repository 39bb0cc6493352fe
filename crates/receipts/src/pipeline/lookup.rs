//! Read-only views of the file and profile records the pipeline consumes.

use crate::db::{file_repo, profile_repo, Database, DatabaseError};

/// An uploaded receipt file.
#[derive(Debug, Clone, PartialEq)]
pub struct FileRecord {
    pub id: String,
    pub profile_id: String,
    pub source_path: String,
    pub file_ext: String,
    pub content_hash: Vec<u8>,
}

impl FileRecord {
    pub fn content_hash_hex(&self) -> String {
        file_repo::hex(&self.content_hash)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ProfileRecord {
    pub name: String,
    pub job_title: Option<String>,
    pub job_description: Option<String>,
    pub default_currency: String,
}

pub trait FileLookup: Send + Sync {
    fn get_file(&self, id: &str) -> Result<Option<FileRecord>, DatabaseError>;
}

pub trait ProfileLookup: Send + Sync {
    fn get_profile(&self, id: &str) -> Result<Option<ProfileRecord>, DatabaseError>;
}

impl FileLookup for Database {
    fn get_file(&self, id: &str) -> Result<Option<FileRecord>, DatabaseError> {
        Ok(file_repo::find_by_id(self, id)?.map(|row| FileRecord {
            id: row.id,
            profile_id: row.profile_id,
            source_path: row.source_path,
            file_ext: row.file_ext,
            content_hash: row.content_hash,
        }))
    }
}

impl ProfileLookup for Database {
    fn get_profile(&self, id: &str) -> Result<Option<ProfileRecord>, DatabaseError> {
        Ok(profile_repo::find_by_id(self, id)?.map(|row| ProfileRecord {
            name: row.name,
            job_title: row.job_title,
            job_description: row.job_description,
            default_currency: row.default_currency,
        }))
    }
}
