//! Isolated environment for pipeline tests.

#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tempfile::TempDir;

use receipts::db::file_repo::{self, NewFile};
use receipts::db::job_repo::{self, JobRow};
use receipts::db::profile_repo::{self, NewProfile};
use receipts::db::receipt_repo::{self, ReceiptRow};
use receipts::{Database, FieldExtractor, Pipeline, PipelineConfig, TextExtractor};

pub struct TestHarness {
    temp_dir: TempDir,
    pub input_dir: PathBuf,
    pub cache_dir: PathBuf,
    pub db: Database,
    pub profile_id: String,
}

impl TestHarness {
    pub fn new() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let input_dir = temp_dir.path().join("Receipts").join("2024");
        let cache_dir = temp_dir.path().join("cache");
        std::fs::create_dir_all(&input_dir).expect("Failed to create input dir");

        let db = Database::open_in_memory().expect("Failed to create test database");
        let profile_id = profile_repo::insert(
            &db,
            &NewProfile {
                name: "Consulting".to_string(),
                job_title: Some("Software Engineer".to_string()),
                job_description: Some("Independent contractor".to_string()),
                default_currency: "USD".to_string(),
            },
        )
        .expect("Failed to insert profile")
        .id;

        Self {
            temp_dir,
            input_dir,
            cache_dir,
            db,
            profile_id,
        }
    }

    pub fn temp_path(&self) -> &Path {
        self.temp_dir.path()
    }

    /// Writes an input file and registers it; returns the file id.
    pub fn add_file(&self, filename: &str, content: &[u8]) -> String {
        let path = self.input_dir.join(filename);
        std::fs::write(&path, content).expect("Failed to write input file");
        let ext = Path::new(filename)
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or_default()
            .to_string();

        file_repo::insert(
            &self.db,
            &NewFile {
                profile_id: self.profile_id.clone(),
                source_path: path.display().to_string(),
                file_ext: ext,
                content_hash: uuid::Uuid::new_v4().as_bytes().to_vec(),
                file_size: content.len() as i64,
            },
        )
        .expect("Failed to register file")
        .id
    }

    pub fn pipeline_config(&self) -> PipelineConfig {
        PipelineConfig {
            artifact_cache_dir: Some(self.cache_dir.clone()),
            ..PipelineConfig::default()
        }
    }

    pub fn pipeline(
        &self,
        text: Arc<dyn TextExtractor>,
        fields: Arc<dyn FieldExtractor>,
    ) -> Pipeline {
        Pipeline::new(
            Arc::new(self.pipeline_config()),
            self.db.clone(),
            text,
            fields,
        )
    }

    pub fn job(&self, job_id: &str) -> JobRow {
        job_repo::find_by_id(&self.db, job_id)
            .expect("job lookup failed")
            .expect("job row missing")
    }

    pub fn jobs_for(&self, file_id: &str) -> Vec<JobRow> {
        job_repo::list_by_file(&self.db, file_id).expect("job listing failed")
    }

    pub fn receipt(&self, receipt_id: &str) -> ReceiptRow {
        receipt_repo::find_by_id(&self.db, receipt_id)
            .expect("receipt lookup failed")
            .expect("receipt row missing")
    }

    pub fn versions_for(&self, file_id: &str) -> Vec<ReceiptRow> {
        receipt_repo::list_versions_by_file(&self.db, file_id).expect("version listing failed")
    }
}
