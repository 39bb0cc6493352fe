pub mod config;
pub mod lookup;
pub mod runner;
pub mod status;

pub use config::PipelineConfig;
pub use lookup::{FileLookup, FileRecord, ProfileLookup, ProfileRecord};
pub use runner::Pipeline;
pub use status::{JobStatus, Stage};
