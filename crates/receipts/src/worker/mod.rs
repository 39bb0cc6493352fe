pub mod job;
pub mod pool;

pub use job::{JobOutcome, JobResult, ProcessRequest};
pub use pool::{FileProcessor, ShutdownOutcome, WorkerPool};

// Callers build cancel channels for `WorkerPool::shutdown` with it.
pub use crossbeam_channel;
