//! Worker pool driving the real pipeline over scripted extractors.

mod common;

use std::sync::Arc;
use std::time::Duration;

use common::{ExtractionBuilder, FakeFieldExtractor, FakeTextExtractor, FieldsBuilder, TestHarness};
use receipts::config::QueueConfig;
use receipts::worker::JobResult;
use receipts::{JobStatus, ProcessRequest, ShutdownOutcome, WorkerError, WorkerPool};

fn queue_config() -> QueueConfig {
    QueueConfig {
        workers: 3,
        capacity: 4,
        job_timeout_secs: 30,
    }
}

#[test]
fn test_pool_processes_files_through_pipeline() {
    let harness = TestHarness::new();
    let pipeline = Arc::new(harness.pipeline(
        FakeTextExtractor::returning(ExtractionBuilder::pdf_text("TOTAL 42.50").build()),
        FakeFieldExtractor::returning(FieldsBuilder::costco().build()),
    ));
    let pool = WorkerPool::new(pipeline, &queue_config()).unwrap();

    let file_ids: Vec<String> = (0..6)
        .map(|i| harness.add_file(&format!("receipt-{}.pdf", i), b"%PDF"))
        .collect();
    for file_id in &file_ids {
        pool.enqueue(ProcessRequest::new(file_id.clone())).unwrap();
    }

    assert_eq!(pool.shutdown_and_wait(), ShutdownOutcome::Drained);

    let outcomes: Vec<_> = pool.results().try_iter().collect();
    assert_eq!(outcomes.len(), file_ids.len());
    for outcome in &outcomes {
        let job_id = outcome.result.job_id().expect("job id");
        assert!(outcome.result.is_success(), "{:?}", outcome.result);
        assert_eq!(harness.job(job_id).status, JobStatus::ParseComplete);
    }
}

#[test]
fn test_pool_reports_stage_failures_with_job_id() {
    let harness = TestHarness::new();
    let pipeline = Arc::new(harness.pipeline(
        FakeTextExtractor::failing("tesseract crashed"),
        FakeFieldExtractor::returning(FieldsBuilder::costco().build()),
    ));
    let pool = WorkerPool::new(pipeline, &queue_config()).unwrap();

    let file_id = harness.add_file("bad.jpg", b"\xff\xd8");
    pool.enqueue(ProcessRequest::new(file_id.clone())).unwrap();
    pool.enqueue(ProcessRequest::new("unknown-file")).unwrap();
    assert_eq!(pool.shutdown_and_wait(), ShutdownOutcome::Drained);

    let mut outcomes: Vec<_> = pool.results().try_iter().collect();
    outcomes.sort_by(|a, b| a.file_id.cmp(&b.file_id));
    assert_eq!(outcomes.len(), 2);

    let stage_failure = outcomes.iter().find(|o| o.file_id == file_id).unwrap();
    match &stage_failure.result {
        JobResult::Failed {
            job_id: Some(job_id),
            error,
        } => {
            assert!(error.contains("tesseract crashed"));
            assert_eq!(harness.job(job_id).status, JobStatus::Failed);
        }
        other => panic!("Expected failure with job id, got {:?}", other),
    }

    let lookup_failure = outcomes.iter().find(|o| o.file_id == "unknown-file").unwrap();
    assert!(matches!(
        lookup_failure.result,
        JobResult::Failed { job_id: None, .. }
    ));
}

#[test]
fn test_enqueue_after_shutdown_is_an_error() {
    let harness = TestHarness::new();
    let pipeline = Arc::new(harness.pipeline(
        FakeTextExtractor::returning(ExtractionBuilder::pdf_text("TOTAL 1.00").build()),
        FakeFieldExtractor::returning(FieldsBuilder::costco().build()),
    ));
    let pool = WorkerPool::new(pipeline, &queue_config()).unwrap();
    assert_eq!(
        pool.shutdown_timeout(Duration::from_secs(10)),
        ShutdownOutcome::Drained
    );

    let file_id = harness.add_file("late.pdf", b"%PDF");
    let err = pool.enqueue(ProcessRequest::new(file_id.clone())).unwrap_err();
    assert!(matches!(err, WorkerError::ShuttingDown(ref id) if *id == file_id));
    assert!(harness.jobs_for(&file_id).is_empty());
}
