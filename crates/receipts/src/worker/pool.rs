use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use crossbeam_channel::{bounded, unbounded, Receiver, Sender, TrySendError};
use futures_util::FutureExt;
use log::{debug, error, info, warn};

use crate::config::QueueConfig;
use crate::error::{ProcessError, WorkerError};
use crate::pipeline::Pipeline;

use super::job::{JobOutcome, JobResult, ProcessRequest};

/// Work executed for each queued request.
#[async_trait]
pub trait FileProcessor: Send + Sync {
    /// Returns the id of the job row created for the request.
    async fn process(&self, request: &ProcessRequest) -> Result<String, ProcessError>;
}

#[async_trait]
impl FileProcessor for Pipeline {
    async fn process(&self, request: &ProcessRequest) -> Result<String, ProcessError> {
        self.process_file(&request.file_id).await
    }
}

/// How [`WorkerPool::shutdown`] returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownOutcome {
    /// Every queued request was handled and all workers exited.
    Drained,
    /// The caller stopped waiting; workers keep finishing in the background.
    Interrupted,
}

/// Fixed set of OS threads fed by a bounded queue.
///
/// Each worker owns a current-thread tokio runtime and runs one request at a
/// time under the per-job timeout.
pub struct WorkerPool {
    sender: Mutex<Option<Sender<ProcessRequest>>>,
    results: Receiver<JobOutcome>,
    workers: Mutex<Vec<JoinHandle<()>>>,
    closed: AtomicBool,
}

impl WorkerPool {
    pub fn new<P>(processor: Arc<P>, config: &QueueConfig) -> Result<Self, WorkerError>
    where
        P: FileProcessor + ?Sized + 'static,
    {
        let worker_count = config.workers.max(1);
        let timeout = Duration::from_secs(config.job_timeout_secs.max(1));
        Self::with_timeout(processor, worker_count, config.capacity.max(1), timeout)
    }

    /// Like [`WorkerPool::new`] with an explicit per-job timeout.
    pub fn with_timeout<P>(
        processor: Arc<P>,
        worker_count: usize,
        capacity: usize,
        job_timeout: Duration,
    ) -> Result<Self, WorkerError>
    where
        P: FileProcessor + ?Sized + 'static,
    {
        let (sender, receiver) = bounded::<ProcessRequest>(capacity);
        let (result_sender, results) = unbounded::<JobOutcome>();

        let mut workers = Vec::with_capacity(worker_count);
        for worker_id in 1..=worker_count {
            let runtime = tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
                .map_err(|e| WorkerError::SpawnFailed(e.to_string()))?;
            let requests = receiver.clone();
            let result_tx = result_sender.clone();
            let processor = Arc::clone(&processor);

            let handle = thread::Builder::new()
                .name(format!("receipts-worker-{}", worker_id))
                .spawn(move || {
                    run_worker(worker_id, runtime, requests, result_tx, processor, job_timeout)
                })
                .map_err(|e| WorkerError::SpawnFailed(e.to_string()))?;
            workers.push(handle);
        }

        info!(
            "Started {} workers (capacity {}, timeout {:?})",
            worker_count, capacity, job_timeout
        );

        Ok(Self {
            sender: Mutex::new(Some(sender)),
            results,
            workers: Mutex::new(workers),
            closed: AtomicBool::new(false),
        })
    }

    /// Queues a request, blocking while the queue is full.
    pub fn enqueue(&self, request: ProcessRequest) -> Result<(), WorkerError> {
        if self.closed.load(Ordering::Acquire) {
            warn!(
                "Cannot enqueue file {}: queue is shutting down",
                request.file_id
            );
            return Err(WorkerError::ShuttingDown(request.file_id));
        }

        let sender = self
            .sender
            .lock()
            .map_err(|_| WorkerError::ChannelClosed)?
            .clone();
        let Some(sender) = sender else {
            return Err(WorkerError::ShuttingDown(request.file_id));
        };

        match sender.try_send(request) {
            Ok(()) => {}
            Err(TrySendError::Full(request)) => {
                warn!(
                    "Queue full, applying backpressure for file {}",
                    request.file_id
                );
                sender
                    .send(request)
                    .map_err(|_| WorkerError::ChannelClosed)?;
            }
            Err(TrySendError::Disconnected(_)) => return Err(WorkerError::ChannelClosed),
        }
        debug!("Queued file for processing ({} waiting)", sender.len());
        Ok(())
    }

    pub fn results(&self) -> &Receiver<JobOutcome> {
        &self.results
    }

    pub fn try_recv_result(&self) -> Option<JobOutcome> {
        self.results.try_recv().ok()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Stops accepting requests and waits for the queue to drain, or until
    /// `cancel` yields a message.
    ///
    /// Cancelling only stops the wait. A disconnected `cancel` channel is
    /// not a cancellation.
    pub fn shutdown<T>(&self, cancel: &Receiver<T>) -> ShutdownOutcome {
        if self.closed.swap(true, Ordering::AcqRel) {
            debug!("Worker pool already shut down");
        } else {
            info!("Shutting down worker pool...");
        }

        // Workers exit once the queue is empty and every sender is gone.
        if let Ok(mut sender) = self.sender.lock() {
            sender.take();
        }
        let workers = match self.workers.lock() {
            Ok(mut workers) => std::mem::take(&mut *workers),
            Err(_) => Vec::new(),
        };

        let (done_tx, done_rx) = bounded::<()>(1);
        thread::spawn(move || {
            for (i, worker) in workers.into_iter().enumerate() {
                if let Err(panic) = worker.join() {
                    error!("Worker {} panicked: {}", i + 1, panic_message(panic.as_ref()));
                }
            }
            let _ = done_tx.send(());
        });

        crossbeam_channel::select! {
            recv(done_rx) -> _ => {
                info!("Queue drained, shutdown complete");
                ShutdownOutcome::Drained
            }
            recv(cancel) -> msg => match msg {
                Ok(_) => {
                    warn!("Shutdown wait interrupted; in-flight jobs continue");
                    ShutdownOutcome::Interrupted
                }
                Err(_) => {
                    let _ = done_rx.recv();
                    info!("Queue drained, shutdown complete");
                    ShutdownOutcome::Drained
                }
            },
        }
    }

    /// [`WorkerPool::shutdown`] with a deadline instead of a cancel channel.
    pub fn shutdown_timeout(&self, timeout: Duration) -> ShutdownOutcome {
        self.shutdown(&crossbeam_channel::after(timeout))
    }

    /// Shuts down and waits for every queued request.
    pub fn shutdown_and_wait(&self) -> ShutdownOutcome {
        self.shutdown(&crossbeam_channel::never::<()>())
    }
}

fn run_worker<P>(
    worker_id: usize,
    runtime: tokio::runtime::Runtime,
    requests: Receiver<ProcessRequest>,
    results: Sender<JobOutcome>,
    processor: Arc<P>,
    job_timeout: Duration,
) where
    P: FileProcessor + ?Sized,
{
    debug!("Worker {} started", worker_id);

    for request in requests.iter() {
        let started = Instant::now();
        let result = runtime.block_on(run_one(processor.as_ref(), &request, job_timeout));
        let elapsed = started.elapsed();

        match &result {
            JobResult::Succeeded { job_id } => info!(
                "Worker {} processed file {} as job {} in {:?}",
                worker_id, request.file_id, job_id, elapsed
            ),
            JobResult::Failed { error, .. } => error!(
                "Worker {} failed to process file {}: {}",
                worker_id, request.file_id, error
            ),
            JobResult::TimedOut { after } => error!(
                "Worker {} timed out processing file {} after {:?}",
                worker_id, request.file_id, after
            ),
            JobResult::Panicked { message } => error!(
                "Worker {} panicked processing file {}: {}",
                worker_id, request.file_id, message
            ),
        }

        let outcome = JobOutcome {
            file_id: request.file_id,
            worker_id,
            elapsed,
            result,
        };
        if results.send(outcome).is_err() {
            debug!("Worker {} result receiver dropped", worker_id);
        }
    }

    debug!("Worker {} stopped", worker_id);
}

async fn run_one<P>(processor: &P, request: &ProcessRequest, job_timeout: Duration) -> JobResult
where
    P: FileProcessor + ?Sized,
{
    let work = AssertUnwindSafe(processor.process(request)).catch_unwind();
    match tokio::time::timeout(job_timeout, work).await {
        Err(_) => JobResult::TimedOut { after: job_timeout },
        Ok(Err(panic)) => JobResult::Panicked {
            message: panic_message(panic.as_ref()),
        },
        Ok(Ok(Ok(job_id))) => JobResult::Succeeded { job_id },
        Ok(Ok(Err(e))) => JobResult::Failed {
            job_id: e.job_id().map(str::to_string),
            error: e.to_string(),
        },
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
