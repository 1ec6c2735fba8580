use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender, TrySendError};
use log::{debug, error, info, warn};

use crate::error::WorkerError;
use crate::pipeline::{ArtifactGuard, Pipeline, PANIC_MESSAGE};
use crate::registry::TaskOutcome;
use crate::worker::job::Job;

const ABANDONED_MESSAGE: &str = "Service shut down before the resume was processed";

/// Fixed set of worker threads consuming a bounded job queue.
pub struct WorkerPool {
    job_sender: Sender<Job>,
    job_receiver: Receiver<Job>,
    workers: Vec<JoinHandle<()>>,
    shutdown: Arc<AtomicBool>,
    pipeline: Arc<Pipeline>,
}

impl WorkerPool {
    pub fn new(
        pipeline: Arc<Pipeline>,
        worker_count: usize,
        queue_capacity: usize,
    ) -> Result<Self, WorkerError> {
        let worker_count = worker_count.max(1);
        let (job_sender, job_receiver) = bounded::<Job>(queue_capacity.max(1));
        let shutdown = Arc::new(AtomicBool::new(false));

        let mut workers = Vec::with_capacity(worker_count);
        for worker_id in 0..worker_count {
            let job_rx = job_receiver.clone();
            let shutdown_flag = Arc::clone(&shutdown);
            let worker_pipeline = Arc::clone(&pipeline);

            let handle = thread::Builder::new()
                .name(format!("resume-worker-{}", worker_id))
                .spawn(move || run_worker(worker_id, job_rx, shutdown_flag, worker_pipeline))
                .map_err(|e| WorkerError::SpawnFailed(e.to_string()))?;
            workers.push(handle);
        }

        info!(
            "Started {} workers (queue capacity {})",
            worker_count,
            queue_capacity.max(1)
        );

        Ok(Self {
            job_sender,
            job_receiver,
            workers,
            shutdown,
            pipeline,
        })
    }

    /// Queues a job without blocking; a full queue is reported as
    /// [`WorkerError::QueueFull`].
    pub fn try_submit(&self, job: Job) -> Result<(), (WorkerError, Job)> {
        if self.shutdown.load(Ordering::Relaxed) {
            return Err((WorkerError::ChannelClosed, job));
        }

        self.job_sender.try_send(job).map_err(|e| match e {
            TrySendError::Full(job) => (WorkerError::QueueFull, job),
            TrySendError::Disconnected(job) => (WorkerError::ChannelClosed, job),
        })
    }

    pub fn queued(&self) -> usize {
        self.job_sender.len()
    }

    pub fn worker_count(&self) -> usize {
        self.workers.len()
    }

    pub fn shutdown(&self) {
        info!("Shutting down worker pool...");
        self.shutdown.store(true, Ordering::Relaxed);
    }

    pub fn is_shutdown(&self) -> bool {
        self.shutdown.load(Ordering::Relaxed)
    }

    /// Stops the workers, fails every job still queued and joins the threads.
    pub fn wait(self) {
        self.shutdown.store(true, Ordering::Relaxed);
        drop(self.job_sender);

        for (i, worker) in self.workers.into_iter().enumerate() {
            if let Err(e) = worker.join() {
                error!("Worker {} panicked: {:?}", i, e);
            } else {
                debug!("Worker {} finished", i);
            }
        }

        let mut abandoned = 0;
        while let Ok(job) = self.job_receiver.try_recv() {
            abandon(&self.pipeline, job);
            abandoned += 1;
        }
        if abandoned > 0 {
            warn!("Abandoned {} queued jobs at shutdown", abandoned);
        }

        info!("All workers have stopped");
    }
}

fn abandon(pipeline: &Pipeline, job: Job) {
    let mut sources = ArtifactGuard::with_paths(job.files().iter().map(|f| f.path.clone()));
    sources.release();
    if let Err(e) = pipeline
        .registry()
        .finalize(&job.id, TaskOutcome::Failed(ABANDONED_MESSAGE.to_string()))
    {
        debug!("Could not finalize abandoned job {}: {}", job.id, e);
    }
}

fn run_worker(
    worker_id: usize,
    job_receiver: Receiver<Job>,
    shutdown: Arc<AtomicBool>,
    pipeline: Arc<Pipeline>,
) {
    debug!("Worker {} started", worker_id);

    loop {
        if shutdown.load(Ordering::Relaxed) {
            debug!("Worker {} received shutdown signal", worker_id);
            break;
        }

        match job_receiver.recv_timeout(Duration::from_millis(100)) {
            Ok(job) => {
                debug!("Worker {} processing job {}", worker_id, job.id);
                let fallback = job.clone();

                let outcome = panic::catch_unwind(AssertUnwindSafe(|| pipeline.run(job)));
                if outcome.is_err() {
                    error!("Worker {} panicked while processing job {}", worker_id, fallback.id);
                    pipeline.fail_job(&fallback, PANIC_MESSAGE);
                }
            }
            Err(RecvTimeoutError::Timeout) => continue,
            Err(RecvTimeoutError::Disconnected) => {
                debug!("Worker {} job channel disconnected", worker_id);
                break;
            }
        }
    }

    debug!("Worker {} stopped", worker_id);
}
