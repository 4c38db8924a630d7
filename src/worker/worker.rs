//! A single polling worker.

use crate::audit::{self, JobDisposition};
use crate::callback::CallbackDispatcher;
use crate::core::{ArcScanner, JobDescriptor, ScanError};
use crate::queue::ArcQueue;
use crate::worker::failure::FailurePolicy;

use std::path::Path;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

/// Lifecycle state of a worker.
///
/// `Idle -> Draining -> Idle -> ... -> Stopped`; `Stopped` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
    /// Waiting for the next tick.
    Idle,
    /// Pulling jobs off the queue.
    Draining,
    /// Exited after cancellation.
    Stopped,
}

impl WorkerState {
    fn as_u8(self) -> u8 {
        match self {
            Self::Idle => 0,
            Self::Draining => 1,
            Self::Stopped => 2,
        }
    }

    fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::Idle,
            1 => Self::Draining,
            _ => Self::Stopped,
        }
    }
}

/// Shared view of a worker's current state.
#[derive(Debug)]
pub(crate) struct WorkerStatus(AtomicU8);

impl WorkerStatus {
    pub(crate) fn new() -> Self {
        Self(AtomicU8::new(WorkerState::Idle.as_u8()))
    }

    pub(crate) fn get(&self) -> WorkerState {
        WorkerState::from_u8(self.0.load(Ordering::Acquire))
    }

    fn set(&self, state: WorkerState) {
        self.0.store(state.as_u8(), Ordering::Release);
    }
}

/// One of the pool's polling loops.
///
/// Everything a worker touches is injected at construction; workers share
/// nothing but the queue, whose atomic pop keeps them from ever seeing the
/// same job.
#[derive(Debug)]
pub(crate) struct Worker {
    pub(crate) id: usize,
    pub(crate) queue: ArcQueue,
    pub(crate) scanner: ArcScanner,
    pub(crate) dispatcher: CallbackDispatcher,
    pub(crate) policy: FailurePolicy,
    pub(crate) poll_interval: Duration,
    pub(crate) status: Arc<WorkerStatus>,
}

impl Worker {
    /// Runs until `shutdown` is cancelled.
    pub(crate) async fn run(self, shutdown: CancellationToken) {
        let mut ticker = tokio::time::interval(self.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        tracing::debug!(worker = self.id, "Worker started");

        loop {
            tokio::select! {
                biased;
                _ = shutdown.cancelled() => break,
                _ = ticker.tick() => {
                    self.status.set(WorkerState::Draining);
                    let processed = self.drain().await;
                    if processed > 0 {
                        tracing::debug!(worker = self.id, processed, "Drained queue");
                    }
                    self.status.set(WorkerState::Idle);
                }
            }
        }

        self.status.set(WorkerState::Stopped);
        tracing::debug!(worker = self.id, "Worker stopped");
    }

    /// Processes jobs until the queue is empty or the store fails.
    ///
    /// Shutdown is only observed between ticks, so a drain that has started
    /// runs to completion.
    async fn drain(&self) -> usize {
        let mut processed = 0;
        loop {
            match self.queue.dequeue().await {
                Ok(Some(job)) => {
                    self.process(job).await;
                    processed += 1;
                }
                Ok(None) => break,
                // A corrupt record is already gone; keep going with the next one.
                Err(e) if e.is_decode() => {
                    audit::emit_dequeue_failed(self.id, self.queue.name(), &e);
                }
                Err(e) => {
                    audit::emit_dequeue_failed(self.id, self.queue.name(), &e);
                    break;
                }
            }
        }
        processed
    }

    async fn process(&self, job: JobDescriptor) {
        audit::emit_job_started(self.id, &job);
        let start = Instant::now();

        match self.scanner.scan(&job.directory, job.timeout).await {
            Ok(result) => {
                remove_staging(self.id, &job.directory).await;
                audit::emit_job_completed(self.id, &job, start.elapsed());
                self.dispatcher.dispatch(&job.callback, result);
            }
            Err(e) => self.handle_failure(job, e).await,
        }
    }

    async fn handle_failure(&self, job: JobDescriptor, error: ScanError) {
        let disposition = match &self.policy {
            FailurePolicy::Requeue { .. } if self.policy.allows_retry(job.attempts) => {
                self.hand_off(&self.queue, &job, JobDisposition::Requeued).await
            }
            FailurePolicy::DeadLetter(dead_letters) => {
                self.hand_off(dead_letters, &job, JobDisposition::DeadLettered).await
            }
            _ => JobDisposition::Dropped,
        };

        audit::emit_job_failed(self.id, &job, &error, disposition);
        if disposition == JobDisposition::Dropped {
            remove_staging(self.id, &job.directory).await;
        }
    }

    async fn hand_off(
        &self,
        target: &ArcQueue,
        job: &JobDescriptor,
        disposition: JobDisposition,
    ) -> JobDisposition {
        match target.enqueue(&job.next_attempt()).await {
            Ok(_) => disposition,
            Err(e) => {
                tracing::warn!(
                    worker = self.id,
                    job_id = %job.id,
                    queue = %target.name(),
                    error = %e,
                    "Could not hand off failed job, dropping it"
                );
                JobDisposition::Dropped
            }
        }
    }
}

/// Best-effort removal of a job's staging directory.
async fn remove_staging(worker: usize, dir: &Path) {
    match tokio::fs::remove_dir_all(dir).await {
        Ok(()) => {}
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            tracing::debug!(worker, dir = %dir.display(), "Staging directory already gone");
        }
        Err(e) => {
            tracing::warn!(
                worker,
                dir = %dir.display(),
                error = %e,
                "Failed to remove staging directory"
            );
        }
    }
}
