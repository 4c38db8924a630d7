//! Audit event types and emission functions.

use crate::core::{DeliveryError, JobDescriptor, QueueError, ScanError};

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// What happened to a job whose scan failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobDisposition {
    /// The job was discarded along with its staging directory.
    Dropped,
    /// The job was pushed back onto the queue for another attempt.
    Requeued,
    /// The job was moved to the dead-letter queue.
    DeadLettered,
}

impl fmt::Display for JobDisposition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Dropped => write!(f, "dropped"),
            Self::Requeued => write!(f, "requeued"),
            Self::DeadLettered => write!(f, "dead_lettered"),
        }
    }
}

/// Emits an audit event for a job accepted into the queue.
pub fn emit_job_enqueued(job: &JobDescriptor, queue: &str, depth: u64) {
    tracing::info!(
        target: "scanspool::audit",
        event_type = "job_enqueued",
        job_id = %job.id,
        queue = %queue,
        dir = %job.directory.display(),
        callback = %job.callback,
        timeout = ?job.timeout,
        depth = depth,
        "Job enqueued"
    );
}

/// Emits an audit event for a worker picking up a job.
pub fn emit_job_started(worker: usize, job: &JobDescriptor) {
    tracing::info!(
        target: "scanspool::audit",
        event_type = "job_started",
        worker = worker,
        job_id = %job.id,
        dir = %job.directory.display(),
        attempt = job.attempts + 1,
        enqueued_at = ?job.enqueued_at,
        "Job started"
    );
}

/// Emits an audit event for a job whose scan succeeded.
pub fn emit_job_completed(worker: usize, job: &JobDescriptor, elapsed: Duration) {
    tracing::info!(
        target: "scanspool::audit",
        event_type = "job_completed",
        worker = worker,
        job_id = %job.id,
        dir = %job.directory.display(),
        duration_ms = elapsed.as_millis() as u64,
        "Job completed"
    );
}

/// Emits an audit event for a job whose scan failed.
pub fn emit_job_failed(
    worker: usize,
    job: &JobDescriptor,
    error: &ScanError,
    disposition: JobDisposition,
) {
    tracing::warn!(
        target: "scanspool::audit",
        event_type = "job_failed",
        worker = worker,
        job_id = %job.id,
        dir = %job.directory.display(),
        timed_out = error.is_timeout(),
        error = %error,
        attempts = job.attempts + 1,
        disposition = %disposition,
        "Job failed"
    );
}

/// Emits an audit event for a record that could not be dequeued.
pub fn emit_dequeue_failed(worker: usize, queue: &str, error: &QueueError) {
    tracing::warn!(
        target: "scanspool::audit",
        event_type = "dequeue_failed",
        worker = worker,
        queue = %queue,
        record_lost = error.is_decode(),
        error = %error,
        "Dequeue failed"
    );
}

/// Emits an audit event for a delivered callback.
pub fn emit_callback_delivered(url: &str) {
    tracing::debug!(
        target: "scanspool::audit",
        event_type = "callback_delivered",
        url = %url,
        "Callback delivered"
    );
}

/// Emits an audit event for a callback that could not be delivered.
pub fn emit_callback_failed(url: &str, error: &DeliveryError) {
    tracing::warn!(
        target: "scanspool::audit",
        event_type = "callback_failed",
        url = %url,
        error = %error,
        "Callback delivery failed"
    );
}
