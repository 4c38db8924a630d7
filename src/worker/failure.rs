//! What a worker does with a job whose scan failed.

use crate::queue::ArcQueue;

/// Policy applied when a queued scan fails or times out.
///
/// The default, `Drop`, discards the job and its staging directory without
/// a callback: delivery is at most once and a bad job never blocks the
/// queue. The other variants keep the staging directory so the job stays
/// runnable or inspectable.
#[derive(Debug, Clone, Default)]
pub enum FailurePolicy {
    /// Discard the job and remove its staging directory.
    #[default]
    Drop,

    /// Push the job back onto the queue until it has run `max_attempts`
    /// times in total, then drop it.
    Requeue {
        /// Total attempts allowed, including the first.
        max_attempts: u32,
    },

    /// Move the job to a separate queue for later inspection.
    DeadLetter(ArcQueue),
}

impl FailurePolicy {
    /// Creates a requeue policy allowing `max_attempts` runs in total.
    pub fn requeue(max_attempts: u32) -> Self {
        Self::Requeue {
            max_attempts: max_attempts.max(1),
        }
    }

    /// Creates a dead-letter policy targeting `queue`.
    pub fn dead_letter(queue: ArcQueue) -> Self {
        Self::DeadLetter(queue)
    }

    /// Returns whether a job that has failed `attempts + 1` times may run again.
    pub fn allows_retry(&self, attempts: u32) -> bool {
        match self {
            Self::Requeue { max_attempts } => attempts.saturating_add(1) < *max_attempts,
            _ => false,
        }
    }
}
