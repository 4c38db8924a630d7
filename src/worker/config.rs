//! Worker pool configuration.

use crate::core::ScanError;
use std::time::Duration;

/// Configuration for a [`WorkerPool`](crate::worker::WorkerPool).
#[derive(Debug, Clone)]
pub struct WorkerPoolConfig {
    /// Number of concurrent workers.
    pub workers: usize,

    /// How often an idle worker polls the queue.
    pub poll_interval: Duration,
}

impl Default for WorkerPoolConfig {
    fn default() -> Self {
        Self {
            workers: 1,
            poll_interval: Duration::from_millis(500),
        }
    }
}

impl WorkerPoolConfig {
    /// Creates a new configuration with defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the number of workers (at least one).
    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers.max(1);
        self
    }

    /// Sets the poll interval.
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Checks the configuration for values the pool cannot run with.
    pub fn validate(&self) -> Result<(), ScanError> {
        if self.workers == 0 {
            return Err(ScanError::configuration("at least one worker is required"));
        }
        if self.poll_interval.is_zero() {
            return Err(ScanError::configuration("poll interval must be positive"));
        }
        Ok(())
    }
}
