//! Service configuration.

use crate::core::job::{duration_str, option_duration_str};
use crate::core::ScanError;
use crate::queue::DEFAULT_QUEUE_NAME;
use crate::worker::WorkerPoolConfig;

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Configuration for a [`ScanService`](crate::service::ScanService).
///
/// Loadable from any serde format; durations are written as human strings
/// such as `"30s"` or `"5m"`. Missing fields take their defaults.
///
/// ```rust
/// use scanspool::service::ScanServiceConfig;
/// use std::time::Duration;
///
/// let config = ScanServiceConfig::new()
///     .with_staging_dir("/var/lib/scanspool/tmp")
///     .with_workers(4)
///     .with_file_timeout(Duration::from_secs(30));
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanServiceConfig {
    /// Root under which uploads are staged for scanning.
    pub staging_dir: PathBuf,

    /// Directory holding the durable queue.
    pub queue_dir: PathBuf,

    /// Name of the list that holds pending jobs.
    pub queue_name: String,

    /// Number of queue workers.
    pub workers: usize,

    /// How often an idle worker polls the queue.
    #[serde(with = "duration_str")]
    pub poll_interval: Duration,

    /// Default scan budget for single files.
    #[serde(with = "duration_str")]
    pub file_timeout: Duration,

    /// Default scan budget for extracted archives.
    #[serde(with = "duration_str")]
    pub archive_timeout: Duration,

    /// Callback used by async submissions that do not name one.
    pub default_callback: Option<String>,

    /// Per-request timeout for callback delivery.
    #[serde(with = "duration_str")]
    pub callback_timeout: Duration,

    /// How long shutdown waits for in-flight callbacks. `None` does not wait.
    #[serde(with = "option_duration_str", skip_serializing_if = "Option::is_none")]
    pub callback_drain: Option<Duration>,
}

impl Default for ScanServiceConfig {
    fn default() -> Self {
        Self {
            staging_dir: std::env::temp_dir().join("scanspool"),
            queue_dir: PathBuf::from("persist"),
            queue_name: DEFAULT_QUEUE_NAME.to_string(),
            workers: 1,
            poll_interval: Duration::from_millis(500),
            file_timeout: Duration::from_secs(60),
            archive_timeout: Duration::from_secs(300),
            default_callback: None,
            callback_timeout: Duration::from_secs(30),
            callback_drain: None,
        }
    }
}

impl ScanServiceConfig {
    /// Creates a new configuration with defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the staging root.
    pub fn with_staging_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.staging_dir = dir.into();
        self
    }

    /// Sets the queue directory.
    pub fn with_queue_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.queue_dir = dir.into();
        self
    }

    /// Sets the queue name.
    pub fn with_queue_name(mut self, name: impl Into<String>) -> Self {
        self.queue_name = name.into();
        self
    }

    /// Sets the number of workers (at least one).
    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers.max(1);
        self
    }

    /// Sets the worker poll interval.
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Sets the default single-file scan budget.
    pub fn with_file_timeout(mut self, timeout: Duration) -> Self {
        self.file_timeout = timeout;
        self
    }

    /// Sets the default archive scan budget.
    pub fn with_archive_timeout(mut self, timeout: Duration) -> Self {
        self.archive_timeout = timeout;
        self
    }

    /// Sets the fallback callback URL for async submissions.
    pub fn with_default_callback(mut self, url: impl Into<String>) -> Self {
        self.default_callback = Some(url.into());
        self
    }

    /// Sets the callback delivery timeout.
    pub fn with_callback_timeout(mut self, timeout: Duration) -> Self {
        self.callback_timeout = timeout;
        self
    }

    /// Makes shutdown wait up to `timeout` for in-flight callbacks.
    pub fn with_callback_drain(mut self, timeout: Duration) -> Self {
        self.callback_drain = Some(timeout);
        self
    }

    /// Returns the worker pool settings.
    pub fn pool_config(&self) -> WorkerPoolConfig {
        WorkerPoolConfig::new()
            .with_workers(self.workers)
            .with_poll_interval(self.poll_interval)
    }

    /// Checks the configuration for values the service cannot run with.
    pub fn validate(&self) -> Result<(), ScanError> {
        if self.queue_name.is_empty() {
            return Err(ScanError::configuration("queue name must not be empty"));
        }
        if self.file_timeout.is_zero() || self.archive_timeout.is_zero() {
            return Err(ScanError::configuration("scan timeouts must be positive"));
        }
        if self.callback_timeout.is_zero() {
            return Err(ScanError::configuration(
                "callback timeout must be positive",
            ));
        }
        self.pool_config().validate()
    }
}
