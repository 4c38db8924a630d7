//! Mock scanner for testing.
//!
//! This module provides a configurable mock scanner that can be used
//! in tests to simulate engine output, failures and slow scans without
//! requiring a real engine binary.

use crate::core::{ScanError, Scanner};

use async_trait::async_trait;
use parking_lot::Mutex;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// A mock scanner for testing purposes.
///
/// # Examples
///
/// ```rust
/// use scanspool::backends::MockScanner;
/// use std::time::Duration;
///
/// // Reports every directory as clean
/// let scanner = MockScanner::new();
///
/// // Fails every scan
/// let scanner = MockScanner::new().with_failure("engine crashed");
///
/// // Sleeps for 5s, so any shorter timeout expires
/// let scanner = MockScanner::new().with_latency(Duration::from_secs(5));
/// ```
#[derive(Debug)]
pub struct MockScanner {
    /// Name of this scanner instance.
    name: String,
    /// Text returned on success.
    output: String,
    /// Message returned as an execution error, if set.
    failure: Option<String>,
    /// Simulated scan duration.
    latency: Option<Duration>,
    /// Counter for scan operations.
    scan_count: AtomicU64,
    /// Directories scanned, in call order.
    scanned: Mutex<Vec<PathBuf>>,
    /// Reported signature version.
    version: Option<String>,
}

impl MockScanner {
    /// Creates a mock scanner that reports a clean result.
    pub fn new() -> Self {
        Self {
            name: "mock".to_string(),
            output: r#"{"result":"clean"}"#.to_string(),
            failure: None,
            latency: None,
            scan_count: AtomicU64::new(0),
            scanned: Mutex::new(Vec::new()),
            version: None,
        }
    }

    /// Sets the name of this scanner.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Sets the text returned on success.
    ///
    /// `{dir}` in the output is replaced with the scanned directory.
    pub fn with_output(mut self, output: impl Into<String>) -> Self {
        self.output = output.into();
        self
    }

    /// Makes every scan fail with an execution error.
    pub fn with_failure(mut self, message: impl Into<String>) -> Self {
        self.failure = Some(message.into());
        self
    }

    /// Sets the simulated scan duration.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Sets the reported signature version.
    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = Some(version.into());
        self
    }

    /// Returns the number of scans started.
    pub fn scan_count(&self) -> u64 {
        self.scan_count.load(Ordering::Relaxed)
    }

    /// Returns the directories scanned so far.
    pub fn scanned_dirs(&self) -> Vec<PathBuf> {
        self.scanned.lock().clone()
    }
}

impl Default for MockScanner {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Scanner for MockScanner {
    fn name(&self) -> &str {
        &self.name
    }

    async fn scan(&self, dir: &Path, timeout: Duration) -> Result<String, ScanError> {
        self.scan_count.fetch_add(1, Ordering::Relaxed);
        self.scanned.lock().push(dir.to_path_buf());

        if let Some(latency) = self.latency {
            if latency > timeout {
                tokio::time::sleep(timeout).await;
                return Err(ScanError::timeout(
                    &self.name,
                    dir.display().to_string(),
                    timeout,
                ));
            }
            tokio::time::sleep(latency).await;
        }

        if let Some(ref message) = self.failure {
            return Err(ScanError::execution(&self.name, message.clone()));
        }

        Ok(self.output.replace("{dir}", &dir.display().to_string()))
    }

    async fn signature_version(&self) -> Option<String> {
        self.version.clone()
    }
}
