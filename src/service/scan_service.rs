//! The submission facade over queue, scanner and workers.

use crate::audit;
use crate::callback::{CallbackDispatcher, CallbackSink};
use crate::core::output;
use crate::core::{ArcScanner, JobDescriptor, QueueError, QueueResult, ScanError, ScanResult, Scanner};
use crate::queue::{ArcQueue, JobQueue, RocksQueue, RocksQueueConfig};
use crate::service::config::ScanServiceConfig;
use crate::service::staging;
use crate::worker::{FailurePolicy, WorkerPool, WorkerState};

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

/// Builder for a [`ScanService`].
///
/// Anything not supplied is created from the configuration: a
/// [`RocksQueue`] under `queue_dir`, the default
/// [`CommandScanner`](crate::backends::CommandScanner) and, with the
/// `http-callback` feature, an [`HttpCallback`](crate::callback::HttpCallback).
pub struct ScanServiceBuilder {
    config: ScanServiceConfig,
    queue: Option<ArcQueue>,
    scanner: Option<ArcScanner>,
    sink: Option<Arc<dyn CallbackSink>>,
    policy: FailurePolicy,
}

impl ScanServiceBuilder {
    fn new(config: ScanServiceConfig) -> Self {
        Self {
            config,
            queue: None,
            scanner: None,
            sink: None,
            policy: FailurePolicy::default(),
        }
    }

    /// Uses the given queue instead of opening one.
    pub fn with_queue<Q: JobQueue + 'static>(self, queue: Q) -> Self {
        self.with_arc_queue(Arc::new(queue))
    }

    /// Uses a shared queue instead of opening one.
    pub fn with_arc_queue(mut self, queue: ArcQueue) -> Self {
        self.queue = Some(queue);
        self
    }

    /// Sets the scan engine.
    pub fn with_scanner<S: Scanner + 'static>(self, scanner: S) -> Self {
        self.with_arc_scanner(Arc::new(scanner))
    }

    /// Sets a shared scan engine.
    pub fn with_arc_scanner(mut self, scanner: ArcScanner) -> Self {
        self.scanner = Some(scanner);
        self
    }

    /// Sets the callback sink.
    pub fn with_callback_sink<C: CallbackSink + 'static>(self, sink: C) -> Self {
        self.with_arc_callback_sink(Arc::new(sink))
    }

    /// Sets a shared callback sink.
    pub fn with_arc_callback_sink(mut self, sink: Arc<dyn CallbackSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    /// Sets the policy for failed queued scans.
    pub fn with_failure_policy(mut self, policy: FailurePolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Builds the service. Workers are not started until [`ScanService::start`].
    pub fn build(self) -> Result<ScanService, ScanError> {
        self.config.validate()?;

        let queue = match self.queue {
            Some(queue) => queue,
            None => {
                let queue_config = RocksQueueConfig::new().with_name(&self.config.queue_name);
                let queue = RocksQueue::open(&self.config.queue_dir, queue_config).map_err(|e| {
                    ScanError::configuration(format!("failed to open job queue: {e}"))
                })?;
                Arc::new(queue) as ArcQueue
            }
        };

        let scanner = match self.scanner {
            Some(scanner) => scanner,
            None => Arc::new(crate::backends::CommandScanner::with_defaults()?) as ArcScanner,
        };

        let sink = match self.sink {
            Some(sink) => sink,
            None => default_sink(&self.config)?,
        };

        Ok(ScanService {
            config: self.config,
            queue,
            scanner,
            dispatcher: CallbackDispatcher::from_arc(sink),
            policy: self.policy,
            pool: Mutex::new(None),
            accepting: AtomicBool::new(true),
        })
    }
}

#[cfg(feature = "http-callback")]
fn default_sink(config: &ScanServiceConfig) -> Result<Arc<dyn CallbackSink>, ScanError> {
    Ok(Arc::new(crate::callback::HttpCallback::new(
        config.callback_timeout,
    )?))
}

#[cfg(not(feature = "http-callback"))]
fn default_sink(_config: &ScanServiceConfig) -> Result<Arc<dyn CallbackSink>, ScanError> {
    tracing::warn!("Built without http-callback; queued results will not be delivered");
    Ok(Arc::new(crate::callback::NoOpSink))
}

impl std::fmt::Debug for ScanServiceBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScanServiceBuilder")
            .field("config", &self.config)
            .field("policy", &self.policy)
            .finish()
    }
}

/// Submission facade for the scanning service.
///
/// Synchronous submissions scan immediately and return the result text.
/// Asynchronous submissions are queued and later scanned by the worker pool,
/// which POSTs the result to the job's callback. A queued job that fails is
/// handled by the [`FailurePolicy`]; under the default policy it is dropped
/// without a callback.
///
/// # Example
///
/// ```rust,no_run
/// use scanspool::backends::MockScanner;
/// use scanspool::callback::NoOpSink;
/// use scanspool::queue::MemoryQueue;
/// use scanspool::service::{ScanService, ScanServiceConfig};
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let service = ScanService::builder(ScanServiceConfig::new())
///     .with_queue(MemoryQueue::default())
///     .with_scanner(MockScanner::new())
///     .with_callback_sink(NoOpSink)
///     .build()?;
/// service.start().await?;
///
/// let dir = service.stage_bytes("sample.exe", b"MZ").await?;
/// let depth = service
///     .submit_async(&dir, Some("http://example.test/cb"), None)
///     .await?;
/// println!("queued, depth {depth}");
///
/// service.shutdown().await?;
/// # Ok(())
/// # }
/// ```
pub struct ScanService {
    config: ScanServiceConfig,
    queue: ArcQueue,
    scanner: ArcScanner,
    dispatcher: CallbackDispatcher,
    policy: FailurePolicy,
    pool: Mutex<Option<WorkerPool>>,
    accepting: AtomicBool,
}

impl ScanService {
    /// Creates a builder for a service with the given configuration.
    pub fn builder(config: ScanServiceConfig) -> ScanServiceBuilder {
        ScanServiceBuilder::new(config)
    }

    /// Starts the worker pool. Calling this on a running service is a no-op.
    pub async fn start(&self) -> ScanResult<()> {
        if !self.accepting.load(Ordering::Acquire) {
            return Err(ScanError::Cancelled);
        }
        let mut pool = self.pool.lock().await;
        if pool.is_some() {
            return Ok(());
        }

        *pool = Some(
            WorkerPool::builder(Arc::clone(&self.queue), Arc::clone(&self.scanner))
                .with_dispatcher(self.dispatcher.clone())
                .with_failure_policy(self.policy.clone())
                .with_config(self.config.pool_config())
                .start()?,
        );
        Ok(())
    }

    /// Scans a staged upload immediately and returns the response body.
    ///
    /// Failures are rendered as `{"error": "..."}`. The staging path is
    /// scrubbed from the output and the directory is removed afterwards. If
    /// `callback` is given, the same body is also dispatched to it. Without
    /// a `timeout`, `file_timeout` applies.
    pub async fn submit_sync(
        &self,
        dir: impl AsRef<Path>,
        timeout: Option<Duration>,
        callback: Option<&str>,
    ) -> ScanResult<String> {
        let timeout = timeout.unwrap_or(self.config.file_timeout);
        self.scan_now(dir.as_ref(), timeout, callback).await
    }

    /// Like [`submit_sync`](Self::submit_sync) for an extracted archive.
    ///
    /// Without a `timeout`, `archive_timeout` applies.
    pub async fn submit_sync_archive(
        &self,
        dir: impl AsRef<Path>,
        timeout: Option<Duration>,
        callback: Option<&str>,
    ) -> ScanResult<String> {
        let timeout = timeout.unwrap_or(self.config.archive_timeout);
        self.scan_now(dir.as_ref(), timeout, callback).await
    }

    async fn scan_now(
        &self,
        dir: &Path,
        timeout: Duration,
        callback: Option<&str>,
    ) -> ScanResult<String> {
        self.ensure_accepting()?;

        let result = self.scanner.scan(dir, timeout).await;
        if let Err(ref e) = result {
            tracing::warn!(dir = %dir.display(), error = %e, "Synchronous scan failed");
        }
        let body = output::render(result, dir);

        if let Err(e) = tokio::fs::remove_dir_all(dir).await {
            tracing::debug!(dir = %dir.display(), error = %e, "Could not remove staging directory");
        }
        if let Some(url) = callback {
            self.dispatcher.dispatch(url, body.clone());
        }
        Ok(body)
    }

    /// Queues `dir` for a background scan and returns the new queue depth.
    ///
    /// Without a callback the configured default is used; if there is none
    /// the job is rejected with [`QueueError::InvalidJob`].
    pub async fn submit_async(
        &self,
        dir: impl Into<PathBuf>,
        callback: Option<&str>,
        timeout: Option<Duration>,
    ) -> QueueResult<u64> {
        if !self.accepting.load(Ordering::Acquire) {
            return Err(QueueError::Closed {
                queue: self.queue.name().to_string(),
            });
        }

        let callback = callback
            .map(str::trim)
            .filter(|c| !c.is_empty())
            .or(self.config.default_callback.as_deref())
            .unwrap_or_default();
        if callback.is_empty() {
            return Err(QueueError::invalid_job(
                "no callback URL; use a synchronous submission instead",
            ));
        }

        let job = JobDescriptor::new(
            dir,
            callback,
            timeout.unwrap_or(self.config.file_timeout),
        )?
        .with_enqueued_now();
        let depth = self.queue.enqueue(&job).await?;
        audit::emit_job_enqueued(&job, self.queue.name(), depth);
        Ok(depth)
    }

    /// Returns the number of queued jobs.
    pub fn queue_depth(&self) -> u64 {
        self.queue.len()
    }

    /// Returns the scan engine's signature version, if known.
    pub async fn version(&self) -> Option<String> {
        self.scanner.signature_version().await
    }

    /// Writes an upload into a fresh directory under the staging root.
    pub async fn stage_bytes(&self, name: &str, bytes: &[u8]) -> ScanResult<PathBuf> {
        staging::stage_bytes(&self.config.staging_dir, name, bytes).await
    }

    /// Parses a caller-supplied timeout, falling back to `default`.
    pub fn resolve_timeout(raw: Option<&str>, default: Duration) -> Duration {
        staging::resolve_timeout(raw, default)
    }

    /// Returns the worker states, empty if the pool is not running.
    pub async fn worker_states(&self) -> Vec<WorkerState> {
        match self.pool.lock().await.as_ref() {
            Some(pool) => pool.states(),
            None => Vec::new(),
        }
    }

    /// Returns the number of callback deliveries still running.
    pub fn callbacks_in_flight(&self) -> usize {
        self.dispatcher.in_flight()
    }

    /// Returns the configuration.
    pub fn config(&self) -> &ScanServiceConfig {
        &self.config
    }

    /// Stops accepting work, stops the workers and closes the queue.
    ///
    /// Workers finish the job they are on. In-flight callbacks are only
    /// awaited when `callback_drain` is configured.
    pub async fn shutdown(&self) -> ScanResult<()> {
        if !self.accepting.swap(false, Ordering::AcqRel) {
            return Ok(());
        }
        tracing::info!(queue = %self.queue.name(), "Shutting down scan service");

        let pool = self.pool.lock().await.take();
        let stopped = match pool {
            Some(mut pool) => pool.shutdown().await,
            None => Ok(()),
        };

        if let Some(timeout) = self.config.callback_drain {
            self.dispatcher.drain(timeout).await;
        }

        // Storage is released even if a worker failed to stop.
        let closed = self
            .queue
            .close()
            .await
            .map_err(|e| ScanError::internal(format!("failed to close job queue: {e}")));
        stopped.and(closed)
    }

    fn ensure_accepting(&self) -> ScanResult<()> {
        if self.accepting.load(Ordering::Acquire) {
            Ok(())
        } else {
            Err(ScanError::Cancelled)
        }
    }
}

impl std::fmt::Debug for ScanService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScanService")
            .field("queue", &self.queue.name())
            .field("scanner", &self.scanner.name())
            .field("accepting", &self.accepting.load(Ordering::Relaxed))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::MockScanner;
    use crate::callback::RecordingSink;
    use crate::queue::MemoryQueue;
    use std::time::Instant;
    use tempfile::TempDir;

    async fn wait_until<F: Fn() -> bool>(condition: F) -> bool {
        let deadline = Instant::now() + Duration::from_secs(5);
        while Instant::now() < deadline {
            if condition() {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        condition()
    }

    fn config(root: &TempDir) -> ScanServiceConfig {
        ScanServiceConfig::new()
            .with_staging_dir(root.path().join("staging"))
            .with_queue_dir(root.path().join("queue"))
            .with_poll_interval(Duration::from_millis(20))
    }

    fn service(
        config: ScanServiceConfig,
        scanner: Arc<MockScanner>,
        sink: Arc<RecordingSink>,
    ) -> ScanService {
        ScanService::builder(config)
            .with_queue(MemoryQueue::default())
            .with_arc_scanner(scanner)
            .with_arc_callback_sink(sink)
            .build()
            .unwrap()
    }

    #[tokio::test]
    async fn test_submit_sync_scrubs_and_removes() {
        let root = TempDir::new().unwrap();
        let scanner = Arc::new(MockScanner::new().with_output(r#"{"path":"{dir}/a.exe"}"#));
        let sink = Arc::new(RecordingSink::new());
        let service = service(config(&root), scanner, sink.clone());

        let dir = service.stage_bytes("a.exe", b"MZ").await.unwrap();
        let body = service.submit_sync(&dir, None, None).await.unwrap();

        assert_eq!(body, r#"{"path":"/a.exe"}"#);
        assert!(!dir.exists());
        assert_eq!(sink.call_count(), 0);
    }

    #[tokio::test]
    async fn test_submit_sync_error_payload_and_callback() {
        let root = TempDir::new().unwrap();
        let scanner = Arc::new(MockScanner::new().with_failure("engine crashed"));
        let sink = Arc::new(RecordingSink::new());
        let service = service(config(&root), scanner, sink.clone());

        let dir = service.stage_bytes("a.exe", b"MZ").await.unwrap();
        let body = service
            .submit_sync(&dir, None, Some("http://example.test/cb"))
            .await
            .unwrap();

        let parsed: serde_json::Value = serde_json::from_str(&body).unwrap();
        assert!(parsed["error"].as_str().unwrap().contains("engine crashed"));
        assert!(wait_until(|| sink.call_count() == 1).await);
        assert_eq!(sink.calls()[0].body, body);
    }

    #[tokio::test]
    async fn test_submit_async_runs_in_background() {
        let root = TempDir::new().unwrap();
        let scanner = Arc::new(MockScanner::new());
        let sink = Arc::new(RecordingSink::new());
        let service = service(config(&root), scanner.clone(), sink.clone());

        let dir = service.stage_bytes("a.exe", b"MZ").await.unwrap();
        let depth = service
            .submit_async(&dir, Some("http://example.test/cb"), Some(Duration::from_secs(2)))
            .await
            .unwrap();
        assert_eq!(depth, 1);
        assert_eq!(service.queue_depth(), 1);

        service.start().await.unwrap();
        assert!(wait_until(|| sink.call_count() == 1).await);
        assert_eq!(service.queue_depth(), 0);
        assert!(!dir.exists());
        assert_eq!(sink.calls()[0].url, "http://example.test/cb");

        service.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_submit_async_uses_default_callback() {
        let root = TempDir::new().unwrap();
        let config = config(&root).with_default_callback("http://example.test/default");
        let sink = Arc::new(RecordingSink::new());
        let service = service(config, Arc::new(MockScanner::new()), sink.clone());

        let dir = service.stage_bytes("a.exe", b"MZ").await.unwrap();
        service.submit_async(&dir, None, None).await.unwrap();
        service.start().await.unwrap();

        assert!(wait_until(|| sink.call_count() == 1).await);
        assert_eq!(sink.calls()[0].url, "http://example.test/default");
        service.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_submit_async_requires_callback() {
        let root = TempDir::new().unwrap();
        let service = service(
            config(&root),
            Arc::new(MockScanner::new()),
            Arc::new(RecordingSink::new()),
        );

        let err = service
            .submit_async("/tmp/scan_x", Some("  "), None)
            .await
            .unwrap_err();
        assert!(matches!(err, QueueError::InvalidJob { .. }));
        assert_eq!(service.queue_depth(), 0);
    }

    #[tokio::test]
    async fn test_shutdown_rejects_new_work() {
        let root = TempDir::new().unwrap();
        let service = service(
            config(&root),
            Arc::new(MockScanner::new()),
            Arc::new(RecordingSink::new()),
        );
        service.start().await.unwrap();
        assert_eq!(service.worker_states().await.len(), 1);

        service.shutdown().await.unwrap();
        assert!(service.worker_states().await.is_empty());
        assert!(matches!(
            service
                .submit_async("/tmp/scan_x", Some("http://example.test/cb"), None)
                .await,
            Err(QueueError::Closed { .. })
        ));
        assert!(matches!(
            service.submit_sync("/tmp/scan_x", None, None).await,
            Err(ScanError::Cancelled)
        ));
        // Idempotent.
        service.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_version_from_scanner() {
        let root = TempDir::new().unwrap();
        let service = service(
            config(&root),
            Arc::new(MockScanner::new().with_version("2024.06.01")),
            Arc::new(RecordingSink::new()),
        );
        assert_eq!(service.version().await.as_deref(), Some("2024.06.01"));
    }

    #[tokio::test]
    async fn test_build_opens_durable_queue() {
        let root = TempDir::new().unwrap();
        let config = config(&root);
        let queue_dir = config.queue_dir.clone();

        {
            let service = ScanService::builder(config.clone())
                .with_scanner(MockScanner::new())
                .with_callback_sink(RecordingSink::new())
                .build()
                .unwrap();
            service
                .submit_async("/tmp/scan_x", Some("http://example.test/cb"), None)
                .await
                .unwrap();
            service.shutdown().await.unwrap();
        }

        let service = ScanService::builder(config)
            .with_scanner(MockScanner::new())
            .with_callback_sink(RecordingSink::new())
            .build()
            .unwrap();
        assert!(queue_dir.exists());
        assert_eq!(service.queue_depth(), 1);
    }

    #[tokio::test]
    async fn test_callback_drain_on_shutdown() {
        let root = TempDir::new().unwrap();
        let config = config(&root).with_callback_drain(Duration::from_secs(2));
        let sink = Arc::new(RecordingSink::new());
        let service = service(config, Arc::new(MockScanner::new()), sink.clone());

        let dir = service.stage_bytes("a.exe", b"MZ").await.unwrap();
        service
            .submit_sync(&dir, None, Some("http://example.test/cb"))
            .await
            .unwrap();
        service.shutdown().await.unwrap();

        assert_eq!(sink.call_count(), 1);
        assert_eq!(service.callbacks_in_flight(), 0);
    }

    #[tokio::test]
    async fn test_archive_scans_use_archive_timeout() {
        let root = TempDir::new().unwrap();
        let config = config(&root)
            .with_file_timeout(Duration::from_millis(100))
            .with_archive_timeout(Duration::from_secs(5));
        let scanner = Arc::new(MockScanner::new().with_latency(Duration::from_millis(300)));
        let service = service(config, scanner, Arc::new(RecordingSink::new()));

        let dir = service.stage_bytes("a.exe", b"MZ").await.unwrap();
        let body = service.submit_sync(&dir, None, None).await.unwrap();
        assert!(body.contains("timed out"));

        let dir = service.stage_bytes("bundle.zip", b"PK").await.unwrap();
        let body = service.submit_sync_archive(&dir, None, None).await.unwrap();
        assert_eq!(body, r#"{"result":"clean"}"#);
    }

    #[tokio::test]
    async fn test_shutdown_releases_queue_directory() {
        let root = TempDir::new().unwrap();
        let config = config(&root);
        let service = ScanService::builder(config.clone())
            .with_scanner(MockScanner::new())
            .with_callback_sink(RecordingSink::new())
            .build()
            .unwrap();
        service
            .submit_async("/tmp/scan_x", Some("http://example.test/cb"), None)
            .await
            .unwrap();
        service.start().await.unwrap();
        service.shutdown().await.unwrap();

        // The service still holds its queue handle.
        let reopened = RocksQueue::open(
            &config.queue_dir,
            RocksQueueConfig::new().with_name(&config.queue_name),
        )
        .unwrap();
        assert!(reopened.len() <= 1);
        assert_eq!(service.queue_depth(), reopened.len());
    }

    #[derive(Debug)]
    struct PanickingScanner;

    #[async_trait::async_trait]
    impl Scanner for PanickingScanner {
        fn name(&self) -> &str {
            "panicking"
        }

        async fn scan(&self, _dir: &Path, _timeout: Duration) -> Result<String, ScanError> {
            panic!("engine binding crashed");
        }
    }

    #[tokio::test]
    async fn test_shutdown_closes_queue_when_worker_failed() {
        let root = TempDir::new().unwrap();
        let queue = Arc::new(MemoryQueue::default());
        let service = ScanService::builder(config(&root))
            .with_arc_queue(queue.clone())
            .with_scanner(PanickingScanner)
            .with_callback_sink(RecordingSink::new())
            .build()
            .unwrap();

        service
            .submit_async("/tmp/scan_x", Some("http://example.test/cb"), None)
            .await
            .unwrap();
        service.start().await.unwrap();
        assert!(wait_until(|| queue.is_empty()).await);

        assert!(matches!(
            service.shutdown().await,
            Err(ScanError::Internal { .. })
        ));
        assert!(matches!(
            queue.enqueue_raw(b"{}".to_vec()),
            Err(QueueError::Closed { .. })
        ));
    }

    #[test]
    fn test_resolve_timeout_passthrough() {
        assert_eq!(
            ScanService::resolve_timeout(Some("5m"), Duration::from_secs(60)),
            Duration::from_secs(300)
        );
    }
}
