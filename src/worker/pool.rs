//! The worker pool that drains the job queue.

use crate::callback::{CallbackDispatcher, NoOpSink};
use crate::core::{ArcScanner, ScanError, ScanResult, Scanner};
use crate::queue::{ArcQueue, JobQueue};
use crate::worker::config::WorkerPoolConfig;
use crate::worker::failure::FailurePolicy;
use crate::worker::worker::{Worker, WorkerState, WorkerStatus};

use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Builder for a [`WorkerPool`].
pub struct WorkerPoolBuilder {
    queue: ArcQueue,
    scanner: ArcScanner,
    dispatcher: Option<CallbackDispatcher>,
    policy: FailurePolicy,
    config: WorkerPoolConfig,
}

impl WorkerPoolBuilder {
    fn new(queue: ArcQueue, scanner: ArcScanner) -> Self {
        Self {
            queue,
            scanner,
            dispatcher: None,
            policy: FailurePolicy::default(),
            config: WorkerPoolConfig::default(),
        }
    }

    /// Sets the dispatcher that delivers results.
    ///
    /// Without one, results are discarded.
    pub fn with_dispatcher(mut self, dispatcher: CallbackDispatcher) -> Self {
        self.dispatcher = Some(dispatcher);
        self
    }

    /// Sets the policy for failed scans.
    pub fn with_failure_policy(mut self, policy: FailurePolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Sets the pool configuration.
    pub fn with_config(mut self, config: WorkerPoolConfig) -> Self {
        self.config = config;
        self
    }

    /// Spawns the workers on the current Tokio runtime.
    pub fn start(self) -> Result<WorkerPool, ScanError> {
        self.config.validate()?;

        let dispatcher = self
            .dispatcher
            .unwrap_or_else(|| CallbackDispatcher::new(NoOpSink));
        let shutdown = CancellationToken::new();
        let mut statuses = Vec::with_capacity(self.config.workers);
        let mut handles = Vec::with_capacity(self.config.workers);

        for id in 0..self.config.workers {
            let status = Arc::new(WorkerStatus::new());
            let worker = Worker {
                id,
                queue: Arc::clone(&self.queue),
                scanner: Arc::clone(&self.scanner),
                dispatcher: dispatcher.clone(),
                policy: self.policy.clone(),
                poll_interval: self.config.poll_interval,
                status: Arc::clone(&status),
            };
            statuses.push(status);
            handles.push(tokio::spawn(worker.run(shutdown.child_token())));
        }

        tracing::info!(
            workers = self.config.workers,
            queue = %self.queue.name(),
            scanner = %self.scanner.name(),
            poll_interval = ?self.config.poll_interval,
            "Worker pool started"
        );

        Ok(WorkerPool {
            queue: self.queue,
            dispatcher,
            shutdown,
            statuses,
            handles,
        })
    }
}

impl std::fmt::Debug for WorkerPoolBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerPoolBuilder")
            .field("queue", &self.queue.name())
            .field("scanner", &self.scanner.name())
            .field("policy", &self.policy)
            .field("config", &self.config)
            .finish()
    }
}

/// A fixed set of workers polling one queue.
///
/// Each worker wakes every poll interval and drains the queue until it is
/// empty. Dropping the pool without calling [`shutdown`](Self::shutdown)
/// leaves the workers running until the runtime stops.
pub struct WorkerPool {
    queue: ArcQueue,
    dispatcher: CallbackDispatcher,
    shutdown: CancellationToken,
    statuses: Vec<Arc<WorkerStatus>>,
    handles: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    /// Creates a builder for a pool over `queue` using `scanner`.
    pub fn builder(queue: ArcQueue, scanner: ArcScanner) -> WorkerPoolBuilder {
        WorkerPoolBuilder::new(queue, scanner)
    }

    /// Creates a builder from concrete queue and scanner types.
    pub fn builder_from<Q, S>(queue: Q, scanner: S) -> WorkerPoolBuilder
    where
        Q: JobQueue + 'static,
        S: Scanner + 'static,
    {
        WorkerPoolBuilder::new(Arc::new(queue), Arc::new(scanner))
    }

    /// Returns the number of workers.
    pub fn size(&self) -> usize {
        self.statuses.len()
    }

    /// Returns the current state of every worker, indexed by worker id.
    pub fn states(&self) -> Vec<WorkerState> {
        self.statuses.iter().map(|s| s.get()).collect()
    }

    /// Returns the number of callback deliveries still running.
    pub fn in_flight(&self) -> usize {
        self.dispatcher.in_flight()
    }

    /// Returns the dispatcher shared by the workers.
    pub fn dispatcher(&self) -> &CallbackDispatcher {
        &self.dispatcher
    }

    /// Stops every worker and waits for them to exit.
    ///
    /// A worker in the middle of a drain keeps going until the queue is
    /// empty, then exits. Callbacks already dispatched are not awaited.
    /// Calling this twice is harmless.
    pub async fn shutdown(&mut self) -> ScanResult<()> {
        self.shutdown.cancel();
        let handles = std::mem::take(&mut self.handles);
        if handles.is_empty() {
            return Ok(());
        }

        let mut panicked = 0usize;
        for result in futures::future::join_all(handles).await {
            if let Err(e) = result {
                tracing::error!(error = %e, "Worker task failed");
                panicked += 1;
            }
        }

        tracing::info!(
            queue = %self.queue.name(),
            remaining = self.queue.len(),
            "Worker pool stopped"
        );

        if panicked > 0 {
            return Err(ScanError::internal(format!(
                "{panicked} worker task(s) did not exit cleanly"
            )));
        }
        Ok(())
    }
}

impl std::fmt::Debug for WorkerPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerPool")
            .field("queue", &self.queue.name())
            .field("states", &self.states())
            .field("in_flight", &self.in_flight())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::MockScanner;
    use crate::callback::RecordingSink;
    use crate::core::JobDescriptor;
    use crate::queue::MemoryQueue;
    use std::collections::HashSet;
    use std::path::PathBuf;
    use std::time::{Duration, Instant};
    use tempfile::TempDir;

    const POLL: Duration = Duration::from_millis(20);

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

    fn staging(root: &TempDir, n: usize) -> PathBuf {
        let dir = root.path().join(format!("scan_{n}"));
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("sample.bin"), b"MZ").unwrap();
        dir
    }

    fn job(dir: &PathBuf, timeout: Duration) -> JobDescriptor {
        JobDescriptor::new(dir, "http://example.test/cb", timeout).unwrap()
    }

    fn config(workers: usize) -> WorkerPoolConfig {
        WorkerPoolConfig::new()
            .with_workers(workers)
            .with_poll_interval(POLL)
    }

    #[tokio::test]
    async fn test_processes_jobs_and_delivers() {
        let root = TempDir::new().unwrap();
        let queue: ArcQueue = Arc::new(MemoryQueue::default());
        let sink = Arc::new(RecordingSink::new());
        let scanner = Arc::new(MockScanner::new().with_output(r#"{"dir":"{dir}"}"#));

        let dirs: Vec<_> = (0..3).map(|n| staging(&root, n)).collect();
        for dir in &dirs {
            queue.enqueue(&job(dir, Duration::from_secs(2))).await.unwrap();
        }

        let mut pool = WorkerPool::builder(queue.clone(), scanner.clone())
            .with_dispatcher(CallbackDispatcher::from_arc(sink.clone()))
            .with_config(config(1))
            .start()
            .unwrap();

        assert!(wait_until(|| sink.call_count() == 3).await);
        pool.shutdown().await.unwrap();

        assert!(queue.is_empty());
        for dir in &dirs {
            assert!(!dir.exists());
        }
        let calls = sink.calls();
        assert!(calls.iter().all(|c| c.url == "http://example.test/cb"));
        assert!(calls.iter().any(|c| c.body.contains("scan_0")));
    }

    #[tokio::test]
    async fn test_failed_job_is_dropped() {
        let root = TempDir::new().unwrap();
        let queue: ArcQueue = Arc::new(MemoryQueue::default());
        let sink = Arc::new(RecordingSink::new());
        let scanner = Arc::new(MockScanner::new().with_failure("engine crashed"));
        let dir = staging(&root, 0);
        queue.enqueue(&job(&dir, Duration::from_secs(2))).await.unwrap();

        let mut pool = WorkerPool::builder(queue.clone(), scanner.clone())
            .with_dispatcher(CallbackDispatcher::from_arc(sink.clone()))
            .with_config(config(1))
            .start()
            .unwrap();

        assert!(wait_until(|| !dir.exists()).await);
        pool.shutdown().await.unwrap();

        assert_eq!(scanner.scan_count(), 1);
        assert_eq!(sink.call_count(), 0);
        assert!(queue.is_empty());
    }

    #[tokio::test]
    async fn test_timed_out_job_is_dropped() {
        let root = TempDir::new().unwrap();
        let queue: ArcQueue = Arc::new(MemoryQueue::default());
        let sink = Arc::new(RecordingSink::new());
        let scanner = Arc::new(MockScanner::new().with_latency(Duration::from_secs(5)));
        let dir = staging(&root, 0);
        queue
            .enqueue(&job(&dir, Duration::from_millis(200)))
            .await
            .unwrap();

        let mut pool = WorkerPool::builder(queue.clone(), scanner.clone())
            .with_dispatcher(CallbackDispatcher::from_arc(sink.clone()))
            .with_config(config(1))
            .start()
            .unwrap();

        assert!(wait_until(|| !dir.exists()).await);
        pool.shutdown().await.unwrap();

        assert_eq!(sink.call_count(), 0);
        assert!(queue.is_empty());
    }

    #[tokio::test]
    async fn test_requeue_until_attempts_exhausted() {
        let root = TempDir::new().unwrap();
        let queue: ArcQueue = Arc::new(MemoryQueue::default());
        let scanner = Arc::new(MockScanner::new().with_failure("flaky"));
        let dir = staging(&root, 0);
        queue.enqueue(&job(&dir, Duration::from_secs(2))).await.unwrap();

        let mut pool = WorkerPool::builder(queue.clone(), scanner.clone())
            .with_failure_policy(FailurePolicy::requeue(3))
            .with_config(config(1))
            .start()
            .unwrap();

        assert!(wait_until(|| !dir.exists()).await);
        pool.shutdown().await.unwrap();

        assert_eq!(scanner.scan_count(), 3);
        assert!(queue.is_empty());
    }

    #[tokio::test]
    async fn test_dead_letter_keeps_staging() {
        let root = TempDir::new().unwrap();
        let queue: ArcQueue = Arc::new(MemoryQueue::default());
        let dead_letters: ArcQueue = Arc::new(MemoryQueue::new("dead"));
        let scanner = Arc::new(MockScanner::new().with_failure("engine crashed"));
        let dir = staging(&root, 0);
        queue.enqueue(&job(&dir, Duration::from_secs(2))).await.unwrap();

        let mut pool = WorkerPool::builder(queue.clone(), scanner.clone())
            .with_failure_policy(FailurePolicy::dead_letter(dead_letters.clone()))
            .with_config(config(1))
            .start()
            .unwrap();

        assert!(wait_until(|| dead_letters.len() == 1).await);
        pool.shutdown().await.unwrap();

        assert!(dir.exists());
        assert!(queue.is_empty());
        let parked = dead_letters.dequeue().await.unwrap().unwrap();
        assert_eq!(parked.directory, dir);
        assert_eq!(parked.attempts, 1);
    }

    #[tokio::test]
    async fn test_shutdown_stops_all_workers() {
        let queue: ArcQueue = Arc::new(MemoryQueue::default());
        let mut pool = WorkerPool::builder(queue.clone(), Arc::new(MockScanner::new()))
            .with_config(config(4))
            .start()
            .unwrap();
        assert_eq!(pool.size(), 4);

        pool.shutdown().await.unwrap();
        assert!(pool
            .states()
            .iter()
            .all(|state| *state == WorkerState::Stopped));

        // A second call has nothing left to join.
        pool.shutdown().await.unwrap();
        queue.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_shutdown_finishes_current_drain() {
        let root = TempDir::new().unwrap();
        let queue: ArcQueue = Arc::new(MemoryQueue::default());
        let scanner = Arc::new(MockScanner::new().with_latency(Duration::from_millis(50)));
        let dirs: Vec<_> = (0..4).map(|n| staging(&root, n)).collect();
        for dir in &dirs {
            queue.enqueue(&job(dir, Duration::from_secs(2))).await.unwrap();
        }

        let mut pool = WorkerPool::builder(queue.clone(), scanner.clone())
            .with_config(config(1))
            .start()
            .unwrap();

        assert!(wait_until(|| scanner.scan_count() >= 1).await);
        pool.shutdown().await.unwrap();

        assert_eq!(scanner.scan_count(), 4);
        assert!(queue.is_empty());
        assert_eq!(pool.states(), vec![WorkerState::Stopped]);
    }

    #[tokio::test]
    async fn test_corrupt_record_does_not_stop_worker() {
        let root = TempDir::new().unwrap();
        let memory = Arc::new(MemoryQueue::default());
        memory.enqueue_raw(b"not json".to_vec()).unwrap();
        let dir = staging(&root, 0);
        memory.enqueue(&job(&dir, Duration::from_secs(2))).await.unwrap();

        let sink = Arc::new(RecordingSink::new());
        let queue: ArcQueue = memory.clone();
        let mut pool = WorkerPool::builder(queue, Arc::new(MockScanner::new()))
            .with_dispatcher(CallbackDispatcher::from_arc(sink.clone()))
            .with_config(config(1))
            .start()
            .unwrap();

        assert!(wait_until(|| sink.call_count() == 1).await);
        pool.shutdown().await.unwrap();
        assert!(memory.is_empty());
    }

    #[tokio::test]
    async fn test_each_job_scanned_once_across_workers() {
        let root = TempDir::new().unwrap();
        let queue: ArcQueue = Arc::new(MemoryQueue::default());
        let sink = Arc::new(RecordingSink::new());
        let scanner = Arc::new(MockScanner::new().with_latency(Duration::from_millis(5)));

        let dirs: Vec<_> = (0..40).map(|n| staging(&root, n)).collect();
        for dir in &dirs {
            queue.enqueue(&job(dir, Duration::from_secs(2))).await.unwrap();
        }

        let mut pool = WorkerPool::builder(queue.clone(), scanner.clone())
            .with_dispatcher(CallbackDispatcher::from_arc(sink.clone()))
            .with_config(config(4))
            .start()
            .unwrap();

        assert!(wait_until(|| sink.call_count() == dirs.len()).await);
        pool.shutdown().await.unwrap();

        let scanned = scanner.scanned_dirs();
        let unique: HashSet<_> = scanned.iter().collect();
        assert_eq!(scanned.len(), dirs.len());
        assert_eq!(unique.len(), dirs.len());
    }

    #[tokio::test]
    async fn test_single_worker_preserves_order() {
        let root = TempDir::new().unwrap();
        let queue: ArcQueue = Arc::new(MemoryQueue::default());
        let scanner = Arc::new(MockScanner::new());

        let dirs: Vec<_> = (0..5).map(|n| staging(&root, n)).collect();
        for dir in &dirs {
            queue.enqueue(&job(dir, Duration::from_secs(2))).await.unwrap();
        }

        let mut pool = WorkerPool::builder(queue.clone(), scanner.clone())
            .with_config(config(1))
            .start()
            .unwrap();

        assert!(wait_until(|| scanner.scan_count() == 5).await);
        pool.shutdown().await.unwrap();
        assert_eq!(scanner.scanned_dirs(), dirs);
    }

    #[tokio::test]
    async fn test_rejects_invalid_config() {
        let config = WorkerPoolConfig::new().with_poll_interval(Duration::ZERO);
        let result = WorkerPool::builder_from(MemoryQueue::default(), MockScanner::new())
            .with_config(config)
            .start();
        assert!(matches!(result, Err(ScanError::Configuration { .. })));
    }
}
