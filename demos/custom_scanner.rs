//! Custom scanner example demonstrating how to plug in a new engine.
//!
//! This example shows how to:
//! - Implement the Scanner trait for a custom engine
//! - Run a WorkerPool directly over an in-memory queue
//! - Use a failure policy that moves failed jobs to a dead-letter queue
//!
//! Run with: cargo run --example custom_scanner

use async_trait::async_trait;
use scanspool::callback::RecordingSink;
use scanspool::prelude::*;
use scanspool::queue::ArcQueue;
use scanspool::worker::WorkerPoolConfig;

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

/// A scanner that flags any staged file whose name matches a blocklist.
#[derive(Debug)]
struct FileNameScanner {
    name: String,
    blocked: Vec<String>,
}

impl FileNameScanner {
    fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            blocked: Vec::new(),
        }
    }

    fn with_blocked(mut self, file_name: impl Into<String>) -> Self {
        self.blocked.push(file_name.into());
        self
    }
}

#[async_trait]
impl Scanner for FileNameScanner {
    fn name(&self) -> &str {
        &self.name
    }

    async fn scan(&self, dir: &Path, timeout: Duration) -> Result<String, ScanError> {
        let listing = async {
            let mut names = Vec::new();
            let mut entries = tokio::fs::read_dir(dir).await?;
            while let Some(entry) = entries.next_entry().await? {
                names.push(entry.file_name().to_string_lossy().into_owned());
            }
            Ok::<_, std::io::Error>(names)
        };

        let names = tokio::time::timeout(timeout, listing)
            .await
            .map_err(|_| ScanError::timeout(&self.name, dir.display().to_string(), timeout))?
            .map_err(|e| ScanError::execution(&self.name, e.to_string()))?;

        let hits: Vec<_> = names
            .iter()
            .filter(|n| self.blocked.contains(n))
            .cloned()
            .collect();
        Ok(serde_json::json!({ "files": names.len(), "blocked": hits }).to_string())
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .init();

    println!("=== Scanspool Custom Scanner Example ===\n");

    let root = tempfile::tempdir()?;
    let scanner = FileNameScanner::new("filename-blocklist").with_blocked("evil.exe");

    let queue: ArcQueue = Arc::new(MemoryQueue::new("jobs"));
    let dead_letters: ArcQueue = Arc::new(MemoryQueue::new("jobs-dead"));
    let sink = Arc::new(RecordingSink::new());

    // Two staged directories and one that was never created
    for (n, file) in ["report.pdf", "evil.exe"].iter().enumerate() {
        let dir = root.path().join(format!("scan_{n}"));
        std::fs::create_dir_all(&dir)?;
        std::fs::write(dir.join(file), b"data")?;
        let job = JobDescriptor::new(&dir, "http://localhost:8080/cb", Duration::from_secs(2))?;
        queue.enqueue(&job).await?;
    }
    let missing = JobDescriptor::new(
        root.path().join("scan_missing"),
        "http://localhost:8080/cb",
        Duration::from_secs(2),
    )?;
    queue.enqueue(&missing).await?;

    let mut pool = WorkerPool::builder(Arc::clone(&queue), Arc::new(scanner))
        .with_dispatcher(CallbackDispatcher::from_arc(sink.clone()))
        .with_failure_policy(FailurePolicy::dead_letter(Arc::clone(&dead_letters)))
        .with_config(
            WorkerPoolConfig::new()
                .with_workers(1)
                .with_poll_interval(Duration::from_millis(50)),
        )
        .start()?;

    while sink.call_count() < 2 || dead_letters.is_empty() {
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    pool.shutdown().await?;

    println!("=== Delivered ===");
    for call in sink.calls() {
        println!("{}", call.body);
    }

    println!("\n=== Dead letters ===");
    while let Some(job) = dead_letters.dequeue().await? {
        println!("{} (attempts: {})", job.directory.display(), job.attempts);
    }

    Ok(())
}
