//! Basic queue example demonstrating queued and synchronous scans.
//!
//! This example shows how to:
//! - Build a ScanService over a durable queue
//! - Stage uploads and queue them for background scanning
//! - Run a synchronous scan and read the response body
//! - Shut the service down cleanly
//!
//! Run with: cargo run --example basic_queue

use scanspool::backends::MockScanner;
use scanspool::callback::RecordingSink;
use scanspool::prelude::*;

use std::sync::Arc;
use std::time::Duration;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,scanspool=debug".into()),
        )
        .init();

    println!("=== Scanspool Basic Queue Example ===\n");

    let root = tempfile::tempdir()?;
    let config = ScanServiceConfig::new()
        .with_staging_dir(root.path().join("staging"))
        .with_queue_dir(root.path().join("queue"))
        .with_workers(2)
        .with_poll_interval(Duration::from_millis(100))
        .with_callback_drain(Duration::from_secs(2));

    // Stand-in for the real engine and callback receiver
    let scanner = MockScanner::new()
        .with_name("example-engine")
        .with_output(r#"{"verdict":"clean","path":"{dir}/upload.bin"}"#)
        .with_latency(Duration::from_millis(200))
        .with_version("example-2024.06");
    let sink = Arc::new(RecordingSink::new());

    let service = ScanService::builder(config)
        .with_scanner(scanner)
        .with_arc_callback_sink(sink.clone())
        .build()?;

    println!(
        "Engine version: {}",
        service.version().await.unwrap_or_else(|| "unknown".into())
    );

    // Synchronous path: the response body has the staging path scrubbed
    let dir = service.stage_bytes("upload.bin", b"hello").await?;
    let body = service.submit_sync(&dir, None, None).await?;
    println!("Synchronous result: {body}\n");

    // Asynchronous path: queue a few jobs, then start the workers
    for n in 0..3 {
        let dir = service
            .stage_bytes(&format!("upload_{n}.bin"), b"hello")
            .await?;
        let timeout = ScanService::resolve_timeout(Some("2s"), Duration::from_secs(60));
        let depth = service
            .submit_async(&dir, Some("http://localhost:8080/scan-result"), Some(timeout))
            .await?;
        println!("Queued {} (depth {depth})", dir.display());
    }

    service.start().await?;

    while service.queue_depth() > 0 || sink.call_count() < 3 {
        tokio::time::sleep(Duration::from_millis(100)).await;
    }

    println!("\n=== Callbacks ===");
    for call in sink.calls() {
        println!("{} <- {}", call.url, call.body);
    }

    service.shutdown().await?;
    println!("\nService stopped.");
    Ok(())
}
