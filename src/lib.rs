//! # Scanspool
//!
//! A durable job queue and worker pool for running an external malware
//! scan engine over staged directories and delivering the results to
//! callback URLs.
//!
//! ## Overview
//!
//! Scanspool sits between a submission front end and a command-line scan
//! engine:
//!
//! - Synchronous submissions scan a staged directory immediately and return
//!   the engine's output (or an `{"error": "..."}` payload)
//! - Asynchronous submissions are written to a crash-persistent FIFO queue
//!   and picked up by a fixed pool of polling workers
//! - Each queued scan runs under a hard timeout; the engine process is
//!   killed when it expires
//! - Results are POSTed to the job's callback URL without blocking the worker
//! - Failed queued scans follow a [`FailurePolicy`](worker::FailurePolicy):
//!   dropped silently by default, optionally requeued or dead-lettered
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use scanspool::prelude::*;
//! use scanspool::backends::MockScanner;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = ScanServiceConfig::new()
//!         .with_queue_dir("/var/lib/scanspool/queue")
//!         .with_workers(2);
//!
//!     let service = ScanService::builder(config)
//!         .with_scanner(MockScanner::new())
//!         .build()?;
//!     service.start().await?;
//!
//!     let dir = service.stage_bytes("upload.bin", b"file content").await?;
//!     let depth = service
//!         .submit_async(&dir, Some("http://localhost:8080/cb"), None)
//!         .await?;
//!     println!("queued, depth {depth}");
//!
//!     service.shutdown().await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Features
//!
//! - `default` - Includes the HTTP callback sink
//! - `http-callback` - Deliver results with `reqwest`
//!
//! ## Architecture
//!
//! - **Core**: Job descriptors, the `Scanner` trait, errors and output shaping
//! - **Queue**: The durable RocksDB-backed queue and an in-memory variant
//! - **Backends**: The subprocess scanner and a mock for tests
//! - **Callback**: Fire-and-forget result delivery
//! - **Worker**: The polling worker pool and failure policies
//! - **Service**: The submission facade and its configuration
//! - **Audit**: Structured job lifecycle events

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(unsafe_code)]

pub mod audit;
pub mod backends;
pub mod callback;
pub mod core;
pub mod queue;
pub mod service;
pub mod worker;

// Re-export commonly used types at the crate root
pub use crate::core::{
    DeliveryError, JobDescriptor, QueueError, QueueResult, ScanError, ScanResult, Scanner,
};

pub use crate::callback::{CallbackDispatcher, CallbackSink};
pub use crate::queue::{JobQueue, MemoryQueue, RocksQueue};
pub use crate::service::{ScanService, ScanServiceConfig};
pub use crate::worker::{FailurePolicy, WorkerPool, WorkerState};

/// Prelude module for convenient imports.
///
/// ```rust
/// use scanspool::prelude::*;
/// ```
pub mod prelude {
    pub use crate::core::{
        DeliveryError, JobDescriptor, QueueError, QueueResult, ScanError, ScanResult, Scanner,
    };
    pub use crate::callback::{CallbackDispatcher, CallbackSink};
    pub use crate::queue::{JobQueue, MemoryQueue, RocksQueue};
    pub use crate::service::{ScanService, ScanServiceConfig};
    pub use crate::worker::{FailurePolicy, WorkerPool, WorkerState};
}
