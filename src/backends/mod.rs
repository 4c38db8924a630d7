//! Scanning backend implementations.
//!
//! This module contains implementations of the `Scanner` trait.
//!
//! ## Available Backends
//!
//! - [`command`] - Runs an external engine binary as a subprocess
//! - [`mock`] - A mock scanner for testing
//!
//! ## Implementing a Custom Backend
//!
//! ```rust,ignore
//! use scanspool::core::{Scanner, ScanError};
//! use async_trait::async_trait;
//! use std::path::Path;
//! use std::time::Duration;
//!
//! #[derive(Debug)]
//! pub struct MyScanner;
//!
//! #[async_trait]
//! impl Scanner for MyScanner {
//!     fn name(&self) -> &str {
//!         "my-scanner"
//!     }
//!
//!     async fn scan(&self, dir: &Path, timeout: Duration) -> Result<String, ScanError> {
//!         todo!()
//!     }
//! }
//! ```

pub mod command;
pub mod mock;

pub use command::{CommandScanner, CommandScannerConfig};
pub use mock::MockScanner;
