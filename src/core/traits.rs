//! Core traits for the scanspool library.
//!
//! This module defines the `Scanner` trait that wraps a single bounded
//! invocation of an external scan engine.

use crate::core::error::ScanError;

use async_trait::async_trait;
use std::fmt::Debug;
use std::path::Path;
use std::time::Duration;

/// A bounded call into an external scanning engine.
///
/// # Implementation Notes
///
/// - Implementations must be `Send + Sync`; one scanner is shared by every worker.
/// - `scan` must enforce `timeout` itself and fail with `ScanError::Timeout`
///   once it expires, leaving nothing running behind it.
/// - `scan` must not delete `dir`; cleanup belongs to the caller.
/// - The returned text is opaque to the library and is never parsed.
///
/// # Example Implementation
///
/// ```rust,ignore
/// use scanspool::core::{Scanner, ScanError};
/// use async_trait::async_trait;
/// use std::path::Path;
/// use std::time::Duration;
///
/// #[derive(Debug)]
/// struct EchoScanner;
///
/// #[async_trait]
/// impl Scanner for EchoScanner {
///     fn name(&self) -> &str {
///         "echo"
///     }
///
///     async fn scan(&self, dir: &Path, _timeout: Duration) -> Result<String, ScanError> {
///         Ok(format!("{{\"dir\":\"{}\"}}", dir.display()))
///     }
/// }
/// ```
#[async_trait]
pub trait Scanner: Send + Sync + Debug {
    /// Returns a stable identifier for this engine, like `"hmb"`.
    fn name(&self) -> &str;

    /// Scans `dir`, giving up after `timeout`.
    ///
    /// # Errors
    ///
    /// - `Timeout` - the deadline expired and the engine was terminated.
    /// - `Execution` - the engine could not start or exited unsuccessfully.
    async fn scan(&self, dir: &Path, timeout: Duration) -> Result<String, ScanError>;

    /// Returns the engine's signature database version, if known.
    async fn signature_version(&self) -> Option<String> {
        None
    }
}

/// An arc-wrapped scanner for shared ownership.
pub type ArcScanner = std::sync::Arc<dyn Scanner>;
