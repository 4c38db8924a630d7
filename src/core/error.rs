//! Error types for the scanspool library.
//!
//! Failures are split by the component that raises them: the scan engine
//! (`ScanError`), the durable queue (`QueueError`) and callback delivery
//! (`DeliveryError`). The library never panics; all errors are returned as
//! `Result` values.

use std::time::Duration;
use thiserror::Error;

/// Errors raised while invoking the external scan engine.
#[derive(Debug, Error)]
pub enum ScanError {
    /// The scan exceeded its time budget and the engine was terminated.
    #[error("scan of '{dir}' timed out after {elapsed:?} on engine '{engine}'")]
    Timeout {
        /// Name of the engine that timed out.
        engine: String,
        /// Directory that was being scanned.
        dir: String,
        /// How long the scan ran before it was terminated.
        elapsed: Duration,
    },

    /// The engine could not be started or exited unsuccessfully.
    #[error("engine '{engine}' failed: {message}")]
    Execution {
        /// Name of the engine.
        engine: String,
        /// Underlying failure message (spawn error or stderr).
        message: String,
        /// Exit code, if the process ran to completion.
        exit_code: Option<i32>,
    },

    /// An I/O error occurred outside the engine itself.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration error.
    #[error("configuration error: {message}")]
    Configuration {
        /// Description of the configuration error.
        message: String,
    },

    /// The service is shutting down and no longer accepts work.
    #[error("scan was cancelled")]
    Cancelled,

    /// An internal error occurred.
    #[error("internal error: {message}")]
    Internal {
        /// Description of the internal error.
        message: String,
    },
}

impl ScanError {
    /// Returns `true` if the scan was terminated because of its deadline.
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }

    /// Returns the engine name if this error is associated with one.
    pub fn engine(&self) -> Option<&str> {
        match self {
            Self::Timeout { engine, .. } | Self::Execution { engine, .. } => Some(engine),
            _ => None,
        }
    }

    /// Creates a `Timeout` error.
    pub fn timeout(engine: impl Into<String>, dir: impl Into<String>, elapsed: Duration) -> Self {
        Self::Timeout {
            engine: engine.into(),
            dir: dir.into(),
            elapsed,
        }
    }

    /// Creates an `Execution` error.
    pub fn execution(engine: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Execution {
            engine: engine.into(),
            message: message.into(),
            exit_code: None,
        }
    }

    /// Creates an `Internal` error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Creates a `Configuration` error.
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }
}

/// Errors raised by the durable job queue.
#[derive(Debug, Error)]
pub enum QueueError {
    /// The underlying store could not be read or written.
    #[error("queue storage error on '{queue}': {message}")]
    Storage {
        /// Name of the queue.
        queue: String,
        /// Message from the storage engine.
        message: String,
    },

    /// A stored record could not be decoded into a job descriptor.
    #[error("failed to decode job descriptor: {reason}")]
    Decode {
        /// Why decoding failed.
        reason: String,
    },

    /// The job descriptor is not acceptable for queueing.
    #[error("invalid job: {reason}")]
    InvalidJob {
        /// Why the job was rejected.
        reason: String,
    },

    /// The queue has been closed.
    #[error("queue '{queue}' is closed")]
    Closed {
        /// Name of the queue.
        queue: String,
    },
}

impl QueueError {
    /// Creates a `Storage` error.
    pub fn storage(queue: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Storage {
            queue: queue.into(),
            message: message.into(),
        }
    }

    /// Creates a `Decode` error.
    pub fn decode(reason: impl Into<String>) -> Self {
        Self::Decode {
            reason: reason.into(),
        }
    }

    /// Creates an `InvalidJob` error.
    pub fn invalid_job(reason: impl Into<String>) -> Self {
        Self::InvalidJob {
            reason: reason.into(),
        }
    }

    /// Returns `true` if the error lost a single record rather than the store.
    pub fn is_decode(&self) -> bool {
        matches!(self, Self::Decode { .. })
    }
}

/// Errors raised while delivering a result to a callback URL.
#[derive(Debug, Error)]
pub enum DeliveryError {
    /// The request could not be sent or the response could not be read.
    #[error("callback to '{url}' failed: {message}")]
    Request {
        /// Callback URL.
        url: String,
        /// Transport error message.
        message: String,
    },

    /// The receiver answered with a non-success status.
    #[error("callback to '{url}' returned status {status}")]
    Status {
        /// Callback URL.
        url: String,
        /// HTTP status code.
        status: u16,
    },
}

/// A specialized `Result` type for scan operations.
pub type ScanResult<T> = Result<T, ScanError>;

/// A specialized `Result` type for queue operations.
pub type QueueResult<T> = Result<T, QueueError>;

/// A specialized `Result` type for callback delivery.
pub type DeliveryResult<T> = Result<T, DeliveryError>;
