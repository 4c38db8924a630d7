//! Callback sink trait definition.

use crate::core::{DeliveryError, DeliveryResult};

use async_trait::async_trait;
use parking_lot::Mutex;
use std::fmt::Debug;

/// Delivers a scan result to a caller-supplied URL.
///
/// A sink performs exactly one attempt; retries are not part of the
/// contract. Fire-and-forget semantics are added by
/// [`CallbackDispatcher`](crate::callback::CallbackDispatcher).
#[async_trait]
pub trait CallbackSink: Send + Sync + Debug {
    /// Sends `body` to `url` as a JSON document.
    async fn deliver(&self, url: &str, body: String) -> DeliveryResult<()>;
}

/// A sink that discards every result.
///
/// Useful when callbacks are disabled.
#[derive(Debug, Default)]
pub struct NoOpSink;

impl NoOpSink {
    /// Creates a new no-op sink.
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl CallbackSink for NoOpSink {
    async fn deliver(&self, url: &str, _body: String) -> DeliveryResult<()> {
        tracing::debug!(url = %url, "NoOp callback sink: result discarded");
        Ok(())
    }
}

/// A delivered callback, as seen by a [`RecordingSink`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedCallback {
    /// Target URL.
    pub url: String,
    /// Delivered body.
    pub body: String,
}

/// A sink that records deliveries in memory instead of sending them.
///
/// Lets tests assert exactly which callbacks fired.
#[derive(Debug, Default)]
pub struct RecordingSink {
    calls: Mutex<Vec<RecordedCallback>>,
    fail_with_status: Option<u16>,
}

impl RecordingSink {
    /// Creates a sink that accepts every delivery.
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every delivery fail with the given HTTP status after recording it.
    pub fn failing(status: u16) -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            fail_with_status: Some(status),
        }
    }

    /// Returns the deliveries recorded so far.
    pub fn calls(&self) -> Vec<RecordedCallback> {
        self.calls.lock().clone()
    }

    /// Returns the number of deliveries recorded so far.
    pub fn call_count(&self) -> usize {
        self.calls.lock().len()
    }
}

#[async_trait]
impl CallbackSink for RecordingSink {
    async fn deliver(&self, url: &str, body: String) -> DeliveryResult<()> {
        self.calls.lock().push(RecordedCallback {
            url: url.to_string(),
            body,
        });
        match self.fail_with_status {
            Some(status) => Err(DeliveryError::Status {
                url: url.to_string(),
                status,
            }),
            None => Ok(()),
        }
    }
}
