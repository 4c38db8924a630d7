//! Fire-and-forget callback dispatch.

use crate::callback::traits::CallbackSink;

use std::sync::Arc;
use std::time::Duration;
use tokio_util::task::TaskTracker;

/// Hands scan results to a [`CallbackSink`] on detached tasks.
///
/// `dispatch` returns immediately; the delivery runs on its own task and a
/// failure is only logged. Deliveries are tracked so shutdown may choose to
/// wait for them with [`drain`](Self::drain).
#[derive(Debug, Clone)]
pub struct CallbackDispatcher {
    sink: Arc<dyn CallbackSink>,
    tracker: TaskTracker,
}

impl CallbackDispatcher {
    /// Creates a dispatcher for the given sink.
    pub fn new<S: CallbackSink + 'static>(sink: S) -> Self {
        Self::from_arc(Arc::new(sink))
    }

    /// Creates a dispatcher for a shared sink.
    pub fn from_arc(sink: Arc<dyn CallbackSink>) -> Self {
        Self {
            sink,
            tracker: TaskTracker::new(),
        }
    }

    /// Starts delivery of `result` to `url` and returns without waiting.
    ///
    /// An empty `url` is a no-op. Must be called from within a Tokio runtime.
    pub fn dispatch(&self, url: &str, result: String) {
        let url = url.trim();
        if url.is_empty() {
            tracing::debug!("No callback URL; result not delivered");
            return;
        }

        let sink = Arc::clone(&self.sink);
        let url = url.to_string();
        self.tracker.spawn(async move {
            match sink.deliver(&url, result).await {
                Ok(()) => crate::audit::emit_callback_delivered(&url),
                Err(e) => crate::audit::emit_callback_failed(&url, &e),
            }
        });
    }

    /// Returns the number of deliveries still running.
    pub fn in_flight(&self) -> usize {
        self.tracker.len()
    }

    /// Waits up to `timeout` for running deliveries.
    ///
    /// Returns `true` if all of them finished in time.
    pub async fn drain(&self, timeout: Duration) -> bool {
        self.tracker.close();
        let drained = tokio::time::timeout(timeout, self.tracker.wait())
            .await
            .is_ok();
        self.tracker.reopen();
        if !drained {
            tracing::warn!(
                in_flight = self.in_flight(),
                "Callbacks still in flight after drain timeout"
            );
        }
        drained
    }
}
