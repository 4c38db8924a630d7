//! Job queue trait definition.

use crate::core::{JobDescriptor, QueueResult};

use async_trait::async_trait;
use std::fmt::Debug;
use std::sync::Arc;

/// A FIFO of job descriptors with an atomic pop.
///
/// `enqueue` appends at one end and `dequeue` removes from the other, so the
/// first job submitted is the first handed out. Every enqueued item is
/// returned by exactly one `dequeue` call no matter how many callers race on
/// the queue; that guarantee is the only synchronisation between workers.
///
/// # Example Implementation
///
/// ```rust,ignore
/// use scanspool::queue::JobQueue;
/// use scanspool::core::{JobDescriptor, QueueResult};
/// use async_trait::async_trait;
///
/// #[derive(Debug)]
/// struct MyQueue {
///     // Your storage
/// }
///
/// #[async_trait]
/// impl JobQueue for MyQueue {
///     fn name(&self) -> &str {
///         "my-queue"
///     }
///
///     async fn enqueue(&self, job: &JobDescriptor) -> QueueResult<u64> {
///         todo!()
///     }
///
///     async fn dequeue(&self) -> QueueResult<Option<JobDescriptor>> {
///         todo!()
///     }
///
///     fn len(&self) -> u64 {
///         0
///     }
/// }
/// ```
#[async_trait]
pub trait JobQueue: Send + Sync + Debug {
    /// Returns the name of the underlying list.
    fn name(&self) -> &str;

    /// Serializes and appends `job`, returning the new queue depth.
    ///
    /// # Errors
    ///
    /// - `InvalidJob` - the descriptor breaks its invariants.
    /// - `Storage` - the store could not be written; the job is not queued.
    /// - `Closed` - the queue has been closed.
    async fn enqueue(&self, job: &JobDescriptor) -> QueueResult<u64>;

    /// Pops the oldest job, or `None` when the queue is empty.
    ///
    /// # Errors
    ///
    /// - `Decode` - the popped record was corrupt; it has been removed and is lost.
    /// - `Storage` - the store could not be read.
    /// - `Closed` - the queue has been closed.
    async fn dequeue(&self) -> QueueResult<Option<JobDescriptor>>;

    /// Returns the current depth without blocking.
    fn len(&self) -> u64;

    /// Returns `true` if no jobs are waiting.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Flushes and releases the store. Later calls fail with `Closed`.
    async fn close(&self) -> QueueResult<()> {
        Ok(())
    }
}

/// An arc-wrapped queue shared by the gateway and every worker.
pub type ArcQueue = Arc<dyn JobQueue>;
