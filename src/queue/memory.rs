//! In-memory job queue.
//!
//! Holds encoded records exactly as the durable queue would, so decode
//! failures behave the same way. Nothing survives a restart.

use crate::core::{JobDescriptor, QueueError, QueueResult};
use crate::queue::traits::JobQueue;

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};

/// A non-durable `JobQueue` backed by a `VecDeque`.
#[derive(Debug)]
pub struct MemoryQueue {
    name: String,
    items: Mutex<VecDeque<Vec<u8>>>,
    closed: AtomicBool,
}

impl MemoryQueue {
    /// Creates an empty queue with the given name.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            items: Mutex::new(VecDeque::new()),
            closed: AtomicBool::new(false),
        }
    }

    /// Appends a raw record without validation.
    ///
    /// Used to replay records from another store or to inject corrupt data.
    pub fn enqueue_raw(&self, record: impl Into<Vec<u8>>) -> QueueResult<u64> {
        self.ensure_open()?;
        let mut items = self.items.lock();
        items.push_back(record.into());
        Ok(items.len() as u64)
    }

    fn ensure_open(&self) -> QueueResult<()> {
        if self.closed.load(Ordering::Acquire) {
            return Err(QueueError::Closed {
                queue: self.name.clone(),
            });
        }
        Ok(())
    }
}

impl Default for MemoryQueue {
    fn default() -> Self {
        Self::new(crate::queue::DEFAULT_QUEUE_NAME)
    }
}

#[async_trait]
impl JobQueue for MemoryQueue {
    fn name(&self) -> &str {
        &self.name
    }

    async fn enqueue(&self, job: &JobDescriptor) -> QueueResult<u64> {
        job.validate()?;
        let record = job.encode()?;
        self.enqueue_raw(record)
    }

    async fn dequeue(&self) -> QueueResult<Option<JobDescriptor>> {
        self.ensure_open()?;
        let record = self.items.lock().pop_front();
        match record {
            Some(bytes) => JobDescriptor::decode(&bytes).map(Some),
            None => Ok(None),
        }
    }

    fn len(&self) -> u64 {
        self.items.lock().len() as u64
    }

    async fn close(&self) -> QueueResult<()> {
        self.closed.store(true, Ordering::Release);
        Ok(())
    }
}
