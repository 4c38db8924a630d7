//! Durable job queue.
//!
//! [`JobQueue`] is the single synchronisation point between the submission
//! side and the workers. [`RocksQueue`] persists jobs across restarts;
//! [`MemoryQueue`] offers the same contract without durability.

mod memory;
mod rocks;
mod traits;

pub use memory::MemoryQueue;
pub use rocks::{RocksQueue, RocksQueueConfig};
pub use traits::{ArcQueue, JobQueue};

/// Name of the list that holds pending scan jobs.
pub const DEFAULT_QUEUE_NAME: &str = "__HMBD_PERSIST";
