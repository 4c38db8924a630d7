//! Background workers that drain the job queue.
//!
//! A [`WorkerPool`] runs a fixed number of workers. Each one wakes on a
//! ticker, pops jobs until the queue is empty, scans them and hands the
//! result to the [`CallbackDispatcher`](crate::callback::CallbackDispatcher).
//! Failed scans are handled by a [`FailurePolicy`].

mod config;
mod failure;
mod pool;
#[allow(clippy::module_inception)]
mod worker;

pub use config::WorkerPoolConfig;
pub use failure::FailurePolicy;
pub use pool::{WorkerPool, WorkerPoolBuilder};
pub use worker::WorkerState;
