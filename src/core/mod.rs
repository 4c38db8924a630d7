//! Core types and traits for the scanspool library.
//!
//! - [`job`] - The `JobDescriptor` and its persisted wire form
//! - [`traits`] - The `Scanner` trait
//! - [`error`] - Structured error types
//! - [`output`] - Shaping of scan output for submitters

pub mod error;
pub mod job;
pub mod output;
pub mod traits;

pub use error::{
    DeliveryError, DeliveryResult, QueueError, QueueResult, ScanError, ScanResult,
};
pub use job::JobDescriptor;
pub use traits::{ArcScanner, Scanner};
