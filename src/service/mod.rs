//! Submission gateway facade.
//!
//! [`ScanService`] ties the queue, the scan engine, the callback dispatcher
//! and the worker pool together behind the operations a front end needs:
//! synchronous and queued submission, queue depth, engine version and
//! shutdown.

mod config;
mod scan_service;
mod staging;

pub use config::ScanServiceConfig;
pub use scan_service::{ScanService, ScanServiceBuilder};
pub use staging::{resolve_timeout, stage_bytes};
