//! Structured audit logging of the job lifecycle.
//!
//! Events are emitted through `tracing` under the `scanspool::audit`
//! target, so a subscriber can route them to a separate sink.

mod events;

pub use events::{
    emit_callback_delivered, emit_callback_failed, emit_dequeue_failed, emit_job_completed,
    emit_job_enqueued, emit_job_failed, emit_job_started, JobDisposition,
};
