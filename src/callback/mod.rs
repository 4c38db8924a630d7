//! Result delivery to caller-supplied callback URLs.
//!
//! - [`CallbackSink`] performs a single delivery attempt
//! - [`HttpCallback`] POSTs JSON over HTTP (requires the `http-callback` feature)
//! - [`CallbackDispatcher`] runs deliveries on detached tasks

mod dispatcher;
#[cfg(feature = "http-callback")]
mod http;
mod traits;

pub use dispatcher::CallbackDispatcher;
#[cfg(feature = "http-callback")]
pub use http::HttpCallback;
pub use traits::{CallbackSink, NoOpSink, RecordedCallback, RecordingSink};
