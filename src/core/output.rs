//! Shaping of scan output returned to submitters.
//!
//! The engine's standard output is passed through untouched except for
//! scrubbing the server-side staging path. Failures on the synchronous path
//! are turned into an error-shaped JSON payload so callers always receive a
//! JSON document.

use crate::core::error::ScanError;

use serde::Serialize;
use std::path::Path;

#[derive(Serialize)]
struct ErrorPayload<'a> {
    error: &'a str,
}

/// Builds the `{"error": "..."}` payload for a failed scan.
pub fn error_payload(err: &ScanError) -> String {
    let message = err.to_string();
    serde_json::to_string(&ErrorPayload { error: &message })
        .unwrap_or_else(|_| String::from(r#"{"error":"scan failed"}"#))
}

/// Removes every occurrence of the staging directory from `output`.
pub fn scrub_staging_path(output: &str, staging: &Path) -> String {
    let staging = staging.to_string_lossy();
    if staging.is_empty() {
        return output.to_string();
    }
    output.replace(staging.as_ref(), "")
}

/// Renders a synchronous scan outcome as the response body.
pub fn render(result: Result<String, ScanError>, staging: &Path) -> String {
    match result {
        Ok(output) => scrub_staging_path(&output, staging),
        Err(err) => scrub_staging_path(&error_payload(&err), staging),
    }
}
