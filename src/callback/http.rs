//! HTTP callback sink.
//!
//! POSTs the scan result to the callback URL with a JSON content type.
//! The response body is ignored; only the status is inspected.

use crate::callback::traits::CallbackSink;
use crate::core::{DeliveryError, DeliveryResult, ScanError};

use async_trait::async_trait;
use std::time::Duration;

/// Callback sink backed by a shared `reqwest::Client`.
#[derive(Debug, Clone)]
pub struct HttpCallback {
    client: reqwest::Client,
}

impl HttpCallback {
    /// Creates a sink whose requests give up after `timeout`.
    pub fn new(timeout: Duration) -> Result<Self, ScanError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("scanspool/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| ScanError::configuration(format!("failed to build HTTP client: {e}")))?;
        Ok(Self { client })
    }

    /// Wraps an existing client.
    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl CallbackSink for HttpCallback {
    async fn deliver(&self, url: &str, body: String) -> DeliveryResult<()> {
        let response = self
            .client
            .post(url)
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .body(body)
            .send()
            .await
            .map_err(|e| DeliveryError::Request {
                url: url.to_string(),
                message: e.to_string(),
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(DeliveryError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }
        Ok(())
    }
}
