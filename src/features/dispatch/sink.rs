//! # Event Sinks
//!
//! Where batches go. The dispatcher only knows the [`EventSink`] trait; the
//! default implementation POSTs JSON to the collector over HTTPS.
//!
//! - **Version**: 0.1.0
//! - **Since**: 0.1.0
//! - **Toggleable**: false
//!
//! ## Changelog
//! - 0.1.0: Initial release

use crate::core::error::{Error, Result};
use crate::features::dispatch::batch::Batch;
use async_trait::async_trait;
use log::debug;
use reqwest::header::{self, HeaderMap, HeaderValue};
use reqwest::StatusCode;
use std::time::Duration;

/// Path of the batch endpoint, relative to the API base URL
pub const BATCH_PATH: &str = "events/batch/";

const USER_AGENT: &str = "cls-api-client";

/// Destination for event batches
#[async_trait]
pub trait EventSink: Send + Sync {
    /// Deliver one batch. Errors marked retryable are attempted again by the
    /// dispatcher.
    async fn send(&self, batch: &Batch) -> Result<()>;
}

/// Sends batches to the collector as JSON over HTTP(S)
pub struct HttpSink {
    endpoint: String,
    client: reqwest::Client,
}

impl HttpSink {
    /// Create a sink for the API at `api_url` (with trailing slash)
    pub fn new(api_url: &str, timeout: Duration) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(header::ACCEPT, HeaderValue::from_static("application/json"));
        headers.insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static("application/json"),
        );
        headers.insert(header::USER_AGENT, HeaderValue::from_static(USER_AGENT));

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(timeout)
            .build()?;

        Ok(HttpSink {
            endpoint: format!("{api_url}{BATCH_PATH}"),
            client,
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl EventSink for HttpSink {
    async fn send(&self, batch: &Batch) -> Result<()> {
        let mut request = self.client.post(&self.endpoint).json(batch);

        if !batch.project_key.is_empty() {
            // A key that is not a valid header value is still sent in the body
            if let Ok(mut auth) = HeaderValue::from_str(&format!("Token {}", batch.project_key)) {
                auth.set_sensitive(true);
                request = request.header(header::AUTHORIZATION, auth);
            }
        }

        let response = request.send().await?;
        let status = response.status();
        let body = response.text().await.unwrap_or_else(|_| "<no text>".to_string());
        debug!("api_post {} {} {}", self.endpoint, status, body);

        if status.is_success() {
            return Ok(());
        }
        Err(Error::Rejected {
            status: status.as_u16(),
            retryable: is_retryable_status(status),
        })
    }
}

/// Server errors, timeouts and rate limits may succeed later; other client
/// errors will not
pub fn is_retryable_status(status: StatusCode) -> bool {
    status.is_server_error()
        || status == StatusCode::REQUEST_TIMEOUT
        || status == StatusCode::TOO_MANY_REQUESTS
}
