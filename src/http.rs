//! Shared retrying HTTP client.
//!
//! Each backend client (extraction, embedding, vector index) owns one
//! [`RetryingClient`] built from the `[http]` config section. The connect
//! timeout bounds the TCP and TLS handshake; the read timeout bounds each
//! wait for response bytes, so a slow but steadily streaming body is never
//! cut off. The wrapper re-issues a request on transient failures:
//!
//! - network / timeout errors → retry
//! - HTTP 429 and 5xx → retry
//! - any other non-2xx → returned to the caller immediately
//!
//! Backoff before attempt `n` (1-based retry count) is
//! `backoff_factor * 2^(n-1)`.

use std::time::Duration;

use reqwest::{Client, RequestBuilder, Response, StatusCode};
use tracing::warn;

use crate::config::HttpConfig;
use crate::error::{IngestError, IngestResult};

#[derive(Debug, Clone)]
pub struct RetryingClient {
    client: Client,
    max_retries: u32,
    backoff_factor: Duration,
}

impl RetryingClient {
    pub fn new(config: &HttpConfig) -> IngestResult<Self> {
        let client = Client::builder()
            .connect_timeout(config.connect_timeout())
            .read_timeout(config.read_timeout())
            .build()
            .map_err(|e| IngestError::Config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            max_retries: config.max_retries,
            backoff_factor: config.backoff_factor(),
        })
    }

    /// Send a request built by `build`, requiring a 2xx response.
    pub async fn send<F>(&self, backend: &'static str, build: F) -> IngestResult<Response>
    where
        F: Fn(&Client) -> RequestBuilder,
    {
        let response = self.send_raw(backend, build).await?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        Err(status_error(backend, response).await)
    }

    /// Like [`send`](Self::send) but hands back any non-retryable response,
    /// so callers can treat e.g. 404 or 409 as meaningful answers.
    pub async fn send_raw<F>(&self, backend: &'static str, build: F) -> IngestResult<Response>
    where
        F: Fn(&Client) -> RequestBuilder,
    {
        let mut last_err = None;

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                let delay = self.backoff(attempt);
                warn!(
                    backend,
                    attempt,
                    max_retries = self.max_retries,
                    delay_ms = delay.as_millis() as u64,
                    error = %last_err.as_ref().map(ToString::to_string).unwrap_or_default(),
                    "retrying request"
                );
                tokio::time::sleep(delay).await;
            }

            match build(&self.client).send().await {
                Ok(response) => {
                    let status = response.status();
                    if status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
                        last_err = Some(status_error(backend, response).await);
                        continue;
                    }
                    return Ok(response);
                }
                Err(e) => {
                    last_err = Some(IngestError::Backend {
                        backend,
                        message: e.to_string(),
                    });
                }
            }
        }

        Err(last_err.unwrap_or_else(|| IngestError::Backend {
            backend,
            message: "request failed after retries".to_string(),
        }))
    }

    fn backoff(&self, attempt: u32) -> Duration {
        self.backoff_factor * 2u32.pow(attempt.saturating_sub(1).min(10))
    }
}

async fn status_error(backend: &'static str, response: Response) -> IngestError {
    let status = response.status().as_u16();
    let body = response.text().await.unwrap_or_default();
    IngestError::Status {
        backend,
        status,
        body,
    }
}
