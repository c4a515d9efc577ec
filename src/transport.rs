//! HTTP transport for delivering serialized payloads to the collector.
//!
//! The transport owns retry policy: callers hand it one payload and get
//! back the final outcome after up to `max_retries + 1` tries with
//! exponential backoff. In-flight requests are bounded by a semaphore so
//! fire-and-forget dispatch cannot grow the number of concurrent
//! connections without limit.

use std::collections::HashMap;
use std::time::Duration;

use reqwest::header::{ACCEPT, CONTENT_TYPE};
use reqwest::{Client, Method, StatusCode};
use serde_json::Value;
use tokio::sync::Semaphore;
use tracing::{debug, warn};

use crate::config::{Config, ConfigError};

/// Header carrying the API key credential.
const API_KEY_HEADER: &str = "x-api-key";

/// Maximum delay between retries (in milliseconds).
const MAX_RETRY_DELAY_MS: u64 = 30_000;

/// Errors that can occur while delivering a payload.
///
/// Each failure condition is a distinct variant so callers can tell a
/// connection failure from a timeout, a terminal response status, a
/// body-decode failure, or retry exhaustion.
#[derive(Debug)]
pub enum TransportError {
    /// The HTTP request failed at the network layer
    Request(reqwest::Error),

    /// The request timed out
    Timeout,

    /// The collector answered with a terminal (non-2xx) status
    Status { code: StatusCode, message: String },

    /// The response body could not be decoded
    Decode(String),

    /// The payload could not be serialized
    Serialize(String),

    /// All tries were used up; wraps the last observed failure
    RetriesExhausted {
        attempts: u32,
        last: Box<TransportError>,
    },
}

impl std::fmt::Display for TransportError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TransportError::Request(e) => write!(f, "HTTP request failed: {}", e),
            TransportError::Timeout => write!(f, "Request timed out"),
            TransportError::Status { code, message } => {
                write!(f, "Collector error ({}): {}", code, message)
            }
            TransportError::Decode(e) => write!(f, "Failed to decode response: {}", e),
            TransportError::Serialize(e) => write!(f, "Failed to serialize payload: {}", e),
            TransportError::RetriesExhausted { attempts, last } => {
                write!(f, "All {} send attempts failed. Last error: {}", attempts, last)
            }
        }
    }
}

impl std::error::Error for TransportError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            TransportError::Request(e) => Some(e),
            TransportError::RetriesExhausted { last, .. } => Some(last.as_ref()),
            _ => None,
        }
    }
}

impl From<reqwest::Error> for TransportError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            TransportError::Timeout
        } else {
            TransportError::Request(err)
        }
    }
}

impl TransportError {
    /// Whether another try could change the outcome.
    ///
    /// Connection errors, timeouts, server errors (5xx) and rate limiting
    /// (429) are retryable; terminal statuses, decode and serialization
    /// failures are not.
    pub fn is_retryable(&self) -> bool {
        match self {
            TransportError::Request(e) => e.is_connect() || e.is_timeout() || e.is_request(),
            TransportError::Timeout => true,
            TransportError::Status { code, .. } => {
                code.is_server_error() || *code == StatusCode::TOO_MANY_REQUESTS
            }
            TransportError::Decode(_) => false,
            TransportError::Serialize(_) => false,
            TransportError::RetriesExhausted { .. } => false,
        }
    }
}

/// Retrying HTTP delivery to the collector endpoint.
///
/// The underlying `reqwest` client is reused for connection pooling; the
/// pool and the in-flight semaphore are both sized by
/// `Config::max_connections`.
pub struct Transport {
    /// The underlying HTTP client (reused for connection pooling)
    client: Client,

    /// Collector base URL, no trailing slash
    endpoint: String,

    /// API key credential; empty means unauthenticated
    api_key: String,

    /// Extra headers attached to every request
    extra_headers: HashMap<String, String>,

    /// Maximum number of retry attempts after the first try
    max_retries: u32,

    /// Base delay for exponential backoff
    retry_backoff: Duration,

    /// Bounds concurrently in-flight requests
    permits: Semaphore,
}

impl Transport {
    /// Create a new transport from a configuration snapshot.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if the configuration is invalid or the HTTP
    /// client cannot be built.
    pub fn new(config: &Config) -> Result<Self, ConfigError> {
        config.validate()?;

        let client = Client::builder()
            .timeout(config.request_timeout)
            .pool_max_idle_per_host(config.max_connections)
            .pool_idle_timeout(Duration::from_secs(90))
            .build()
            .map_err(|e| ConfigError::new(e.to_string()))?;

        Ok(Self {
            client,
            endpoint: config.endpoint.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            extra_headers: config.headers.clone(),
            max_retries: config.max_retries,
            retry_backoff: config.retry_backoff,
            permits: Semaphore::new(config.max_connections),
        })
    }

    /// Deliver one payload to `{endpoint}{path}` and report the outcome.
    ///
    /// A try fails on a network error or a 5xx response; any other status
    /// completes the call immediately. Between failed tries the transport
    /// sleeps `retry_backoff * 2^attempt_index` plus jitter. When all
    /// tries are used up the last failure is returned wrapped in
    /// `RetriesExhausted`.
    ///
    /// A response with no body (204 or an empty 2xx) yields an empty JSON
    /// object rather than a decode error.
    pub async fn send(
        &self,
        method: Method,
        path: &str,
        body: Option<String>,
    ) -> Result<Value, TransportError> {
        // Bound concurrent requests; the semaphore is never closed, so a
        // failed acquire can only mean the process is tearing down.
        let _permit = self
            .permits
            .acquire()
            .await
            .map_err(|_| TransportError::Timeout)?;

        let url = format!("{}{}", self.endpoint, path);
        let mut attempt: u32 = 0;

        loop {
            match self.try_send(&method, &url, body.as_deref()).await {
                Ok(value) => {
                    debug!(%url, attempt, "payload delivered");
                    return Ok(value);
                }
                Err(e) if e.is_retryable() && attempt < self.max_retries => {
                    let delay = self.backoff_delay(attempt);
                    warn!(
                        error = %e,
                        attempt = attempt + 1,
                        max_retries = self.max_retries,
                        delay_ms = delay.as_millis() as u64,
                        "send failed, will retry"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) if e.is_retryable() => {
                    return Err(TransportError::RetriesExhausted {
                        attempts: attempt + 1,
                        last: Box::new(e),
                    });
                }
                Err(e) => {
                    debug!(error = %e, %url, "send failed permanently");
                    return Err(e);
                }
            }
        }
    }

    /// One HTTP try, no retry logic.
    async fn try_send(
        &self,
        method: &Method,
        url: &str,
        body: Option<&str>,
    ) -> Result<Value, TransportError> {
        let mut request = self
            .client
            .request(method.clone(), url)
            .header(CONTENT_TYPE, "application/json")
            .header(ACCEPT, "application/json");

        if !self.api_key.is_empty() {
            request = request.header(API_KEY_HEADER, self.api_key.as_str());
        }

        for (name, value) in &self.extra_headers {
            request = request.header(name.as_str(), value.as_str());
        }

        if let Some(body) = body {
            request = request.body(body.to_string());
        }

        let response = request.send().await?;
        let status = response.status();

        if status == StatusCode::NO_CONTENT {
            return Ok(Value::Object(serde_json::Map::new()));
        }

        if !status.is_success() {
            let message = response
                .text()
                .await
                .unwrap_or_else(|_| status.to_string());

            return Err(TransportError::Status {
                code: status,
                message,
            });
        }

        let text = response.text().await?;
        if text.is_empty() {
            return Ok(Value::Object(serde_json::Map::new()));
        }

        serde_json::from_str(&text).map_err(|e| TransportError::Decode(e.to_string()))
    }

    /// Calculate the backoff delay before retry number `attempt_index + 1`.
    ///
    /// delay = min(retry_backoff * 2^attempt_index + jitter, max_delay),
    /// with jitter up to 25% of the exponential delay.
    fn backoff_delay(&self, attempt_index: u32) -> Duration {
        let base_ms = self.retry_backoff.as_millis() as u64;
        let exponential = base_ms.saturating_mul(1 << attempt_index.min(10));
        let jitter = rand::random::<u64>() % (exponential / 4 + 1);

        Duration::from_millis(exponential.saturating_add(jitter).min(MAX_RETRY_DELAY_MS))
    }

    /// Get the configured collector endpoint.
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Get the maximum number of retries.
    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }
}
