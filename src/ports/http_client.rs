use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

/// Custom error type for HTTP client operations
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum HttpClientError {
    /// Error when connection to the remote host fails
    #[error("Connection error: {0}")]
    ConnectionError(String),

    /// Error when request times out
    #[error("Timeout error after {0:?}")]
    Timeout(Duration),

    /// Error when request is invalid
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Error when the remote host returns an error status code
    #[error("Remote host returned error status: {status}, url: {url}")]
    StatusError {
        /// The URL that was requested
        url: String,
        /// The status code returned by the remote host
        status: u16,
    },

    /// Error when the response body could not be read
    #[error("Failed to read response body: {0}")]
    BodyError(String),
}

/// Result type alias for HTTP client operations
pub type HttpClientResult<T> = Result<T, HttpClientError>;

/// HttpClient defines the port (interface) for the few HTTP requests the
/// resolver itself issues: health checks against candidate backends and the
/// external address lookup.
#[async_trait]
pub trait HttpClient: Send + Sync + 'static {
    /// Perform a health check GET against `url`
    ///
    /// # Returns
    /// `Ok(true)` for any 2xx status, `Ok(false)` for other statuses and
    /// connection failures, `Err(Timeout)` when no answer arrived in time
    async fn health_check(&self, url: &str, timeout: Duration) -> HttpClientResult<bool>;

    /// GET `url` and return the body as text; non-2xx statuses are errors
    async fn get_text(&self, url: &str, timeout: Duration) -> HttpClientResult<String>;
}
