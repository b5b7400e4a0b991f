use std::time::Duration;

use async_trait::async_trait;
use eyre::{Result, WrapErr};
use reqwest::{Client, header};

use crate::ports::http_client::{HttpClient, HttpClientError, HttpClientResult};

const USER_AGENT: &str = concat!("homing/", env!("CARGO_PKG_VERSION"));

/// HTTP client adapter built on reqwest with rustls.
///
/// Responsibilities:
/// * Health checks (`GET`, any 2xx is healthy, body discarded)
/// * Plain-text fetches for the external address lookup
///
/// Timeouts are applied per request so one client can serve probes with
/// different budgets. Redirects are not followed; a 3xx from a candidate
/// counts as unhealthy. System proxies are ignored.
pub struct HttpClientAdapter {
    client: Client,
}

impl HttpClientAdapter {
    /// Create a new HTTP client adapter.
    pub fn new() -> Result<Self> {
        let mut default_headers = header::HeaderMap::new();
        default_headers.insert(
            header::ACCEPT,
            header::HeaderValue::from_static("application/json, text/plain;q=0.9, */*;q=0.8"),
        );

        let client = Client::builder()
            .user_agent(USER_AGENT)
            .default_headers(default_headers)
            .redirect(reqwest::redirect::Policy::none())
            // Reachability must be judged from this host, not from a proxy
            .no_proxy()
            .build()
            .wrap_err("Failed to build reqwest client")?;

        tracing::debug!("Created HTTP client adapter ({})", USER_AGENT);
        Ok(Self { client })
    }

    fn classify_error(err: reqwest::Error, timeout: Duration) -> HttpClientError {
        if err.is_timeout() {
            HttpClientError::Timeout(timeout)
        } else if err.is_builder() {
            HttpClientError::InvalidRequest(err.to_string())
        } else {
            HttpClientError::ConnectionError(err.to_string())
        }
    }
}

#[async_trait]
impl HttpClient for HttpClientAdapter {
    async fn health_check(&self, url: &str, timeout: Duration) -> HttpClientResult<bool> {
        tracing::debug!("Health checking URL: {}", url);

        match self.client.get(url).timeout(timeout).send().await {
            Ok(response) => {
                let is_healthy = response.status().is_success();
                // Drain the body so the connection can be reused
                let _ = response.bytes().await;
                tracing::debug!("Health check for {} result: {}", url, is_healthy);
                Ok(is_healthy)
            }
            Err(err) if err.is_timeout() => {
                tracing::debug!("Health check timeout for {}", url);
                Err(HttpClientError::Timeout(timeout))
            }
            Err(err) if err.is_builder() => {
                Err(HttpClientError::InvalidRequest(err.to_string()))
            }
            Err(err) => {
                tracing::debug!("Health check error for {}: {}", url, err);
                // Connection errors mean "not reachable", not a failure of the check itself
                Ok(false)
            }
        }
    }

    async fn get_text(&self, url: &str, timeout: Duration) -> HttpClientResult<String> {
        let response = self
            .client
            .get(url)
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| Self::classify_error(e, timeout))?;

        let status = response.status();
        if !status.is_success() {
            return Err(HttpClientError::StatusError {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        response
            .text()
            .await
            .map_err(|e| HttpClientError::BodyError(e.to_string()))
    }
}
