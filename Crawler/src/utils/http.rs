// src/utils/http.rs

//! HTTP transport.
//!
//! The pipeline only needs "give me the bytes at this URL within this
//! deadline"; [`Transport`] is that seam, and [`HttpTransport`] is the
//! reqwest-backed implementation used outside of tests.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{CONTENT_TYPE, HeaderMap, HeaderName, HeaderValue};

use crate::error::{AppError, Result};
use crate::models::CrawlerConfig;

/// Payload of a POST query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestBody {
    pub content_type: String,
    pub bytes: Vec<u8>,
}

impl RequestBody {
    pub fn form(body: impl Into<String>) -> Self {
        Self {
            content_type: "application/x-www-form-urlencoded".to_string(),
            bytes: body.into().into_bytes(),
        }
    }

    pub fn json(body: impl Into<String>) -> Self {
        Self {
            content_type: "application/json".to_string(),
            bytes: body.into().into_bytes(),
        }
    }
}

/// Fetches raw bytes from a URL. Single attempt, no retries.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn fetch(
        &self,
        url: &str,
        timeout: Duration,
        headers: &[(String, String)],
    ) -> Result<Vec<u8>>;

    /// POST `body` and return the response bytes.
    async fn post(
        &self,
        url: &str,
        _timeout: Duration,
        _headers: &[(String, String)],
        _body: &RequestBody,
    ) -> Result<Vec<u8>> {
        Err(AppError::fetch(url, "POST is not supported by this transport"))
    }
}

/// Create a configured asynchronous HTTP client.
pub fn create_async_client(config: &CrawlerConfig) -> Result<reqwest::Client> {
    let client = reqwest::Client::builder()
        .user_agent(&config.user_agent)
        .timeout(Duration::from_secs(config.timeout_secs))
        .build()?;
    Ok(client)
}

/// reqwest-backed [`Transport`]. Bodies larger than `max_body_bytes` are
/// rejected as fetch failures.
#[derive(Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
    max_body_bytes: u64,
}

impl HttpTransport {
    pub fn new(config: &CrawlerConfig) -> Result<Self> {
        Ok(Self {
            client: create_async_client(config)?,
            max_body_bytes: config.max_body_bytes,
        })
    }

    pub fn with_client(client: reqwest::Client, max_body_bytes: u64) -> Self {
        Self {
            client,
            max_body_bytes,
        }
    }

    async fn execute(&self, url: &str, request: reqwest::RequestBuilder) -> Result<Vec<u8>> {
        let response = request.send().await.map_err(|e| classify(url, e))?;
        let mut response = response
            .error_for_status()
            .map_err(|e| AppError::fetch(url, e))?;

        if let Some(length) = response.content_length() {
            if length > self.max_body_bytes {
                return Err(too_large(url, length, self.max_body_bytes));
            }
        }

        let mut body = Vec::new();
        while let Some(chunk) = response.chunk().await.map_err(|e| classify(url, e))? {
            let total = (body.len() + chunk.len()) as u64;
            if total > self.max_body_bytes {
                return Err(too_large(url, total, self.max_body_bytes));
            }
            body.extend_from_slice(&chunk);
        }

        log::debug!("Fetched {} bytes from {}", body.len(), url);
        Ok(body)
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn fetch(
        &self,
        url: &str,
        timeout: Duration,
        headers: &[(String, String)],
    ) -> Result<Vec<u8>> {
        let request = self
            .client
            .get(url)
            .timeout(timeout)
            .headers(build_headers(headers)?);
        self.execute(url, request).await
    }

    async fn post(
        &self,
        url: &str,
        timeout: Duration,
        headers: &[(String, String)],
        body: &RequestBody,
    ) -> Result<Vec<u8>> {
        let request = self
            .client
            .post(url)
            .timeout(timeout)
            .headers(build_headers(headers)?)
            .header(CONTENT_TYPE, body.content_type.as_str())
            .body(body.bytes.clone());
        self.execute(url, request).await
    }
}

fn too_large(url: &str, size: u64, limit: u64) -> AppError {
    AppError::fetch(
        url,
        format!("response body of {size}+ bytes exceeds the {limit} byte limit"),
    )
}

fn build_headers(headers: &[(String, String)]) -> Result<HeaderMap> {
    let mut map = HeaderMap::with_capacity(headers.len());
    for (name, value) in headers {
        let name = HeaderName::from_bytes(name.as_bytes())
            .map_err(|e| AppError::config(format!("invalid header name '{name}': {e}")))?;
        let value = HeaderValue::from_str(value)
            .map_err(|e| AppError::config(format!("invalid header value for '{name}': {e}")))?;
        map.insert(name, value);
    }
    Ok(map)
}

fn classify(url: &str, error: reqwest::Error) -> AppError {
    if error.is_timeout() {
        AppError::Timeout {
            url: url.to_string(),
        }
    } else {
        AppError::fetch(url, error)
    }
}
