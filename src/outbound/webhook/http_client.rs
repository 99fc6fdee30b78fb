use async_trait::async_trait;
use bytes::Bytes;
use reqwest::{Client, Response};
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{debug, warn};

use crate::domain::events::USER_AGENT;

/// Limit on response bytes read back from a destination
const MAX_BODY_SIZE: usize = 1024 * 1024;

/// Error type for HTTP client operations
#[derive(Debug, Error)]
pub enum HttpClientError {
    #[error("HTTP request failed: {0}")]
    RequestFailed(String),

    #[error("Request timeout after {0:?}")]
    Timeout(Duration),

    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    #[error("Network error: {0}")]
    NetworkError(String),

    #[error("Response error: status={status}, body={body}")]
    ResponseError { status: u16, body: String },
}

impl HttpClientError {
    /// HTTP status returned by the destination, if it answered at all
    pub fn status(&self) -> Option<u16> {
        match self {
            HttpClientError::ResponseError { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Destination answered 401/403: retrying with the same secret cannot help
    pub fn is_authentication_failure(&self) -> bool {
        matches!(self.status(), Some(401 | 403))
    }

    fn from_reqwest(err: reqwest::Error, timeout: Duration) -> Self {
        if err.is_timeout() {
            HttpClientError::Timeout(timeout)
        } else if err.is_connect() {
            HttpClientError::NetworkError(err.to_string())
        } else if err.is_builder() {
            HttpClientError::InvalidUrl(err.to_string())
        } else {
            HttpClientError::RequestFailed(err.to_string())
        }
    }
}

/// One signed POST, ready to send
#[derive(Debug, Clone)]
pub struct DeliveryRequest {
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: Bytes,
    pub timeout: Duration,
}

/// What a destination answered
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveryResponse {
    pub status: u16,
    pub body: String,
    pub response_time_ms: u64,
}

/// A single delivery attempt against a destination. No retries here.
#[async_trait]
pub trait DeliveryClient: Send + Sync {
    /// Send the request and return whatever the destination answered
    async fn send(&self, request: &DeliveryRequest) -> Result<DeliveryResponse, HttpClientError>;

    /// Send the request, treating any status >= 400 as a failed delivery
    async fn deliver(
        &self,
        request: &DeliveryRequest,
    ) -> Result<DeliveryResponse, HttpClientError> {
        let response = self.send(request).await?;
        if response.status >= 400 {
            return Err(HttpClientError::ResponseError {
                status: response.status,
                body: response.body,
            });
        }
        Ok(response)
    }
}

/// reqwest-backed delivery client
#[derive(Debug, Clone)]
pub struct WebhookHttpClient {
    client: Client,
}

impl WebhookHttpClient {
    pub fn new() -> Result<Self, HttpClientError> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| HttpClientError::RequestFailed(e.to_string()))?;

        Ok(Self { client })
    }

    /// Read response body with size limit
    async fn read_response_body(&self, response: Response) -> Result<String, HttpClientError> {
        let bytes = response.bytes().await.map_err(|e| {
            HttpClientError::RequestFailed(format!("Failed to read response body: {e}"))
        })?;

        if bytes.len() > MAX_BODY_SIZE {
            warn!(
                size = bytes.len(),
                max_size = MAX_BODY_SIZE,
                "Response body too large, truncating"
            );
        }

        Ok(String::from_utf8_lossy(&bytes[..bytes.len().min(MAX_BODY_SIZE)]).to_string())
    }
}

#[async_trait]
impl DeliveryClient for WebhookHttpClient {
    async fn send(&self, request: &DeliveryRequest) -> Result<DeliveryResponse, HttpClientError> {
        let url = reqwest::Url::parse(&request.url)
            .map_err(|e| HttpClientError::InvalidUrl(format!("{}: {e}", request.url)))?;

        debug!(url = %url, "Sending webhook");
        let start = Instant::now();

        let mut builder = self
            .client
            .post(url)
            .timeout(request.timeout)
            .header("Content-Type", "application/json");
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }

        let response = builder
            .body(request.body.clone())
            .send()
            .await
            .map_err(|e| {
                warn!(url = %request.url, error = %e, "Webhook request failed");
                HttpClientError::from_reqwest(e, request.timeout)
            })?;

        let status = response.status().as_u16();
        let response_time_ms = start.elapsed().as_millis() as u64;

        debug!(
            url = %request.url,
            status = status,
            response_time_ms = response_time_ms,
            "Webhook response received"
        );

        let body = self.read_response_body(response).await?;
        Ok(DeliveryResponse {
            status,
            body,
            response_time_ms,
        })
    }
}
