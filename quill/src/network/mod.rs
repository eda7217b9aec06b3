//! Transport layer: how serialized requests reach the service.
//!
//! The driver core only needs a "send an HTTP request, get an HTTP
//! response" capability. [`Transport`] is that seam; [`ReqwestTransport`]
//! is the default implementation, and tests substitute stubs.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use thiserror::Error;

/// Consistency watermark, microseconds since the epoch. Sent with
/// requests and read back from responses.
pub const HEADER_LAST_TXN_TS: &str = "X-Last-Txn-Ts";
/// Requests linearized execution for the query.
pub const HEADER_LINEARIZED: &str = "X-Linearized";
/// Caps server-side transaction contention retries.
pub const HEADER_MAX_CONTENTION_RETRIES: &str = "X-Max-Contention-Retries";
/// Free-form tags attached to the query for observability.
pub const HEADER_QUERY_TAGS: &str = "X-Query-Tags";
/// Server-side query timeout in milliseconds.
pub const HEADER_QUERY_TIMEOUT_MS: &str = "X-Query-Timeout-Ms";
/// W3C trace context, passed through unchanged.
pub const HEADER_TRACEPARENT: &str = "Traceparent";
/// Forces the query through the typechecker.
pub const HEADER_TYPECHECK: &str = "X-Typecheck";

pub(crate) const HEADER_AUTHORIZATION: &str = "Authorization";
pub(crate) const HEADER_CONTENT_TYPE: &str = "Content-Type";
pub(crate) const HEADER_DRIVER: &str = "X-Driver";
pub(crate) const HEADER_FORMAT: &str = "X-Format";

/// A serialized request, ready to be sent by a [`Transport`].
#[derive(Debug, Clone)]
pub struct HttpRequest {
    /// Request method; queries always POST.
    pub method: reqwest::Method,
    /// Absolute URL of the query endpoint.
    pub url: String,
    /// Request headers, already fully resolved.
    pub headers: HashMap<String, String>,
    /// Serialized JSON body.
    pub body: Bytes,
    /// Hard deadline for this attempt. Lets a caller-facing timeout abort
    /// the request promptly instead of waiting out the transport defaults.
    pub timeout: Option<Duration>,
}

/// A response as seen by the driver core: status, headers, body bytes.
#[derive(Debug, Clone)]
pub struct HttpResponse {
    /// HTTP status code.
    pub status: u16,
    /// Response headers.
    pub headers: HashMap<String, String>,
    /// Raw body bytes, fully read.
    pub body: Bytes,
}

impl HttpResponse {
    /// Case-insensitive header lookup.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }
}

/// A failure below the protocol level: DNS, refused connection, timeout
/// with no response. These are never classified as service errors and
/// never retried by the driver.
#[derive(Error, Debug, Clone)]
#[non_exhaustive]
pub enum TransportError {
    /// The underlying HTTP client failed to produce a response.
    #[error("http request failed: {0}")]
    Request(#[from] Arc<reqwest::Error>),
    /// Failure reported by a custom [`Transport`] implementation.
    #[error(transparent)]
    Other(Arc<dyn std::error::Error + Send + Sync + 'static>),
}

impl From<reqwest::Error> for TransportError {
    fn from(err: reqwest::Error) -> Self {
        TransportError::Request(Arc::new(err))
    }
}

/// Sends serialized requests to the service.
///
/// Implementations must be cheap to call concurrently; the driver issues
/// any number of in-flight requests against one transport.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Performs one request attempt and reads the response in full.
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, TransportError>;
}

/// Default [`Transport`] over a shared [`reqwest::Client`].
#[derive(Debug, Clone, Default)]
pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    /// Creates a transport with the given connection timeout.
    pub fn new(connection_timeout: Duration) -> Result<Self, TransportError> {
        let client = reqwest::Client::builder()
            .connect_timeout(connection_timeout)
            .build()?;
        Ok(Self { client })
    }

    /// Wraps an already configured client, e.g. one with proxy settings.
    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, TransportError> {
        let mut builder = self
            .client
            .request(request.method.clone(), &request.url)
            .body(request.body.clone());
        for (name, value) in &request.headers {
            builder = builder.header(name, value);
        }
        if let Some(timeout) = request.timeout {
            builder = builder.timeout(timeout);
        }

        let response = builder.send().await?;
        let status = response.status().as_u16();
        let headers = response
            .headers()
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|value| (name.as_str().to_owned(), value.to_owned()))
            })
            .collect();
        let body = response.bytes().await?;

        Ok(HttpResponse {
            status,
            headers,
            body,
        })
    }
}
