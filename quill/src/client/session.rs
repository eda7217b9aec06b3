//! `Session` is the entry point for executing queries.
//!
//! A session owns the transport, the default request headers and the
//! transaction-time watermark. Any number of queries may execute
//! concurrently against one session; the watermark is the only mutable
//! state they share.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use bytes::Bytes;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, warn};

use crate::client::pager::QueryPager;
use crate::client::txn_time::TxnTime;
use crate::errors::{ExecutionError, NewSessionError, ServiceError};
use crate::network::{
    self, HttpRequest, HttpResponse, ReqwestTransport, Transport, TransportError,
};
use crate::policies::retry::RetryConfig;
use crate::response::{QueryResponse, QuerySuccess};
use crate::statement::query::Query;

/// Query endpoint path, relative to the session endpoint.
const QUERY_PATH: &str = "/query/1";

const STATUS_TOO_MANY_REQUESTS: u16 = 429;

/// Configuration for a new [`Session`], assembled by
/// [`SessionBuilder`](crate::client::session_builder::SessionBuilder).
#[derive(Clone)]
pub struct SessionConfig {
    /// Authentication secret, attached as a bearer token.
    pub secret: String,
    /// Base URL of the service.
    pub endpoint: String,
    /// Server-side per-query timeout, sent as a request header.
    pub query_timeout: Duration,
    /// Extra time past the query timeout before the client abandons a
    /// request it has received no response for.
    pub client_buffer_timeout: Duration,
    /// Time allowed for establishing a connection.
    pub connection_timeout: Duration,
    /// Retry policy for throttled requests.
    pub retry: RetryConfig,
    /// Default typecheck setting; per-query options override it.
    pub typecheck: Option<bool>,
    /// Additional default headers sent with every request.
    pub extra_headers: HashMap<String, String>,
    /// Transport override; `None` builds the default reqwest transport.
    pub transport: Option<Arc<dyn Transport>>,
}

impl SessionConfig {
    /// Creates a configuration with the recommended defaults and an
    /// empty secret.
    pub fn new() -> Self {
        SessionConfig {
            secret: String::new(),
            endpoint: crate::client::session_builder::ENDPOINT_DEFAULT.to_owned(),
            query_timeout: Duration::from_secs(5),
            client_buffer_timeout: Duration::from_secs(5),
            connection_timeout: Duration::from_secs(5),
            retry: RetryConfig::default(),
            typecheck: None,
            extra_headers: HashMap::new(),
            transport: None,
        }
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Serialize)]
struct QueryBody<'a> {
    query: &'a Query,
}

/// A handle to the service through which queries are executed.
///
/// Created with a [`SessionBuilder`](crate::SessionBuilder). Cheap to
/// share behind an `Arc`; all methods take `&self`.
pub struct Session {
    transport: Arc<dyn Transport>,
    query_url: String,
    default_headers: HashMap<String, String>,
    txn_time: TxnTime,
    retry: RetryConfig,
    query_timeout: Duration,
    client_buffer_timeout: Duration,
    typecheck: Option<bool>,
}

impl Session {
    /// Creates a session from a resolved configuration.
    pub(crate) fn new(config: SessionConfig) -> Result<Self, NewSessionError> {
        let endpoint =
            url::Url::parse(&config.endpoint).map_err(|source| NewSessionError::InvalidEndpoint {
                url: config.endpoint.clone(),
                source,
            })?;
        let query_url = endpoint
            .join(QUERY_PATH)
            .map_err(|source| NewSessionError::InvalidEndpoint {
                url: config.endpoint.clone(),
                source,
            })?
            .to_string();

        let transport = match config.transport {
            Some(transport) => transport,
            None => Arc::new(ReqwestTransport::new(config.connection_timeout)?),
        };

        let mut default_headers = HashMap::from([
            (
                network::HEADER_AUTHORIZATION.to_owned(),
                format!("Bearer {}", config.secret),
            ),
            (
                network::HEADER_CONTENT_TYPE.to_owned(),
                "application/json; charset=utf-8".to_owned(),
            ),
            (network::HEADER_FORMAT.to_owned(), "simple".to_owned()),
            (network::HEADER_DRIVER.to_owned(), "rust".to_owned()),
        ]);
        default_headers.extend(config.extra_headers);

        Ok(Session {
            transport,
            query_url,
            default_headers,
            txn_time: TxnTime::default(),
            retry: config.retry,
            query_timeout: config.query_timeout,
            client_buffer_timeout: config.client_buffer_timeout,
            typecheck: config.typecheck,
        })
    }

    /// Executes a query and returns its decoded success payload.
    ///
    /// Throttled attempts are retried with jittered exponential backoff
    /// up to the configured ceiling; all other failures surface
    /// immediately as an [`ExecutionError`].
    pub async fn query(&self, query: &Query) -> Result<QuerySuccess, ExecutionError> {
        let request = self.build_request(query)?;
        let response = self.send_with_retry(request).await?;
        self.handle_response(response)
    }

    /// Executes a paginated query, returning a pager over its pages.
    pub fn paginate(&self, query: Query) -> QueryPager<'_> {
        QueryPager::new(self, query)
    }

    /// Raises the session watermark to an externally observed transaction
    /// time. A no-op for times at or before the stored watermark.
    ///
    /// Only needed when coordinating timestamps across multiple clients;
    /// moving the watermark arbitrarily far forward stalls transactions.
    pub fn set_last_txn_time(&self, txn_time: SystemTime) {
        if let Ok(since_epoch) = txn_time.duration_since(UNIX_EPOCH) {
            self.txn_time.observe(since_epoch.as_micros() as i64);
        }
    }

    /// The last transaction time seen by this session, in microseconds
    /// since the epoch; zero if no response has carried one yet.
    pub fn get_last_txn_time(&self) -> i64 {
        self.txn_time.current()
    }

    fn build_request(&self, query: &Query) -> Result<HttpRequest, ExecutionError> {
        let body = serde_json::to_vec(&QueryBody { query })
            .map_err(|err| ExecutionError::BodySerialize(Arc::new(err)))?;

        let mut headers = self.default_headers.clone();
        // The watermark is read fresh before every request.
        if let Some(last_seen) = self.txn_time.header_value() {
            headers.insert(network::HEADER_LAST_TXN_TS.to_owned(), last_seen);
        }

        let config = &query.config;
        let query_timeout = config.query_timeout.unwrap_or(self.query_timeout);
        headers.insert(
            network::HEADER_QUERY_TIMEOUT_MS.to_owned(),
            query_timeout.as_millis().to_string(),
        );
        if let Some(linearized) = config.linearized {
            headers.insert(network::HEADER_LINEARIZED.to_owned(), linearized.to_string());
        }
        if let Some(retries) = config.max_contention_retries {
            headers.insert(
                network::HEADER_MAX_CONTENTION_RETRIES.to_owned(),
                retries.to_string(),
            );
        }
        if let Some(tags) = &config.query_tags {
            headers.insert(network::HEADER_QUERY_TAGS.to_owned(), encode_tags(tags));
        }
        if let Some(traceparent) = &config.traceparent {
            headers.insert(network::HEADER_TRACEPARENT.to_owned(), traceparent.clone());
        }
        if let Some(typecheck) = config.typecheck.or(self.typecheck) {
            headers.insert(network::HEADER_TYPECHECK.to_owned(), typecheck.to_string());
        }

        Ok(HttpRequest {
            method: reqwest::Method::POST,
            url: self.query_url.clone(),
            headers,
            body: Bytes::from(body),
            timeout: Some(query_timeout + self.client_buffer_timeout),
        })
    }

    /// Sends a request, retrying throttled attempts.
    ///
    /// A bounded loop rather than recursion: the request is sent at most
    /// `max_attempts` times in total. Transport failures propagate
    /// immediately. The backoff sleep holds no locks.
    async fn send_with_retry(&self, request: HttpRequest) -> Result<HttpResponse, TransportError> {
        let mut attempt = 1u32;
        loop {
            let response = self.transport.send(request.clone()).await?;
            if response.status != STATUS_TOO_MANY_REQUESTS
                || attempt >= self.retry.max_attempts()
            {
                return Ok(response);
            }

            let delay = self.retry.backoff(attempt);
            warn!(
                attempt,
                delay_ms = delay.as_millis() as u64,
                "request throttled; backing off before retrying"
            );
            // The throttled response body is discarded, not decoded.
            drop(response);
            tokio::time::sleep(delay).await;
            attempt += 1;
        }
    }

    fn handle_response(&self, response: HttpResponse) -> Result<QuerySuccess, ExecutionError> {
        if let Some(raw_ts) = response.header(network::HEADER_LAST_TXN_TS) {
            match raw_ts.parse::<i64>() {
                Ok(txn_ts) => self.txn_time.observe(txn_ts),
                Err(_) => warn!(value = raw_ts, "ignoring unparsable last-txn-ts header"),
            }
        }

        let decoded: QueryResponse = match serde_json::from_slice(&response.body) {
            Ok(decoded) => decoded,
            Err(err) => {
                // Gateways and proxies answer with bodies that are not
                // query responses; classification still has to be total.
                return Err(match ServiceError::classify(response.status, None) {
                    Some(service_error) => service_error.into(),
                    None => ExecutionError::BodyDecode(Arc::new(err)),
                });
            }
        };

        if let Some(txn_ts) = decoded.txn_ts {
            self.txn_time.observe(txn_ts);
        }

        if let Some(service_error) = ServiceError::classify(response.status, decoded.error) {
            debug!(
                status = response.status,
                code = service_error.code(),
                "query failed"
            );
            return Err(service_error.into());
        }

        Ok(QuerySuccess {
            data: decoded.data.unwrap_or(Value::Null),
            txn_ts: decoded.txn_ts,
            summary: decoded.summary,
            stats: decoded.stats.unwrap_or_default(),
            schema_version: decoded.schema_version,
            static_type: decoded.static_type,
        })
    }
}

impl std::fmt::Display for Session {
    /// Only the query URL; headers hold the secret and must not leak
    /// into logs.
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.query_url)
    }
}

fn encode_tags(tags: &HashMap<String, String>) -> String {
    let mut pairs: Vec<String> = tags
        .iter()
        .map(|(key, value)| format!("{key}={value}"))
        .collect();
    // Deterministic ordering keeps the header stable across requests.
    pairs.sort();
    pairs.join(",")
}
