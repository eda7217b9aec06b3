//! Errors returned by the driver.
//!
//! Failures fall into two firmly separated categories: [`ServiceError`]
//! covers everything the service itself reported (classified from the
//! HTTP status and the error body), while [`TransportError`] covers
//! requests that never produced a response. Only throttling responses are
//! ever retried; every other category surfaces on first occurrence.

use std::fmt;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde_json::Value;
use thiserror::Error;

pub use crate::network::TransportError;
use crate::response::{ConstraintFailure, ErrorInfo};
pub use crate::statement::template::TemplateParseError;

/// Error that occurred during query execution.
#[derive(Error, Debug, Clone)]
#[non_exhaustive]
pub enum ExecutionError {
    /// The service reported a failure.
    #[error(transparent)]
    Service(#[from] ServiceError),

    /// The request never produced a response. Propagated unchanged and
    /// never retried.
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    /// The query could not be built from its template and arguments.
    /// Reported before any network call is attempted.
    #[error(transparent)]
    BadQuery(#[from] QueryBuildError),

    /// The request body could not be serialized.
    #[error("failed to serialize request body: {0}")]
    BodySerialize(Arc<serde_json::Error>),

    /// A 2xx response body was not a well-formed query response.
    #[error("failed to decode response body: {0}")]
    BodyDecode(Arc<serde_json::Error>),

    /// `next_page` was called on an exhausted pager.
    #[error("no page left to fetch; check has_next first")]
    PagerExhausted,
}

/// The caller passed an invalid template or mismatched arguments.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum QueryBuildError {
    /// The template text contains a malformed placeholder.
    #[error(transparent)]
    InvalidTemplate(#[from] TemplateParseError),

    /// The template names a variable the arguments do not provide.
    #[error("template variable '{0}' was not provided")]
    MissingArgument(String),
}

/// Details every classified service error carries.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ErrorDetails {
    /// HTTP status of the response this error was classified from.
    /// Always set, for every category including the fallback.
    pub status_code: u16,
    /// Service-reported error code; empty when the body carried none.
    pub code: String,
    /// Human-readable message from the service.
    pub message: String,
}

impl fmt::Display for ErrorDetails {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "http {}", self.status_code)?;
        if !self.code.is_empty() {
            write!(f, " [{}]", self.code)?;
        }
        if !self.message.is_empty() {
            write!(f, ": {}", self.message)?;
        }
        Ok(())
    }
}

/// A failure reported by the service, classified by HTTP status and
/// error code into a closed set of variants.
///
/// Classification is total: a status/code combination outside the table
/// lands in [`ServiceError::Other`], never in a panic or a decode error.
#[derive(Error, Debug, Clone)]
#[non_exhaustive]
pub enum ServiceError {
    /// The query failed checks before execution (400 `invalid_query`).
    /// Retrying cannot help; the query text itself is defective.
    #[error("query check failed: {0}")]
    QueryCheck(ErrorDetails),

    /// The query failed while executing (400 `invalid_argument`).
    #[error("query runtime failure: {details}")]
    QueryRuntime {
        /// Status, code and message of the failure.
        details: ErrorDetails,
        /// Constraint violations reported with the failure; may be empty.
        constraint_failures: Vec<ConstraintFailure>,
    },

    /// The request was malformed (400 `invalid_request`).
    #[error("invalid request: {0}")]
    InvalidRequest(ErrorDetails),

    /// The query called `abort()` (400 `abort`).
    #[error("query aborted: {details}")]
    Abort {
        /// Status, code and message of the failure.
        details: ErrorDetails,
        /// Raw abort payload; decode it with [`ServiceError::abort`].
        payload: Option<Value>,
    },

    /// The secret was missing or invalid (401).
    #[error("authentication failed: {0}")]
    Authentication(ErrorDetails),

    /// The secret does not allow this operation (403).
    #[error("not authorized: {0}")]
    Authorization(ErrorDetails),

    /// The transaction lost repeatedly to concurrent writers
    /// (409 `contended_transaction`).
    #[error("transaction contention: {0}")]
    ContendedTransaction(ErrorDetails),

    /// The client exceeded its rate limits (429). The only category the
    /// executor retries, up to its attempt ceiling.
    #[error("request throttled: {0}")]
    Throttling(ErrorDetails),

    /// The query ran past its server-side timeout (440).
    #[error("query timed out: {0}")]
    QueryTimeout(ErrorDetails),

    /// The service failed unexpectedly (500).
    #[error("internal service error: {0}")]
    ServiceInternal(ErrorDetails),

    /// The service was unavailable or timed out internally (503).
    #[error("service timeout: {0}")]
    ServiceTimeout(ErrorDetails),

    /// Any status/code combination outside the classification table:
    /// unmapped statuses such as 404 or 502, unknown codes on mapped
    /// statuses, and 2xx responses whose body carried an error object.
    #[error("service error: {0}")]
    Other(ErrorDetails),
}

impl ServiceError {
    /// Classifies a response into a service error, or `None` for success.
    ///
    /// The status is checked first, then the body's error code
    /// disambiguates within the status. A 2xx response without an error
    /// body is the only successful outcome.
    pub(crate) fn classify(status: u16, error: Option<ErrorInfo>) -> Option<ServiceError> {
        let info = match error {
            Some(info) => info,
            None if (200..300).contains(&status) => return None,
            None => ErrorInfo::default(),
        };

        let details = ErrorDetails {
            status_code: status,
            code: info.code.clone(),
            message: info.message.clone(),
        };

        let classified = match (status, info.code.as_str()) {
            (400, "invalid_query") => ServiceError::QueryCheck(details),
            (400, "invalid_argument") => ServiceError::QueryRuntime {
                details,
                constraint_failures: info.constraint_failures.unwrap_or_default(),
            },
            (400, "invalid_request") => ServiceError::InvalidRequest(details),
            (400, "abort") => ServiceError::Abort {
                details,
                payload: info.abort,
            },
            (401, _) => ServiceError::Authentication(details),
            (403, _) => ServiceError::Authorization(details),
            (409, "contended_transaction") => ServiceError::ContendedTransaction(details),
            (429, _) => ServiceError::Throttling(details),
            (440, _) => ServiceError::QueryTimeout(details),
            (500, _) => ServiceError::ServiceInternal(details),
            (503, _) => ServiceError::ServiceTimeout(details),
            _ => ServiceError::Other(details),
        };
        Some(classified)
    }

    /// Status, code and message of this error, whatever the variant.
    pub fn details(&self) -> &ErrorDetails {
        match self {
            ServiceError::QueryCheck(details)
            | ServiceError::InvalidRequest(details)
            | ServiceError::Authentication(details)
            | ServiceError::Authorization(details)
            | ServiceError::ContendedTransaction(details)
            | ServiceError::Throttling(details)
            | ServiceError::QueryTimeout(details)
            | ServiceError::ServiceInternal(details)
            | ServiceError::ServiceTimeout(details)
            | ServiceError::Other(details) => details,
            ServiceError::QueryRuntime { details, .. } | ServiceError::Abort { details, .. } => {
                details
            }
        }
    }

    /// HTTP status of the response this error was classified from.
    pub fn status_code(&self) -> u16 {
        self.details().status_code
    }

    /// Service-reported error code; empty when the body carried none.
    pub fn code(&self) -> &str {
        &self.details().code
    }

    /// Human-readable message from the service.
    pub fn message(&self) -> &str {
        &self.details().message
    }

    /// Constraint violations of a [`ServiceError::QueryRuntime`] error;
    /// empty for every other variant.
    pub fn constraint_failures(&self) -> &[ConstraintFailure] {
        match self {
            ServiceError::QueryRuntime {
                constraint_failures,
                ..
            } => constraint_failures,
            _ => &[],
        }
    }

    /// Raw abort payload, when this is an abort error that carried one.
    pub fn abort_payload(&self) -> Option<&Value> {
        match self {
            ServiceError::Abort { payload, .. } => payload.as_ref(),
            _ => None,
        }
    }

    /// Decodes the abort payload into a caller-defined type.
    ///
    /// Returns `None` when this error is not an abort, or the abort
    /// carried no payload.
    pub fn abort<T: DeserializeOwned>(&self) -> Option<serde_json::Result<T>> {
        self.abort_payload()
            .map(|payload| serde_json::from_value(payload.clone()))
    }
}

/// Creating a new session failed before any query was attempted.
#[derive(Error, Debug, Clone)]
#[non_exhaustive]
pub enum NewSessionError {
    /// No authentication secret was provided.
    #[error("authentication secret not set: pass it to SessionBuilder or set {0}")]
    MissingSecret(&'static str),

    /// The endpoint is not a valid URL.
    #[error("invalid endpoint url '{url}': {source}")]
    InvalidEndpoint {
        /// The rejected endpoint string.
        url: String,
        /// Why the URL parser rejected it.
        source: url::ParseError,
    },

    /// The default transport could not be constructed.
    #[error(transparent)]
    Transport(#[from] TransportError),
}
