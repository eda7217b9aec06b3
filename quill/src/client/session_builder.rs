//! `SessionBuilder` provides an easy way to create new [`Session`]s.

use std::sync::Arc;
use std::time::Duration;

use crate::client::session::{Session, SessionConfig};
use crate::errors::NewSessionError;
use crate::network::Transport;
use crate::policies::retry::RetryConfig;

/// Production endpoint.
pub const ENDPOINT_DEFAULT: &str = "https://db.quill.io";
/// Local (Docker) endpoint.
pub const ENDPOINT_LOCAL: &str = "http://localhost:8443";

/// Environment variable overriding the endpoint for
/// [`SessionBuilder::from_env`].
pub const ENV_QUILL_ENDPOINT: &str = "QUILL_ENDPOINT";
/// Environment variable providing the secret for
/// [`SessionBuilder::from_env`].
pub const ENV_QUILL_SECRET: &str = "QUILL_SECRET";

/// Builder of [`Session`] instances.
///
/// # Example
/// ```no_run
/// use quill::SessionBuilder;
///
/// # fn example() -> Result<(), quill::errors::NewSessionError> {
/// let session = SessionBuilder::new("my-secret")
///     .endpoint("http://localhost:8443")
///     .query_timeout(std::time::Duration::from_secs(10))
///     .build()?;
/// # Ok(())
/// # }
/// ```
#[derive(Clone, Default)]
pub struct SessionBuilder {
    config: SessionConfig,
}

impl SessionBuilder {
    /// Creates a builder with the given secret and recommended defaults.
    pub fn new(secret: impl Into<String>) -> Self {
        let mut config = SessionConfig::new();
        config.secret = secret.into();
        SessionBuilder { config }
    }

    /// Creates a builder configured from the environment: the secret
    /// from `QUILL_SECRET` (required), the endpoint from
    /// `QUILL_ENDPOINT` (falling back to the production endpoint).
    pub fn from_env() -> Result<Self, NewSessionError> {
        let secret = std::env::var(ENV_QUILL_SECRET)
            .map_err(|_| NewSessionError::MissingSecret(ENV_QUILL_SECRET))?;
        let mut builder = SessionBuilder::new(secret);
        if let Ok(endpoint) = std::env::var(ENV_QUILL_ENDPOINT) {
            builder = builder.endpoint(endpoint);
        }
        Ok(builder)
    }

    /// Sets the base URL of the service.
    pub fn endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.config.endpoint = endpoint.into();
        self
    }

    /// Sets the server-side per-query timeout (default 5 s).
    pub fn query_timeout(mut self, timeout: Duration) -> Self {
        self.config.query_timeout = timeout;
        self
    }

    /// Sets the extra time past the query timeout before a request with
    /// no response is abandoned (default 5 s). Values close to zero make
    /// the client abort before the server can report a legitimate
    /// response or error.
    pub fn client_buffer_timeout(mut self, timeout: Duration) -> Self {
        self.config.client_buffer_timeout = timeout;
        self
    }

    /// Sets the connection establishment timeout (default 5 s).
    pub fn connection_timeout(mut self, timeout: Duration) -> Self {
        self.config.connection_timeout = timeout;
        self
    }

    /// Sets the retry policy for throttled requests
    /// (default: 3 attempts, 20 s backoff cap).
    pub fn retry(mut self, retry: RetryConfig) -> Self {
        self.config.retry = retry;
        self
    }

    /// Sets the default typecheck flag sent with every query; per-query
    /// options override it.
    pub fn typecheck(mut self, typecheck: bool) -> Self {
        self.config.typecheck = Some(typecheck);
        self
    }

    /// Adds a default header sent with every request.
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.config.extra_headers.insert(name.into(), value.into());
        self
    }

    /// Replaces the default reqwest transport, e.g. with a stub in tests.
    pub fn transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.config.transport = Some(transport);
        self
    }

    /// Builds the session.
    pub fn build(self) -> Result<Session, NewSessionError> {
        Session::new(self.config)
    }
}
