//! Defines the [`Query`] type: a single executable query built from a
//! template and its arguments, plus its per-query options.

use std::collections::HashMap;
use std::time::Duration;

use serde::ser::SerializeStruct;
use serde::{Serialize, Serializer};
use serde_json::Value;

use crate::errors::QueryBuildError;

use super::template::{self, TemplatePart};

/// Wire fragment of a query: raw query text or a substituted argument.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Fragment {
    Literal(String),
    Value(Value),
}

impl Serialize for Fragment {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Fragment::Literal(text) => serializer.serialize_str(text),
            Fragment::Value(value) => {
                let mut state = serializer.serialize_struct("Fragment", 1)?;
                state.serialize_field("value", value)?;
                state.end()
            }
        }
    }
}

/// Options of a single query, emitted as request headers.
#[derive(Debug, Clone, Default)]
pub(crate) struct QueryConfig {
    pub(crate) linearized: Option<bool>,
    pub(crate) query_tags: Option<HashMap<String, String>>,
    pub(crate) traceparent: Option<String>,
    pub(crate) typecheck: Option<bool>,
    pub(crate) query_timeout: Option<Duration>,
    pub(crate) max_contention_retries: Option<u32>,
}

/// A single query, ready to be executed by a
/// [`Session`](crate::client::session::Session).
///
/// Built from a template whose `${name}` placeholders are substituted
/// with argument values. Argument values are plain JSON; this crate does
/// not interpret them.
///
/// # Example
/// ```
/// use std::collections::HashMap;
/// use quill::Query;
///
/// let mut args = HashMap::new();
/// args.insert("email".to_owned(), "ada@example.com".into());
/// let query = Query::from_template("users.byEmail(${email})", &args)?;
/// # Ok::<(), quill::errors::QueryBuildError>(())
/// ```
#[derive(Debug, Clone)]
pub struct Query {
    pub(crate) fragments: Vec<Fragment>,
    pub(crate) config: QueryConfig,
}

impl Query {
    /// Builds a query by substituting `args` into the template.
    ///
    /// Fails on a malformed template, and on any placeholder (including
    /// the empty `${}`) that `args` does not provide a value for.
    pub fn from_template(
        text: &str,
        args: &HashMap<String, Value>,
    ) -> Result<Self, QueryBuildError> {
        let parts = template::parse(text)?;
        let mut fragments = Vec::with_capacity(parts.len());
        for part in parts {
            match part {
                TemplatePart::Literal(text) => fragments.push(Fragment::Literal(text)),
                TemplatePart::Variable(name) => match args.get(&name) {
                    Some(value) => fragments.push(Fragment::Value(value.clone())),
                    None => return Err(QueryBuildError::MissingArgument(name)),
                },
            }
        }
        Ok(Self {
            fragments,
            config: QueryConfig::default(),
        })
    }

    /// Requests linearized execution for this query.
    pub fn set_linearized(&mut self, linearized: bool) {
        self.config.linearized = Some(linearized);
    }

    /// Attaches free-form tags to this query, visible in service logs.
    pub fn set_query_tags(&mut self, tags: HashMap<String, String>) {
        self.config.query_tags = Some(tags);
    }

    /// Sets the W3C trace context to propagate with this query.
    pub fn set_traceparent(&mut self, traceparent: impl Into<String>) {
        self.config.traceparent = Some(traceparent.into());
    }

    /// Overrides the session's typecheck setting for this query.
    pub fn set_typecheck(&mut self, typecheck: bool) {
        self.config.typecheck = Some(typecheck);
    }

    /// Overrides the session's query timeout for this query.
    pub fn set_query_timeout(&mut self, timeout: Duration) {
        self.config.query_timeout = Some(timeout);
    }

    /// Caps how often the service retries this query's transaction under
    /// contention.
    pub fn set_max_contention_retries(&mut self, retries: u32) {
        self.config.max_contention_retries = Some(retries);
    }

    /// Returns self with linearized execution requested.
    #[must_use]
    pub fn with_linearized(mut self, linearized: bool) -> Self {
        self.set_linearized(linearized);
        self
    }

    /// Returns self with the query timeout overridden.
    #[must_use]
    pub fn with_query_timeout(mut self, timeout: Duration) -> Self {
        self.set_query_timeout(timeout);
        self
    }
}

impl Serialize for Query {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut state = serializer.serialize_struct("Query", 1)?;
        state.serialize_field("fql", &self.fragments)?;
        state.end()
    }
}
