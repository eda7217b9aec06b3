//! Wire schema of query responses and the types a caller receives back.

use serde::Deserialize;
use serde_json::Value;

/// Raw response body of a query request, as decoded from JSON.
#[derive(Deserialize, Debug, Clone, Default)]
pub(crate) struct QueryResponse {
    #[serde(default)]
    pub(crate) data: Option<Value>,
    #[serde(default)]
    pub(crate) error: Option<ErrorInfo>,
    #[serde(default)]
    pub(crate) txn_ts: Option<i64>,
    #[serde(default)]
    pub(crate) summary: Option<String>,
    #[serde(default)]
    pub(crate) stats: Option<QueryStats>,
    #[serde(default)]
    pub(crate) schema_version: Option<i64>,
    #[serde(default)]
    pub(crate) static_type: Option<String>,
}

/// The error object the service embeds in a failed response body.
///
/// Decoded by the driver, never constructed by it (outside of tests).
#[derive(Deserialize, Debug, Clone, Default, PartialEq)]
pub struct ErrorInfo {
    /// Machine-readable error code, e.g. `invalid_query`.
    #[serde(default)]
    pub code: String,
    /// Human-readable description of the failure.
    #[serde(default)]
    pub message: String,
    /// Raw payload passed to `abort()` by the query, if any.
    #[serde(default)]
    pub abort: Option<Value>,
    /// Constraint violations accompanying an `invalid_argument` failure.
    #[serde(default)]
    pub constraint_failures: Option<Vec<ConstraintFailure>>,
}

/// A single schema constraint violation reported by the service.
#[derive(Deserialize, Debug, Clone, PartialEq)]
pub struct ConstraintFailure {
    /// Description of the violated constraint.
    pub message: String,
    /// Name of the violated constraint, when the schema defines one.
    #[serde(default)]
    pub name: Option<String>,
    /// Paths of the document fields that violated the constraint.
    #[serde(default)]
    pub paths: Option<Vec<Vec<PathElement>>>,
}

/// One element of a constraint failure field path: an object key or an
/// array index.
#[derive(Deserialize, Debug, Clone, PartialEq)]
#[serde(untagged)]
pub enum PathElement {
    /// Index into an array field.
    Index(u64),
    /// Key of an object field.
    Key(String),
}

/// Server-side resource usage of a single query.
#[derive(Deserialize, Debug, Clone, Default, PartialEq, Eq)]
pub struct QueryStats {
    /// Transactional compute operations consumed.
    #[serde(default)]
    pub compute_ops: u64,
    /// Transactional read operations consumed.
    #[serde(default)]
    pub read_ops: u64,
    /// Transactional write operations consumed.
    #[serde(default)]
    pub write_ops: u64,
    /// Wall-clock query runtime in milliseconds.
    #[serde(default)]
    pub query_time_ms: u64,
    /// Times the transaction was retried due to contention.
    #[serde(default)]
    pub contention_retries: u64,
    /// Bytes read from storage.
    #[serde(default)]
    pub storage_bytes_read: u64,
    /// Bytes written to storage.
    #[serde(default)]
    pub storage_bytes_write: u64,
}

/// Successful outcome of a query.
#[derive(Debug, Clone)]
pub struct QuerySuccess {
    /// The query result. Values arrive as plain JSON; decoding them into
    /// caller types is out of this crate's hands.
    pub data: Value,
    /// Transaction time of the database state the query observed,
    /// in microseconds since the epoch.
    pub txn_ts: Option<i64>,
    /// Human-readable execution summary, e.g. accumulated log lines.
    pub summary: Option<String>,
    /// Resource usage of the query.
    pub stats: QueryStats,
    /// Version of the schema the query ran against.
    pub schema_version: Option<i64>,
    /// Inferred static type of the result, present when typechecking ran.
    pub static_type: Option<String>,
}

/// One page of a paginated result set.
#[derive(Debug, Clone, PartialEq)]
pub struct Page {
    /// The items of this page, in result order.
    pub data: Vec<Value>,
    /// Cursor of the next page; `None` on the last page.
    pub after: Option<String>,
}

impl Page {
    /// Normalizes a success payload into a page.
    ///
    /// Page-shaped objects (a `data` array plus an optional `after`
    /// cursor, possibly still wrapped in their `@set` tagged form) map
    /// directly; any other payload becomes a single-item page with no
    /// cursor. An empty cursor string counts as no cursor.
    pub(crate) fn from_value(data: Value) -> Page {
        let data = unwrap_set(data);
        match data {
            Value::Object(mut object) if object.get("data").is_some_and(Value::is_array) => {
                let after = object
                    .get("after")
                    .and_then(Value::as_str)
                    .filter(|cursor| !cursor.is_empty())
                    .map(str::to_owned);
                let data = match object.remove("data") {
                    Some(Value::Array(items)) => items,
                    _ => Vec::new(),
                };
                Page { data, after }
            }
            other => Page {
                data: vec![other],
                after: None,
            },
        }
    }
}

fn unwrap_set(data: Value) -> Value {
    match data {
        Value::Object(mut object) if object.len() == 1 => match object.remove("@set") {
            Some(inner) => inner,
            None => Value::Object(object),
        },
        other => other,
    }
}
