use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use assert_matches::assert_matches;
use async_trait::async_trait;
use bytes::Bytes;
use futures::TryStreamExt;
use serde_json::{json, Value};

use crate::client::session::Session;
use crate::client::session_builder::{SessionBuilder, ENDPOINT_LOCAL};
use crate::errors::{ExecutionError, ServiceError};
use crate::network::{HttpRequest, HttpResponse, Transport, TransportError};
use crate::policies::retry::RetryConfig;
use crate::statement::Query;

fn setup_tracing() {
    let _ = tracing_subscriber::fmt::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .without_time()
        .try_init();
}

/// Transport stub: hands out canned responses in order, repeating the
/// last one, and records every request it saw.
struct StubTransport {
    responses: Mutex<Vec<Result<HttpResponse, TransportError>>>,
    requests: Mutex<Vec<HttpRequest>>,
}

impl StubTransport {
    fn new(responses: Vec<Result<HttpResponse, TransportError>>) -> Arc<Self> {
        assert!(!responses.is_empty());
        Arc::new(StubTransport {
            responses: Mutex::new(responses),
            requests: Mutex::new(Vec::new()),
        })
    }

    fn request_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    fn request(&self, index: usize) -> HttpRequest {
        self.requests.lock().unwrap()[index].clone()
    }

    fn request_body(&self, index: usize) -> Value {
        serde_json::from_slice(&self.request(index).body).unwrap()
    }
}

#[async_trait]
impl Transport for StubTransport {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, TransportError> {
        self.requests.lock().unwrap().push(request);
        let mut responses = self.responses.lock().unwrap();
        if responses.len() > 1 {
            Ok(responses.remove(0)?)
        } else {
            responses[0].clone()
        }
    }
}

fn response(status: u16, body: Value) -> HttpResponse {
    HttpResponse {
        status,
        headers: HashMap::new(),
        body: Bytes::from(serde_json::to_vec(&body).unwrap()),
    }
}

fn response_with_txn_ts(status: u16, body: Value, txn_ts: i64) -> HttpResponse {
    let mut response = response(status, body);
    response
        .headers
        .insert("x-last-txn-ts".to_owned(), txn_ts.to_string());
    response
}

fn session(transport: Arc<StubTransport>) -> Session {
    SessionBuilder::new("test-secret")
        .endpoint(ENDPOINT_LOCAL)
        // Zero backoff keeps retry tests instant.
        .retry(RetryConfig::new(3, Duration::ZERO))
        .transport(transport)
        .build()
        .unwrap()
}

fn query(text: &str) -> Query {
    Query::from_template(text, &HashMap::new()).unwrap()
}

#[tokio::test]
async fn request_carries_default_headers_and_serialized_query() {
    setup_tracing();
    let transport = StubTransport::new(vec![Ok(response(200, json!({"data": 1})))]);
    let session = session(transport.clone());

    session.query(&query("Collection.all()")).await.unwrap();

    let request = transport.request(0);
    assert_eq!(request.url, "http://localhost:8443/query/1");
    assert_eq!(
        request.headers.get("Authorization").map(String::as_str),
        Some("Bearer test-secret")
    );
    assert_eq!(
        request.headers.get("X-Format").map(String::as_str),
        Some("simple")
    );
    assert_eq!(
        request.headers.get("X-Query-Timeout-Ms").map(String::as_str),
        Some("5000")
    );
    // Nothing observed yet, so no consistency header goes out.
    assert!(!request.headers.contains_key("X-Last-Txn-Ts"));
    assert_eq!(
        transport.request_body(0),
        json!({"query": {"fql": ["Collection.all()"]}})
    );
}

#[tokio::test]
async fn per_query_options_become_headers() {
    setup_tracing();
    let transport = StubTransport::new(vec![Ok(response(200, json!({"data": null})))]);
    let session = session(transport.clone());

    let mut query = query("1 + 1");
    query.set_linearized(true);
    query.set_typecheck(false);
    query.set_max_contention_retries(7);
    query.set_traceparent("00-aaaa-bbbb-01");
    query.set_query_tags(HashMap::from([
        ("env".to_owned(), "test".to_owned()),
        ("app".to_owned(), "quill".to_owned()),
    ]));
    query.set_query_timeout(Duration::from_secs(2));
    session.query(&query).await.unwrap();

    let headers = transport.request(0).headers;
    assert_eq!(headers.get("X-Linearized").map(String::as_str), Some("true"));
    assert_eq!(headers.get("X-Typecheck").map(String::as_str), Some("false"));
    assert_eq!(
        headers.get("X-Max-Contention-Retries").map(String::as_str),
        Some("7")
    );
    assert_eq!(
        headers.get("Traceparent").map(String::as_str),
        Some("00-aaaa-bbbb-01")
    );
    assert_eq!(
        headers.get("X-Query-Tags").map(String::as_str),
        Some("app=quill,env=test")
    );
    assert_eq!(
        headers.get("X-Query-Timeout-Ms").map(String::as_str),
        Some("2000")
    );
}

#[tokio::test]
async fn watermark_advances_and_flows_into_the_next_request() {
    setup_tracing();
    let transport = StubTransport::new(vec![
        Ok(response_with_txn_ts(200, json!({"data": 1}), 42)),
        Ok(response_with_txn_ts(200, json!({"data": 2}), 40)),
    ]);
    let session = session(transport.clone());

    session.query(&query("a")).await.unwrap();
    assert_eq!(session.get_last_txn_time(), 42);

    session.query(&query("b")).await.unwrap();
    assert_eq!(
        transport.request(1).headers.get("X-Last-Txn-Ts").map(String::as_str),
        Some("42")
    );
    // The older timestamp of the second response must not regress it.
    assert_eq!(session.get_last_txn_time(), 42);
}

#[tokio::test]
async fn watermark_observes_body_txn_ts() {
    setup_tracing();
    let transport =
        StubTransport::new(vec![Ok(response(200, json!({"data": 1, "txn_ts": 777})))]);
    let session = session(transport);

    session.query(&query("a")).await.unwrap();
    assert_eq!(session.get_last_txn_time(), 777);
}

#[tokio::test]
async fn set_last_txn_time_is_monotonic() {
    setup_tracing();
    let transport = StubTransport::new(vec![Ok(response(200, json!({"data": 1})))]);
    let session = session(transport);

    session.set_last_txn_time(UNIX_EPOCH + Duration::from_micros(100));
    session.set_last_txn_time(UNIX_EPOCH + Duration::from_micros(50));
    assert_eq!(session.get_last_txn_time(), 100);

    // Pre-epoch times are ignored rather than regressing the watermark.
    session.set_last_txn_time(SystemTime::UNIX_EPOCH - Duration::from_secs(1));
    assert_eq!(session.get_last_txn_time(), 100);
}

#[tokio::test]
async fn throttled_request_is_sent_exactly_max_attempts_times() {
    setup_tracing();
    let throttled = response(
        429,
        json!({"error": {"code": "limit_exceeded", "message": "Rate limit exceeded"}}),
    );
    let transport = StubTransport::new(vec![Ok(throttled)]);
    let session = session(transport.clone());

    let err = session.query(&query("a")).await.unwrap_err();
    assert_eq!(transport.request_count(), 3);
    assert_matches!(
        err,
        ExecutionError::Service(ServiceError::Throttling(ref details)) => {
            assert_eq!(details.status_code, 429);
            assert_eq!(details.code, "limit_exceeded");
        }
    );
}

#[tokio::test]
async fn throttled_request_succeeds_after_backoff() {
    setup_tracing();
    let transport = StubTransport::new(vec![
        Ok(response(429, json!({"error": {"code": "limit_exceeded"}}))),
        Ok(response(200, json!({"data": "ok"}))),
    ]);
    let session = session(transport.clone());

    let success = session.query(&query("a")).await.unwrap();
    assert_eq!(success.data, json!("ok"));
    assert_eq!(transport.request_count(), 2);
}

#[tokio::test]
async fn transport_errors_propagate_without_retry() {
    setup_tracing();
    let failure = TransportError::Other(Arc::new(std::io::Error::new(
        std::io::ErrorKind::ConnectionRefused,
        "connection refused",
    )));
    let transport = StubTransport::new(vec![Err(failure)]);
    let session = session(transport.clone());

    let err = session.query(&query("a")).await.unwrap_err();
    assert_matches!(err, ExecutionError::Transport(_));
    assert_eq!(transport.request_count(), 1);
}

#[tokio::test]
async fn service_errors_are_classified() {
    setup_tracing();
    let transport = StubTransport::new(vec![Ok(response(
        400,
        json!({"error": {"code": "invalid_query", "message": "unexpected token"}}),
    ))]);
    let session = session(transport);

    let err = session.query(&query("a")).await.unwrap_err();
    assert_matches!(err, ExecutionError::Service(ref error) => {
        assert_matches!(error, ServiceError::QueryCheck(_));
        assert_eq!(error.status_code(), 400);
        assert_eq!(error.message(), "unexpected token");
    });
}

#[tokio::test]
async fn abort_payload_is_unmarshallable() {
    setup_tracing();

    #[derive(serde::Deserialize, Debug, PartialEq)]
    struct CustomAbort {
        msg: String,
        aborted_at: i64,
    }

    let transport = StubTransport::new(vec![Ok(response(
        400,
        json!({"error": {
            "code": "abort",
            "message": "",
            "abort": {"msg": "abrasive message", "aborted_at": 1_677_608_410_000_010_i64},
        }}),
    ))]);
    let session = session(transport);

    let err = session.query(&query(r#"abort({ msg: "abrasive message" })"#)).await.unwrap_err();
    assert_matches!(err, ExecutionError::Service(ref error) => {
        assert_eq!(error.code(), "abort");
        let decoded: CustomAbort = error.abort().unwrap().unwrap();
        assert_eq!(decoded.msg, "abrasive message");
        assert_eq!(decoded.aborted_at, 1_677_608_410_000_010);
    });
}

#[tokio::test]
async fn non_query_response_bodies_still_classify_by_status() {
    setup_tracing();
    let gateway_error = HttpResponse {
        status: 502,
        headers: HashMap::new(),
        body: Bytes::from_static(b"<html>bad gateway</html>"),
    };
    let transport = StubTransport::new(vec![Ok(gateway_error)]);
    let session = session(transport);

    let err = session.query(&query("a")).await.unwrap_err();
    assert_matches!(err, ExecutionError::Service(ServiceError::Other(ref details)) => {
        assert_eq!(details.status_code, 502);
    });
}

#[tokio::test]
async fn malformed_success_body_is_a_decode_error() {
    setup_tracing();
    let garbage = HttpResponse {
        status: 200,
        headers: HashMap::new(),
        body: Bytes::from_static(b"not json"),
    };
    let transport = StubTransport::new(vec![Ok(garbage)]);
    let session = session(transport);

    let err = session.query(&query("a")).await.unwrap_err();
    assert_matches!(err, ExecutionError::BodyDecode(_));
}

#[tokio::test]
async fn pager_walks_cursors_until_exhausted() {
    setup_tracing();
    let transport = StubTransport::new(vec![
        Ok(response(200, json!({"data": {"data": [1, 2], "after": "a"}}))),
        Ok(response(200, json!({"data": {"data": [3], "after": "b"}}))),
        Ok(response(200, json!({"data": {"data": [4], "after": ""}}))),
    ]);
    let session = session(transport.clone());
    let mut pager = session.paginate(query("items.all()"));

    assert!(pager.has_next());
    let first = pager.next_page().await.unwrap();
    assert_eq!(first.data, vec![json!(1), json!(2)]);
    assert_eq!(first.after.as_deref(), Some("a"));

    let second = pager.next_page().await.unwrap();
    assert_eq!(second.data, vec![json!(3)]);
    assert!(pager.has_next());

    let third = pager.next_page().await.unwrap();
    assert_eq!(third.data, vec![json!(4)]);
    assert_eq!(third.after, None);
    assert!(!pager.has_next());

    // The follow-up requests are cursor continuations.
    assert_eq!(transport.request_count(), 3);
    assert_eq!(
        transport.request_body(1),
        json!({"query": {"fql": ["Set.paginate(", {"value": "a"}, ")"]}})
    );

    assert_matches!(
        pager.next_page().await.unwrap_err(),
        ExecutionError::PagerExhausted
    );
}

#[tokio::test]
async fn pager_wraps_plain_payload_into_single_item_page() {
    setup_tracing();
    let transport = StubTransport::new(vec![Ok(response(200, json!({"data": {"name": "Ada"}})))]);
    let session = session(transport.clone());
    let mut pager = session.paginate(query("users.first()"));

    let page = pager.next_page().await.unwrap();
    assert_eq!(page.data, vec![json!({"name": "Ada"})]);
    assert!(!pager.has_next());
    assert_eq!(transport.request_count(), 1);
}

#[tokio::test]
async fn pager_keeps_the_pending_query_on_failure() {
    setup_tracing();
    let transport = StubTransport::new(vec![
        Ok(response(503, json!({"error": {"code": "time_out", "message": "unavailable"}}))),
        Ok(response(200, json!({"data": {"data": [1]}}))),
    ]);
    let session = session(transport);
    let mut pager = session.paginate(query("items.all()"));

    let err = pager.next_page().await.unwrap_err();
    assert_matches!(err, ExecutionError::Service(ServiceError::ServiceTimeout(_)));
    assert!(pager.has_next());

    let page = pager.next_page().await.unwrap();
    assert_eq!(page.data, vec![json!(1)]);
}

#[tokio::test]
async fn pager_stream_yields_every_page() {
    setup_tracing();
    let transport = StubTransport::new(vec![
        Ok(response(200, json!({"data": {"data": [1], "after": "a"}}))),
        Ok(response(200, json!({"data": {"data": [2]}}))),
    ]);
    let session = session(transport);

    let pages: Vec<_> = session
        .paginate(query("items.all()"))
        .into_stream()
        .try_collect()
        .await
        .unwrap();
    assert_eq!(pages.len(), 2);
    assert_eq!(pages[0].data, vec![json!(1)]);
    assert_eq!(pages[1].data, vec![json!(2)]);
}
