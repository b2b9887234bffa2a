//! Integration tests for the HTTP gateway against a local axum server.

use autopatch_client::{Error, HttpGateway, Method, RemoteGateway};
use autopatch_engine::{ContentType, FormConfig};
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::routing::get;
use axum::{Json, Router};
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::sync::Arc;

/// What the server saw of one request.
#[derive(Debug, Clone)]
struct Seen {
    method: &'static str,
    accept: Option<String>,
    content_type: Option<String>,
    body: String,
}

type Log = Arc<Mutex<Vec<Seen>>>;

fn header(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
}

async fn get_form(State(log): State<Log>, headers: HeaderMap) -> Json<Value> {
    log.lock().push(Seen {
        method: "GET",
        accept: header(&headers, "accept"),
        content_type: header(&headers, "content-type"),
        body: String::new(),
    });
    Json(json!({"name": "Ada", "age": 36}))
}

async fn patch_form(State(log): State<Log>, headers: HeaderMap, body: String) -> StatusCode {
    log.lock().push(Seen {
        method: "PATCH",
        accept: header(&headers, "accept"),
        content_type: header(&headers, "content-type"),
        body,
    });
    StatusCode::NO_CONTENT
}

async fn plain_text() -> &'static str {
    "OK"
}

async fn unavailable() -> StatusCode {
    StatusCode::SERVICE_UNAVAILABLE
}

/// Start a test server and return its base URL.
async fn serve(log: Log) -> String {
    let app = Router::new()
        .route("/form", get(get_form).patch(patch_form))
        .route("/text", get(plain_text).patch(plain_text))
        .route("/down", get(unavailable).patch(unavailable))
        .with_state(log);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{}", addr)
}

#[tokio::test]
async fn get_sends_accept_and_parses_the_body() {
    let log = Log::default();
    let base = serve(log.clone()).await;
    let gateway = HttpGateway::new(&FormConfig::new(format!("{base}/form"))).unwrap();

    let response = gateway.send(Method::Get, None).await.unwrap();

    assert_eq!(response.status, 200);
    assert_eq!(response.body, json!({"name": "Ada", "age": 36}));

    let seen = log.lock().clone();
    assert_eq!(seen.len(), 1);
    assert_eq!(seen[0].method, "GET");
    assert_eq!(seen[0].accept.as_deref(), Some("application/json"));
    assert_eq!(seen[0].content_type, None);
}

#[tokio::test]
async fn patch_sends_the_configured_media_type() {
    let log = Log::default();
    let base = serve(log.clone()).await;
    let config =
        FormConfig::new(format!("{base}/form")).with_content_type(ContentType::JsonApi);
    let gateway = HttpGateway::new(&config).unwrap();

    let body = json!({"data": {"type": "merge", "id": "self", "attributes": {}}});
    let response = gateway.send(Method::Patch, Some(&body)).await.unwrap();

    // An empty response body reads as null
    assert_eq!(response.status, 204);
    assert_eq!(response.body, Value::Null);

    let seen = log.lock().clone();
    assert_eq!(seen[0].method, "PATCH");
    assert_eq!(seen[0].accept.as_deref(), Some("application/vnd.api+json"));
    assert_eq!(
        seen[0].content_type.as_deref(),
        Some("application/vnd.api+json")
    );
    assert_eq!(serde_json::from_str::<Value>(&seen[0].body).unwrap(), body);
}

#[tokio::test]
async fn success_with_a_text_body_reads_as_null() {
    let base = serve(Log::default()).await;
    let gateway = HttpGateway::new(&FormConfig::new(format!("{base}/text"))).unwrap();

    let response = gateway
        .send(Method::Patch, Some(&json!({"a": {"value": 1}})))
        .await
        .unwrap();
    assert_eq!(response.status, 200);
    assert_eq!(response.body, Value::Null);

    let response = gateway.send(Method::Get, None).await.unwrap();
    assert_eq!(response.body, Value::Null);
}

#[tokio::test]
async fn non_success_status_is_an_error() {
    let base = serve(Log::default()).await;
    let gateway = HttpGateway::new(&FormConfig::new(format!("{base}/down"))).unwrap();

    let err = gateway
        .send(Method::Patch, Some(&json!({})))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        Error::Status {
            method: "PATCH",
            status: 503
        }
    ));
    assert!(err.is_transport());

    let err = gateway.send(Method::Get, None).await.unwrap_err();
    assert!(matches!(err, Error::Status { method: "GET", .. }));
}

#[tokio::test]
async fn unreachable_remote_is_a_transport_error() {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let gateway = HttpGateway::new(&FormConfig::new(format!("http://{addr}/form"))).unwrap();
    let err = gateway.send(Method::Get, None).await.unwrap_err();

    assert!(matches!(err, Error::Transport(_)));
    assert!(err.is_transport());
}
