//! End-to-end tests of the hyper transport against a local axum server.

use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use axum::Router;
use axum::http::{HeaderMap, StatusCode, header};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use serde_json::{Value, json};

use callflow_client::{
    Body, Client, EndStatus, ErrorReason, RequestError, RequestOptions, ResponseData,
    TransportError,
};

async fn json_handler() -> impl IntoResponse {
    axum::Json(json!({ "hello": "world" }))
}

async fn found_handler() -> impl IntoResponse {
    (StatusCode::FOUND, [(header::LOCATION, "/json")])
}

async fn slow_handler() -> impl IntoResponse {
    tokio::time::sleep(Duration::from_secs(5)).await;
    "late"
}

async fn large_handler() -> impl IntoResponse {
    "x".repeat(256 * 1024)
}

async fn echo_handler(headers: HeaderMap, body: String) -> impl IntoResponse {
    let content_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("")
        .to_string();
    axum::Json(json!({ "content_type": content_type, "body": body }))
}

async fn spawn_server() -> SocketAddr {
    let app = Router::new()
        .route("/json", get(json_handler))
        .route("/found", get(found_handler))
        .route("/slow", get(slow_handler))
        .route("/large", get(large_handler))
        .route("/echo", post(echo_handler));

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    addr
}

#[tokio::test]
async fn test_get_json() {
    let addr = spawn_server().await;
    let client = Client::new().unwrap();

    let response = client
        .request(RequestOptions::get(format!("http://{addr}/json")).json(true))
        .await;

    assert!(response.success());
    assert_eq!(response.status(), 200);
    assert_eq!(response.status_text(), "OK");
    assert_eq!(
        response.data(),
        Some(ResponseData::Json(json!({ "hello": "world" })))
    );
    assert!(
        response
            .header("content-type")
            .is_some_and(|ct| ct.starts_with("application/json"))
    );
}

#[tokio::test]
async fn test_content_type_sniffing_without_json_mode() {
    let addr = spawn_server().await;
    let client = Client::new().unwrap();

    let response = client.get(format!("http://{addr}/json")).await;

    let value: Value = response.json().unwrap();
    assert_eq!(value["hello"], "world");
}

#[tokio::test]
async fn test_post_json_body() {
    let addr = spawn_server().await;
    let client = Client::builder().json(true).build().unwrap();

    let response = client
        .post(
            format!("http://{addr}/echo"),
            Body::json(&json!({ "a": 1 })).unwrap(),
        )
        .await;

    assert!(response.success());
    let echoed: Value = response.json().unwrap();
    assert_eq!(echoed["content_type"], "application/json");
    assert_eq!(echoed["body"], r#"{"a":1}"#);
}

#[tokio::test]
async fn test_post_text_body_gets_text_content_type() {
    let addr = spawn_server().await;
    let client = Client::new().unwrap();

    let response = client
        .post(format!("http://{addr}/echo"), "hello")
        .await;

    let echoed: Value = response.json().unwrap();
    assert_eq!(echoed["content_type"], "text/plain;charset=UTF-8");
    assert_eq!(echoed["body"], "hello");
}

#[tokio::test]
async fn test_redirect_followed() {
    let addr = spawn_server().await;
    let client = Client::new().unwrap();

    let request = client.request(
        RequestOptions::get(format!("http://{addr}/found"))
            .json(true)
            .max_redirects(1),
    );
    let response = request.clone().await;

    assert!(response.success());
    assert_eq!(
        response.lifecycle().options().url(),
        format!("http://{addr}/json")
    );
    assert_eq!(request.status(), 302);
    assert!(request.redirect().is_some());
}

#[tokio::test]
async fn test_redirect_not_followed_by_default() {
    let addr = spawn_server().await;
    let client = Client::new().unwrap();

    let response = client.get(format!("http://{addr}/found")).await;

    assert_eq!(response.end_status(), EndStatus::Success);
    assert_eq!(response.status(), 302);
    assert_eq!(response.header("location").as_deref(), Some("/json"));
}

#[tokio::test]
async fn test_timeout() {
    let addr = spawn_server().await;
    let client = Client::new().unwrap();

    let response = client
        .request(
            RequestOptions::get(format!("http://{addr}/slow"))
                .timeout(Duration::from_millis(100)),
        )
        .await;

    assert!(!response.success());
    assert_eq!(response.error(), Some(ErrorReason::Timeout));
    assert_eq!(response.status(), 0);
}

#[tokio::test]
async fn test_abort_in_flight() {
    let addr = spawn_server().await;
    let client = Client::new().unwrap();

    let request = client.get(format!("http://{addr}/slow"));
    let aborter = request.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        aborter.abort();
    });

    let response = request.await;
    assert_eq!(response.error(), Some(ErrorReason::Abort));
    assert_eq!(response.status(), 0);
}

#[tokio::test]
async fn test_download_progress() {
    let addr = spawn_server().await;
    let client = Client::new().unwrap();
    let events = Arc::new(AtomicUsize::new(0));
    let last_loaded = Arc::new(AtomicUsize::new(0));
    let (count, loaded) = (events.clone(), last_loaded.clone());

    let response = client
        .request(
            RequestOptions::get(format!("http://{addr}/large")).on_progress(move |event| {
                count.fetch_add(1, Ordering::SeqCst);
                loaded.store(event.loaded as usize, Ordering::SeqCst);
            }),
        )
        .await;

    assert!(response.success());
    assert_eq!(response.text().map(|t| t.len()), Some(256 * 1024));
    // loadstart, at least one progress; loadend arrives after load and is dropped
    assert!(events.load(Ordering::SeqCst) >= 2);
    assert_eq!(last_loaded.load(Ordering::SeqCst), 256 * 1024);
}

#[tokio::test]
async fn test_connection_refused() {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let client = Client::new().unwrap();
    let response = client.get(format!("http://{addr}/")).await;

    assert_eq!(response.error(), Some(ErrorReason::Error));
    assert!(matches!(
        response.cause(),
        Some(RequestError::Transport(TransportError::Connect(_)))
    ));
}

#[tokio::test]
async fn test_invalid_url_fails_setup() {
    let client = Client::new().unwrap();

    let response = client.get("ftp://example.com/file").await;

    assert_eq!(response.error(), Some(ErrorReason::Error));
    assert!(matches!(
        response.cause(),
        Some(RequestError::Transport(TransportError::InvalidUrl(_)))
    ));
}
