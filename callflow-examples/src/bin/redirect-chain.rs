//! Redirect chains, vetoes and abort against a local server.
//!
//! Usage:
//!   cargo run --bin redirect-chain
//!   RUST_LOG=callflow_client=debug cargo run --bin redirect-chain

use std::time::Duration;

use axum::Router;
use axum::extract::Path;
use axum::http::{StatusCode, header};
use axum::response::IntoResponse;
use axum::routing::get;
use callflow_client::{Client, ErrorReason, RequestOptions};
use serde_json::json;
use tracing_subscriber::EnvFilter;

/// `/hop/N` redirects to `/hop/N-1`; `/hop/0` answers with JSON.
async fn hop(Path(n): Path<u32>) -> axum::response::Response {
    if n == 0 {
        return axum::Json(json!({ "arrived": true })).into_response();
    }
    let location = format!("/hop/{}", n - 1);
    (StatusCode::FOUND, [(header::LOCATION, location)]).into_response()
}

async fn slow() -> impl IntoResponse {
    tokio::time::sleep(Duration::from_secs(30)).await;
    "too late"
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let app = Router::new()
        .route("/hop/{n}", get(hop))
        .route("/slow", get(slow));
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    tokio::spawn(async move { axum::serve(listener, app).await });

    let client = Client::builder().json(true).build()?;

    println!("Test 1: follow a chain of three redirects...");
    {
        let request =
            client.request(RequestOptions::get(format!("http://{addr}/hop/3")).max_redirects(5));
        let response = request.clone().await;
        assert!(response.success());
        println!("  PASS: landed on {}", request.last().options().url());
        println!("  PASS: data = {:?}", response.data());
    }

    println!("Test 2: redirect budget runs out...");
    {
        let response = client
            .request(RequestOptions::get(format!("http://{addr}/hop/3")).max_redirects(1))
            .await;
        assert_eq!(response.status(), 302);
        println!(
            "  PASS: stopped at {} with {}",
            response.lifecycle().options().url(),
            response.status()
        );
    }

    println!("Test 3: veto the second hop...");
    {
        let response = client
            .request(
                RequestOptions::get(format!("http://{addr}/hop/3"))
                    .max_redirects(5)
                    .on_redirect(|next, _| !next.url().ends_with("/hop/1")),
            )
            .await;
        assert_eq!(response.status(), 302);
        println!("  PASS: vetoed at {}", response.lifecycle().options().url());
    }

    println!("Test 4: abort an in-flight request...");
    {
        let request = client.get(format!("http://{addr}/slow"));
        let aborter = request.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(200)).await;
            aborter.abort();
        });
        let response = request.await;
        assert_eq!(response.error(), Some(ErrorReason::Abort));
        println!("  PASS: error = {:?}", response.error());
    }

    println!("Test 5: timeout...");
    {
        let response = client
            .request(RequestOptions::get(format!("http://{addr}/slow")).timeout(Duration::from_millis(200)))
            .await;
        assert_eq!(response.error(), Some(ErrorReason::Timeout));
        println!("  PASS: cause = {:?}", response.cause());
    }

    println!();
    println!("All tests passed.");
    Ok(())
}
