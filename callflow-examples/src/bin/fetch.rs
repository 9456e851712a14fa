//! Fetch a URL and print the outcome.
//!
//! Usage:
//!   cargo run --bin fetch -- https://httpbin.org/redirect/2
//!
//!   # Request logs:
//!   RUST_LOG=callflow_client=debug cargo run --bin fetch -- https://example.com
//!
//! Environment:
//!   MAX_REDIRECTS  redirects to follow (default 5)
//!   TIMEOUT_MS     request timeout in milliseconds (default 10000)

use std::env;
use std::time::Duration;

use callflow_client::{Client, RequestOptions};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let url = env::args()
        .nth(1)
        .unwrap_or_else(|| "https://example.com".to_string());
    let max_redirects = env::var("MAX_REDIRECTS")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(5);
    let timeout = env::var("TIMEOUT_MS")
        .ok()
        .and_then(|v| v.parse().ok())
        .map(Duration::from_millis)
        .unwrap_or(Duration::from_secs(10));

    let client = Client::builder()
        .max_redirects(max_redirects)
        .timeout(timeout)
        .build()?;

    let request = client.request(
        RequestOptions::get(&url).on_progress(|event| match event.total {
            Some(total) => eprintln!("  {}/{} bytes", event.loaded, total),
            None => eprintln!("  {} bytes", event.loaded),
        }),
    );
    let response = request.clone().await;

    let mut hop = Some(request.lifecycle().clone());
    while let Some(lifecycle) = hop {
        println!("{} -> {}", lifecycle.options().url(), lifecycle.status());
        hop = lifecycle.redirect();
    }

    println!("end status: {}", response.end_status());
    match response.error() {
        None => {
            let text = response.text().unwrap_or_default();
            println!("{} bytes", text.len());
            if let Some(content_type) = response.header("content-type") {
                println!("content-type: {}", content_type);
            }
        }
        Some(reason) => {
            let cause = response.cause().map(ToString::to_string).unwrap_or_default();
            anyhow::bail!("request failed ({}): {}", reason, cause);
        }
    }

    Ok(())
}
