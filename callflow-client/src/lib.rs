//! Future-based HTTP requests over an event-emitting transport.
//!
//! This crate turns the events of an `XMLHttpRequest`-shaped transport call
//! (`load`, `error`, `abort`, `timeout`, `readystatechange`, progress) into
//! exactly one [`Response`] per request.
//!
//! ## Features
//!
//! - JSON mode: `Accept`/`Content-Type` defaults, body serialization and
//!   response parsing
//! - Bounded redirect following, cancelable at any point in the chain
//! - Timeouts, with a fallback timer for transports that never report one
//! - Download and upload progress callbacks
//! - Idempotent abort
//! - A hyper-based transport with rustls for HTTPS
//!
//! ## Example
//!
//! ```ignore
//! use callflow_client::{Body, Client, RequestOptions};
//! use std::time::Duration;
//!
//! let client = Client::builder()
//!     .json(true)
//!     .timeout(Duration::from_secs(10))
//!     .build()?;
//!
//! let response = client
//!     .request(
//!         RequestOptions::post("https://api.example.com/items")
//!             .data(Body::json(&item)?)
//!             .max_redirects(3),
//!     )
//!     .await;
//!
//! match response.error() {
//!     None => println!("{} {:?}", response.status(), response.data()),
//!     Some(reason) => eprintln!("request failed ({reason}): {:?}", response.cause()),
//! }
//! ```
//!
//! ## Outcomes
//!
//! Awaiting a [`Request`] never fails. Failures are described by
//! [`Response::error`] (`timeout`, `abort` or `error`) and
//! [`Response::cause`]. A request that received any HTTP response, including
//! a 4xx or 5xx, ends in `success`; check [`Response::success`] for the
//! status class.
//!
//! ## Redirects
//!
//! The transport is expected not to follow redirects. When a call loads with
//! a status in `301..=399` and a `Location` header, and
//! [`RequestOptions::max_redirects`] allows it, a new attempt is issued to
//! the resolved location. [`RequestOptions::on_redirect`] can veto each hop.
//! The first request settles with the outcome of the last attempt, and
//! aborting it aborts whichever attempt is in flight.
//!
//! ```ignore
//! let request = client.request(
//!     RequestOptions::get("https://example.com/old")
//!         .max_redirects(5)
//!         .on_redirect(|next, _current| next.url().starts_with("https://")),
//! );
//! let response = request.clone().await;
//! println!("landed on {}", request.last().options().url());
//! ```
//!
//! ## Custom transports
//!
//! Implement [`Transport`](transport::Transport) for the call and
//! [`Connect`](transport::Connect) for the factory, then pass the factory to
//! [`ClientBuilder::connector`].

mod builder;
mod client;
mod driver;
mod error;
mod lifecycle;
mod options;
mod redirect;
mod request;
mod response;
pub mod transport;

pub use builder::{ClientBuildError, ClientBuilder, defaults};
pub use client::Client;
pub use error::{RequestError, TransportError, classify};
pub use lifecycle::Lifecycle;
pub use options::{ProgressCallback, RedirectCallback, RequestOptions};
pub use redirect::next_location;
pub use request::{Request, ResponseFuture};
pub use response::{Response, ResponseData};

// Re-export transport types at the top level for convenience
pub use transport::{
    EventKind, HyperConnector, HyperConnectorBuilder, ProgressEvent, ReadyState, ResponseType,
    TlsClientConfig, TransportEvent,
};

// Re-export core types that users need
pub use callflow_core::{Body, EndStatus, ErrorReason, effective_headers, encode_body};
