//! The handle returned for an issued request.

use std::future::IntoFuture;
use std::ops::Deref;
use std::sync::Arc;

use futures::FutureExt;
use futures::future::{BoxFuture, Shared};
use tokio::sync::oneshot;

use callflow_core::EndStatus;

use crate::error::{RequestError, TransportError};
use crate::lifecycle::Lifecycle;
use crate::response::Response;

/// Future resolving to the outcome of a request.
pub type ResponseFuture = Shared<BoxFuture<'static, Response>>;

/// An issued request.
///
/// Dereferences to the first [`Lifecycle`] of the request, so `abort()` and
/// introspection are available directly. Awaiting the request (or any clone
/// of it) yields the one [`Response`] the request settles with; after a
/// followed redirect that is the response of the last attempt.
///
/// # Example
///
/// ```ignore
/// let request = client.request(RequestOptions::get("https://example.com/slow"));
///
/// let watcher = request.clone();
/// tokio::spawn(async move {
///     tokio::time::sleep(Duration::from_secs(1)).await;
///     watcher.abort();
/// });
///
/// let response = request.await;
/// assert_eq!(response.error(), Some(ErrorReason::Abort));
/// ```
#[derive(Clone)]
pub struct Request {
    lifecycle: Arc<Lifecycle>,
    response: ResponseFuture,
}

impl Request {
    pub(crate) fn new(lifecycle: Arc<Lifecycle>, settled: oneshot::Receiver<Response>) -> Self {
        let fallback = lifecycle.clone();
        let response = settled
            .map(move |result| {
                result.unwrap_or_else(|_| {
                    let cause = RequestError::Transport(TransportError::InvalidState(
                        "request dropped before settling".into(),
                    ));
                    Response::new(fallback, EndStatus::Error, Some(cause))
                })
            })
            .boxed()
            .shared();

        Self {
            lifecycle,
            response,
        }
    }

    /// The first lifecycle of this request.
    pub fn lifecycle(&self) -> &Arc<Lifecycle> {
        &self.lifecycle
    }

    /// The most recent lifecycle in the redirect chain.
    pub fn last(&self) -> Arc<Lifecycle> {
        let mut current = self.lifecycle.clone();
        while let Some(next) = current.redirect() {
            current = next;
        }
        current
    }

    /// A future resolving to the outcome.
    pub fn response(&self) -> ResponseFuture {
        self.response.clone()
    }

    /// The outcome, if the request has settled.
    pub fn peek(&self) -> Option<Response> {
        self.response.peek().cloned()
    }
}

impl Deref for Request {
    type Target = Lifecycle;

    fn deref(&self) -> &Lifecycle {
        &self.lifecycle
    }
}

impl IntoFuture for Request {
    type Output = Response;
    type IntoFuture = ResponseFuture;

    fn into_future(self) -> Self::IntoFuture {
        self.response
    }
}

impl std::fmt::Debug for Request {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Request")
            .field("lifecycle", &self.lifecycle)
            .field("settled", &self.response.peek().is_some())
            .finish()
    }
}
