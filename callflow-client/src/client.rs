//! The request client.
//!
//! [`Client::request`] opens one transport call per attempt, arms it from
//! the request options, and hands the call's events to a driver task that
//! decides the outcome. Redirects are issued through the same client, so a
//! chain of attempts shares its defaults and connector.

use std::fmt;
use std::sync::Arc;

use http::Method;
use tokio::runtime::Handle;
use tokio::sync::oneshot;
use tracing::Instrument;

use callflow_core::{Body, EndStatus, encode_body};

use crate::builder::{ClientBuildError, ClientBuilder, RequestDefaults};
use crate::driver::Driver;
use crate::error::{RequestError, TransportError, classify};
use crate::lifecycle::Lifecycle;
use crate::options::RequestOptions;
use crate::request::Request;
use crate::transport::{Connect, EventSink, HyperConnector, ResponseType};


/// Issues requests through a transport factory.
///
/// Cloning is cheap and clones share the connector and defaults.
///
/// # Example
///
/// ```ignore
/// use callflow_client::{Client, RequestOptions};
///
/// let client = Client::builder().json(true).max_redirects(5).build()?;
///
/// let response = client.get("https://api.example.com/items").await;
/// if response.success() {
///     println!("{:?}", response.data());
/// }
/// ```
#[derive(Clone)]
pub struct Client {
    connector: Arc<dyn Connect>,
    defaults: Arc<RequestDefaults>,
}

impl fmt::Debug for Client {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Client")
            .field("defaults", &self.defaults)
            .finish_non_exhaustive()
    }
}

impl Client {
    /// Create a builder for configuring a client.
    pub fn builder() -> ClientBuilder {
        ClientBuilder::new()
    }

    /// Create a client over the default [`HyperConnector`] with no defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if the connector cannot be created.
    pub fn new() -> Result<Self, ClientBuildError> {
        let connector = HyperConnector::builder().build()?;
        Ok(Self::with_connector(connector))
    }

    /// Create a client over `connector` with no defaults.
    pub fn with_connector<C: Connect>(connector: C) -> Self {
        Self::from_parts(Arc::new(connector), RequestDefaults::default())
    }

    pub(crate) fn from_parts(connector: Arc<dyn Connect>, defaults: RequestDefaults) -> Self {
        Self {
            connector,
            defaults: Arc::new(defaults),
        }
    }

    /// Issue a request.
    ///
    /// Never fails: setup errors settle the returned request with an
    /// `error` outcome. The call runs on a task spawned on the current tokio
    /// runtime; called outside one, the request settles with an `error`
    /// outcome without being sent.
    pub fn request(&self, options: RequestOptions) -> Request {
        let options = self.defaults.apply(options).with_effective_headers();

        let span = tracing::info_span!(
            "http.request",
            http.method = %options.get_method(),
            http.url = %options.url(),
            redirects_left = options.get_max_redirects(),
        );

        let transport = self.connector.connect();
        let (signals, events) = EventSink::channel();
        let lifecycle = Arc::new(Lifecycle::new(options, transport, signals.clone()));
        let (tx, rx) = oneshot::channel();
        let request = Request::new(lifecycle.clone(), rx);

        let setup = Handle::try_current()
            .map_err(|err| {
                RequestError::Transport(TransportError::InvalidState(format!(
                    "no tokio runtime: {err}"
                )))
            })
            .and_then(|runtime| span.in_scope(|| arm(&lifecycle, signals)).map(|()| runtime));

        match setup {
            Ok(runtime) => {
                let driver = Driver::new(self.clone(), lifecycle, tx);
                runtime.spawn(driver.run(events).instrument(span));
            }
            Err(err) => {
                let _entered = span.enter();
                tracing::debug!(error = %err, "request setup failed");
                let cause = classify(
                    &**lifecycle.transport(),
                    "exception during setup",
                    Some(err),
                );
                lifecycle.end(EndStatus::Error, Some(cause), &mut Some(tx));
            }
        }

        request
    }

    /// Issue a `GET` request.
    pub fn get<S: Into<String>>(&self, url: S) -> Request {
        self.request(RequestOptions::get(url))
    }

    /// Issue a `POST` request with `data`.
    pub fn post<S: Into<String>, B: Into<Body>>(&self, url: S, data: B) -> Request {
        self.request(RequestOptions::post(url).data(data))
    }

    /// Issue a `PUT` request with `data`.
    pub fn put<S: Into<String>, B: Into<Body>>(&self, url: S, data: B) -> Request {
        self.request(RequestOptions::put(url).data(data))
    }

    /// Issue a `DELETE` request.
    pub fn delete<S: Into<String>>(&self, url: S) -> Request {
        self.request(RequestOptions::new(Method::DELETE, url))
    }
}

/// Configure the transport from the lifecycle's options and send.
fn arm(lifecycle: &Lifecycle, signals: EventSink) -> Result<(), RequestError> {
    let options = lifecycle.options();
    let mut transport = lifecycle.transport();

    transport.set_event_sink(signals);
    for (kind, listener) in options.listeners() {
        transport.add_event_listener(*kind, listener.clone());
    }

    transport.open(options.get_method(), options.url())?;
    if options.is_with_credentials() {
        transport.set_with_credentials(true)?;
    }
    if let Some(timeout) = options.get_timeout() {
        transport.set_timeout(timeout);
    }
    for (name, value) in options.get_headers() {
        transport.set_request_header(name, value)?;
    }

    let response_type = options
        .get_response_type()
        .or_else(|| options.is_json().then_some(ResponseType::Json));
    if let Some(response_type) = response_type {
        transport.set_response_type(response_type);
    }

    let body = encode_body(options.get_data(), options.get_headers())?;
    transport.send(body)?;
    Ok(())
}
