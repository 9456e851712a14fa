//! Hyper-based transport.
//!
//! [`HyperConnector`] shares one pooled hyper_util client across calls and
//! hands out a [`HyperCall`] per attempt. Redirects are never followed at
//! this level.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use bytes::{Bytes, BytesMut};
use http::header::{CONTENT_LENGTH, CONTENT_TYPE, USER_AGENT};
use http::{HeaderMap, HeaderName, HeaderValue, Method, Uri};
use http_body_util::{BodyExt, Full};
use hyper_rustls::HttpsConnector;
use hyper_util::client::legacy::{Client, connect::HttpConnector};
use hyper_util::rt::{TokioExecutor, TokioTimer};
use rustls::ClientConfig;
use tokio::task::JoinHandle;

use callflow_core::Body;

use super::connector::build_https_connector;
use super::{
    Connect, EventKind, EventSink, EventTarget, Listener, ProgressEvent, ReadyState,
    ResponseType, Transport, TransportEvent,
};
use crate::builder::ClientBuildError;
use crate::error::TransportError;
use crate::response::ResponseData;

/// Type alias for the hyper client with HTTPS connector.
type HyperClient = Client<HttpsConnector<HttpConnector>, Full<Bytes>>;

const DEFAULT_USER_AGENT: &str = concat!("callflow/", env!("CARGO_PKG_VERSION"));

/// Hands out one [`HyperCall`] per request attempt.
///
/// Every call shares the connector's connection pool, so the attempts of a
/// redirect chain reuse connections to the same host. The client underneath
/// never follows redirects: a 3xx is reported to the lifecycle like any
/// other response, and the lifecycle decides whether to issue another
/// attempt.
///
/// # Example
///
/// ```ignore
/// use callflow_client::{Client, HyperConnector};
///
/// let connector = HyperConnector::builder()
///     .pool_max_idle_per_host(8)
///     .build()?;
///
/// let client = Client::builder().connector(connector).build()?;
/// ```
#[derive(Clone)]
pub struct HyperConnector {
    client: HyperClient,
    user_agent: Option<HeaderValue>,
    http2_only: bool,
}

impl std::fmt::Debug for HyperConnector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HyperConnector")
            .field("user_agent", &self.user_agent)
            .field("http2_only", &self.http2_only)
            .finish_non_exhaustive()
    }
}

impl HyperConnector {
    /// Create a new connector builder.
    pub fn builder() -> HyperConnectorBuilder {
        HyperConnectorBuilder::new()
    }

    /// Create a connector with default settings.
    pub fn new() -> Result<Self, ClientBuildError> {
        Self::builder().build()
    }

    /// Check if this connector is configured for HTTP/2 only.
    pub fn is_http2_only(&self) -> bool {
        self.http2_only
    }
}

impl Connect for HyperConnector {
    fn connect(&self) -> Box<dyn Transport> {
        Box::new(HyperCall::new(self.client.clone(), self.user_agent.clone()))
    }
}

/// Builder for [`HyperConnector`].
///
/// By default requests without a `User-Agent` are sent as
/// `callflow/<version>`, idle connections are kept for 90 seconds and at
/// most 32 per host, and both HTTP/1.1 and HTTP/2 are offered.
///
/// # Example
///
/// ```ignore
/// use callflow_client::HyperConnectorBuilder;
/// use std::time::Duration;
///
/// let connector = HyperConnectorBuilder::new()
///     .pool_idle_timeout(Duration::from_secs(30))
///     .user_agent(HeaderValue::from_static("my-app/1.0"))
///     .build()?;
/// ```
pub struct HyperConnectorBuilder {
    tls_config: Option<ClientConfig>,
    http2_only: bool,
    pool_idle_timeout: Option<Duration>,
    pool_max_idle_per_host: usize,
    /// `User-Agent` sent when the request has none.
    user_agent: Option<HeaderValue>,
}

impl Default for HyperConnectorBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl HyperConnectorBuilder {
    /// Create a builder with the defaults listed on the type.
    pub fn new() -> Self {
        Self {
            tls_config: None,
            http2_only: false,
            pool_idle_timeout: Some(Duration::from_secs(90)),
            pool_max_idle_per_host: 32,
            user_agent: Some(HeaderValue::from_static(DEFAULT_USER_AGENT)),
        }
    }

    /// Use `config` for HTTPS instead of the feature-selected provider and
    /// root store.
    pub fn tls_config(mut self, config: ClientConfig) -> Self {
        self.tls_config = Some(config);
        self
    }

    /// Speak only HTTP/2, including over plain `http://` (prior knowledge).
    pub fn http2_only(mut self, enabled: bool) -> Self {
        self.http2_only = enabled;
        self
    }

    /// How long a pooled connection may sit unused before it is closed.
    pub fn pool_idle_timeout(mut self, timeout: Duration) -> Self {
        self.pool_idle_timeout = Some(timeout);
        self
    }

    /// Keep idle connections until the server closes them.
    pub fn pool_idle_timeout_none(mut self) -> Self {
        self.pool_idle_timeout = None;
        self
    }

    /// Idle connections kept per host between attempts.
    pub fn pool_max_idle_per_host(mut self, max: usize) -> Self {
        self.pool_max_idle_per_host = max;
        self
    }

    /// `User-Agent` for requests whose headers carry none.
    pub fn user_agent(mut self, user_agent: HeaderValue) -> Self {
        self.user_agent = Some(user_agent);
        self
    }

    /// Leave `User-Agent` off requests that do not set one.
    pub fn no_user_agent(mut self) -> Self {
        self.user_agent = None;
        self
    }

    /// Build the connector.
    ///
    /// # Errors
    ///
    /// Fails when TLS cannot be configured.
    pub fn build(self) -> Result<HyperConnector, ClientBuildError> {
        let https_connector = build_https_connector(self.tls_config)?;

        let mut builder = Client::builder(TokioExecutor::new());
        // idle expiry needs a timer
        builder.pool_timer(TokioTimer::new());

        if let Some(timeout) = self.pool_idle_timeout {
            builder.pool_idle_timeout(timeout);
        }
        builder.pool_max_idle_per_host(self.pool_max_idle_per_host);

        if self.http2_only {
            builder.http2_only(true);
        }

        let client = builder.build(https_connector);

        Ok(HyperConnector {
            client,
            user_agent: self.user_agent,
            http2_only: self.http2_only,
        })
    }
}

impl std::fmt::Debug for HyperConnectorBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HyperConnectorBuilder")
            .field("tls_config", &self.tls_config.is_some())
            .field("http2_only", &self.http2_only)
            .field("pool_idle_timeout", &self.pool_idle_timeout)
            .field("pool_max_idle_per_host", &self.pool_max_idle_per_host)
            .field("user_agent", &self.user_agent)
            .finish()
    }
}

#[derive(Default)]
struct CallState {
    method: Method,
    uri: Option<Uri>,
    headers: HeaderMap,
    with_credentials: bool,
    timeout: Option<Duration>,
    response_type: ResponseType,
    target: EventTarget,
    ready_state: ReadyState,
    sent: bool,
    aborted: bool,
    status: u16,
    status_text: String,
    response_headers: HeaderMap,
    body: BytesMut,
    progress: ProgressEvent,
}

type SharedState = Arc<Mutex<CallState>>;

fn lock(state: &Mutex<CallState>) -> MutexGuard<'_, CallState> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Apply `f` and dispatch `event` outside the lock, unless the call was
/// aborted.
fn update<F>(state: &Mutex<CallState>, event: TransportEvent, f: F)
where
    F: FnOnce(&mut CallState),
{
    let target = {
        let mut state = lock(state);
        if state.aborted {
            return;
        }
        f(&mut state);
        state.target.clone()
    };
    target.dispatch(event);
}

/// One call over a [`HyperConnector`].
///
/// `send` spawns the request on the current tokio runtime. Events are
/// dispatched in `XMLHttpRequest` order: `loadstart`, `upload.progress`,
/// `readystatechange` (headers, then once per body frame along with
/// `progress`), then `readystatechange` to DONE followed by exactly one of
/// `load`, `error`, `timeout` or `abort`, then `loadend`. The lifecycle
/// receives the outcome event ahead of DONE.
///
/// Credentials are recorded but have no effect: there is no cookie store.
pub struct HyperCall {
    client: HyperClient,
    user_agent: Option<HeaderValue>,
    state: SharedState,
    task: Option<JoinHandle<()>>,
}

impl HyperCall {
    fn new(client: HyperClient, user_agent: Option<HeaderValue>) -> Self {
        Self {
            client,
            user_agent,
            state: SharedState::default(),
            task: None,
        }
    }

    fn state(&self) -> MutexGuard<'_, CallState> {
        lock(&self.state)
    }

    fn require_unsent(state: &CallState) -> Result<(), TransportError> {
        if state.ready_state != ReadyState::Opened || state.sent {
            return Err(TransportError::InvalidState(format!(
                "call must be opened and not sent (ready state {:?})",
                state.ready_state
            )));
        }
        Ok(())
    }
}

impl std::fmt::Debug for HyperCall {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state();
        f.debug_struct("HyperCall")
            .field("method", &state.method)
            .field("uri", &state.uri)
            .field("ready_state", &state.ready_state)
            .field("status", &state.status)
            .field("with_credentials", &state.with_credentials)
            .finish_non_exhaustive()
    }
}

impl Drop for HyperCall {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

impl Transport for HyperCall {
    fn open(&mut self, method: &Method, url: &str) -> Result<(), TransportError> {
        let uri: Uri = url
            .parse()
            .map_err(|e| TransportError::InvalidUrl(format!("{}: {}", url, e)))?;
        match uri.scheme_str() {
            Some("http") | Some("https") => {}
            _ => {
                return Err(TransportError::InvalidUrl(format!(
                    "{}: only http and https are supported",
                    url
                )));
            }
        }

        update(&self.state, TransportEvent::ReadyStateChange(ReadyState::Opened), |state| {
            state.method = method.clone();
            state.uri = Some(uri);
            state.headers.clear();
            state.ready_state = ReadyState::Opened;
        });
        Ok(())
    }

    fn set_with_credentials(&mut self, enabled: bool) -> Result<(), TransportError> {
        let mut state = self.state();
        Self::require_unsent(&state)?;
        state.with_credentials = enabled;
        Ok(())
    }

    fn set_timeout(&mut self, timeout: Duration) {
        self.state().timeout = Some(timeout).filter(|t| !t.is_zero());
    }

    fn set_response_type(&mut self, response_type: ResponseType) {
        self.state().response_type = response_type;
    }

    fn set_request_header(
        &mut self,
        name: &HeaderName,
        value: &HeaderValue,
    ) -> Result<(), TransportError> {
        let mut state = self.state();
        Self::require_unsent(&state)?;
        state.headers.append(name.clone(), value.clone());
        Ok(())
    }

    fn set_event_sink(&mut self, sink: EventSink) {
        self.state().target.set_sink(sink);
    }

    fn add_event_listener(&mut self, kind: EventKind, listener: Listener) {
        self.state().target.add(kind, listener);
    }

    fn remove_event_listener(&mut self, kind: EventKind, listener: &Listener) {
        self.state().target.remove(kind, listener);
    }

    fn send(&mut self, body: Option<Body>) -> Result<(), TransportError> {
        let (request, timeout, upload) = {
            let mut state = self.state();
            Self::require_unsent(&state)?;
            let uri = state
                .uri
                .clone()
                .ok_or_else(|| TransportError::InvalidState("call not opened".into()))?;

            let mut headers = state.headers.clone();
            if let Some(user_agent) = &self.user_agent {
                if !headers.contains_key(USER_AGENT) {
                    headers.insert(USER_AGENT, user_agent.clone());
                }
            }
            if body.as_ref().is_some_and(Body::is_text) && !headers.contains_key(CONTENT_TYPE) {
                headers.insert(
                    CONTENT_TYPE,
                    HeaderValue::from_static("text/plain;charset=UTF-8"),
                );
            }

            let payload = match body {
                Some(body) => body
                    .into_bytes()
                    .map_err(|e| TransportError::Body(e.to_string()))?,
                None => Bytes::new(),
            };
            let upload = payload.len() as u64;

            let mut request = http::Request::builder()
                .method(state.method.clone())
                .uri(uri)
                .body(Full::new(payload))
                .map_err(|e| TransportError::InvalidUrl(e.to_string()))?;
            *request.headers_mut() = headers;

            state.sent = true;
            (request, state.timeout, upload)
        };

        let task = tokio::spawn(run_call(
            self.client.clone(),
            request,
            self.state.clone(),
            timeout,
            upload,
        ));
        self.task = Some(task);
        Ok(())
    }

    fn abort(&mut self) {
        let Some(task) = self.task.take() else {
            return;
        };
        task.abort();

        let (target, progress) = {
            let mut state = self.state();
            if state.ready_state == ReadyState::Done || state.aborted {
                return;
            }
            state.aborted = true;
            state.ready_state = ReadyState::Done;
            state.status = 0;
            state.status_text.clear();
            (state.target.clone(), state.progress)
        };
        target.dispatch_end(TransportEvent::Abort(None), progress);
    }

    fn ready_state(&self) -> ReadyState {
        self.state().ready_state
    }

    fn status(&self) -> u16 {
        self.state().status
    }

    fn status_text(&self) -> String {
        self.state().status_text.clone()
    }

    fn response_text(&self) -> Option<String> {
        let state = self.state();
        if state.ready_state < ReadyState::HeadersReceived {
            return None;
        }
        Some(String::from_utf8_lossy(&state.body).into_owned())
    }

    fn response(&self) -> Option<ResponseData> {
        let state = self.state();
        if state.ready_state != ReadyState::Done || state.aborted {
            return None;
        }
        match state.response_type {
            ResponseType::Json => serde_json::from_slice(&state.body)
                .ok()
                .map(ResponseData::Json),
            ResponseType::ArrayBuffer | ResponseType::Blob => {
                Some(ResponseData::Bytes(Bytes::copy_from_slice(&state.body)))
            }
            ResponseType::Default | ResponseType::Document | ResponseType::Text => None,
        }
    }

    fn response_header(&self, name: &str) -> Option<String> {
        let state = self.state();
        let values: Vec<&str> = state
            .response_headers
            .get_all(name)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .collect();
        if values.is_empty() {
            None
        } else {
            Some(values.join(", "))
        }
    }
}

async fn run_call(
    client: HyperClient,
    request: http::Request<Full<Bytes>>,
    state: SharedState,
    timeout: Option<Duration>,
    upload: u64,
) {
    let call = perform(client, request, &state, upload);
    let result = match timeout {
        Some(timeout) => tokio::time::timeout(timeout, call)
            .await
            .unwrap_or(Err(TransportError::TimedOut)),
        None => call.await,
    };

    let event = match result {
        Ok(()) => TransportEvent::Load,
        Err(TransportError::TimedOut) => TransportEvent::Timeout(Some(TransportError::TimedOut)),
        Err(err) => TransportEvent::Error(Some(err)),
    };
    let failed = !matches!(event, TransportEvent::Load);

    let (target, progress) = {
        let mut state = lock(&state);
        if state.aborted {
            return;
        }
        state.ready_state = ReadyState::Done;
        if failed {
            state.status = 0;
            state.status_text.clear();
        }
        (state.target.clone(), state.progress)
    };
    target.dispatch_end(event, progress);
}

async fn perform(
    client: HyperClient,
    request: http::Request<Full<Bytes>>,
    state: &Mutex<CallState>,
    upload: u64,
) -> Result<(), TransportError> {
    update(state, TransportEvent::LoadStart(ProgressEvent::new(0, None)), |_| {});

    let response = client
        .request(request)
        .await
        .map_err(|e| TransportError::Connect(e.to_string()))?;

    update(
        state,
        TransportEvent::UploadProgress(ProgressEvent::new(upload, Some(upload))),
        |_| {},
    );

    let (parts, mut body) = response.into_parts();
    let total = parts
        .headers
        .get(CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<u64>().ok());

    update(
        state,
        TransportEvent::ReadyStateChange(ReadyState::HeadersReceived),
        |state| {
            state.status = parts.status.as_u16();
            state.status_text = parts.status.canonical_reason().unwrap_or("").to_string();
            state.response_headers = parts.headers;
            state.ready_state = ReadyState::HeadersReceived;
            state.progress = ProgressEvent::new(0, total);
        },
    );

    let mut loaded = 0u64;
    while let Some(frame) = body.frame().await {
        let frame = frame.map_err(|e| TransportError::Body(e.to_string()))?;
        let Ok(data) = frame.into_data() else {
            continue;
        };
        loaded += data.len() as u64;
        let progress = ProgressEvent::new(loaded, total);

        update(
            state,
            TransportEvent::ReadyStateChange(ReadyState::Loading),
            |state| {
                state.body.extend_from_slice(&data);
                state.ready_state = ReadyState::Loading;
                state.progress = progress;
            },
        );
        update(state, TransportEvent::Progress(progress), |_| {});
    }

    Ok(())
}
