//! Per-request configuration.
//!
//! [`RequestOptions`] describes one request: where it goes, what it sends,
//! and the callbacks that observe it. Options are values; redirect hops and
//! computed headers produce new `RequestOptions` rather than mutating a
//! shared one.

use std::fmt;
use std::sync::{Arc, Weak};
use std::time::Duration;

use http::{HeaderMap, HeaderName, HeaderValue, Method};

use callflow_core::{Body, effective_headers};

use crate::lifecycle::Lifecycle;
use crate::transport::{EventKind, Listener, ProgressEvent, ResponseType, TransportEvent};

/// Callback receiving progress events.
pub type ProgressCallback = Arc<dyn Fn(&ProgressEvent) + Send + Sync>;

/// Callback deciding whether to follow a redirect.
///
/// Receives the options of the request that would follow and the lifecycle
/// that received the redirect. Returning `false` stops at the redirect
/// response.
pub type RedirectCallback = Arc<dyn Fn(&RequestOptions, &Lifecycle) -> bool + Send + Sync>;

/// Options for a single request.
///
/// # Example
///
/// ```ignore
/// use callflow_client::{Body, RequestOptions};
/// use std::time::Duration;
///
/// let options = RequestOptions::post("https://api.example.com/items")
///     .json(true)
///     .data(Body::json(&item)?)
///     .timeout(Duration::from_secs(5))
///     .max_redirects(3)
///     .on_progress(|event| println!("{} bytes", event.loaded));
/// ```
#[derive(Clone)]
pub struct RequestOptions {
    pub(crate) method: Method,
    pub(crate) url: String,
    pub(crate) data: Option<Body>,
    pub(crate) headers: HeaderMap,
    pub(crate) listeners: Vec<(EventKind, Listener)>,
    pub(crate) with_credentials: bool,
    pub(crate) response_type: Option<ResponseType>,
    pub(crate) json: bool,
    pub(crate) timeout: Option<Duration>,
    pub(crate) max_redirects: Option<u32>,
    pub(crate) on_progress: Option<ProgressCallback>,
    pub(crate) on_upload_progress: Option<ProgressCallback>,
    pub(crate) on_redirect: Option<RedirectCallback>,
    pub(crate) original: Option<Weak<Lifecycle>>,
}

impl RequestOptions {
    /// Create options for `method` and `url`.
    pub fn new<S: Into<String>>(method: Method, url: S) -> Self {
        Self {
            method,
            url: url.into(),
            data: None,
            headers: HeaderMap::new(),
            listeners: Vec::new(),
            with_credentials: false,
            response_type: None,
            json: false,
            timeout: None,
            max_redirects: None,
            on_progress: None,
            on_upload_progress: None,
            on_redirect: None,
            original: None,
        }
    }

    /// Options for a `GET` request.
    pub fn get<S: Into<String>>(url: S) -> Self {
        Self::new(Method::GET, url)
    }

    /// Options for a `POST` request.
    pub fn post<S: Into<String>>(url: S) -> Self {
        Self::new(Method::POST, url)
    }

    /// Options for a `PUT` request.
    pub fn put<S: Into<String>>(url: S) -> Self {
        Self::new(Method::PUT, url)
    }

    /// Options for a `PATCH` request.
    pub fn patch<S: Into<String>>(url: S) -> Self {
        Self::new(Method::PATCH, url)
    }

    /// Options for a `DELETE` request.
    pub fn delete<S: Into<String>>(url: S) -> Self {
        Self::new(Method::DELETE, url)
    }

    /// Options for a `HEAD` request.
    pub fn head<S: Into<String>>(url: S) -> Self {
        Self::new(Method::HEAD, url)
    }

    /// Set the request data.
    pub fn data<B: Into<Body>>(mut self, data: B) -> Self {
        self.data = Some(data.into());
        self
    }

    /// Add a request header, replacing any existing value.
    pub fn header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }

    /// Try to add a request header.
    ///
    /// Returns `None` if the header name or value is invalid.
    ///
    /// # Example
    ///
    /// ```ignore
    /// let options = RequestOptions::get("https://example.com")
    ///     .try_header("authorization", "Bearer token123")?
    ///     .try_header("x-request-id", "abc-123")?;
    /// ```
    pub fn try_header<K, V>(mut self, name: K, value: V) -> Option<Self>
    where
        K: TryInto<HeaderName>,
        V: TryInto<HeaderValue>,
    {
        let name = name.try_into().ok()?;
        let value = value.try_into().ok()?;
        self.headers.insert(name, value);
        Some(self)
    }

    /// Set all request headers, replacing any existing headers.
    pub fn headers(mut self, headers: HeaderMap) -> Self {
        self.headers = headers;
        self
    }

    /// Get a mutable reference to the request headers.
    pub fn headers_mut(&mut self) -> &mut HeaderMap {
        &mut self.headers
    }

    /// Attach a raw listener to the transport.
    ///
    /// Listeners see every event of the call they are attached to. When a
    /// redirect is followed they are detached from the finished call and
    /// attached to the next one.
    pub fn listener(mut self, kind: EventKind, listener: Listener) -> Self {
        self.listeners.push((kind, listener));
        self
    }

    /// Attach a raw listener built from a closure.
    pub fn on<F>(self, kind: EventKind, listener: F) -> Self
    where
        F: Fn(&TransportEvent) + Send + Sync + 'static,
    {
        self.listener(kind, Arc::new(listener))
    }

    /// Include credentials with the request.
    pub fn with_credentials(mut self, enabled: bool) -> Self {
        self.with_credentials = enabled;
        self
    }

    /// Set the response type hint.
    pub fn response_type(mut self, response_type: ResponseType) -> Self {
        self.response_type = Some(response_type);
        self
    }

    /// Enable JSON mode.
    ///
    /// JSON mode adds `Accept`/`Content-Type` defaults, serializes structured
    /// data, asks the transport for a JSON response and parses text bodies
    /// as JSON.
    pub fn json(mut self, enabled: bool) -> Self {
        self.json = enabled;
        self
    }

    /// Set the timeout. A zero duration disables it.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Set how many redirects may be followed.
    pub fn max_redirects(mut self, max_redirects: u32) -> Self {
        self.max_redirects = Some(max_redirects);
        self
    }

    /// Observe download progress (`loadstart`, `progress`, `loadend`).
    pub fn on_progress<F>(mut self, callback: F) -> Self
    where
        F: Fn(&ProgressEvent) + Send + Sync + 'static,
    {
        self.on_progress = Some(Arc::new(callback));
        self
    }

    /// Observe upload progress.
    pub fn on_upload_progress<F>(mut self, callback: F) -> Self
    where
        F: Fn(&ProgressEvent) + Send + Sync + 'static,
    {
        self.on_upload_progress = Some(Arc::new(callback));
        self
    }

    /// Decide per redirect whether to follow it.
    pub fn on_redirect<F>(mut self, callback: F) -> Self
    where
        F: Fn(&RequestOptions, &Lifecycle) -> bool + Send + Sync + 'static,
    {
        self.on_redirect = Some(Arc::new(callback));
        self
    }

    pub fn get_method(&self) -> &Method {
        &self.method
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn get_data(&self) -> Option<&Body> {
        self.data.as_ref()
    }

    pub fn get_headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn listeners(&self) -> &[(EventKind, Listener)] {
        &self.listeners
    }

    pub fn is_with_credentials(&self) -> bool {
        self.with_credentials
    }

    pub fn get_response_type(&self) -> Option<ResponseType> {
        self.response_type
    }

    pub fn is_json(&self) -> bool {
        self.json
    }

    /// The effective timeout; a zero duration counts as none.
    pub fn get_timeout(&self) -> Option<Duration> {
        self.timeout.filter(|t| !t.is_zero())
    }

    /// Redirects left to follow; unset counts as zero.
    pub fn get_max_redirects(&self) -> u32 {
        self.max_redirects.unwrap_or(0)
    }

    pub(crate) fn progress_callback(&self) -> Option<&ProgressCallback> {
        self.on_progress.as_ref()
    }

    pub(crate) fn upload_progress_callback(&self) -> Option<&ProgressCallback> {
        self.on_upload_progress.as_ref()
    }

    pub(crate) fn redirect_callback(&self) -> Option<&RedirectCallback> {
        self.on_redirect.as_ref()
    }

    /// The lifecycle whose redirect produced these options.
    ///
    /// Only set on options built for a followed redirect, and only while
    /// that lifecycle is still alive.
    pub fn original(&self) -> Option<Arc<Lifecycle>> {
        self.original.as_ref().and_then(Weak::upgrade)
    }

    /// Replace the headers with their effective form for this request.
    pub(crate) fn with_effective_headers(mut self) -> Self {
        let effective = effective_headers(&self.headers, &self.method, self.json).into_owned();
        self.headers = effective;
        self
    }

    /// Options for following a redirect from `from` to `url`.
    pub(crate) fn redirected(&self, url: String, from: &Arc<Lifecycle>) -> Self {
        Self {
            url,
            max_redirects: Some(self.get_max_redirects().saturating_sub(1)),
            original: Some(Arc::downgrade(from)),
            ..self.clone()
        }
    }
}

impl fmt::Debug for RequestOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestOptions")
            .field("method", &self.method)
            .field("url", &self.url)
            .field("data", &self.data)
            .field("headers", &self.headers)
            .field("listeners", &self.listeners.len())
            .field("with_credentials", &self.with_credentials)
            .field("response_type", &self.response_type)
            .field("json", &self.json)
            .field("timeout", &self.timeout)
            .field("max_redirects", &self.max_redirects)
            .field("on_progress", &self.on_progress.is_some())
            .field("on_upload_progress", &self.on_upload_progress.is_some())
            .field("on_redirect", &self.on_redirect.is_some())
            .field("original", &self.original.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::header::{ACCEPT, CONTENT_TYPE};

    #[test]
    fn test_request_options_defaults() {
        let options = RequestOptions::get("http://h/");
        assert_eq!(options.get_method(), Method::GET);
        assert_eq!(options.url(), "http://h/");
        assert!(options.get_data().is_none());
        assert!(!options.is_json());
        assert_eq!(options.get_timeout(), None);
        assert_eq!(options.get_max_redirects(), 0);
        assert!(options.original().is_none());
    }

    #[test]
    fn test_request_options_zero_timeout_is_none() {
        let options = RequestOptions::get("http://h/").timeout(Duration::ZERO);
        assert_eq!(options.get_timeout(), None);

        let options = options.timeout(Duration::from_millis(250));
        assert_eq!(options.get_timeout(), Some(Duration::from_millis(250)));
    }

    #[test]
    fn test_request_options_try_header() {
        let options = RequestOptions::get("http://h/")
            .try_header("authorization", "Bearer token")
            .unwrap();
        assert_eq!(
            options.get_headers().get("authorization").unwrap(),
            "Bearer token"
        );

        let invalid = RequestOptions::get("http://h/").try_header("bad\0name", "v");
        assert!(invalid.is_none());
    }

    #[test]
    fn test_request_options_effective_headers() {
        let options = RequestOptions::post("http://h/").json(true).with_effective_headers();
        assert_eq!(options.get_headers().get(ACCEPT).unwrap(), "application/json");
        assert_eq!(
            options.get_headers().get(CONTENT_TYPE).unwrap(),
            "application/json"
        );
    }

    #[test]
    fn test_request_options_listeners() {
        let options = RequestOptions::get("http://h/")
            .on(EventKind::Load, |_| {})
            .on(EventKind::Progress, |_| {});
        assert_eq!(options.listeners().len(), 2);
        assert_eq!(options.listeners()[0].0, EventKind::Load);
    }

    #[test]
    fn test_request_options_debug_hides_callbacks() {
        let options = RequestOptions::get("http://h/").on_progress(|_| {});
        let debug = format!("{:?}", options);
        assert!(debug.contains("on_progress: true"));
        assert!(debug.contains("on_redirect: false"));
    }
}
