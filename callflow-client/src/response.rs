//! Request outcomes.
//!
//! A [`Response`] is produced exactly once per request, whatever the outcome.
//! Status and body facets are read from the transport of the lifecycle that
//! terminated, which after a redirect is the last lifecycle in the chain.

use std::fmt;
use std::sync::Arc;

use bytes::Bytes;
use serde::de::DeserializeOwned;

use callflow_core::{EndStatus, ErrorReason, is_json_media_type};

use crate::error::RequestError;
use crate::lifecycle::Lifecycle;
use crate::transport::Transport;

/// A decoded response body.
#[derive(Clone, Debug, PartialEq)]
pub enum ResponseData {
    /// A parsed JSON value.
    Json(serde_json::Value),
    /// Raw text.
    Text(String),
    /// Raw bytes.
    Bytes(Bytes),
}

impl ResponseData {
    /// Deserialize into a typed value.
    ///
    /// Text and bytes are parsed as JSON first. Returns `None` if the data
    /// does not match `T`.
    pub fn deserialize<T: DeserializeOwned>(self) -> Option<T> {
        match self {
            ResponseData::Json(value) => serde_json::from_value(value).ok(),
            ResponseData::Text(text) => serde_json::from_str(&text).ok(),
            ResponseData::Bytes(bytes) => serde_json::from_slice(&bytes).ok(),
        }
    }

    /// Borrow the JSON value, if this is one.
    pub fn as_json(&self) -> Option<&serde_json::Value> {
        match self {
            ResponseData::Json(value) => Some(value),
            _ => None,
        }
    }

    /// Borrow the text, if this is text.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            ResponseData::Text(text) => Some(text),
            _ => None,
        }
    }
}

/// Decode the body of a finished call.
///
/// A value exposed by the transport (shaped by the response type) wins.
/// Otherwise non-empty text is parsed as JSON when `json` is set or the
/// response declares a JSON content type; a parse failure yields `None`.
/// Any other text is returned raw.
pub(crate) fn decode(transport: &dyn Transport, json: bool) -> Option<ResponseData> {
    if let Some(data) = transport.response() {
        return Some(data);
    }

    let text = transport.response_text()?;
    if !text.is_empty()
        && (json
            || transport
                .response_header("content-type")
                .is_some_and(|ct| is_json_media_type(&ct)))
    {
        return serde_json::from_str(&text).ok().map(ResponseData::Json);
    }

    Some(ResponseData::Text(text))
}

/// The outcome of a request.
///
/// Failures are not errors in the `Result` sense: a request that timed out,
/// was aborted or failed still produces a `Response`, with [`error`] telling
/// why.
///
/// # Example
///
/// ```ignore
/// let response = client.request(RequestOptions::get("https://example.com/items").json(true)).await;
///
/// if response.success() {
///     let items: Vec<Item> = response.json().unwrap_or_default();
/// } else if let Some(reason) = response.error() {
///     eprintln!("request failed: {reason}");
/// }
/// ```
///
/// [`error`]: Response::error
#[derive(Clone)]
pub struct Response {
    lifecycle: Arc<Lifecycle>,
    end_status: EndStatus,
    cause: Option<RequestError>,
}

impl Response {
    pub(crate) fn new(
        lifecycle: Arc<Lifecycle>,
        end_status: EndStatus,
        cause: Option<RequestError>,
    ) -> Self {
        Self {
            lifecycle,
            end_status,
            cause,
        }
    }

    /// The lifecycle that produced this response.
    pub fn lifecycle(&self) -> &Arc<Lifecycle> {
        &self.lifecycle
    }

    /// How the terminating attempt ended.
    pub fn end_status(&self) -> EndStatus {
        self.end_status
    }

    /// HTTP status, `0` when unavailable.
    pub fn status(&self) -> u16 {
        self.lifecycle.status()
    }

    /// HTTP status text, empty when unavailable.
    pub fn status_text(&self) -> String {
        self.lifecycle.status_text()
    }

    /// Returns true for a status in `200..300`.
    pub fn success(&self) -> bool {
        (200..300).contains(&self.status())
    }

    /// Why the request failed: only set for `timeout`, `abort` and `error`.
    pub fn error(&self) -> Option<ErrorReason> {
        self.end_status.reason()
    }

    /// The error captured when the request failed.
    pub fn cause(&self) -> Option<&RequestError> {
        self.cause.as_ref()
    }

    /// A response header value.
    pub fn header(&self, name: &str) -> Option<String> {
        self.lifecycle.response_header(name)
    }

    /// The raw response text.
    pub fn text(&self) -> Option<String> {
        self.lifecycle.transport().response_text()
    }

    /// Decode the response body.
    ///
    /// Decoding happens on every call; nothing is cached. JSON parse
    /// failures yield `None`.
    pub fn data(&self) -> Option<ResponseData> {
        let json = self.lifecycle.options().is_json();
        decode(&**self.lifecycle.transport(), json)
    }

    /// Decode the response body into a typed value.
    pub fn json<T: DeserializeOwned>(&self) -> Option<T> {
        self.data()?.deserialize()
    }
}

impl fmt::Debug for Response {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Response")
            .field("url", &self.lifecycle.options().url())
            .field("end_status", &self.end_status)
            .field("status", &self.status())
            .field("cause", &self.cause)
            .finish()
    }
}
