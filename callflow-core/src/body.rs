//! Request body values and wire encoding.

use bytes::Bytes;
use http::HeaderMap;
use http::header::CONTENT_TYPE;
use serde::Serialize;

use crate::media::is_json_media_type;

/// Data attached to a request.
///
/// `Text` and `Bytes` are sent as-is. `Json` holds a structured value that is
/// serialized when the request declares a JSON content type.
#[derive(Debug, Clone, PartialEq)]
pub enum Body {
    /// A string body.
    Text(String),
    /// A binary body.
    Bytes(Bytes),
    /// A structured value.
    Json(serde_json::Value),
}

impl Body {
    /// Create a text body.
    pub fn text<S: Into<String>>(text: S) -> Self {
        Body::Text(text.into())
    }

    /// Create a binary body.
    pub fn bytes<B: Into<Bytes>>(bytes: B) -> Self {
        Body::Bytes(bytes.into())
    }

    /// Create a structured body from any serializable value.
    ///
    /// # Example
    ///
    /// ```
    /// use callflow_core::Body;
    ///
    /// #[derive(serde::Serialize)]
    /// struct Login<'a> { user: &'a str }
    ///
    /// let body = Body::json(&Login { user: "ada" }).unwrap();
    /// assert_eq!(body, Body::Json(serde_json::json!({ "user": "ada" })));
    /// ```
    pub fn json<T: Serialize + ?Sized>(value: &T) -> Result<Self, serde_json::Error> {
        serde_json::to_value(value).map(Body::Json)
    }

    /// Returns true for [`Body::Text`].
    pub fn is_text(&self) -> bool {
        matches!(self, Body::Text(_))
    }

    /// Convert into raw bytes for transmission.
    ///
    /// Structured values are written as JSON.
    pub fn into_bytes(self) -> Result<Bytes, serde_json::Error> {
        match self {
            Body::Text(text) => Ok(Bytes::from(text)),
            Body::Bytes(bytes) => Ok(bytes),
            Body::Json(value) => serde_json::to_vec(&value).map(Bytes::from),
        }
    }
}

impl From<String> for Body {
    fn from(text: String) -> Self {
        Body::Text(text)
    }
}

impl From<&str> for Body {
    fn from(text: &str) -> Self {
        Body::Text(text.to_owned())
    }
}

impl From<Bytes> for Body {
    fn from(bytes: Bytes) -> Self {
        Body::Bytes(bytes)
    }
}

impl From<Vec<u8>> for Body {
    fn from(bytes: Vec<u8>) -> Self {
        Body::Bytes(Bytes::from(bytes))
    }
}

impl From<serde_json::Value> for Body {
    fn from(value: serde_json::Value) -> Self {
        Body::Json(value)
    }
}

/// Derive the wire body from request data and the effective headers.
///
/// - No data: no body.
/// - Structured data with a JSON `Content-Type`: serialized JSON text.
/// - Anything else: passed through unchanged for the transport to handle.
///
/// # Example
///
/// ```
/// use callflow_core::{Body, encode_body};
/// use http::{HeaderMap, HeaderValue};
///
/// let mut headers = HeaderMap::new();
/// headers.insert("content-type", HeaderValue::from_static("application/json"));
///
/// let data = Body::Json(serde_json::json!({ "a": 1 }));
/// let body = encode_body(Some(&data), &headers).unwrap();
/// assert_eq!(body, Some(Body::Text(r#"{"a":1}"#.to_string())));
/// ```
pub fn encode_body(
    data: Option<&Body>,
    headers: &HeaderMap,
) -> Result<Option<Body>, serde_json::Error> {
    let Some(data) = data else {
        return Ok(None);
    };

    if let Body::Json(value) = data {
        let content_type = headers
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("");
        if is_json_media_type(content_type) {
            return serde_json::to_string(value).map(|text| Some(Body::Text(text)));
        }
    }

    Ok(Some(data.clone()))
}
