//! Effective request headers.
//!
//! JSON mode adds `Accept` and `Content-Type` defaults on top of whatever the
//! caller supplied. Header names in [`HeaderMap`] are case-insensitive, so an
//! existing `accept` or `content-type` entry counts as present no matter how
//! the caller spelled it.

use std::borrow::Cow;

use http::header::{ACCEPT, CONTENT_TYPE};
use http::{HeaderMap, HeaderValue, Method};

use crate::media::APPLICATION_JSON;

/// Derive the headers a request is sent with.
///
/// With `json` set:
/// - `Accept: application/json` is added unless an `Accept` header exists.
/// - `Content-Type: application/json` is added unless a `Content-Type` header
///   exists or the method is `GET` or `HEAD`.
///
/// The caller's map is never modified. When nothing needs to be added the
/// original map is borrowed; otherwise an owned copy is returned.
///
/// # Example
///
/// ```
/// use callflow_core::effective_headers;
/// use http::{HeaderMap, Method};
///
/// let headers = HeaderMap::new();
/// let effective = effective_headers(&headers, &Method::POST, true);
/// assert_eq!(effective.get("accept").unwrap(), "application/json");
/// assert_eq!(effective.get("content-type").unwrap(), "application/json");
/// assert!(headers.is_empty());
/// ```
pub fn effective_headers<'a>(
    headers: &'a HeaderMap,
    method: &Method,
    json: bool,
) -> Cow<'a, HeaderMap> {
    if !json {
        return Cow::Borrowed(headers);
    }

    let needs_accept = !headers.contains_key(ACCEPT);
    let needs_content_type = *method != Method::GET
        && *method != Method::HEAD
        && !headers.contains_key(CONTENT_TYPE);

    if !needs_accept && !needs_content_type {
        return Cow::Borrowed(headers);
    }

    let mut copy = headers.clone();
    if needs_accept {
        copy.insert(ACCEPT, HeaderValue::from_static(APPLICATION_JSON));
    }
    if needs_content_type {
        copy.insert(CONTENT_TYPE, HeaderValue::from_static(APPLICATION_JSON));
    }
    Cow::Owned(copy)
}
