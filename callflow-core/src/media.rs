//! Media type detection.

/// The JSON media type.
pub const APPLICATION_JSON: &str = "application/json";

/// Check whether a `Content-Type` value names JSON.
///
/// Matches `application/json` case-insensitively at the start of the value,
/// followed by a word boundary, so parameters such as `; charset=utf-8`
/// are ignored.
///
/// # Example
///
/// ```
/// use callflow_core::is_json_media_type;
///
/// assert!(is_json_media_type("application/json"));
/// assert!(is_json_media_type("Application/JSON; charset=utf-8"));
/// assert!(!is_json_media_type("application/jsonp"));
/// assert!(!is_json_media_type("text/plain"));
/// ```
pub fn is_json_media_type(value: &str) -> bool {
    let prefix_len = APPLICATION_JSON.len();
    let Some(head) = value.get(..prefix_len) else {
        return false;
    };
    if !head.eq_ignore_ascii_case(APPLICATION_JSON) {
        return false;
    }
    // Word boundary after the subtype.
    match value[prefix_len..].chars().next() {
        None => true,
        Some(c) => !(c.is_alphanumeric() || c == '_'),
    }
}
