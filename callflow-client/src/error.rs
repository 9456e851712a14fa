//! Error types for request lifecycles.
//!
//! - [`TransportError`]: failures reported by (or about) a transport call
//! - [`RequestError`]: the error captured on a failed [`Response`](crate::Response)
//! - [`classify`]: builds a [`RequestError`] from a finished transport call

use crate::transport::Transport;

/// Failures reported by a transport.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    /// The URL could not be parsed.
    #[error("invalid url: {0}")]
    InvalidUrl(String),

    /// A header name or value was rejected.
    #[error("invalid header: {0}")]
    InvalidHeader(String),

    /// The operation is not allowed in the call's current state.
    #[error("invalid state: {0}")]
    InvalidState(String),

    /// The connection could not be established or was lost.
    #[error("connection failed: {0}")]
    Connect(String),

    /// Reading or writing a body failed.
    #[error("body error: {0}")]
    Body(String),

    /// TLS setup failed.
    #[error("tls error: {0}")]
    Tls(String),

    /// The transport's own timer elapsed.
    #[error("request timed out")]
    TimedOut,
}

/// Error captured when a request ends in `timeout`, `abort` or `error`.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum RequestError {
    /// An error value supplied by the transport or raised during setup.
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// A description synthesized from the call's status line and body.
    #[error("{status} {status_text}: {detail}")]
    Status {
        status: u16,
        status_text: String,
        detail: String,
    },

    /// Request data could not be encoded.
    #[error("encode error: {0}")]
    Encode(String),
}

impl RequestError {
    /// The HTTP status captured with the error, if any.
    pub fn status(&self) -> Option<u16> {
        match self {
            RequestError::Status { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// The human-readable detail, without the status line.
    pub fn message(&self) -> String {
        match self {
            RequestError::Status { detail, .. } => detail.clone(),
            other => other.to_string(),
        }
    }

    /// Returns true if the error came from a transport timer.
    pub fn is_timeout(&self) -> bool {
        matches!(self, RequestError::Transport(TransportError::TimedOut))
    }
}

impl From<serde_json::Error> for RequestError {
    fn from(err: serde_json::Error) -> Self {
        RequestError::Encode(format!("JSON encoding failed: {}", err))
    }
}

/// Describe why a transport call failed.
///
/// An error value that is already known (from the transport event or from a
/// failed setup step) is returned unchanged. Otherwise the description is
/// `"<status> <status text>: <response text or fallback>"`, with a missing
/// status rendered as `0` and a missing status text as an empty string.
pub fn classify(
    transport: &dyn Transport,
    fallback: &str,
    known: Option<RequestError>,
) -> RequestError {
    if let Some(err) = known {
        return err;
    }

    let detail = transport
        .response_text()
        .filter(|text| !text.is_empty())
        .unwrap_or_else(|| fallback.to_string());

    RequestError::Status {
        status: transport.status(),
        status_text: transport.status_text(),
        detail,
    }
}
