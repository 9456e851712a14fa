//! Terminal status tags.
//!
//! - [`EndStatus`]: How a single transport attempt concluded
//! - [`ErrorReason`]: The failure subset of [`EndStatus`] surfaced on responses

use std::fmt;
use std::str::FromStr;

use serde::Serialize;

/// How a transport attempt concluded.
///
/// `Redirect` is transient: the attempt is finished, but its outcome is the
/// outcome of the request that follows the redirect. Every other status
/// settles the outcome immediately.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EndStatus {
    Success,
    Redirect,
    Timeout,
    Abort,
    Error,
}

impl EndStatus {
    /// Get the string representation of this status.
    pub fn as_str(&self) -> &'static str {
        match self {
            EndStatus::Success => "success",
            EndStatus::Redirect => "redirect",
            EndStatus::Timeout => "timeout",
            EndStatus::Abort => "abort",
            EndStatus::Error => "error",
        }
    }

    /// Returns whether reaching this status settles the request outcome.
    ///
    /// Only [`EndStatus::Redirect`] defers settlement.
    pub fn settles(&self) -> bool {
        !matches!(self, EndStatus::Redirect)
    }

    /// The failure reason carried by this status, if any.
    ///
    /// # Example
    ///
    /// ```
    /// use callflow_core::{EndStatus, ErrorReason};
    ///
    /// assert_eq!(EndStatus::Timeout.reason(), Some(ErrorReason::Timeout));
    /// assert_eq!(EndStatus::Success.reason(), None);
    /// assert_eq!(EndStatus::Redirect.reason(), None);
    /// ```
    pub fn reason(&self) -> Option<ErrorReason> {
        match self {
            EndStatus::Timeout => Some(ErrorReason::Timeout),
            EndStatus::Abort => Some(ErrorReason::Abort),
            EndStatus::Error => Some(ErrorReason::Error),
            EndStatus::Success | EndStatus::Redirect => None,
        }
    }
}

impl fmt::Display for EndStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when parsing an unknown status name.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UnknownStatus(pub String);

impl fmt::Display for UnknownStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown status: {}", self.0)
    }
}

impl std::error::Error for UnknownStatus {}

impl FromStr for EndStatus {
    type Err = UnknownStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "success" => Ok(EndStatus::Success),
            "redirect" => Ok(EndStatus::Redirect),
            "timeout" => Ok(EndStatus::Timeout),
            "abort" => Ok(EndStatus::Abort),
            "error" => Ok(EndStatus::Error),
            other => Err(UnknownStatus(other.to_string())),
        }
    }
}

/// Why a request did not complete.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorReason {
    /// The timeout elapsed before the call completed.
    Timeout,
    /// The caller cancelled the call.
    Abort,
    /// The transport reported a failure, or the request could not be set up.
    Error,
}

impl ErrorReason {
    /// Get the string representation of this reason.
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorReason::Timeout => "timeout",
            ErrorReason::Abort => "abort",
            ErrorReason::Error => "error",
        }
    }
}

impl fmt::Display for ErrorReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<ErrorReason> for EndStatus {
    fn from(reason: ErrorReason) -> Self {
        match reason {
            ErrorReason::Timeout => EndStatus::Timeout,
            ErrorReason::Abort => EndStatus::Abort,
            ErrorReason::Error => EndStatus::Error,
        }
    }
}
