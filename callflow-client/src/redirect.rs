//! Redirect planning.
//!
//! Redirects are never followed by the transport. Once a call has loaded,
//! [`plan`] looks at its status and `Location` header and decides whether a
//! new attempt should be issued, and with which options.

use std::sync::Arc;

use url::Url;

use crate::lifecycle::Lifecycle;
use crate::options::RequestOptions;

/// Options for the next attempt, if the finished call asks for a redirect
/// that may be followed.
pub(crate) fn plan(lifecycle: &Arc<Lifecycle>) -> Option<RequestOptions> {
    let options = lifecycle.options();
    let location = lifecycle.response_header("location");
    let next = next_location(
        lifecycle.status(),
        options.get_max_redirects(),
        location.as_deref(),
        options.url(),
    )?;
    Some(options.redirected(next, lifecycle))
}

/// Resolve where a redirect response points.
///
/// Returns `None` unless `status` is strictly between 300 and 400, there
/// are redirects left, a location is present, and it resolves to a URL
/// other than `current`.
pub fn next_location(
    status: u16,
    max_redirects: u32,
    location: Option<&str>,
    current: &str,
) -> Option<String> {
    if status <= 300 || status >= 400 || max_redirects == 0 {
        return None;
    }
    let location = location?;

    let resolved = match Url::parse(current).and_then(|base| base.join(location)) {
        Ok(url) => url,
        Err(err) => {
            tracing::debug!(location, current, error = %err, "unresolvable redirect location");
            return None;
        }
    };

    let href = String::from(resolved);
    if href == current {
        return None;
    }
    Some(href)
}
