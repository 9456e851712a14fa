//! Client builder.
//!
//! Provides a fluent API for configuring client-wide request defaults and
//! building a [`Client`].

use std::sync::Arc;
use std::time::Duration;

use http::{HeaderMap, HeaderName, HeaderValue};

use crate::client::Client;
use crate::options::RequestOptions;
use crate::transport::{Connect, HyperConnector};

/// Default values for request lifecycles.
pub mod defaults {
    use std::time::Duration;

    /// Redirects followed when neither the request nor the client sets a limit.
    pub const MAX_REDIRECTS: u32 = 0;

    /// Delay between a `readystatechange` to DONE and the fallback success
    /// terminator. Any `load`, `error`, `abort` or `timeout` already
    /// delivered wins over it.
    pub const READY_STATE_GRACE: Duration = Duration::from_millis(1);
}

/// Client-wide defaults merged into every request.
#[derive(Clone, Debug, Default)]
pub(crate) struct RequestDefaults {
    pub(crate) timeout: Option<Duration>,
    pub(crate) max_redirects: Option<u32>,
    pub(crate) json: bool,
    pub(crate) with_credentials: bool,
    pub(crate) headers: HeaderMap,
}

impl RequestDefaults {
    /// Fill the fields `options` leaves unset.
    ///
    /// Flags are enabled if either side enables them. Headers already set on
    /// the request are never replaced.
    pub(crate) fn apply(&self, mut options: RequestOptions) -> RequestOptions {
        if options.timeout.is_none() {
            options.timeout = self.timeout;
        }
        if options.max_redirects.is_none() {
            options.max_redirects = self.max_redirects;
        }
        options.json |= self.json;
        options.with_credentials |= self.with_credentials;

        for name in self.headers.keys() {
            if !options.headers.contains_key(name) {
                for value in self.headers.get_all(name) {
                    options.headers.append(name.clone(), value.clone());
                }
            }
        }
        options
    }
}

/// Builder for creating a [`Client`].
///
/// # Example
///
/// ```ignore
/// use callflow_client::Client;
/// use std::time::Duration;
///
/// let client = Client::builder()
///     .json(true)
///     .timeout(Duration::from_secs(10))
///     .max_redirects(5)
///     .try_header("user-agent", "callflow")?
///     .build()?;
/// ```
#[derive(Default)]
pub struct ClientBuilder {
    /// Transport factory; a [`HyperConnector`] is built when unset.
    connector: Option<Arc<dyn Connect>>,
    defaults: RequestDefaults,
}

impl std::fmt::Debug for ClientBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientBuilder")
            .field("connector", &self.connector.is_some())
            .field("defaults", &self.defaults)
            .finish()
    }
}

impl ClientBuilder {
    /// Create a builder with no defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Use a custom transport factory.
    ///
    /// # Example
    ///
    /// ```ignore
    /// let connector = HyperConnector::builder()
    ///     .pool_idle_timeout(Duration::from_secs(30))
    ///     .build()?;
    ///
    /// let client = Client::builder().connector(connector).build()?;
    /// ```
    pub fn connector<C: Connect>(mut self, connector: C) -> Self {
        self.connector = Some(Arc::new(connector));
        self
    }

    /// Default timeout for requests that do not set one.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.defaults.timeout = Some(timeout);
        self
    }

    /// Default redirect limit for requests that do not set one.
    pub fn max_redirects(mut self, max_redirects: u32) -> Self {
        self.defaults.max_redirects = Some(max_redirects);
        self
    }

    /// Enable JSON mode for every request.
    pub fn json(mut self, enabled: bool) -> Self {
        self.defaults.json = enabled;
        self
    }

    /// Include credentials with every request.
    pub fn with_credentials(mut self, enabled: bool) -> Self {
        self.defaults.with_credentials = enabled;
        self
    }

    /// Add a default header.
    pub fn header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.defaults.headers.insert(name, value);
        self
    }

    /// Try to add a default header.
    ///
    /// Returns `None` if the header name or value is invalid.
    pub fn try_header<K, V>(mut self, name: K, value: V) -> Option<Self>
    where
        K: TryInto<HeaderName>,
        V: TryInto<HeaderValue>,
    {
        let name = name.try_into().ok()?;
        let value = value.try_into().ok()?;
        self.defaults.headers.insert(name, value);
        Some(self)
    }

    /// Build the client.
    ///
    /// # Errors
    ///
    /// Returns an error if no connector was given and the default
    /// [`HyperConnector`] cannot be created.
    pub fn build(self) -> Result<Client, ClientBuildError> {
        let connector: Arc<dyn Connect> = match self.connector {
            Some(connector) => connector,
            None => Arc::new(HyperConnector::builder().build()?),
        };
        Ok(Client::from_parts(connector, self.defaults))
    }
}

/// Error type for client building failures.
#[derive(Debug, thiserror::Error)]
pub enum ClientBuildError {
    /// TLS could not be configured.
    #[error("failed to configure TLS: {0}")]
    Tls(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::header::{ACCEPT, USER_AGENT};

    #[test]
    fn test_build_error_is_tls_only() {
        let err = ClientBuildError::Tls("no root certificates".into());
        match &err {
            ClientBuildError::Tls(detail) => assert_eq!(detail, "no root certificates"),
        }
        assert_eq!(
            err.to_string(),
            "failed to configure TLS: no root certificates"
        );
    }

    #[test]
    fn test_builder_defaults() {
        let builder = ClientBuilder::new();
        assert!(builder.connector.is_none());
        assert!(!builder.defaults.json);
        assert_eq!(builder.defaults.timeout, None);
        assert!(builder.defaults.headers.is_empty());
    }

    #[test]
    fn test_defaults_fill_unset_fields() {
        let defaults = ClientBuilder::new()
            .timeout(Duration::from_secs(5))
            .max_redirects(3)
            .json(true)
            .defaults;

        let options = defaults.apply(RequestOptions::get("http://h/"));
        assert_eq!(options.get_timeout(), Some(Duration::from_secs(5)));
        assert_eq!(options.get_max_redirects(), 3);
        assert!(options.is_json());
    }

    #[test]
    fn test_defaults_do_not_override_request_values() {
        let defaults = ClientBuilder::new()
            .timeout(Duration::from_secs(5))
            .max_redirects(3)
            .defaults;

        let options = defaults.apply(
            RequestOptions::get("http://h/")
                .timeout(Duration::from_secs(1))
                .max_redirects(0),
        );
        assert_eq!(options.get_timeout(), Some(Duration::from_secs(1)));
        assert_eq!(options.get_max_redirects(), 0);
    }

    #[test]
    fn test_defaults_merge_headers() {
        let defaults = ClientBuilder::new()
            .try_header("user-agent", "callflow")
            .unwrap()
            .try_header("accept", "text/plain")
            .unwrap()
            .defaults;

        let options = defaults.apply(
            RequestOptions::get("http://h/").header(ACCEPT, HeaderValue::from_static("text/html")),
        );
        assert_eq!(options.get_headers().get(USER_AGENT).unwrap(), "callflow");
        assert_eq!(options.get_headers().get(ACCEPT).unwrap(), "text/html");
        assert_eq!(options.get_headers().get_all(ACCEPT).iter().count(), 1);
    }

    #[test]
    fn test_builder_try_header_invalid() {
        assert!(ClientBuilder::new().try_header("bad name", "v").is_none());
    }

    #[test]
    fn test_builder_debug() {
        let debug = format!("{:?}", ClientBuilder::new().json(true));
        assert!(debug.contains("connector: false"));
        assert!(debug.contains("json: true"));
    }
}
