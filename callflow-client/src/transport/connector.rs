//! TLS connector setup for the hyper transport.
//!
//! # Feature Flags
//!
//! TLS support requires both a crypto provider and root certificates:
//!
//! - **Crypto providers** (choose one):
//!   - `tls-ring` - Use ring crypto (default with `tls` feature)
//!   - `tls-aws-lc` - Use AWS LC crypto
//!
//! - **Root certificates** (choose one):
//!   - `tls-native-roots` - Use system root certificates (default with `tls` feature)
//!   - `tls-webpki-roots` - Use bundled Mozilla root certificates
//!
//! Without a crypto provider feature, a provider installed with
//! `CryptoProvider::install_default()` is used.

#[cfg(any(feature = "tls-ring", feature = "tls-aws-lc"))]
use std::sync::Arc;

use hyper_rustls::{HttpsConnector, HttpsConnectorBuilder};
use hyper_util::client::legacy::connect::HttpConnector;
use rustls::ClientConfig;

use crate::builder::ClientBuildError;

/// Returns true if both a crypto provider feature and a root certificate
/// feature are enabled.
#[inline]
pub const fn has_tls_support() -> bool {
    cfg!(any(feature = "tls-ring", feature = "tls-aws-lc"))
        && cfg!(any(
            feature = "tls-native-roots",
            feature = "tls-webpki-roots"
        ))
}

type WantsVerifier = rustls::ConfigBuilder<ClientConfig, rustls::WantsVerifier>;

fn versions_error(err: rustls::Error) -> ClientBuildError {
    ClientBuildError::Tls(format!("protocol versions rejected: {}", err))
}

/// Config builder from the feature-gated provider, else the global default.
#[allow(unreachable_code)]
fn crypto_provider_builder() -> Result<WantsVerifier, ClientBuildError> {
    #[cfg(feature = "tls-ring")]
    return ClientConfig::builder_with_provider(Arc::new(rustls::crypto::ring::default_provider()))
        .with_safe_default_protocol_versions()
        .map_err(versions_error);

    #[cfg(all(feature = "tls-aws-lc", not(feature = "tls-ring")))]
    return ClientConfig::builder_with_provider(Arc::new(
        rustls::crypto::aws_lc_rs::default_provider(),
    ))
    .with_safe_default_protocol_versions()
    .map_err(versions_error);

    match rustls::crypto::CryptoProvider::get_default() {
        Some(provider) => ClientConfig::builder_with_provider(provider.clone())
            .with_safe_default_protocol_versions()
            .map_err(versions_error),
        None => Err(ClientBuildError::Tls(
            "no crypto provider: enable `tls-ring` or `tls-aws-lc`, or install a default provider"
                .into(),
        )),
    }
}

/// Build the default TLS configuration from the enabled features.
///
/// # Errors
///
/// Fails if no root certificate feature is enabled or no crypto provider
/// is available.
pub fn default_tls_config() -> Result<ClientConfig, ClientBuildError> {
    let builder = crypto_provider_builder()?;
    let roots = build_root_store()?;
    Ok(builder.with_root_certificates(roots).with_no_client_auth())
}

#[cfg(any(feature = "tls-native-roots", feature = "tls-webpki-roots"))]
fn build_root_store() -> Result<rustls::RootCertStore, ClientBuildError> {
    let mut roots = rustls::RootCertStore::empty();

    // Native roots win when both features are enabled.
    #[cfg(feature = "tls-native-roots")]
    {
        let native_certs = rustls_native_certs::load_native_certs();
        if !native_certs.errors.is_empty() {
            tracing::debug!(errors = ?native_certs.errors, "errors loading native certs");
        }
        roots.add_parsable_certificates(native_certs.certs);
    }

    #[cfg(all(feature = "tls-webpki-roots", not(feature = "tls-native-roots")))]
    {
        roots.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
    }

    Ok(roots)
}

#[cfg(not(any(feature = "tls-native-roots", feature = "tls-webpki-roots")))]
fn build_root_store() -> Result<rustls::RootCertStore, ClientBuildError> {
    Err(ClientBuildError::Tls(
        "no root certificates: enable `tls-native-roots` or `tls-webpki-roots`".into(),
    ))
}

/// Build an HTTPS connector that also accepts plain `http://` URLs.
///
/// Without a custom config, [`default_tls_config`] is used.
pub fn build_https_connector(
    tls_config: Option<ClientConfig>,
) -> Result<HttpsConnector<HttpConnector>, ClientBuildError> {
    let config = match tls_config {
        Some(config) => config,
        None => default_tls_config()?,
    };

    Ok(HttpsConnectorBuilder::new()
        .with_tls_config(config)
        .https_or_http()
        .enable_all_versions()
        .build())
}
