// SPDX-License-Identifier: MIT OR Apache-2.0
#![doc = include_str!("../README.md")]
//! tracekit-transport
#![deny(unsafe_code)]
#![warn(missing_docs)]

mod http_transport;
mod spotlight;
mod sync_transport;

pub use http_transport::{HttpTransport, DEFAULT_QUEUE_SIZE};
pub use spotlight::{SpotlightTransport, DEFAULT_SPOTLIGHT_URL};
pub use sync_transport::SyncTransport;

use tracekit_core::ClientOptions;
use tracekit_types::DsnParseError;

/// Errors surfaced while constructing a transport.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// The DSN string failed to parse.
    #[error(transparent)]
    Dsn(#[from] DsnParseError),

    /// The HTTP client could not be built from the configured proxies or
    /// certificate bundle.
    #[error("failed to build HTTP client: {0}")]
    Http(#[from] reqwest::Error),

    /// The configured CA bundle could not be read or parsed.
    #[error("failed to load CA bundle {path}: {reason}")]
    CaBundle {
        /// Path that was configured.
        path: String,
        /// What went wrong.
        reason: String,
    },
}

/// Apply the shared client-configuration step: proxies, CA bundle, and
/// connection-reuse defaults.
fn configure(
    mut builder: reqwest::ClientBuilder,
    options: &ClientOptions,
) -> Result<reqwest::Client, TransportError> {
    if !options.http_proxy.is_empty() {
        builder = builder.proxy(reqwest::Proxy::http(&options.http_proxy)?);
    }
    let https_proxy = if options.https_proxy.is_empty() {
        &options.http_proxy
    } else {
        &options.https_proxy
    };
    if !https_proxy.is_empty() {
        builder = builder.proxy(reqwest::Proxy::https(https_proxy)?);
    }
    for certificate in load_ca_bundle(&options.ca_certs)? {
        builder = builder.add_root_certificate(certificate);
    }
    builder
        .timeout(std::time::Duration::from_secs(30))
        .build()
        .map_err(TransportError::Http)
}

/// Read and parse the configured PEM bundle; empty path means no extras.
fn load_ca_bundle(path: &str) -> Result<Vec<reqwest::Certificate>, TransportError> {
    if path.is_empty() {
        return Ok(Vec::new());
    }
    let pem = std::fs::read(path).map_err(|err| TransportError::CaBundle {
        path: path.to_owned(),
        reason: err.to_string(),
    })?;
    reqwest::Certificate::from_pem_bundle(&pem).map_err(TransportError::Http)
}
