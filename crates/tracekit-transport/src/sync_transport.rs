// SPDX-License-Identifier: MIT OR Apache-2.0
//! Synchronous transport for short-lived processes.

use std::io::Read;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tracekit_core::{ClientOptions, Transport, sdk_user_agent};
use tracekit_ratelimit::Ledger;
use tracekit_types::{DataCategory, Dsn, Envelope, ENVELOPE_CONTENT_TYPE};

use crate::{TransportError, load_ca_bundle};

const BODY_DRAIN_CAP: u64 = 64 * 1024;

/// Transport that performs the POST inline on the caller's thread.
///
/// No queue, no worker: by the time `send_envelope` returns, the HTTP
/// round-trip has happened. Meant for CLIs and other short-lived processes
/// where a background worker would be killed before draining. Must not be
/// used from inside an async runtime.
pub struct SyncTransport {
    client: reqwest::blocking::Client,
    dsn: Dsn,
    envelope_url: String,
    ledger: Ledger,
}

impl SyncTransport {
    /// Parse the DSN and build the blocking HTTP client.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError`] when the DSN is malformed or the HTTP
    /// client cannot be built.
    pub fn new(options: &ClientOptions) -> Result<Arc<Self>, TransportError> {
        let dsn: Dsn = options.dsn.parse()?;
        let mut builder = reqwest::blocking::Client::builder().user_agent(sdk_user_agent());
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
        let client = builder
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(TransportError::Http)?;

        let envelope_url = dsn.envelope_url();
        Ok(Arc::new(SyncTransport {
            client,
            dsn,
            envelope_url,
            ledger: Ledger::new(),
        }))
    }
}

impl Transport for SyncTransport {
    fn send_envelope(&self, mut envelope: Envelope) -> bool {
        let now = Utc::now();
        envelope.items.retain(|item| match item.category() {
            Some(category) if self.ledger.is_limited(category, now) => {
                tracing::debug!(%category, "dropping rate-limited envelope item");
                false
            }
            _ => true,
        });
        if envelope.items.is_empty() {
            return true;
        }
        let body = match envelope.to_vec() {
            Ok(body) => body,
            Err(err) => {
                tracing::debug!(%err, "failed to serialize envelope");
                return true;
            }
        };
        let auth = self.dsn.auth_header(Utc::now().timestamp(), &sdk_user_agent());
        let response = self
            .client
            .post(&self.envelope_url)
            .header("Content-Type", ENVELOPE_CONTENT_TYPE)
            .header("X-Sentry-Auth", auth)
            .body(body)
            .send();
        match response {
            Ok(response) => {
                let status = response.status();
                self.ledger
                    .update(status.as_u16(), response.headers(), Utc::now());
                let mut sink = std::io::sink();
                let _ = std::io::copy(&mut response.take(BODY_DRAIN_CAP), &mut sink);
            }
            Err(err) => {
                tracing::debug!(%err, "envelope POST failed");
            }
        }
        true
    }

    fn flush(&self, _timeout: Duration) -> bool {
        true
    }

    fn shutdown(&self, _timeout: Duration) -> bool {
        true
    }

    fn is_limited(&self, category: DataCategory) -> bool {
        self.ledger.is_limited(category, Utc::now())
    }
}
