// SPDX-License-Identifier: MIT OR Apache-2.0
//! The transport seam.
//!
//! A [`Transport`] takes finished envelopes off the capture pipeline's hands.
//! The HTTP implementations live in `tracekit-transport`; this crate only
//! knows the trait, the no-op fallback used when no DSN is configured, and
//! the factory type that lets options pick an implementation.

use std::sync::Arc;
use std::time::Duration;

use tracekit_types::{DataCategory, Envelope};

use crate::options::ClientOptions;

/// Factory invoked once per client to build its transport.
pub type TransportFactory = Arc<dyn Fn(&ClientOptions) -> Arc<dyn Transport> + Send + Sync>;

/// Moves envelopes toward the backend.
pub trait Transport: Send + Sync + 'static {
    /// Hand an envelope over. Returns `false` when the transport had to
    /// reject it outright (bounded queue full); the caller records the drop.
    fn send_envelope(&self, envelope: Envelope) -> bool;

    /// Block until everything enqueued before the call has left the
    /// transport, or `timeout` elapsed. Returns `false` on timeout.
    fn flush(&self, timeout: Duration) -> bool;

    /// Stop accepting work, drain what is pending within `timeout`, and join
    /// any worker. Must be idempotent.
    fn shutdown(&self, timeout: Duration) -> bool;

    /// Whether the backend currently suppresses `category`. Transports
    /// without a rate-limit ledger never limit.
    fn is_limited(&self, _category: DataCategory) -> bool {
        false
    }
}

/// Transport that silently discards everything. Installed when no DSN is
/// configured so the rest of the pipeline needs no special casing.
#[derive(Debug, Default)]
pub struct NoopTransport;

impl Transport for NoopTransport {
    fn send_envelope(&self, _envelope: Envelope) -> bool {
        true
    }

    fn flush(&self, _timeout: Duration) -> bool {
        true
    }

    fn shutdown(&self, _timeout: Duration) -> bool {
        true
    }
}
