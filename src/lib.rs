// SPDX-License-Identifier: MIT OR Apache-2.0
#![doc = include_str!("../README.md")]
//! tracekit
#![deny(unsafe_code)]
#![warn(missing_docs)]

use std::sync::Arc;
use std::time::Duration;

pub use tracekit_core::{
    AggregateError, BatchConfig, BatchProcessor, Client, ClientError, ClientOptions, DebugLogger,
    EventHint, Hub, Integration, Logger, Metrics, NoopTransport, SamplingContext, Scope, Span,
    TransactionContext, Transport, TransportFactory, SDK_NAME, SDK_VERSION, sdk_user_agent,
};
pub use tracekit_ratelimit::Ledger;
pub use tracekit_transport::{HttpTransport, SpotlightTransport, SyncTransport, TransportError};
pub use tracekit_types::{
    Attachment, Breadcrumb, CheckIn, CheckInStatus, DataCategory, Dsn, DsnParseError, Envelope,
    Event, EventId, EventType, Level, Log, LogLevel, Metric, SentryTrace, SpanId, SpanStatus,
    TraceId, TransactionSource, User,
};

/// Keeps the globally bound client alive; dropping it flushes and closes.
#[must_use = "dropping the guard immediately shuts the SDK down"]
pub struct ClientInitGuard {
    client: Arc<Client>,
}

impl ClientInitGuard {
    /// The client bound to the process-wide default hub.
    pub fn client(&self) -> Arc<Client> {
        Arc::clone(&self.client)
    }
}

impl Drop for ClientInitGuard {
    fn drop(&mut self) {
        self.client.close(Duration::from_secs(2));
    }
}

/// Initialize the SDK: build a client from `options`, install the default
/// HTTP transport when none is configured, and bind the client to the
/// process-wide default hub.
///
/// The returned guard flushes and closes the client when dropped; keep it
/// alive for the lifetime of the process.
///
/// # Errors
///
/// Returns [`ClientError`] when the configuration is invalid (malformed
/// DSN).
pub fn init(options: impl Into<ClientOptions>) -> Result<ClientInitGuard, ClientError> {
    let mut options = options.into();
    if options.transport.is_none() {
        options.transport = Some(Arc::new(default_transport_factory));
    }
    let client = Client::new(options)?;
    Hub::main().bind_client(Some(Arc::clone(&client)));
    Ok(ClientInitGuard { client })
}

fn default_transport_factory(options: &ClientOptions) -> Arc<dyn Transport> {
    match HttpTransport::start(options) {
        Ok(transport) => {
            if options.spotlight {
                SpotlightTransport::new(transport, &options.spotlight_url)
            } else {
                transport
            }
        }
        Err(err) => {
            tracing::warn!(%err, "failed to start HTTP transport, events are dropped");
            Arc::new(NoopTransport)
        }
    }
}

// ---------------------------------------------------------------------------
// Hub::current() conveniences
// ---------------------------------------------------------------------------

/// Capture a message on the current hub.
pub fn capture_message(message: &str, level: Level) -> Option<EventId> {
    Hub::current().capture_message(message, level)
}

/// Capture an error and its cause chain on the current hub.
pub fn capture_error(error: &(dyn std::error::Error + 'static)) -> Option<EventId> {
    Hub::current().capture_error(error)
}

/// Capture a pre-built event on the current hub.
pub fn capture_event(event: Event) -> Option<EventId> {
    Hub::current().capture_event(event)
}

/// Capture a monitor check-in on the current hub.
pub fn capture_check_in(check_in: CheckIn) -> Option<EventId> {
    Hub::current().capture_check_in(check_in)
}

/// Record a breadcrumb on the current hub's scope.
pub fn add_breadcrumb(breadcrumb: Breadcrumb) {
    Hub::current().add_breadcrumb(breadcrumb);
}

/// Mutate the current hub's scope in place.
pub fn configure_scope<R>(f: impl FnOnce(&Scope) -> R) -> R {
    Hub::current().configure_scope(f)
}

/// Run `f` against a temporary scope, popped afterwards.
pub fn with_scope<R>(f: impl FnOnce(&Scope) -> R) -> R {
    Hub::current().with_scope(f)
}

/// Start a transaction on the current hub and bind it to the scope.
#[must_use]
pub fn start_transaction(ctx: TransactionContext) -> Arc<Span> {
    Hub::current().start_transaction(ctx)
}

/// Id of the last event captured through the current hub.
#[must_use]
pub fn last_event_id() -> Option<EventId> {
    Hub::current().last_event_id()
}

/// Flush the current hub's client within `timeout`.
pub fn flush(timeout: Duration) -> bool {
    Hub::current().flush(timeout)
}
