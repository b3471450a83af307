// SPDX-License-Identifier: MIT OR Apache-2.0
//! Client configuration.

use std::fmt;
use std::io::Write;
use std::sync::Arc;

use tracekit_types::{Breadcrumb, Event, Log};

use crate::integrations::Integration;
use crate::span::SamplingContext;
use crate::transport::TransportFactory;

/// Transform applied to an event just before it leaves the pipeline;
/// returning `None` drops the event.
pub type BeforeSendCallback = Arc<dyn Fn(Event) -> Option<Event> + Send + Sync>;

/// Transform applied to a log record before it is buffered.
pub type BeforeSendLogCallback = Arc<dyn Fn(Log) -> Option<Log> + Send + Sync>;

/// Transform applied to a breadcrumb before it is recorded.
pub type BeforeBreadcrumbCallback = Arc<dyn Fn(Breadcrumb) -> Option<Breadcrumb> + Send + Sync>;

/// Caller-supplied trace sampler; returns the sample rate in `[0, 1]` for
/// the transaction described by the context.
pub type TracesSampler = Arc<dyn Fn(&SamplingContext) -> f64 + Send + Sync>;

/// Default breadcrumb limit, also the hard cap.
pub const DEFAULT_MAX_BREADCRUMBS: usize = 100;

/// Default cap on spans recorded per transaction.
pub const DEFAULT_MAX_SPANS: usize = 1000;

/// Default bound on exception-chain traversal.
pub const DEFAULT_MAX_ERROR_DEPTH: usize = 10;

/// The recognized client options.
///
/// An empty [`dsn`](ClientOptions::dsn) leaves the client constructed but
/// inert (no-op transport). Zero-value numeric options mean "unset" and take
/// their documented defaults.
pub struct ClientOptions {
    /// Endpoint locator string; empty disables sending entirely.
    pub dsn: String,
    /// Enable the `[tracekit]` debug log.
    pub debug: bool,
    /// Sink for the debug log; stderr when unset. Consumed at client
    /// construction.
    pub debug_writer: Option<Box<dyn Write + Send + Sync>>,
    /// Error-event sample rate in `[0, 1]`. Zero means unset and is treated
    /// as 1.0 so that a default configuration sends everything.
    pub sample_rate: f64,
    /// Transaction sample rate in `[0, 1]`.
    pub traces_sample_rate: f64,
    /// Caller-supplied sampler; takes precedence over
    /// [`traces_sample_rate`](ClientOptions::traces_sample_rate).
    pub traces_sampler: Option<TracesSampler>,
    /// Master gate for span recording.
    pub enable_tracing: bool,
    /// Master gate for structured logs.
    pub enable_logs: bool,
    /// Transform/drop hook for error events.
    pub before_send: Option<BeforeSendCallback>,
    /// Transform/drop hook for transaction events.
    pub before_send_transaction: Option<BeforeSendCallback>,
    /// Transform/drop hook for log records.
    pub before_send_log: Option<BeforeSendLogCallback>,
    /// Transform/drop hook for breadcrumbs.
    pub before_breadcrumb: Option<BeforeBreadcrumbCallback>,
    /// Additional integrations installed after the defaults, deduplicated
    /// by name.
    pub integrations: Vec<Arc<dyn Integration>>,
    /// Regex patterns matched against message and exception type/value;
    /// matching error events are dropped.
    pub ignore_errors: Vec<String>,
    /// Regex patterns matched against transaction names; matching
    /// transactions are dropped.
    pub ignore_transactions: Vec<String>,
    /// Breadcrumb ring size. Zero means the default of 100, negative
    /// disables breadcrumbs; values above 100 are clamped.
    pub max_breadcrumbs: i32,
    /// Cap on spans recorded per transaction; zero means the default 1000.
    pub max_spans: usize,
    /// Bound on exception-chain traversal; zero means the default 10.
    pub max_error_depth: usize,
    /// Attach hint-provided stack frames to message events.
    pub attach_stacktrace: bool,
    /// Allow personally identifiable information (user IP, log user
    /// attributes) to leave the process.
    pub send_default_pii: bool,
    /// Reported server name; the `HOSTNAME` environment variable when unset.
    pub server_name: String,
    /// Release identifier of the host application.
    pub release: String,
    /// Deployment environment.
    pub environment: String,
    /// Distribution of the release.
    pub dist: String,
    /// Transport factory; the facade installs the HTTP transport by default.
    pub transport: Option<TransportFactory>,
    /// Proxy for plain HTTP requests.
    pub http_proxy: String,
    /// Proxy for HTTPS requests; falls back to
    /// [`http_proxy`](ClientOptions::http_proxy).
    pub https_proxy: String,
    /// Path to a PEM bundle of additional root certificates.
    pub ca_certs: String,
    /// Mirror envelopes to a local Spotlight sidecar.
    pub spotlight: bool,
    /// Spotlight ingest URL.
    pub spotlight_url: String,
    /// Do not aggregate or send client reports.
    pub disable_client_reports: bool,
    /// Do not start the log/metric batch processors; records are dropped.
    pub disable_telemetry_buffer: bool,
}

impl Default for ClientOptions {
    fn default() -> Self {
        ClientOptions {
            dsn: String::new(),
            debug: false,
            debug_writer: None,
            sample_rate: 0.0,
            traces_sample_rate: 0.0,
            traces_sampler: None,
            enable_tracing: false,
            enable_logs: false,
            before_send: None,
            before_send_transaction: None,
            before_send_log: None,
            before_breadcrumb: None,
            integrations: Vec::new(),
            ignore_errors: Vec::new(),
            ignore_transactions: Vec::new(),
            max_breadcrumbs: 0,
            max_spans: 0,
            max_error_depth: 0,
            attach_stacktrace: false,
            send_default_pii: false,
            server_name: String::new(),
            release: String::new(),
            environment: String::new(),
            dist: String::new(),
            transport: None,
            http_proxy: String::new(),
            https_proxy: String::new(),
            ca_certs: String::new(),
            spotlight: false,
            spotlight_url: String::new(),
            disable_client_reports: false,
            disable_telemetry_buffer: false,
        }
    }
}

impl fmt::Debug for ClientOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientOptions")
            .field("dsn", &self.dsn)
            .field("debug", &self.debug)
            .field("sample_rate", &self.sample_rate)
            .field("traces_sample_rate", &self.traces_sample_rate)
            .field("enable_tracing", &self.enable_tracing)
            .field("enable_logs", &self.enable_logs)
            .field("release", &self.release)
            .field("environment", &self.environment)
            .field("server_name", &self.server_name)
            .finish_non_exhaustive()
    }
}

impl ClientOptions {
    /// Overlay recognized environment variables onto unset fields:
    /// `SENTRY_DSN`, `SENTRY_RELEASE`, `SENTRY_ENVIRONMENT`, and
    /// `SENTRY_SPOTLIGHT` (truthy values `true`, `1`, `yes`).
    pub fn apply_env(&mut self) {
        if self.dsn.is_empty() {
            if let Ok(dsn) = std::env::var("SENTRY_DSN") {
                self.dsn = dsn;
            }
        }
        if self.release.is_empty() {
            if let Ok(release) = std::env::var("SENTRY_RELEASE") {
                self.release = release;
            }
        }
        if self.environment.is_empty() {
            if let Ok(environment) = std::env::var("SENTRY_ENVIRONMENT") {
                self.environment = environment;
            }
        }
        if !self.spotlight {
            if let Ok(value) = std::env::var("SENTRY_SPOTLIGHT") {
                self.spotlight = matches!(value.to_lowercase().as_str(), "true" | "1" | "yes");
            }
        }
    }

    /// The error-event sample rate with the zero-means-unset convention
    /// applied and the result clamped to `[0, 1]`.
    #[must_use]
    pub fn effective_sample_rate(&self) -> f64 {
        if self.sample_rate == 0.0 {
            1.0
        } else {
            self.sample_rate.clamp(0.0, 1.0)
        }
    }

    /// The breadcrumb limit after applying default, disable, and clamp
    /// rules. `None` means breadcrumbs are disabled.
    #[must_use]
    pub fn breadcrumb_limit(&self) -> Option<usize> {
        match self.max_breadcrumbs {
            0 => Some(DEFAULT_MAX_BREADCRUMBS),
            n if n < 0 => None,
            n => Some((n as usize).min(DEFAULT_MAX_BREADCRUMBS)),
        }
    }

    /// Span-recorder cap with the zero-means-default convention applied.
    #[must_use]
    pub fn span_limit(&self) -> usize {
        if self.max_spans == 0 {
            DEFAULT_MAX_SPANS
        } else {
            self.max_spans
        }
    }

    /// Exception-chain bound with the zero-means-default convention applied.
    #[must_use]
    pub fn error_depth(&self) -> usize {
        if self.max_error_depth == 0 {
            DEFAULT_MAX_ERROR_DEPTH
        } else {
            self.max_error_depth
        }
    }
}

impl From<&str> for ClientOptions {
    fn from(dsn: &str) -> Self {
        ClientOptions {
            dsn: dsn.to_owned(),
            ..ClientOptions::default()
        }
    }
}

impl From<String> for ClientOptions {
    fn from(dsn: String) -> Self {
        ClientOptions {
            dsn,
            ..ClientOptions::default()
        }
    }
}
