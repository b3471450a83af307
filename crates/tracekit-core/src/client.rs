// SPDX-License-Identifier: MIT OR Apache-2.0
//! The client: options, the capture pipeline, and ownership of transport
//! and batch processors.
//!
//! Pipeline for one event: sample → prepare (scope applies) → integrations →
//! `before_send` → rate-limit check → envelope → transport. Every drop along
//! the way is counted in the client-report aggregator and shipped with a
//! later envelope.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use chrono::Utc;
use rand::Rng;
use tracekit_types::{
    AttributeValue, DataCategory, DiscardReason, Dsn, DsnParseError, Envelope, EnvelopeItem,
    Event, EventId, EventType, Exception, Level, Log, Metric, Sdk, SdkPackage,
};

use crate::batch::{BatchConfig, BatchProcessor};
use crate::debug::{DebugLogger, sdk_debug};
use crate::integrations::{
    EnvironmentIntegration, IgnoreErrorsIntegration, IgnoreTransactionsIntegration, Integration,
};
use crate::options::ClientOptions;
use crate::report::ReportAggregator;
use crate::scope::{EventHint, Scope};
use crate::transport::{NoopTransport, Transport};

/// Name this SDK reports in envelopes and auth headers.
pub const SDK_NAME: &str = "tracekit.rust";

/// Version this SDK reports in envelopes and auth headers.
pub const SDK_VERSION: &str = env!("CARGO_PKG_VERSION");

/// The `name/version` string used for `User-Agent` and `sentry_client`.
#[must_use]
pub fn sdk_user_agent() -> String {
    format!("{SDK_NAME}/{SDK_VERSION}")
}

/// Errors surfaced at client construction.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// The configured DSN string failed to parse.
    #[error(transparent)]
    Dsn(#[from] DsnParseError),
}

/// Holds options and runs the capture pipeline.
pub struct Client {
    options: ClientOptions,
    dsn: Option<Dsn>,
    transport: Arc<dyn Transport>,
    sdk: Sdk,
    integrations: Vec<Arc<dyn Integration>>,
    reports: Arc<ReportAggregator>,
    log_batcher: Option<BatchProcessor<Log>>,
    metric_batcher: Option<BatchProcessor<Metric>>,
    debug_log: DebugLogger,
    closed: AtomicBool,
}

impl std::fmt::Debug for Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client")
            .field("dsn", &self.dsn)
            .field("enabled", &self.is_enabled())
            .finish_non_exhaustive()
    }
}

impl Client {
    /// Construct a client from options.
    ///
    /// Environment variables are overlaid first. An empty DSN yields a
    /// working but inert client (no-op transport); an unparseable DSN is a
    /// configuration error.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Dsn`] when the DSN string is malformed.
    pub fn new(mut options: ClientOptions) -> Result<Arc<Client>, ClientError> {
        options.apply_env();

        let dsn: Option<Dsn> = if options.dsn.is_empty() {
            None
        } else {
            Some(options.dsn.parse()?)
        };

        let debug_log = DebugLogger::new(options.debug, options.debug_writer.take());

        let mut integrations: Vec<Arc<dyn Integration>> = vec![
            Arc::new(IgnoreErrorsIntegration::new(&options.ignore_errors)),
            Arc::new(IgnoreTransactionsIntegration::new(
                &options.ignore_transactions,
            )),
            Arc::new(EnvironmentIntegration),
        ];
        for integration in std::mem::take(&mut options.integrations) {
            if integrations.iter().any(|i| i.name() == integration.name()) {
                sdk_debug!(
                    debug_log,
                    "integration {} already installed, skipping",
                    integration.name()
                );
                continue;
            }
            integrations.push(integration);
        }
        for integration in &integrations {
            integration.setup(&options);
        }

        let mut integration_names: Vec<String> = integrations
            .iter()
            .map(|i| i.name().to_owned())
            .collect();
        integration_names.sort_unstable();

        let sdk = Sdk {
            name: SDK_NAME.into(),
            version: SDK_VERSION.into(),
            integrations: integration_names,
            packages: vec![SdkPackage {
                name: format!("cargo:{}", env!("CARGO_PKG_NAME")),
                version: SDK_VERSION.into(),
            }],
        };

        let transport: Arc<dyn Transport> = match (&dsn, &options.transport) {
            (None, _) => Arc::new(NoopTransport),
            (Some(_), Some(factory)) => factory(&options),
            (Some(_), None) => {
                sdk_debug!(debug_log, "no transport factory installed, events are dropped");
                Arc::new(NoopTransport)
            }
        };

        let reports = Arc::new(ReportAggregator::new(!options.disable_client_reports));

        let buffers_enabled = dsn.is_some() && !options.disable_telemetry_buffer;
        let log_batcher = (buffers_enabled && options.enable_logs).then(|| {
            batcher(
                Arc::clone(&transport),
                Arc::clone(&reports),
                dsn.clone(),
                sdk.clone(),
                EnvelopeItem::LogBatch,
                DataCategory::Log,
            )
        });
        let metric_batcher = buffers_enabled.then(|| {
            batcher(
                Arc::clone(&transport),
                Arc::clone(&reports),
                dsn.clone(),
                sdk.clone(),
                EnvelopeItem::MetricBatch,
                DataCategory::MetricBucket,
            )
        });

        Ok(Arc::new(Client {
            options,
            dsn,
            transport,
            sdk,
            integrations,
            reports,
            log_batcher,
            metric_batcher,
            debug_log,
            closed: AtomicBool::new(false),
        }))
    }

    /// The options the client was built with.
    #[must_use]
    pub fn options(&self) -> &ClientOptions {
        &self.options
    }

    /// The parsed DSN, when one is configured.
    #[must_use]
    pub fn dsn(&self) -> Option<&Dsn> {
        self.dsn.as_ref()
    }

    /// SDK identity stamped onto events and envelopes.
    #[must_use]
    pub fn sdk(&self) -> &Sdk {
        &self.sdk
    }

    /// Whether the client can send anything at all.
    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.dsn.is_some() && !self.closed.load(Ordering::SeqCst)
    }

    pub(crate) fn record_discard(&self, reason: DiscardReason, category: DataCategory) {
        self.reports.record(reason, category);
    }

    // -- capture ----------------------------------------------------------

    /// Run the capture pipeline.
    ///
    /// `None` as the event is a usage error: a surrogate event describing
    /// the misuse is sent instead. The returned id is the id of whatever
    /// event left the pipeline toward the transport; `None` means the event
    /// was dropped (and the drop was recorded).
    pub fn capture_event(
        &self,
        event: Option<Event>,
        hint: &EventHint,
        scope: Option<&Scope>,
    ) -> Option<EventId> {
        let event = event.unwrap_or_else(|| {
            usage_error_event("capture_event called without an event")
        });
        let category = event.category();

        if event.ty == EventType::Error {
            let rate = self.options.effective_sample_rate();
            if rate < 1.0 && rand::rng().random::<f64>() >= rate {
                self.reports.record(DiscardReason::SampleRate, category);
                sdk_debug!(self.debug_log, "event dropped by sample rate {rate}");
                return None;
            }
        }

        let Some(mut event) = self.prepare_event(event, hint, scope) else {
            self.reports.record(DiscardReason::EventProcessor, category);
            sdk_debug!(self.debug_log, "event dropped by a scope event processor");
            return None;
        };

        for integration in &self.integrations {
            match integration.process_event(event, &self.options) {
                Some(processed) => event = processed,
                None => {
                    self.reports.record(DiscardReason::EventProcessor, category);
                    sdk_debug!(
                        self.debug_log,
                        "event dropped by integration {}",
                        integration.name()
                    );
                    return None;
                }
            }
        }

        let before_send = match event.ty {
            EventType::Error => self.options.before_send.as_ref(),
            EventType::Transaction => self.options.before_send_transaction.as_ref(),
            EventType::CheckIn | EventType::Log => None,
        };
        if let Some(callback) = before_send {
            match callback(event) {
                Some(transformed) => event = transformed,
                None => {
                    self.reports.record(DiscardReason::BeforeSend, category);
                    sdk_debug!(self.debug_log, "event dropped by before_send");
                    return None;
                }
            }
        }

        if self.transport.is_limited(category) {
            self.reports
                .record(DiscardReason::RatelimitBackoff, category);
            sdk_debug!(self.debug_log, "event dropped: category {category} is rate limited");
            return None;
        }

        let event_id = event.event_id;
        let mut envelope = Envelope::from_event(event);
        envelope.header.dsn = self.dsn.clone();
        envelope.header.sdk = Some(self.sdk.clone());
        if let Some(report) = self.reports.take() {
            envelope.add_item(EnvelopeItem::ClientReport(report));
        }
        if !self.transport.send_envelope(envelope) {
            self.reports.record(DiscardReason::QueueOverflow, category);
            sdk_debug!(self.debug_log, "event dropped: transport queue full");
            return None;
        }
        Some(event_id)
    }

    /// Defaults applied to every event before the scope and pipeline run.
    /// The scope itself is not mutated.
    fn prepare_event(
        &self,
        mut event: Event,
        hint: &EventHint,
        scope: Option<&Scope>,
    ) -> Option<Event> {
        if event.event_id.is_nil() {
            event.event_id = EventId::new();
        }
        if event.timestamp.is_none() {
            event.timestamp = Some(Utc::now());
        }
        if event.level.is_none() {
            event.level = Some(Level::Info);
        }
        if event.server_name.is_empty() {
            event.server_name = if self.options.server_name.is_empty() {
                std::env::var("HOSTNAME").unwrap_or_default()
            } else {
                self.options.server_name.clone()
            };
        }
        if event.sdk.is_none() {
            event.sdk = Some(self.sdk.clone());
        }
        if event.platform.is_empty() {
            event.platform = "rust".into();
        }
        if let Some(stacktrace) = &hint.stacktrace {
            if let Some(exception) = event.exception.last_mut() {
                if exception.stacktrace.is_none() {
                    exception.stacktrace = Some(stacktrace.clone());
                }
            } else if self.options.attach_stacktrace && !event.message.is_empty() {
                event.exception.push(Exception {
                    ty: "Message".into(),
                    value: event.message.clone(),
                    stacktrace: Some(stacktrace.clone()),
                    ..Exception::default()
                });
            }
        }
        if event.release.is_empty() {
            event.release = self.options.release.clone();
        }
        if event.environment.is_empty() {
            event.environment = self.options.environment.clone();
        }
        if event.dist.is_empty() {
            event.dist = self.options.dist.clone();
        }
        event.attachments.extend(hint.attachments.iter().cloned());

        let mut event = match scope {
            Some(scope) => scope.apply_to_event(event, hint, self.options.breadcrumb_limit())?,
            None => event,
        };
        if self.options.send_default_pii {
            let user = event.user.get_or_insert_default();
            if user.ip_address.is_none() {
                user.ip_address = Some("{{auto}}".into());
            }
        }
        Some(event)
    }

    // -- logs and metrics -------------------------------------------------

    /// Buffer a structured log record.
    pub fn enqueue_log(&self, mut log: Log, scope: Option<&Scope>) {
        if !self.options.enable_logs {
            sdk_debug!(self.debug_log, "structured logs are disabled, dropping record");
            return;
        }
        if log.severity_number.is_none() {
            log.severity_number = Some(log.level.severity_number());
        }
        self.default_log_attributes(&mut log, scope);

        if let Some(callback) = &self.options.before_send_log {
            match callback(log) {
                Some(transformed) => log = transformed,
                None => {
                    self.reports
                        .record(DiscardReason::BeforeSend, DataCategory::Log);
                    return;
                }
            }
        }

        match &self.log_batcher {
            Some(batcher) => {
                if !batcher.send(log) {
                    self.reports
                        .record(DiscardReason::BufferFull, DataCategory::Log);
                    sdk_debug!(self.debug_log, "log buffer full, dropping record");
                }
            }
            None => {
                sdk_debug!(self.debug_log, "log buffering unavailable, dropping record");
            }
        }
    }

    fn default_log_attributes(&self, log: &mut Log, scope: Option<&Scope>) {
        self.apply_default_attributes(&mut log.attributes, scope);
    }

    fn default_metric_attributes(&self, metric: &mut Metric, scope: Option<&Scope>) {
        self.apply_default_attributes(&mut metric.attributes, scope);
    }

    /// Default attributes shared by log records and metric points: SDK and
    /// deployment identity from the options, user fields from the scope when
    /// PII is allowed. Caller-provided entries always win.
    fn apply_default_attributes(
        &self,
        attributes: &mut BTreeMap<String, AttributeValue>,
        scope: Option<&Scope>,
    ) {
        let mut put = |key: &str, value: String| {
            if !value.is_empty() && !attributes.contains_key(key) {
                attributes.insert(key.to_owned(), value.into());
            }
        };
        put("sentry.release", self.options.release.clone());
        put("sentry.environment", self.options.environment.clone());
        put("sentry.server.address", self.options.server_name.clone());
        put("sentry.sdk.name", SDK_NAME.to_owned());
        put("sentry.sdk.version", SDK_VERSION.to_owned());
        if self.options.send_default_pii {
            if let Some(user) = scope.and_then(Scope::user) {
                put("user.id", user.id.unwrap_or_default());
                put("user.name", user.username.unwrap_or_default());
                put("user.email", user.email.unwrap_or_default());
            }
        }
    }

    /// Buffer a trace-metric data point.
    pub fn enqueue_metric(&self, mut metric: Metric, scope: Option<&Scope>) {
        self.default_metric_attributes(&mut metric, scope);
        match &self.metric_batcher {
            Some(batcher) => {
                if !batcher.send(metric) {
                    self.reports
                        .record(DiscardReason::BufferFull, DataCategory::MetricBucket);
                    sdk_debug!(self.debug_log, "metric buffer full, dropping point");
                }
            }
            None => {
                sdk_debug!(self.debug_log, "metric buffering unavailable, dropping point");
            }
        }
    }

    // -- lifecycle --------------------------------------------------------

    /// Flush the batch processors and the transport.
    ///
    /// Returns `true` when everything enqueued before the call left the SDK
    /// within `timeout`.
    #[must_use]
    pub fn flush(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut ok = true;
        if let Some(batcher) = &self.log_batcher {
            ok &= batcher.flush(remaining(deadline));
        }
        if let Some(batcher) = &self.metric_batcher {
            ok &= batcher.flush(remaining(deadline));
        }
        // Ship a pending client report even when no further event will ever
        // be captured.
        if let Some(report) = self.reports.take() {
            let mut envelope = Envelope::new(tracekit_types::EnvelopeHeader::new(None));
            envelope.header.dsn = self.dsn.clone();
            envelope.header.sdk = Some(self.sdk.clone());
            envelope.add_item(EnvelopeItem::ClientReport(report));
            let _ = self.transport.send_envelope(envelope);
        }
        ok & self.transport.flush(remaining(deadline))
    }

    /// Shut down batch processors and transport, dropping whatever cannot be
    /// sent within `timeout`. Idempotent.
    pub fn close(&self, timeout: Duration) -> bool {
        if self.closed.swap(true, Ordering::SeqCst) {
            return true;
        }
        let deadline = Instant::now() + timeout;
        if let Some(batcher) = &self.log_batcher {
            batcher.shutdown(remaining(deadline));
        }
        if let Some(batcher) = &self.metric_batcher {
            batcher.shutdown(remaining(deadline));
        }
        self.transport.shutdown(remaining(deadline))
    }
}

fn remaining(deadline: Instant) -> Duration {
    deadline.saturating_duration_since(Instant::now())
}

fn usage_error_event(message: &str) -> Event {
    let mut event = Event::new();
    event.level = Some(Level::Error);
    event.exception.push(Exception {
        ty: "UsageError".into(),
        value: message.into(),
        ..Exception::default()
    });
    event
}

/// Build a batch processor whose batches become single-item envelopes.
fn batcher<T: Send + 'static>(
    transport: Arc<dyn Transport>,
    reports: Arc<ReportAggregator>,
    dsn: Option<Dsn>,
    sdk: Sdk,
    wrap: impl Fn(Vec<T>) -> EnvelopeItem + Send + 'static,
    category: DataCategory,
) -> BatchProcessor<T> {
    BatchProcessor::start(BatchConfig::default(), move |batch: Vec<T>| {
        let quantity = batch.len() as u32;
        let mut envelope = Envelope::new(tracekit_types::EnvelopeHeader::new(None));
        envelope.header.dsn = dsn.clone();
        envelope.header.sdk = Some(sdk.clone());
        envelope.add_item(wrap(batch));
        if let Some(report) = reports.take() {
            envelope.add_item(EnvelopeItem::ClientReport(report));
        }
        if !transport.send_envelope(envelope) {
            reports.record_many(DiscardReason::QueueOverflow, category, quantity);
        }
    })
}
