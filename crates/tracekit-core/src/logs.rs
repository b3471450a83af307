// SPDX-License-Identifier: MIT OR Apache-2.0
//! Structured-log front-end.
//!
//! A [`Logger`] builds log records and hands them to the current hub's
//! client, which buffers them in the log batch processor. Records carry the
//! trace id of the active span (or the scope's propagation context) so the
//! backend can attach logs to traces.

use std::collections::BTreeMap;

use chrono::Utc;
use tracekit_types::{AttributeValue, Log, LogLevel};

use crate::hub::Hub;

/// Builder-style producer of structured log records.
///
/// # Examples
///
/// ```no_run
/// use tracekit_core::Logger;
///
/// let logger = Logger::new().with_attribute("component", "billing");
/// logger.info("invoice generated");
/// logger.warn("retrying payment provider");
/// ```
#[derive(Default, Clone)]
pub struct Logger {
    attributes: BTreeMap<String, AttributeValue>,
}

impl Logger {
    /// A logger with no default attributes.
    #[must_use]
    pub fn new() -> Self {
        Logger::default()
    }

    /// Attach an attribute to every record this logger emits.
    #[must_use]
    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<AttributeValue>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }

    /// Emit at `trace` level.
    pub fn trace(&self, body: impl Into<String>) {
        self.emit(LogLevel::Trace, body);
    }

    /// Emit at `debug` level.
    pub fn debug(&self, body: impl Into<String>) {
        self.emit(LogLevel::Debug, body);
    }

    /// Emit at `info` level.
    pub fn info(&self, body: impl Into<String>) {
        self.emit(LogLevel::Info, body);
    }

    /// Emit at `warn` level.
    pub fn warn(&self, body: impl Into<String>) {
        self.emit(LogLevel::Warn, body);
    }

    /// Emit at `error` level.
    pub fn error(&self, body: impl Into<String>) {
        self.emit(LogLevel::Error, body);
    }

    /// Emit at `fatal` level.
    pub fn fatal(&self, body: impl Into<String>) {
        self.emit(LogLevel::Fatal, body);
    }

    /// Emit a record at an explicit level.
    pub fn emit(&self, level: LogLevel, body: impl Into<String>) {
        self.emit_with(level, body, BTreeMap::new());
    }

    /// Emit a record with per-call attributes merged over the logger's
    /// defaults (per-call entries win).
    pub fn emit_with(
        &self,
        level: LogLevel,
        body: impl Into<String>,
        attributes: BTreeMap<String, AttributeValue>,
    ) {
        let hub = Hub::current();
        let Some(client) = hub.client() else {
            return;
        };
        let mut merged = self.attributes.clone();
        merged.extend(attributes);
        let body = body.into();

        hub.configure_scope(|scope| {
            let trace_id = match scope.span() {
                Some(span) => span.trace_id(),
                None => scope.propagation_context().trace_id,
            };
            let log = Log {
                timestamp: Utc::now(),
                trace_id,
                level,
                severity_number: None,
                body,
                attributes: merged,
            };
            client.enqueue_log(log, Some(scope));
        });
    }
}
