// SPDX-License-Identifier: MIT OR Apache-2.0
//! Trace-metric front-end.
//!
//! Counters, gauges, and distributions recorded here flow through the
//! client's metric batch processor and ship as `trace_metric` envelope
//! items, stamped with the active trace and span.

use std::collections::BTreeMap;

use chrono::Utc;
use tracekit_types::{AttributeValue, Metric};

use crate::hub::Hub;

/// Builder-style producer of trace-metric points.
#[derive(Default, Clone)]
pub struct Metrics {
    attributes: BTreeMap<String, AttributeValue>,
    unit: Option<String>,
}

impl Metrics {
    /// A metrics handle with no default attributes.
    #[must_use]
    pub fn new() -> Self {
        Metrics::default()
    }

    /// Attach an attribute to every point this handle records.
    #[must_use]
    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<AttributeValue>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }

    /// Set the unit reported with every point, e.g. `"millisecond"`.
    #[must_use]
    pub fn with_unit(mut self, unit: impl Into<String>) -> Self {
        self.unit = Some(unit.into());
        self
    }

    /// Record a counter increment.
    pub fn count(&self, name: impl Into<String>, value: f64) {
        self.record("counter", name, value);
    }

    /// Record a gauge sample.
    pub fn gauge(&self, name: impl Into<String>, value: f64) {
        self.record("gauge", name, value);
    }

    /// Record a distribution sample.
    pub fn distribution(&self, name: impl Into<String>, value: f64) {
        self.record("distribution", name, value);
    }

    fn record(&self, ty: &str, name: impl Into<String>, value: f64) {
        let hub = Hub::current();
        let Some(client) = hub.client() else {
            return;
        };
        let name = name.into();
        hub.configure_scope(|scope| {
            let (trace_id, span_id) = match scope.span() {
                Some(span) => (span.trace_id(), Some(span.span_id())),
                None => (scope.propagation_context().trace_id, None),
            };
            let metric = Metric {
                timestamp: Utc::now(),
                trace_id,
                span_id,
                name,
                ty: ty.to_owned(),
                value,
                unit: self.unit.clone(),
                attributes: self.attributes.clone(),
            };
            client.enqueue_metric(metric, Some(scope));
        });
    }
}
