// SPDX-License-Identifier: MIT OR Apache-2.0
//! Client-report aggregation.
//!
//! Every item the SDK drops locally is counted here, keyed by
//! `(reason, category)`. The aggregate is flushed as its own envelope item
//! piggybacked on later envelopes, so the backend can account for data the
//! SDK never sent.

use std::collections::BTreeMap;
use std::sync::Mutex;

use chrono::Utc;
use tracekit_types::{ClientReport, DataCategory, DiscardReason, DiscardedEvent};

/// Thread-safe `(reason, category) → quantity` counter.
#[derive(Debug)]
pub struct ReportAggregator {
    enabled: bool,
    counts: Mutex<BTreeMap<(DiscardReason, DataCategory), u32>>,
}

impl ReportAggregator {
    /// A new aggregator; `enabled = false` turns every operation into a
    /// no-op (the `disable_client_reports` option).
    #[must_use]
    pub fn new(enabled: bool) -> Self {
        ReportAggregator {
            enabled,
            counts: Mutex::new(BTreeMap::new()),
        }
    }

    /// Count one dropped item.
    pub fn record(&self, reason: DiscardReason, category: DataCategory) {
        self.record_many(reason, category, 1);
    }

    /// Count `quantity` dropped items at once (batched logs, metrics).
    pub fn record_many(&self, reason: DiscardReason, category: DataCategory, quantity: u32) {
        if !self.enabled || quantity == 0 {
            return;
        }
        let mut counts = self.counts.lock().expect("report lock poisoned");
        *counts.entry((reason, category)).or_insert(0) += quantity;
    }

    /// Drain the counters into a report, or `None` when nothing was dropped
    /// since the last call.
    #[must_use]
    pub fn take(&self) -> Option<ClientReport> {
        if !self.enabled {
            return None;
        }
        let mut counts = self.counts.lock().expect("report lock poisoned");
        if counts.is_empty() {
            return None;
        }
        let discarded_events = std::mem::take(&mut *counts)
            .into_iter()
            .map(|((reason, category), quantity)| DiscardedEvent {
                reason,
                category,
                quantity,
            })
            .collect();
        Some(ClientReport {
            timestamp: Utc::now(),
            discarded_events,
        })
    }
}
