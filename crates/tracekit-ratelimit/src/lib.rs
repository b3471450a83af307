// SPDX-License-Identifier: MIT OR Apache-2.0
#![doc = include_str!("../README.md")]
//! tracekit-ratelimit
#![deny(unsafe_code)]
#![warn(missing_docs)]

use std::collections::BTreeMap;
use std::sync::Mutex;

use chrono::{DateTime, Duration, Utc};
use http::HeaderMap;

pub use tracekit_types::DataCategory;

/// Header carrying structured per-category limits. Authoritative: when
/// present it overrides any general `Retry-After`.
pub const RATE_LIMITS_HEADER: &str = "x-sentry-rate-limits";

/// Fallback applied when a retry duration is missing or malformed.
const DEFAULT_RETRY_AFTER: Duration = Duration::seconds(60);

/// Thread-safe mapping of data category to suppression deadline.
///
/// Deadlines only ever move forward: an update keeps the later of the
/// existing and the incoming deadline per category.
#[derive(Debug, Default)]
pub struct Ledger {
    deadlines: Mutex<BTreeMap<DataCategory, DateTime<Utc>>>,
}

impl Ledger {
    /// A new, empty ledger.
    #[must_use]
    pub fn new() -> Self {
        Ledger::default()
    }

    /// Whether `category` is suppressed at `now`, either directly or via the
    /// `default` wildcard.
    #[must_use]
    pub fn is_limited(&self, category: DataCategory, now: DateTime<Utc>) -> bool {
        let deadlines = self.deadlines.lock().expect("ledger lock poisoned");
        let past = |cat: &DataCategory| deadlines.get(cat).is_some_and(|deadline| now < *deadline);
        past(&category) || past(&DataCategory::Default)
    }

    /// Earliest instant at which `category` becomes sendable again, if it is
    /// currently limited.
    #[must_use]
    pub fn deadline(&self, category: DataCategory) -> Option<DateTime<Utc>> {
        let deadlines = self.deadlines.lock().expect("ledger lock poisoned");
        match (
            deadlines.get(&category).copied(),
            deadlines.get(&DataCategory::Default).copied(),
        ) {
            (Some(a), Some(b)) => Some(a.max(b)),
            (a, b) => a.or(b),
        }
    }

    /// Fold a response into the ledger.
    ///
    /// `X-Sentry-Rate-Limits` takes precedence; otherwise `Retry-After`
    /// limits everything via the wildcard; otherwise a bare 429 applies the
    /// 60-second default to the wildcard.
    pub fn update(&self, status: u16, headers: &HeaderMap, now: DateTime<Utc>) {
        if let Some(value) = header_str(headers, RATE_LIMITS_HEADER) {
            for (category, deadline) in parse_rate_limits(value, now) {
                self.merge(category, deadline);
            }
        } else if let Some(value) = header_str(headers, "retry-after") {
            self.merge(DataCategory::Default, now + parse_retry_after(value));
        } else if status == 429 {
            self.merge(DataCategory::Default, now + DEFAULT_RETRY_AFTER);
        }
    }

    fn merge(&self, category: DataCategory, deadline: DateTime<Utc>) {
        let mut deadlines = self.deadlines.lock().expect("ledger lock poisoned");
        let entry = deadlines.entry(category).or_insert(deadline);
        if deadline > *entry {
            *entry = deadline;
        }
    }
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name)?.to_str().ok()
}

/// Parse an `X-Sentry-Rate-Limits` value into `(category, deadline)` pairs.
///
/// Entries are semicolon-separated `seconds:categories:scope:reason`, the
/// categories a comma-separated list. An empty categories field means the
/// entry applies to everything. Unknown categories and trailing fields are
/// tolerated and skipped.
fn parse_rate_limits(value: &str, now: DateTime<Utc>) -> Vec<(DataCategory, DateTime<Utc>)> {
    let mut limits = Vec::new();
    for entry in value.split(';') {
        let entry = entry.trim();
        if entry.is_empty() {
            continue;
        }
        let mut fields = entry.split(':');
        let seconds = fields
            .next()
            .and_then(|s| s.trim().parse::<f64>().ok())
            .filter(|s| s.is_finite() && *s >= 0.0)
            .map_or(DEFAULT_RETRY_AFTER, |s| {
                Duration::milliseconds((s * 1000.0) as i64)
            });
        let deadline = now + seconds;

        let categories = fields.next().unwrap_or("");
        if categories.trim().is_empty() {
            limits.push((DataCategory::Default, deadline));
            continue;
        }
        for name in categories.split(',') {
            if let Some(category) = DataCategory::parse(name.trim()) {
                limits.push((category, deadline));
            }
        }
    }
    limits
}

/// Parse a `Retry-After` value: integer seconds or an RFC1123 date.
/// Malformed input falls back to 60 seconds.
fn parse_retry_after(value: &str) -> Duration {
    let value = value.trim();
    if let Ok(seconds) = value.parse::<i64>() {
        if seconds >= 0 {
            return Duration::seconds(seconds);
        }
    }
    if let Ok(date) = DateTime::parse_from_rfc2822(value) {
        let delta = date.with_timezone(&Utc) - Utc::now();
        if delta > Duration::zero() {
            return delta;
        }
    }
    DEFAULT_RETRY_AFTER
}
