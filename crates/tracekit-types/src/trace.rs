// SPDX-License-Identifier: MIT OR Apache-2.0
//! Distributed-trace propagation headers.
//!
//! Two headers tie services of one trace together: the single-line
//! `sentry-trace` header carrying trace id, parent span id, and the sampling
//! decision, and the W3C-style `baggage` header whose `sentry-` prefixed
//! members form the dynamic sampling context. Parsing is lenient throughout:
//! malformed input yields no propagation, never an error.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::ids::{SpanId, TraceId};

/// Baggage member key prefix reserved for this SDK.
pub const BAGGAGE_PREFIX: &str = "sentry-";

/// Maximum number of members a serialized baggage header may carry.
const MAX_BAGGAGE_MEMBERS: usize = 64;

// ---------------------------------------------------------------------------
// sentry-trace header
// ---------------------------------------------------------------------------

/// Parsed contents of a `sentry-trace` header:
/// `<32-hex-trace>-<16-hex-span>[-0|-1]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SentryTrace {
    /// The trace id.
    pub trace_id: TraceId,
    /// Span id of the upstream parent.
    pub parent_span_id: SpanId,
    /// Upstream sampling decision; `None` defers the decision to us.
    pub sampled: Option<bool>,
}

impl SentryTrace {
    /// Parse a header value. Returns `None` on any malformation.
    #[must_use]
    pub fn parse(header: &str) -> Option<Self> {
        let mut parts = header.trim().splitn(3, '-');
        let trace_id: TraceId = parts.next()?.parse().ok()?;
        let parent_span_id: SpanId = parts.next()?.parse().ok()?;
        let sampled = match parts.next() {
            Some("0") => Some(false),
            Some("1") => Some(true),
            Some(_) => None,
            None => None,
        };
        if trace_id.is_nil() {
            return None;
        }
        Some(SentryTrace {
            trace_id,
            parent_span_id,
            sampled,
        })
    }
}

impl fmt::Display for SentryTrace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.trace_id, self.parent_span_id)?;
        match self.sampled {
            Some(true) => write!(f, "-1"),
            Some(false) => write!(f, "-0"),
            None => Ok(()),
        }
    }
}

// ---------------------------------------------------------------------------
// Baggage
// ---------------------------------------------------------------------------

/// A parsed `baggage` header.
///
/// Members with the `sentry-` prefix are interpreted and stored decoded;
/// every other member is preserved verbatim so downstream hops see it
/// unchanged.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Baggage {
    sentry: BTreeMap<String, String>,
    third_party: Vec<String>,
}

impl Baggage {
    /// An empty baggage.
    #[must_use]
    pub fn new() -> Self {
        Baggage::default()
    }

    /// Parse a header value. Unparseable members are dropped; everything
    /// else survives.
    #[must_use]
    pub fn parse(header: &str) -> Self {
        let mut baggage = Baggage::new();
        for member in header.split(',') {
            let member = member.trim();
            if member.is_empty() {
                continue;
            }
            // Properties (`;k=v`) stay attached to third-party members but
            // are not interpreted on sentry members.
            let kv = member.split(';').next().unwrap_or(member);
            let Some((key, value)) = kv.split_once('=') else {
                continue;
            };
            let key = key.trim();
            if key.is_empty() {
                continue;
            }
            if let Some(short) = key.strip_prefix(BAGGAGE_PREFIX) {
                let decoded = urlencoding::decode(value.trim())
                    .map(|v| v.into_owned())
                    .unwrap_or_else(|_| value.trim().to_owned());
                baggage.sentry.insert(short.to_owned(), decoded);
            } else {
                baggage.third_party.push(member.to_owned());
            }
        }
        baggage
    }

    /// Look up an interpreted member by its key without the prefix.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.sentry.get(key).map(String::as_str)
    }

    /// Insert an interpreted member (key without the prefix).
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.sentry.insert(key.into(), value.into());
    }

    /// Append a third-party member, preserved verbatim on re-encode.
    pub fn insert_third_party(&mut self, member: impl Into<String>) {
        self.third_party.push(member.into());
    }

    /// The interpreted members, keys without the prefix.
    #[must_use]
    pub fn sentry_members(&self) -> &BTreeMap<String, String> {
        &self.sentry
    }

    /// The preserved third-party members, verbatim.
    #[must_use]
    pub fn third_party_members(&self) -> &[String] {
        &self.third_party
    }

    /// Whether nothing at all is stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.sentry.is_empty() && self.third_party.is_empty()
    }

    /// Serialize back into a header value. Third-party members come first,
    /// unchanged; interpreted members follow with the `sentry-` prefix and
    /// percent-encoded values.
    #[must_use]
    pub fn encode(&self) -> String {
        let mut members: Vec<String> = Vec::new();
        members.extend(self.third_party.iter().cloned());
        for (key, value) in &self.sentry {
            members.push(format!(
                "{BAGGAGE_PREFIX}{key}={}",
                urlencoding::encode(value)
            ));
        }
        members.truncate(MAX_BAGGAGE_MEMBERS);
        members.join(",")
    }
}

// ---------------------------------------------------------------------------
// Dynamic sampling context
// ---------------------------------------------------------------------------

/// The dynamic sampling context: a small string map snapshotted from the
/// root span of a trace, propagated in baggage so every service in the trace
/// can make a consistent sampling decision.
///
/// Once frozen the entries never change; [`DynamicSamplingContext::insert`]
/// becomes a no-op.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct DynamicSamplingContext {
    entries: BTreeMap<String, String>,
    #[serde(skip)]
    frozen: bool,
}

impl DynamicSamplingContext {
    /// An empty, unfrozen context.
    #[must_use]
    pub fn new() -> Self {
        DynamicSamplingContext::default()
    }

    /// Build a frozen context from the interpreted members of inbound
    /// baggage. Returns `None` when the baggage carries no trace id, since
    /// a context without one cannot drive sampling downstream.
    #[must_use]
    pub fn from_baggage(baggage: &Baggage) -> Option<Self> {
        baggage.get("trace_id")?;
        let mut dsc = DynamicSamplingContext {
            entries: baggage.sentry_members().clone(),
            frozen: true,
        };
        dsc.entries.retain(|_, v| !v.is_empty());
        Some(dsc)
    }

    /// Whether the context is frozen.
    #[must_use]
    pub fn is_frozen(&self) -> bool {
        self.frozen
    }

    /// Freeze the context; later mutations are ignored.
    pub fn freeze(&mut self) {
        self.frozen = true;
    }

    /// Insert an entry. No-op once frozen, and empty values are dropped.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        if self.frozen {
            return;
        }
        let value = value.into();
        if value.is_empty() {
            return;
        }
        self.entries.insert(key.into(), value);
    }

    /// Look up an entry.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries.get(key).map(String::as_str)
    }

    /// The flattened entries, as serialized into envelope headers.
    #[must_use]
    pub fn entries(&self) -> &BTreeMap<String, String> {
        &self.entries
    }

    /// Whether no entry is present.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Merge this context into outbound baggage under the `sentry-` prefix.
    pub fn apply_to_baggage(&self, baggage: &mut Baggage) {
        for (key, value) in &self.entries {
            baggage.insert(key.clone(), value.clone());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // -- sentry-trace -----------------------------------------------------

    #[test]
    fn parse_full_trace_header() {
        let parsed =
            SentryTrace::parse("bc6d53f15eb88f4320054569b8c553d4-b72fa28504b07285-1").unwrap();
        assert_eq!(
            parsed.trace_id.to_string(),
            "bc6d53f15eb88f4320054569b8c553d4"
        );
        assert_eq!(parsed.parent_span_id.to_string(), "b72fa28504b07285");
        assert_eq!(parsed.sampled, Some(true));
    }

    #[test]
    fn parse_deferred_sampling() {
        let parsed =
            SentryTrace::parse("bc6d53f15eb88f4320054569b8c553d4-b72fa28504b07285").unwrap();
        assert_eq!(parsed.sampled, None);
        let negative =
            SentryTrace::parse("bc6d53f15eb88f4320054569b8c553d4-b72fa28504b07285-0").unwrap();
        assert_eq!(negative.sampled, Some(false));
    }

    #[test]
    fn parse_is_lenient() {
        assert_eq!(SentryTrace::parse(""), None);
        assert_eq!(SentryTrace::parse("not-a-header"), None);
        assert_eq!(SentryTrace::parse("bc6d53f15eb88f4320054569b8c553d4"), None);
        // all-zero trace id is the reserved "none"
        assert_eq!(
            SentryTrace::parse("00000000000000000000000000000000-b72fa28504b07285-1"),
            None
        );
    }

    #[test]
    fn display_roundtrip() {
        for header in [
            "bc6d53f15eb88f4320054569b8c553d4-b72fa28504b07285-1",
            "bc6d53f15eb88f4320054569b8c553d4-b72fa28504b07285-0",
            "bc6d53f15eb88f4320054569b8c553d4-b72fa28504b07285",
        ] {
            let parsed = SentryTrace::parse(header).unwrap();
            assert_eq!(parsed.to_string(), header);
        }
    }

    // -- baggage ----------------------------------------------------------

    #[test]
    fn baggage_splits_interpreted_and_third_party() {
        let baggage = Baggage::parse(
            "other-vendor=foo;prop=1, sentry-trace_id=bc6d53f15eb88f4320054569b8c553d4, \
             sentry-release=1.2.3",
        );
        assert_eq!(
            baggage.get("trace_id"),
            Some("bc6d53f15eb88f4320054569b8c553d4")
        );
        assert_eq!(baggage.get("release"), Some("1.2.3"));
        assert_eq!(baggage.third_party_members(), ["other-vendor=foo;prop=1"]);
    }

    #[test]
    fn baggage_encode_preserves_third_party() {
        let mut baggage = Baggage::parse("vendor=a,other=b;x=y");
        baggage.insert("sampled", "true");
        let encoded = baggage.encode();
        assert!(encoded.starts_with("vendor=a,other=b;x=y"));
        assert!(encoded.contains("sentry-sampled=true"));
    }

    #[test]
    fn baggage_values_are_percent_encoded() {
        let mut baggage = Baggage::new();
        baggage.insert("transaction", "GET /users list");
        let encoded = baggage.encode();
        assert!(encoded.contains("sentry-transaction=GET%20%2Fusers%20list"));
        let back = Baggage::parse(&encoded);
        assert_eq!(back.get("transaction"), Some("GET /users list"));
    }

    #[test]
    fn baggage_skips_malformed_members() {
        let baggage = Baggage::parse("loose-words, sentry-release=ok,,=bad");
        assert_eq!(baggage.get("release"), Some("ok"));
        assert!(baggage.third_party_members().iter().all(|m| m.contains('=')));
    }

    // -- dynamic sampling context -----------------------------------------

    #[test]
    fn dsc_from_baggage_requires_trace_id() {
        let without = Baggage::parse("sentry-release=1.0");
        assert!(DynamicSamplingContext::from_baggage(&without).is_none());

        let with = Baggage::parse(
            "sentry-trace_id=bc6d53f15eb88f4320054569b8c553d4,sentry-public_key=abc",
        );
        let dsc = DynamicSamplingContext::from_baggage(&with).unwrap();
        assert!(dsc.is_frozen());
        assert_eq!(dsc.get("public_key"), Some("abc"));
    }

    #[test]
    fn frozen_dsc_ignores_mutation() {
        let mut dsc = DynamicSamplingContext::new();
        dsc.insert("release", "1.0");
        dsc.freeze();
        dsc.insert("release", "2.0");
        dsc.insert("environment", "prod");
        assert_eq!(dsc.get("release"), Some("1.0"));
        assert_eq!(dsc.get("environment"), None);
    }

    #[test]
    fn dsc_drops_empty_values() {
        let mut dsc = DynamicSamplingContext::new();
        dsc.insert("release", "");
        assert!(dsc.is_empty());
    }

    #[test]
    fn dsc_applies_to_baggage() {
        let mut dsc = DynamicSamplingContext::new();
        dsc.insert("trace_id", "bc6d53f15eb88f4320054569b8c553d4");
        dsc.insert("sampled", "true");
        dsc.freeze();

        let mut baggage = Baggage::parse("vendor=a");
        dsc.apply_to_baggage(&mut baggage);
        let encoded = baggage.encode();
        assert!(encoded.contains("vendor=a"));
        assert!(encoded.contains("sentry-trace_id=bc6d53f15eb88f4320054569b8c553d4"));
        assert!(encoded.contains("sentry-sampled=true"));
    }
}
