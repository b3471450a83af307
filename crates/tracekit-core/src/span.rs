// SPDX-License-Identifier: MIT OR Apache-2.0
//! Spans and transactions.
//!
//! A transaction is the root span of a local trace tree. Children share the
//! transaction's span recorder (bounded; overflow is logged, not fatal) and
//! its frozen dynamic sampling context. Finishing is idempotent; finishing
//! the root assembles the transaction event from the recorded children and
//! hands it to the client.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use rand::Rng;
use serde_json::Value;
use tracekit_types::{
    Baggage, Context, DataCategory, DiscardReason, DynamicSamplingContext, Event, EventType,
    SentryTrace, SpanData, SpanId, SpanStatus, TraceId, TransactionInfo, TransactionSource,
};

use crate::client::Client;
use crate::scope::{EventHint, Scope};

/// Inputs to a caller-supplied traces sampler.
#[derive(Debug, Clone)]
pub struct SamplingContext {
    /// Name of the transaction being started.
    pub transaction_name: String,
    /// Operation of the root span.
    pub op: String,
    /// Trace the transaction belongs to.
    pub trace_id: TraceId,
    /// Upstream sampling decision, if the trace was continued.
    pub parent_sampled: Option<bool>,
}

/// Everything needed to start a transaction.
#[derive(Debug, Clone, Default)]
pub struct TransactionContext {
    /// Transaction name, e.g. `"GET /users"`.
    pub name: String,
    /// Root span operation, e.g. `"http.server"`.
    pub op: String,
    /// Trace id to continue; a fresh one is generated when unset.
    pub trace_id: Option<TraceId>,
    /// Span id of the upstream parent.
    pub parent_span_id: Option<SpanId>,
    /// Upstream sampling decision.
    pub parent_sampled: Option<bool>,
    /// Explicit local sampling override; takes precedence over everything.
    pub sampled: Option<bool>,
    /// Where the name came from.
    pub source: TransactionSource,
    /// Instrumentation origin.
    pub origin: String,
    /// Frozen sampling context inherited from inbound baggage.
    pub dsc: Option<DynamicSamplingContext>,
    /// Non-Sentry inbound baggage members, preserved verbatim for
    /// downstream hops.
    pub third_party_baggage: Vec<String>,
}

impl TransactionContext {
    /// A context for a fresh trace.
    #[must_use]
    pub fn new(name: impl Into<String>, op: impl Into<String>) -> Self {
        TransactionContext {
            name: name.into(),
            op: op.into(),
            ..TransactionContext::default()
        }
    }

    /// Continue a trace from inbound `sentry-trace` and `baggage` header
    /// values. Malformed headers are ignored and yield a fresh trace.
    ///
    /// Continuing from headers freezes the dynamic sampling context: the
    /// upstream snapshot wins over anything this process would derive.
    #[must_use]
    pub fn continue_from_headers(
        name: impl Into<String>,
        op: impl Into<String>,
        sentry_trace: Option<&str>,
        baggage: Option<&str>,
    ) -> Self {
        let mut ctx = TransactionContext::new(name, op);
        if let Some(trace) = sentry_trace.and_then(SentryTrace::parse) {
            ctx.trace_id = Some(trace.trace_id);
            ctx.parent_span_id = Some(trace.parent_span_id);
            ctx.parent_sampled = trace.sampled;
        }
        if let Some(baggage) = baggage {
            let parsed = Baggage::parse(baggage);
            ctx.third_party_baggage = parsed.third_party_members().to_vec();
            if ctx.trace_id.is_some() {
                ctx.dsc = DynamicSamplingContext::from_baggage(&parsed);
            }
        }
        ctx
    }
}

/// State shared between a transaction and all of its children.
struct TraceShared {
    recorder: Mutex<Vec<Arc<Span>>>,
    cap: usize,
    overflow_logged: AtomicBool,
    dsc: DynamicSamplingContext,
    third_party_baggage: Vec<String>,
}

impl TraceShared {
    fn record(&self, span: &Arc<Span>) {
        let mut recorder = self.recorder.lock().expect("span recorder lock poisoned");
        if recorder.len() >= self.cap {
            if !self.overflow_logged.swap(true, Ordering::Relaxed) {
                tracing::warn!(cap = self.cap, "span recorder full, dropping further spans");
            }
            return;
        }
        recorder.push(Arc::clone(span));
    }
}

/// A node in a distributed-trace tree. The root node is the transaction.
pub struct Span {
    shared: Arc<TraceShared>,
    data: Mutex<SpanData>,
    name: String,
    source: TransactionSource,
    sampled: bool,
    finished: AtomicBool,
    is_transaction: bool,
    client: Option<Arc<Client>>,
    scope: Option<Arc<Scope>>,
}

/// Start a transaction against an explicit client and scope.
///
/// Without a client, or with tracing disabled, the returned span is valid
/// but unsampled: children can be created and finished, nothing is sent.
#[must_use]
pub fn start_transaction(
    client: Option<Arc<Client>>,
    scope: Option<Arc<Scope>>,
    ctx: TransactionContext,
) -> Arc<Span> {
    let trace_id = ctx.trace_id.unwrap_or_else(TraceId::new);
    let span_id = SpanId::new();
    let (sampled, rate) = decide_sampling(client.as_deref(), &ctx, trace_id);

    let dsc = match ctx.dsc {
        Some(dsc) => dsc,
        None => build_dsc(
            client.as_deref(),
            scope.as_deref(),
            &ctx,
            trace_id,
            sampled,
            rate,
        ),
    };

    let cap = client
        .as_ref()
        .map_or(crate::options::DEFAULT_MAX_SPANS, |c| c.options().span_limit());

    let shared = Arc::new(TraceShared {
        recorder: Mutex::new(Vec::new()),
        cap,
        overflow_logged: AtomicBool::new(false),
        dsc,
        third_party_baggage: ctx.third_party_baggage,
    });

    if !sampled {
        if let Some(client) = &client {
            client.record_discard(DiscardReason::SampleRate, DataCategory::Transaction);
        }
    }

    let span = Arc::new(Span {
        shared: Arc::clone(&shared),
        data: Mutex::new(SpanData {
            trace_id,
            span_id,
            parent_span_id: ctx.parent_span_id,
            op: ctx.op,
            origin: ctx.origin,
            start_timestamp: Some(Utc::now()),
            ..SpanData::default()
        }),
        name: ctx.name,
        source: ctx.source,
        sampled,
        finished: AtomicBool::new(false),
        is_transaction: true,
        client,
        scope,
    });
    shared.record(&span);
    span
}

fn decide_sampling(
    client: Option<&Client>,
    ctx: &TransactionContext,
    trace_id: TraceId,
) -> (bool, Option<f64>) {
    let Some(client) = client else {
        return (false, None);
    };
    let options = client.options();
    if !options.enable_tracing {
        return (false, None);
    }
    if let Some(sampled) = ctx.sampled {
        return (sampled, Some(if sampled { 1.0 } else { 0.0 }));
    }
    if let Some(sampler) = &options.traces_sampler {
        let rate = sampler(&SamplingContext {
            transaction_name: ctx.name.clone(),
            op: ctx.op.clone(),
            trace_id,
            parent_sampled: ctx.parent_sampled,
        })
        .clamp(0.0, 1.0);
        return (draw(rate), Some(rate));
    }
    if let Some(parent) = ctx.parent_sampled {
        return (parent, None);
    }
    let rate = options.traces_sample_rate.clamp(0.0, 1.0);
    (draw(rate), Some(rate))
}

fn draw(rate: f64) -> bool {
    if rate <= 0.0 {
        return false;
    }
    if rate >= 1.0 {
        return true;
    }
    rand::rng().random::<f64>() < rate
}

fn build_dsc(
    client: Option<&Client>,
    scope: Option<&Scope>,
    ctx: &TransactionContext,
    trace_id: TraceId,
    sampled: bool,
    rate: Option<f64>,
) -> DynamicSamplingContext {
    let mut dsc = DynamicSamplingContext::new();
    dsc.insert("trace_id", trace_id.to_string());
    dsc.insert("sampled", if sampled { "true" } else { "false" });
    if let Some(rate) = rate {
        dsc.insert("sample_rate", format!("{rate}"));
    }
    if let Some(client) = client {
        if let Some(dsn) = client.dsn() {
            dsc.insert("public_key", dsn.public_key());
        }
        dsc.insert("release", client.options().release.clone());
        dsc.insert("environment", client.options().environment.clone());
    }
    // Raw URLs are high-cardinality; their names stay out of the sampling
    // context.
    if ctx.source != TransactionSource::Url {
        dsc.insert("transaction", ctx.name.clone());
    }
    if let Some(segment) = scope
        .and_then(Scope::user)
        .and_then(|user| user.segment)
    {
        dsc.insert("user_segment", segment);
    }
    dsc.freeze();
    dsc
}

impl Span {
    // -- accessors --------------------------------------------------------

    /// The trace id.
    #[must_use]
    pub fn trace_id(&self) -> TraceId {
        self.data.lock().expect("span lock poisoned").trace_id
    }

    /// This span's id.
    #[must_use]
    pub fn span_id(&self) -> SpanId {
        self.data.lock().expect("span lock poisoned").span_id
    }

    /// The parent span id, if any.
    #[must_use]
    pub fn parent_span_id(&self) -> Option<SpanId> {
        self.data.lock().expect("span lock poisoned").parent_span_id
    }

    /// Whether this trace is being recorded.
    #[must_use]
    pub fn is_sampled(&self) -> bool {
        self.sampled
    }

    /// Whether this is the root span of its trace tree.
    #[must_use]
    pub fn is_transaction(&self) -> bool {
        self.is_transaction
    }

    /// Whether `finish` has been called.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.finished.load(Ordering::SeqCst)
    }

    /// The frozen dynamic sampling context of the trace.
    #[must_use]
    pub fn dynamic_sampling_context(&self) -> Option<DynamicSamplingContext> {
        if self.shared.dsc.is_empty() {
            None
        } else {
            Some(self.shared.dsc.clone())
        }
    }

    /// Number of spans recorded so far, the root included.
    #[must_use]
    pub fn recorded_span_count(&self) -> usize {
        self.shared
            .recorder
            .lock()
            .expect("span recorder lock poisoned")
            .len()
    }

    // -- mutation ---------------------------------------------------------

    /// Set the outcome status.
    pub fn set_status(&self, status: SpanStatus) {
        self.data.lock().expect("span lock poisoned").status = Some(status);
    }

    /// Set a tag.
    pub fn set_tag(&self, key: impl Into<String>, value: impl Into<String>) {
        self.data
            .lock()
            .expect("span lock poisoned")
            .tags
            .insert(key.into(), value.into());
    }

    /// Set a structured data entry.
    pub fn set_data(&self, key: impl Into<String>, value: Value) {
        self.data
            .lock()
            .expect("span lock poisoned")
            .data
            .insert(key.into(), value);
    }

    /// Set the description.
    pub fn set_description(&self, description: impl Into<String>) {
        self.data.lock().expect("span lock poisoned").description = description.into();
    }

    // -- children ---------------------------------------------------------

    /// Start a child span sharing this span's recorder and trace.
    #[must_use]
    pub fn start_child(&self, op: impl Into<String>, description: impl Into<String>) -> Arc<Span> {
        let (trace_id, parent_span_id) = {
            let data = self.data.lock().expect("span lock poisoned");
            (data.trace_id, data.span_id)
        };
        let child = Arc::new(Span {
            shared: Arc::clone(&self.shared),
            data: Mutex::new(SpanData {
                trace_id,
                span_id: SpanId::new(),
                parent_span_id: Some(parent_span_id),
                op: op.into(),
                description: description.into(),
                start_timestamp: Some(Utc::now()),
                ..SpanData::default()
            }),
            name: String::new(),
            source: TransactionSource::Custom,
            sampled: self.sampled,
            finished: AtomicBool::new(false),
            is_transaction: false,
            client: self.client.clone(),
            scope: self.scope.clone(),
        });
        if self.sampled {
            self.shared.record(&child);
        }
        child
    }

    // -- propagation ------------------------------------------------------

    /// The outgoing `sentry-trace` header value.
    #[must_use]
    pub fn to_trace(&self) -> String {
        let data = self.data.lock().expect("span lock poisoned");
        SentryTrace {
            trace_id: data.trace_id,
            parent_span_id: data.span_id,
            sampled: Some(self.sampled),
        }
        .to_string()
    }

    /// The outgoing `baggage` header value: preserved third-party members
    /// plus the trace's frozen sampling context.
    #[must_use]
    pub fn to_baggage(&self) -> String {
        let mut baggage = Baggage::new();
        for member in &self.shared.third_party_baggage {
            baggage.insert_third_party(member.clone());
        }
        self.shared.dsc.apply_to_baggage(&mut baggage);
        baggage.encode()
    }

    // -- finishing --------------------------------------------------------

    /// Finish the span at the current time. Idempotent: only the first call
    /// has any effect, and for the root exactly one transaction event is
    /// emitted even under concurrent calls.
    pub fn finish(&self) {
        self.finish_at(Utc::now());
    }

    /// Finish at an explicit end time.
    pub fn finish_at(&self, end: DateTime<Utc>) {
        if self.finished.swap(true, Ordering::SeqCst) {
            return;
        }
        {
            let mut data = self.data.lock().expect("span lock poisoned");
            if data.timestamp.is_none() {
                data.timestamp = Some(end);
            }
        }
        if !self.is_transaction || !self.sampled {
            return;
        }
        let Some(client) = &self.client else {
            return;
        };

        let root = self.data.lock().expect("span lock poisoned").clone();
        let root_end = root.timestamp.unwrap_or(end);

        let recorded: Vec<Arc<Span>> = self
            .shared
            .recorder
            .lock()
            .expect("span recorder lock poisoned")
            .clone();
        let mut children: Vec<SpanData> = recorded
            .iter()
            .filter(|span| !span.is_transaction)
            .map(|span| {
                let mut data = span.data.lock().expect("span lock poisoned").clone();
                if data.timestamp.is_none() {
                    data.timestamp = Some(root_end);
                }
                data
            })
            .collect();
        children.sort_by_key(|span| span.timestamp);

        let mut trace = Context::new();
        trace.insert("trace_id".into(), root.trace_id.to_string().into());
        trace.insert("span_id".into(), root.span_id.to_string().into());
        if let Some(parent) = root.parent_span_id {
            trace.insert("parent_span_id".into(), parent.to_string().into());
        }
        if !root.op.is_empty() {
            trace.insert("op".into(), root.op.clone().into());
        }
        if !root.description.is_empty() {
            trace.insert("description".into(), root.description.clone().into());
        }
        if let Some(status) = root.status {
            if let Ok(value) = serde_json::to_value(status) {
                trace.insert("status".into(), value);
            }
        }
        if !root.origin.is_empty() {
            trace.insert("origin".into(), root.origin.clone().into());
        }

        let mut event = Event {
            ty: EventType::Transaction,
            transaction: self.name.clone(),
            transaction_info: Some(TransactionInfo {
                source: self.source,
            }),
            start_timestamp: root.start_timestamp,
            timestamp: Some(root_end),
            tags: root.tags.clone(),
            spans: children,
            dynamic_sampling_context: self.dynamic_sampling_context(),
            ..Event::default()
        };
        event.contexts.insert("trace".into(), trace);

        client.capture_event(Some(event), &EventHint::default(), self.scope.as_deref());
    }
}

impl std::fmt::Debug for Span {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let data = self.data.lock().expect("span lock poisoned");
        f.debug_struct("Span")
            .field("trace_id", &data.trace_id)
            .field("span_id", &data.span_id)
            .field("op", &data.op)
            .field("sampled", &self.sampled)
            .field("is_transaction", &self.is_transaction)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::Client;
    use crate::options::ClientOptions;
    use crate::transport::Transport;
    use crate::transport::testing::CollectingTransport;
    use tracekit_types::EnvelopeItem;

    fn traced_client(
        tweak: impl FnOnce(&mut ClientOptions),
    ) -> (Arc<Client>, Arc<CollectingTransport>) {
        let transport = Arc::new(CollectingTransport::default());
        let transport_for_factory = Arc::clone(&transport);
        let mut options = ClientOptions {
            dsn: "https://public@example.com/1".into(),
            enable_tracing: true,
            traces_sample_rate: 1.0,
            transport: Some(Arc::new(move |_: &ClientOptions| {
                transport_for_factory.clone() as Arc<dyn Transport>
            })),
            ..ClientOptions::default()
        };
        tweak(&mut options);
        (Client::new(options).unwrap(), transport)
    }

    fn transaction_events(transport: &CollectingTransport) -> Vec<Event> {
        transport
            .envelopes
            .lock()
            .unwrap()
            .iter()
            .flat_map(|envelope| &envelope.items)
            .filter_map(|item| match item {
                EnvelopeItem::Event(event) if event.ty == EventType::Transaction => {
                    Some(event.clone())
                }
                _ => None,
            })
            .collect()
    }

    #[test]
    fn root_finish_emits_one_transaction_event() {
        let (client, transport) = traced_client(|_| {});
        let txn = start_transaction(
            Some(client),
            None,
            TransactionContext::new("GET /users", "http.server"),
        );
        let child = txn.start_child("db.query", "SELECT 1");
        child.finish();
        txn.finish();

        let events = transaction_events(&transport);
        assert_eq!(events.len(), 1);
        let event = &events[0];
        assert_eq!(event.transaction, "GET /users");
        assert_eq!(event.spans.len(), 1);
        assert_eq!(event.spans[0].op, "db.query");
        assert_eq!(event.contexts["trace"]["op"], "http.server");
        assert!(event.start_timestamp.is_some());
        assert!(event.timestamp.is_some());
    }

    #[test]
    fn concurrent_finishes_emit_exactly_once() {
        let (client, transport) = traced_client(|_| {});
        let txn = start_transaction(
            Some(client),
            None,
            TransactionContext::new("racy", "task"),
        );
        let mut handles = Vec::new();
        for _ in 0..8 {
            let txn = Arc::clone(&txn);
            handles.push(std::thread::spawn(move || txn.finish()));
        }
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(transaction_events(&transport).len(), 1);
    }

    #[test]
    fn unfinished_children_inherit_root_end() {
        let (client, transport) = traced_client(|_| {});
        let txn = start_transaction(
            Some(client),
            None,
            TransactionContext::new("partial", "task"),
        );
        let _never_finished = txn.start_child("slow", "still running");
        txn.finish();

        let events = transaction_events(&transport);
        assert_eq!(events[0].spans.len(), 1);
        assert_eq!(events[0].spans[0].timestamp, events[0].timestamp);
    }

    #[test]
    fn recorder_cap_drops_excess_spans() {
        let (client, transport) = traced_client(|options| options.max_spans = 3);
        let txn = start_transaction(
            Some(client),
            None,
            TransactionContext::new("capped", "task"),
        );
        for i in 0..10 {
            let child = txn.start_child("op", format!("child-{i}"));
            child.finish();
        }
        // Root plus two children fit under the cap of three.
        assert_eq!(txn.recorded_span_count(), 3);
        txn.finish();
        assert_eq!(transaction_events(&transport)[0].spans.len(), 2);
    }

    #[test]
    fn unsampled_transaction_emits_nothing() {
        let (client, transport) = traced_client(|options| {
            options.traces_sample_rate = 0.0;
        });
        let txn = start_transaction(
            Some(client),
            None,
            TransactionContext::new("quiet", "task"),
        );
        assert!(!txn.is_sampled());
        txn.finish();
        assert!(transaction_events(&transport).is_empty());
    }

    #[test]
    fn tracing_disabled_means_unsampled() {
        let (client, _transport) = traced_client(|options| {
            options.enable_tracing = false;
        });
        let txn = start_transaction(
            Some(client),
            None,
            TransactionContext::new("gated", "task"),
        );
        assert!(!txn.is_sampled());
    }

    #[test]
    fn explicit_sampled_overrides_sampler() {
        let (client, _transport) = traced_client(|options| {
            options.traces_sampler = Some(Arc::new(|_: &SamplingContext| 0.0));
        });
        let mut ctx = TransactionContext::new("forced", "task");
        ctx.sampled = Some(true);
        let txn = start_transaction(Some(client), None, ctx);
        assert!(txn.is_sampled());
    }

    #[test]
    fn sampler_overrides_parent_decision() {
        let (client, _transport) = traced_client(|options| {
            options.traces_sampler = Some(Arc::new(|ctx: &SamplingContext| {
                assert_eq!(ctx.parent_sampled, Some(true));
                0.0
            }));
        });
        let mut ctx = TransactionContext::new("sampled-away", "task");
        ctx.parent_sampled = Some(true);
        let txn = start_transaction(Some(client), None, ctx);
        assert!(!txn.is_sampled());
    }

    #[test]
    fn parent_decision_inherited_without_sampler() {
        let (client, _transport) = traced_client(|options| {
            options.traces_sample_rate = 0.0;
        });
        let mut ctx = TransactionContext::new("inherited", "task");
        ctx.parent_sampled = Some(true);
        let txn = start_transaction(Some(client), None, ctx);
        assert!(txn.is_sampled());
    }

    #[test]
    fn continue_from_headers_roundtrip() {
        let ctx = TransactionContext::continue_from_headers(
            "downstream",
            "rpc",
            Some("bc6d53f15eb88f4320054569b8c553d4-b72fa28504b07285-1"),
            Some("vendor=keep"),
        );
        assert_eq!(
            ctx.trace_id.unwrap().to_string(),
            "bc6d53f15eb88f4320054569b8c553d4"
        );
        assert_eq!(ctx.parent_sampled, Some(true));
        assert_eq!(ctx.third_party_baggage, ["vendor=keep"]);

        let (client, _transport) = traced_client(|_| {});
        let txn = start_transaction(Some(client), None, ctx);
        assert!(txn.is_sampled());
        assert!(
            txn.to_trace()
                .starts_with("bc6d53f15eb88f4320054569b8c553d4-")
        );
        let baggage = txn.to_baggage();
        assert!(baggage.contains("vendor=keep"));
        assert!(
            baggage.contains("sentry-trace_id=bc6d53f15eb88f4320054569b8c553d4"),
            "baggage was {baggage}"
        );
        assert!(baggage.contains("sentry-sampled=true"));
    }

    #[test]
    fn dsc_is_frozen_at_start() {
        let (client, _transport) = traced_client(|options| {
            options.release = "1.0.0".into();
        });
        let txn = start_transaction(
            Some(client),
            None,
            TransactionContext::new("frozen", "task"),
        );
        let dsc = txn.dynamic_sampling_context().unwrap();
        assert!(dsc.is_frozen());
        assert_eq!(dsc.get("release"), Some("1.0.0"));
        assert_eq!(dsc.get("public_key"), Some("public"));
        assert_eq!(dsc.get("transaction"), Some("frozen"));
        assert_eq!(dsc.get("sampled"), Some("true"));
    }

    #[test]
    fn url_sourced_names_stay_out_of_dsc() {
        let (client, _transport) = traced_client(|_| {});
        let mut ctx = TransactionContext::new("https://example.com/private?q=1", "http.server");
        ctx.source = TransactionSource::Url;
        let txn = start_transaction(Some(client), None, ctx);
        assert_eq!(
            txn.dynamic_sampling_context().unwrap().get("transaction"),
            None
        );
    }

    #[test]
    fn finish_at_respects_explicit_end() {
        let (client, transport) = traced_client(|_| {});
        let txn = start_transaction(
            Some(client),
            None,
            TransactionContext::new("timed", "task"),
        );
        let end = Utc::now() + chrono::Duration::seconds(5);
        txn.finish_at(end);
        assert_eq!(transaction_events(&transport)[0].timestamp, Some(end));
    }
}
