// SPDX-License-Identifier: MIT OR Apache-2.0
//! Mutable per-call-site context.
//!
//! A [`Scope`] holds everything that should travel with events captured at a
//! call site: tags, extras, contexts, the user, breadcrumbs, attachments,
//! event processors, the active span, and the propagation context used for
//! trace continuity when no span is running. All operations are
//! thread-safe behind a single internal mutex and never block on I/O.

use std::collections::{BTreeMap, VecDeque};
use std::sync::{Arc, Mutex};

use chrono::Utc;
use serde_json::Value;
use tracekit_types::{
    Attachment, Breadcrumb, Context, DynamicSamplingContext, Event, Level, Request, SpanId,
    Stacktrace, TraceId, User,
};

use crate::options::DEFAULT_MAX_BREADCRUMBS;
use crate::span::Span;

/// Side-channel data accompanying an event through capture.
#[derive(Default)]
pub struct EventHint {
    /// Pre-built stack frames collected by the caller.
    pub stacktrace: Option<Stacktrace>,
    /// Attachments to ship with this event only.
    pub attachments: Vec<Attachment>,
}

/// An ordered scope-level event transform; returning `None` drops the event.
pub type EventProcessor = Arc<dyn Fn(Event, &EventHint) -> Option<Event> + Send + Sync>;

/// Trace continuity state used when events are captured outside a span.
#[derive(Debug, Clone)]
pub struct PropagationContext {
    /// Trace id events outside transactions are associated with.
    pub trace_id: TraceId,
    /// Span id representing this execution context.
    pub span_id: SpanId,
    /// Parent span id inherited from inbound headers.
    pub parent_span_id: Option<SpanId>,
    /// Frozen sampling context inherited from inbound baggage.
    pub dsc: Option<DynamicSamplingContext>,
}

impl Default for PropagationContext {
    fn default() -> Self {
        PropagationContext {
            trace_id: TraceId::new(),
            span_id: SpanId::new(),
            parent_span_id: None,
            dsc: None,
        }
    }
}

#[derive(Default, Clone)]
struct ScopeInner {
    level: Option<Level>,
    transaction: String,
    user: Option<User>,
    request: Option<Request>,
    fingerprint: Vec<String>,
    tags: BTreeMap<String, String>,
    extra: BTreeMap<String, Value>,
    contexts: BTreeMap<String, Context>,
    breadcrumbs: VecDeque<Breadcrumb>,
    attachments: Vec<Attachment>,
    processors: Vec<EventProcessor>,
    span: Option<Arc<Span>>,
    propagation: PropagationContext,
}

/// Mutable context attached to a call site.
#[derive(Default)]
pub struct Scope {
    inner: Mutex<ScopeInner>,
}

impl Clone for Scope {
    fn clone(&self) -> Self {
        let snapshot = self.inner.lock().expect("scope lock poisoned").clone();
        Scope {
            inner: Mutex::new(snapshot),
        }
    }
}

impl Scope {
    /// A fresh, empty scope with a new propagation context.
    #[must_use]
    pub fn new() -> Self {
        Scope::default()
    }

    fn with<R>(&self, f: impl FnOnce(&mut ScopeInner) -> R) -> R {
        let mut inner = self.inner.lock().expect("scope lock poisoned");
        f(&mut inner)
    }

    // -- simple setters ---------------------------------------------------

    /// Override the level of every event captured through this scope.
    pub fn set_level(&self, level: Option<Level>) {
        self.with(|s| s.level = level);
    }

    /// Set the transaction (route/task) name.
    pub fn set_transaction(&self, name: impl Into<String>) {
        self.with(|s| s.transaction = name.into());
    }

    /// The current transaction name, if any.
    #[must_use]
    pub fn transaction(&self) -> Option<String> {
        self.with(|s| {
            if s.transaction.is_empty() {
                None
            } else {
                Some(s.transaction.clone())
            }
        })
    }

    /// Set the user.
    pub fn set_user(&self, user: Option<User>) {
        self.with(|s| s.user = user);
    }

    /// Set the inbound request.
    pub fn set_request(&self, request: Option<Request>) {
        self.with(|s| s.request = request);
    }

    /// Set the grouping fingerprint.
    pub fn set_fingerprint(&self, fingerprint: Vec<String>) {
        self.with(|s| s.fingerprint = fingerprint);
    }

    // -- tags -------------------------------------------------------------

    /// Set one tag.
    pub fn set_tag(&self, key: impl Into<String>, value: impl Into<String>) {
        self.with(|s| {
            s.tags.insert(key.into(), value.into());
        });
    }

    /// Merge several tags by key.
    pub fn set_tags(&self, tags: impl IntoIterator<Item = (String, String)>) {
        self.with(|s| s.tags.extend(tags));
    }

    /// Remove one tag.
    pub fn remove_tag(&self, key: &str) {
        self.with(|s| {
            s.tags.remove(key);
        });
    }

    /// Drop all tags.
    pub fn clear_tags(&self) {
        self.with(|s| s.tags.clear());
    }

    // -- extras -----------------------------------------------------------

    /// Set one extra value.
    pub fn set_extra(&self, key: impl Into<String>, value: Value) {
        self.with(|s| {
            s.extra.insert(key.into(), value);
        });
    }

    /// Merge several extras by key.
    pub fn set_extras(&self, extras: impl IntoIterator<Item = (String, Value)>) {
        self.with(|s| s.extra.extend(extras));
    }

    /// Remove one extra.
    pub fn remove_extra(&self, key: &str) {
        self.with(|s| {
            s.extra.remove(key);
        });
    }

    /// Drop all extras.
    pub fn clear_extras(&self) {
        self.with(|s| s.extra.clear());
    }

    // -- contexts ---------------------------------------------------------

    /// Set one named context.
    pub fn set_context(&self, key: impl Into<String>, context: Context) {
        self.with(|s| {
            s.contexts.insert(key.into(), context);
        });
    }

    /// Remove one named context.
    pub fn remove_context(&self, key: &str) {
        self.with(|s| {
            s.contexts.remove(key);
        });
    }

    // -- breadcrumbs ------------------------------------------------------

    /// Record a breadcrumb, stamping its timestamp if unset and dropping the
    /// oldest entry once `limit` is exceeded.
    pub fn add_breadcrumb(&self, mut breadcrumb: Breadcrumb, limit: usize) {
        if breadcrumb.timestamp.is_none() {
            breadcrumb.timestamp = Some(Utc::now());
        }
        self.with(|s| {
            s.breadcrumbs.push_back(breadcrumb);
            while s.breadcrumbs.len() > limit {
                s.breadcrumbs.pop_front();
            }
        });
    }

    /// Drop all breadcrumbs.
    pub fn clear_breadcrumbs(&self) {
        self.with(|s| s.breadcrumbs.clear());
    }

    /// Number of breadcrumbs currently held.
    #[must_use]
    pub fn breadcrumb_count(&self) -> usize {
        self.with(|s| s.breadcrumbs.len())
    }

    // -- attachments ------------------------------------------------------

    /// Attach a file to every event captured through this scope.
    pub fn add_attachment(&self, attachment: Attachment) {
        self.with(|s| s.attachments.push(attachment));
    }

    /// Drop all attachments.
    pub fn clear_attachments(&self) {
        self.with(|s| s.attachments.clear());
    }

    // -- processors / span / propagation ----------------------------------

    /// Append an event processor. Processors run in insertion order.
    pub fn add_event_processor(&self, processor: EventProcessor) {
        self.with(|s| s.processors.push(processor));
    }

    /// Bind the active span.
    pub fn set_span(&self, span: Option<Arc<Span>>) {
        self.with(|s| s.span = span);
    }

    /// The active span, if any.
    #[must_use]
    pub fn span(&self) -> Option<Arc<Span>> {
        self.with(|s| s.span.clone())
    }

    /// Replace the propagation context.
    pub fn set_propagation_context(&self, propagation: PropagationContext) {
        self.with(|s| s.propagation = propagation);
    }

    /// Snapshot of the propagation context.
    #[must_use]
    pub fn propagation_context(&self) -> PropagationContext {
        self.with(|s| s.propagation.clone())
    }

    /// The user currently set, if any.
    #[must_use]
    pub fn user(&self) -> Option<User> {
        self.with(|s| s.user.clone())
    }

    /// Reset the whole scope, including a fresh propagation context.
    pub fn clear(&self) {
        self.with(|s| *s = ScopeInner::default());
    }

    // -- application ------------------------------------------------------

    /// Fold this scope into `event`.
    ///
    /// Event-level values win over scope-level values; collections
    /// concatenate with the event's entries first. Event processors run
    /// last, in order, and any of them returning `None` drops the event.
    #[must_use]
    pub fn apply_to_event(
        &self,
        mut event: Event,
        hint: &EventHint,
        breadcrumb_limit: Option<usize>,
    ) -> Option<Event> {
        let snapshot = self.inner.lock().expect("scope lock poisoned").clone();

        event.breadcrumbs.extend(snapshot.breadcrumbs.iter().cloned());
        let limit = breadcrumb_limit.unwrap_or(DEFAULT_MAX_BREADCRUMBS);
        if event.breadcrumbs.len() > limit {
            let excess = event.breadcrumbs.len() - limit;
            event.breadcrumbs.drain(..excess);
        }

        event.attachments.extend(snapshot.attachments.iter().cloned());

        for (key, value) in &snapshot.tags {
            event.tags.entry(key.clone()).or_insert_with(|| value.clone());
        }
        for (key, value) in &snapshot.contexts {
            event
                .contexts
                .entry(key.clone())
                .or_insert_with(|| value.clone());
        }
        for (key, value) in &snapshot.extra {
            event
                .extra
                .entry(key.clone())
                .or_insert_with(|| value.clone());
        }

        if event.user.as_ref().is_none_or(User::is_empty) {
            event.user = snapshot.user.clone();
        }
        if event.fingerprint.is_empty() {
            event.fingerprint = snapshot.fingerprint.clone();
        }
        if let Some(level) = snapshot.level {
            event.level = Some(level);
        }
        if event.request.is_none() {
            event.request = snapshot.request.clone();
        }
        if event.transaction.is_empty() {
            event.transaction = snapshot.transaction.clone();
        }

        // Trace continuity: events carry the active trace context, from the
        // running span when there is one, otherwise from the propagation
        // context.
        if !event.contexts.contains_key("trace") {
            let (trace_id, span_id, parent_span_id, dsc) = match &snapshot.span {
                Some(span) => (
                    span.trace_id(),
                    span.span_id(),
                    span.parent_span_id(),
                    span.dynamic_sampling_context(),
                ),
                None => (
                    snapshot.propagation.trace_id,
                    snapshot.propagation.span_id,
                    snapshot.propagation.parent_span_id,
                    snapshot.propagation.dsc.clone(),
                ),
            };
            let mut trace = Context::new();
            trace.insert("trace_id".into(), trace_id.to_string().into());
            trace.insert("span_id".into(), span_id.to_string().into());
            if let Some(parent) = parent_span_id {
                trace.insert("parent_span_id".into(), parent.to_string().into());
            }
            event.contexts.insert("trace".into(), trace);
            if event.dynamic_sampling_context.is_none() {
                event.dynamic_sampling_context = dsc;
            }
        }

        for processor in &snapshot.processors {
            event = processor(event, hint)?;
        }
        Some(event)
    }
}
