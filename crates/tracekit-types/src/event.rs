// SPDX-License-Identifier: MIT OR Apache-2.0
//! The event data model.
//!
//! A single [`Event`] type carries every unit of data shipped to the backend;
//! the [`EventType`] discriminator selects between error-like events,
//! transactions, monitor check-ins, and batched logs. Serialization follows
//! the ingestion wire contract: optional fields are omitted, maps are
//! deterministic, timestamps are RFC3339 UTC.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::ids::{EventId, SpanId, TraceId};

/// A context map attached to an event under a named key.
pub type Context = serde_json::Map<String, Value>;

// ---------------------------------------------------------------------------
// Level
// ---------------------------------------------------------------------------

/// Severity of an event or breadcrumb.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Level {
    /// Fine-grained diagnostic detail.
    Debug,
    /// Informational; the default when a caller left the level unset.
    #[default]
    Info,
    /// Something unexpected but recoverable.
    Warning,
    /// A handled error.
    Error,
    /// The process cannot continue.
    Fatal,
}

// ---------------------------------------------------------------------------
// EventType
// ---------------------------------------------------------------------------

/// Discriminator selecting the event variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum EventType {
    /// Error-like event; serializes as the empty string.
    #[default]
    #[serde(rename = "")]
    Error,
    /// A completed distributed-trace transaction.
    #[serde(rename = "transaction")]
    Transaction,
    /// A cron/monitor check-in.
    #[serde(rename = "check_in")]
    CheckIn,
    /// A batch of structured logs.
    #[serde(rename = "log")]
    Log,
}

impl EventType {
    /// Whether this is the error-like default variant.
    #[must_use]
    pub fn is_error(&self) -> bool {
        matches!(self, EventType::Error)
    }
}

// ---------------------------------------------------------------------------
// SDK metadata
// ---------------------------------------------------------------------------

/// Identity of the SDK build that produced an event.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Sdk {
    /// SDK name, e.g. `"tracekit.rust"`.
    pub name: String,
    /// SDK version.
    pub version: String,
    /// Names of installed integrations, sorted.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub integrations: Vec<String>,
    /// Packages bundled into this SDK build.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub packages: Vec<SdkPackage>,
}

/// One package entry in [`Sdk::packages`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SdkPackage {
    /// Package name.
    pub name: String,
    /// Package version.
    pub version: String,
}

// ---------------------------------------------------------------------------
// User / Request
// ---------------------------------------------------------------------------

/// The user associated with an event.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct User {
    /// Application-level user id.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// Email address.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    /// IP address, or `"{{auto}}"` to let the backend infer it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ip_address: Option<String>,
    /// Username.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    /// Display name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Sampling segment the user belongs to.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub segment: Option<String>,
    /// Additional key-value data.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub data: BTreeMap<String, String>,
}

impl User {
    /// Whether no field is set.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self == &User::default()
    }
}

/// The inbound HTTP request an event happened in, if any.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Request {
    /// Full request URL.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub url: String,
    /// HTTP method.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub method: String,
    /// Request body, if captured.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub data: String,
    /// Raw query string.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub query_string: String,
    /// Cookie header value.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub cookies: String,
    /// Selected request headers.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub headers: BTreeMap<String, String>,
    /// Server environment (remote address and the like).
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub env: BTreeMap<String, String>,
}

// ---------------------------------------------------------------------------
// Breadcrumbs
// ---------------------------------------------------------------------------

/// A trail entry recorded before an event.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Breadcrumb {
    /// Breadcrumb type, e.g. `"default"`, `"http"`, `"navigation"`.
    #[serde(rename = "type", default, skip_serializing_if = "String::is_empty")]
    pub ty: String,
    /// Dotted category, e.g. `"auth.login"`.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub category: String,
    /// Human-readable message.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub message: String,
    /// Arbitrary structured payload.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub data: BTreeMap<String, Value>,
    /// Severity.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub level: Option<Level>,
    /// When the breadcrumb happened; filled in at record time if unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
}

// ---------------------------------------------------------------------------
// Exceptions
// ---------------------------------------------------------------------------

/// Metadata describing how an exception relates to its cause chain.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Mechanism {
    /// `"generic"` for the chain root, `"chained"` for linked causes.
    #[serde(rename = "type", default, skip_serializing_if = "String::is_empty")]
    pub ty: String,
    /// How the parent exposed this cause: `"cause"` for single links,
    /// `"errors[i]"` for aggregate members, empty for the root.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub source: String,
    /// Index of this node in traversal order.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exception_id: Option<usize>,
    /// Traversal index of the parent node.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<usize>,
    /// Whether this node exposes further causes.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub is_exception_group: bool,
}

/// One exception in an event's cause chain.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Exception {
    /// Exception type name.
    #[serde(rename = "type", default, skip_serializing_if = "String::is_empty")]
    pub ty: String,
    /// Rendered exception message.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub value: String,
    /// Module/crate the type lives in.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub module: String,
    /// Thread the exception was observed on.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thread_id: Option<String>,
    /// Pre-built stack frames, innermost last.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stacktrace: Option<Stacktrace>,
    /// Cause-chain metadata; omitted for single exceptions.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mechanism: Option<Mechanism>,
}

/// A list of stack frames, oldest call first.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Stacktrace {
    /// The frames.
    pub frames: Vec<Frame>,
}

/// A single stack frame.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Frame {
    /// Function name.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub function: String,
    /// Module path.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub module: String,
    /// Source file name.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub filename: String,
    /// Absolute source path.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub abs_path: String,
    /// 1-based line number.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lineno: Option<u32>,
    /// 1-based column number.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub colno: Option<u32>,
    /// Source lines before the faulting line.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub pre_context: Vec<String>,
    /// The faulting source line.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context_line: Option<String>,
    /// Source lines after the faulting line.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub post_context: Vec<String>,
    /// Whether the frame is in application (vs dependency) code.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub in_app: Option<bool>,
}

// ---------------------------------------------------------------------------
// Attachments
// ---------------------------------------------------------------------------

/// A binary attachment shipped alongside an event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attachment {
    /// File name presented to the backend.
    pub filename: String,
    /// MIME type; `application/octet-stream` when unset.
    pub content_type: Option<String>,
    /// Raw bytes, written into the envelope verbatim.
    pub payload: Vec<u8>,
}

// ---------------------------------------------------------------------------
// Transactions and spans
// ---------------------------------------------------------------------------

/// Where a transaction name came from. Determines whether the name is safe
/// to use for sampling decisions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum TransactionSource {
    /// Explicitly set by the caller; the default.
    #[default]
    Custom,
    /// Raw URL; potentially high-cardinality.
    Url,
    /// Router pattern.
    Route,
    /// Named view.
    View,
    /// UI component.
    Component,
    /// Background task name.
    Task,
}

impl TransactionSource {
    /// Parse a wire name; anything outside the closed set becomes `Custom`.
    #[must_use]
    pub fn from_str_lossy(s: &str) -> Self {
        match s {
            "url" => TransactionSource::Url,
            "route" => TransactionSource::Route,
            "view" => TransactionSource::View,
            "component" => TransactionSource::Component,
            "task" => TransactionSource::Task,
            _ => TransactionSource::Custom,
        }
    }
}

/// Outcome status of a span.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SpanStatus {
    /// Completed successfully.
    Ok,
    /// Cancelled by the caller.
    Cancelled,
    /// Unknown outcome.
    Unknown,
    /// Caller supplied an invalid argument.
    InvalidArgument,
    /// Deadline expired.
    DeadlineExceeded,
    /// Requested entity not found.
    NotFound,
    /// Entity already exists.
    AlreadyExists,
    /// Permission denied.
    PermissionDenied,
    /// Quota or rate limit exhausted.
    ResourceExhausted,
    /// Precondition failed.
    FailedPrecondition,
    /// Aborted, e.g. by a conflict.
    Aborted,
    /// Value out of range.
    OutOfRange,
    /// Operation not implemented.
    Unimplemented,
    /// Internal error.
    InternalError,
    /// Service unavailable.
    Unavailable,
    /// Unrecoverable data loss.
    DataLoss,
    /// Missing authentication.
    Unauthenticated,
}

/// Wire representation of a span inside a transaction event.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct SpanData {
    /// Trace this span belongs to.
    pub trace_id: TraceId,
    /// This span's id.
    pub span_id: SpanId,
    /// Parent span id; absent for the transaction root.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_span_id: Option<SpanId>,
    /// Short operation name, e.g. `"db.query"`.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub op: String,
    /// Longer description, e.g. the query text.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,
    /// Outcome status.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<SpanStatus>,
    /// Flat string tags.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub tags: BTreeMap<String, String>,
    /// Arbitrary structured data.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub data: BTreeMap<String, Value>,
    /// Instrumentation origin, e.g. `"manual"`.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub origin: String,
    /// When the span started.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_timestamp: Option<DateTime<Utc>>,
    /// When the span finished; unset while in flight.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
}

// ---------------------------------------------------------------------------
// Monitor check-ins
// ---------------------------------------------------------------------------

/// Status of a monitor check-in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckInStatus {
    /// Job started.
    InProgress,
    /// Job finished successfully.
    Ok,
    /// Job failed.
    Error,
}

/// A cron/monitor check-in.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckIn {
    /// Unique id of this check-in; reused to close an `InProgress` entry.
    pub check_in_id: EventId,
    /// Slug identifying the monitor.
    pub monitor_slug: String,
    /// Reported status.
    pub status: CheckInStatus,
    /// Job duration in seconds, reported on completion.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<f64>,
}

// ---------------------------------------------------------------------------
// Structured logs
// ---------------------------------------------------------------------------

/// Severity of a structured log record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    /// Finest level.
    Trace,
    /// Debug level.
    Debug,
    /// Informational.
    Info,
    /// Warning.
    Warn,
    /// Error.
    Error,
    /// Fatal.
    Fatal,
}

impl LogLevel {
    /// Default severity number of the level (OpenTelemetry scale).
    #[must_use]
    pub fn severity_number(self) -> i64 {
        match self {
            LogLevel::Trace => 1,
            LogLevel::Debug => 5,
            LogLevel::Info => 9,
            LogLevel::Warn => 13,
            LogLevel::Error => 17,
            LogLevel::Fatal => 21,
        }
    }
}

/// A typed attribute value on a log record or metric.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttributeValue {
    /// The value itself.
    pub value: Value,
    /// Wire type tag: `string`, `boolean`, `integer`, or `double`.
    #[serde(rename = "type")]
    pub ty: String,
}

impl AttributeValue {
    /// Wrap a JSON value, inferring the wire type tag. Values that have no
    /// scalar tag (arrays, objects, null) are stringified.
    #[must_use]
    pub fn infer(value: Value) -> Self {
        let ty = match &value {
            Value::Bool(_) => "boolean",
            Value::Number(n) if n.is_i64() || n.is_u64() => "integer",
            Value::Number(_) => "double",
            Value::String(_) => "string",
            _ => {
                return AttributeValue {
                    value: Value::String(value.to_string()),
                    ty: "string".into(),
                };
            }
        };
        AttributeValue {
            value,
            ty: ty.into(),
        }
    }
}

impl From<&str> for AttributeValue {
    fn from(v: &str) -> Self {
        AttributeValue::infer(Value::String(v.to_owned()))
    }
}

impl From<String> for AttributeValue {
    fn from(v: String) -> Self {
        AttributeValue::infer(Value::String(v))
    }
}

impl From<i64> for AttributeValue {
    fn from(v: i64) -> Self {
        AttributeValue::infer(Value::from(v))
    }
}

impl From<f64> for AttributeValue {
    fn from(v: f64) -> Self {
        AttributeValue::infer(Value::from(v))
    }
}

impl From<bool> for AttributeValue {
    fn from(v: bool) -> Self {
        AttributeValue::infer(Value::Bool(v))
    }
}

/// One structured log record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Log {
    /// When the record was emitted, as float unix seconds.
    #[serde(with = "ts_seconds_float")]
    pub timestamp: DateTime<Utc>,
    /// Trace the record belongs to.
    pub trace_id: TraceId,
    /// Severity name.
    pub level: LogLevel,
    /// Numeric severity; defaults from the level when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub severity_number: Option<i64>,
    /// The log message body.
    pub body: String,
    /// Typed attributes.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub attributes: BTreeMap<String, AttributeValue>,
}

/// A single trace metric data point.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Metric {
    /// When the point was recorded, as float unix seconds.
    #[serde(with = "ts_seconds_float")]
    pub timestamp: DateTime<Utc>,
    /// Trace the point belongs to.
    pub trace_id: TraceId,
    /// Span active when the point was recorded.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub span_id: Option<SpanId>,
    /// Metric name.
    pub name: String,
    /// Metric kind: `counter`, `gauge`, or `distribution`.
    #[serde(rename = "type")]
    pub ty: String,
    /// The recorded value.
    pub value: f64,
    /// Optional unit, e.g. `"millisecond"`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unit: Option<String>,
    /// Typed attributes.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub attributes: BTreeMap<String, AttributeValue>,
}

/// Serde adapter: `DateTime<Utc>` as float unix seconds.
mod ts_seconds_float {
    use chrono::{DateTime, TimeZone, Utc};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(dt: &DateTime<Utc>, ser: S) -> Result<S::Ok, S::Error> {
        let secs = dt.timestamp() as f64 + f64::from(dt.timestamp_subsec_micros()) / 1e6;
        ser.serialize_f64(secs)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(de: D) -> Result<DateTime<Utc>, D::Error> {
        let secs = f64::deserialize(de)?;
        let whole = secs.trunc() as i64;
        let nanos = ((secs - secs.trunc()) * 1e9) as u32;
        Utc.timestamp_opt(whole, nanos)
            .single()
            .ok_or_else(|| serde::de::Error::custom("timestamp out of range"))
    }
}

// ---------------------------------------------------------------------------
// Client reports
// ---------------------------------------------------------------------------

/// Why an item was dropped locally instead of being sent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiscardReason {
    /// Random sampling rejected the event.
    SampleRate,
    /// A `before_send` callback returned nothing.
    BeforeSend,
    /// A scope event processor returned nothing.
    EventProcessor,
    /// The rate-limit ledger suppressed the category.
    RatelimitBackoff,
    /// The transport queue was full.
    QueueOverflow,
    /// A batch processor's buffer was full.
    BufferFull,
    /// The HTTP round-trip failed.
    NetworkError,
    /// The backend answered with a non-success status.
    SendError,
}

/// One aggregated drop entry inside a [`ClientReport`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscardedEvent {
    /// Why the items were dropped.
    pub reason: DiscardReason,
    /// Category of the dropped items.
    pub category: crate::DataCategory,
    /// How many were dropped.
    pub quantity: u32,
}

/// Aggregated counts of locally dropped items, shipped as its own envelope
/// item alongside later events.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClientReport {
    /// When the report was assembled.
    pub timestamp: DateTime<Utc>,
    /// The aggregated drop entries.
    pub discarded_events: Vec<DiscardedEvent>,
}

// ---------------------------------------------------------------------------
// Event
// ---------------------------------------------------------------------------

/// The unit of data sent to the backend.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Event {
    /// Unique id; always set by the time the event is captured.
    pub event_id: EventId,
    /// Discriminator; omitted on the wire for error-like events.
    #[serde(rename = "type", default, skip_serializing_if = "EventType::is_error")]
    pub ty: EventType,
    /// When the event happened; filled in at capture time if unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
    /// Transaction start; transactions only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_timestamp: Option<DateTime<Utc>>,
    /// Severity; defaults to info at capture time.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub level: Option<Level>,
    /// Source platform; always `"rust"` for this SDK.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub platform: String,
    /// Log message for message events.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub message: String,
    /// Name of the logger that produced the event.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub logger: String,
    /// Transaction (route/task) name the event belongs to.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub transaction: String,
    /// Where the transaction name came from.
    #[serde(
        rename = "transaction_info",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub transaction_info: Option<TransactionInfo>,
    /// SDK identity.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sdk: Option<Sdk>,
    /// Release the host application was built from.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub release: String,
    /// Distribution of the release.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub dist: String,
    /// Deployment environment, e.g. `"production"`.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub environment: String,
    /// Host name of the reporting server.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub server_name: String,
    /// Flat string tags.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub tags: BTreeMap<String, String>,
    /// Arbitrary extra data.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub extra: BTreeMap<String, Value>,
    /// Named context maps.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub contexts: BTreeMap<String, Context>,
    /// Grouping fingerprint.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub fingerprint: Vec<String>,
    /// Breadcrumb trail, oldest first.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub breadcrumbs: Vec<Breadcrumb>,
    /// Exception cause chain, root cause first.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub exception: Vec<Exception>,
    /// The user involved.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<User>,
    /// The inbound HTTP request.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request: Option<Request>,
    /// Loaded modules/dependencies and their versions.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub modules: BTreeMap<String, String>,
    /// Debug images metadata.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub debug_meta: Option<DebugMeta>,
    /// Finished child spans; transactions only.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub spans: Vec<SpanData>,
    /// Monitor check-in payload; check-in events only.
    #[serde(flatten)]
    pub check_in: Option<CheckIn>,

    /// Attachments travelling with the event. Serialized as separate
    /// envelope items, never as part of the event JSON.
    #[serde(skip)]
    pub attachments: Vec<Attachment>,
    /// Log records carried by a `log` batch event.
    #[serde(skip)]
    pub logs: Vec<Log>,
    /// Metric points carried by a `trace_metric` batch event.
    #[serde(skip)]
    pub metrics: Vec<Metric>,
    /// Dynamic sampling context snapshot, propagated in the envelope header.
    #[serde(skip)]
    pub dynamic_sampling_context: Option<crate::DynamicSamplingContext>,
}

/// Wrapper for the transaction name source on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionInfo {
    /// Where the transaction name came from.
    pub source: TransactionSource,
}

/// Debug images metadata attached to an event.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct DebugMeta {
    /// SDK build info.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sdk_info: Option<Value>,
    /// Loaded debug images.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub images: Vec<Value>,
}

impl Event {
    /// A fresh empty error-like event. Identifier and timestamp are left
    /// unset; capture fills them in.
    #[must_use]
    pub fn new() -> Self {
        Event::default()
    }

    /// A message event at the given level.
    #[must_use]
    pub fn from_message(message: impl Into<String>, level: Level) -> Self {
        Event {
            message: message.into(),
            level: Some(level),
            ..Event::default()
        }
    }

    /// The rate-limit category this event counts against.
    #[must_use]
    pub fn category(&self) -> crate::DataCategory {
        match self.ty {
            EventType::Error => crate::DataCategory::Error,
            EventType::Transaction => crate::DataCategory::Transaction,
            EventType::CheckIn => crate::DataCategory::Monitor,
            EventType::Log => crate::DataCategory::Log,
        }
    }
}
