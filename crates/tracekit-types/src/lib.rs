// SPDX-License-Identifier: MIT OR Apache-2.0
#![doc = include_str!("../README.md")]
//! tracekit-types
#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod category;
pub mod dsn;
pub mod envelope;
pub mod event;
pub mod ids;
pub mod trace;

pub use category::DataCategory;
pub use dsn::{Dsn, DsnErrorKind, DsnParseError, Scheme};
pub use envelope::{
    Envelope, EnvelopeError, EnvelopeHeader, EnvelopeItem, ENVELOPE_CONTENT_TYPE,
};
pub use event::{
    Attachment, AttributeValue, Breadcrumb, CheckIn, CheckInStatus, ClientReport, Context,
    DebugMeta, DiscardReason, DiscardedEvent, Event, EventType, Exception, Frame, Level, Log,
    LogLevel, Mechanism, Metric, Request, Sdk, SdkPackage, SpanData, SpanStatus, Stacktrace,
    TransactionInfo, TransactionSource, User,
};
pub use ids::{EventId, ParseIdError, SpanId, TraceId};
pub use trace::{Baggage, DynamicSamplingContext, SentryTrace, BAGGAGE_PREFIX};
