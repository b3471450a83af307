// SPDX-License-Identifier: MIT OR Apache-2.0
#![doc = include_str!("../README.md")]
//! tracekit-core
#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod batch;
pub mod client;
pub mod debug;
pub mod exception;
pub mod hub;
pub mod integrations;
pub mod logs;
pub mod metrics;
pub mod options;
pub mod report;
pub mod scope;
pub mod span;
pub mod transport;

pub use batch::{BatchConfig, BatchProcessor};
pub use client::{Client, ClientError, SDK_NAME, SDK_VERSION, sdk_user_agent};
pub use debug::DebugLogger;
pub use exception::{AggregateError, exceptions_from_error};
pub use hub::Hub;
pub use integrations::Integration;
pub use logs::Logger;
pub use metrics::Metrics;
pub use options::{
    BeforeBreadcrumbCallback, BeforeSendCallback, BeforeSendLogCallback, ClientOptions,
    TracesSampler, DEFAULT_MAX_BREADCRUMBS, DEFAULT_MAX_ERROR_DEPTH, DEFAULT_MAX_SPANS,
};
pub use report::ReportAggregator;
pub use scope::{EventHint, EventProcessor, PropagationContext, Scope};
pub use span::{SamplingContext, Span, TransactionContext, start_transaction};
pub use transport::{NoopTransport, Transport, TransportFactory};

// The wire-level data model is part of this crate's public vocabulary.
pub use tracekit_types as types;
