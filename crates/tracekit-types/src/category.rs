// SPDX-License-Identifier: MIT OR Apache-2.0
//! Data categories used for rate limiting and client reports.

use std::fmt;

use serde::{Deserialize, Serialize};

/// The billing/rate-limit category of an outgoing item.
///
/// `Default` is the wildcard: a deadline recorded against it suppresses every
/// category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataCategory {
    /// Error-like events.
    Error,
    /// Transaction (trace) events.
    Transaction,
    /// Batched structured logs.
    Log,
    /// Batched trace metrics.
    MetricBucket,
    /// Monitor check-ins.
    Monitor,
    /// Attachments.
    Attachment,
    /// Wildcard applying to all categories.
    Default,
}

impl DataCategory {
    /// All concrete (non-wildcard) categories.
    pub const ALL: [DataCategory; 6] = [
        DataCategory::Error,
        DataCategory::Transaction,
        DataCategory::Log,
        DataCategory::MetricBucket,
        DataCategory::Monitor,
        DataCategory::Attachment,
    ];

    /// Stable wire name of the category.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            DataCategory::Error => "error",
            DataCategory::Transaction => "transaction",
            DataCategory::Log => "log",
            DataCategory::MetricBucket => "metric_bucket",
            DataCategory::Monitor => "monitor",
            DataCategory::Attachment => "attachment",
            DataCategory::Default => "default",
        }
    }

    /// Parse a wire name. Unknown names yield `None` so callers can skip
    /// categories added by newer backends.
    #[must_use]
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "error" => Some(DataCategory::Error),
            "transaction" => Some(DataCategory::Transaction),
            "log" => Some(DataCategory::Log),
            "metric_bucket" => Some(DataCategory::MetricBucket),
            "monitor" => Some(DataCategory::Monitor),
            "attachment" => Some(DataCategory::Attachment),
            "default" | "" => Some(DataCategory::Default),
            _ => None,
        }
    }
}

impl fmt::Display for DataCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
