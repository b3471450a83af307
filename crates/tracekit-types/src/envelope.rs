// SPDX-License-Identifier: MIT OR Apache-2.0
//! The line-oriented envelope codec.
//!
//! An envelope is one POST body: a single-line JSON header, then for each
//! item a single-line JSON item header followed by the payload bytes and a
//! trailing newline. Envelopes are built just-in-time for transport and
//! never persisted; only the envelope header ever needs to be parsed back.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::category::DataCategory;
use crate::dsn::Dsn;
use crate::event::{Attachment, ClientReport, Event, EventType, Log, Metric, Sdk};
use crate::ids::EventId;

/// Content type of a serialized envelope.
pub const ENVELOPE_CONTENT_TYPE: &str = "application/x-sentry-envelope";

const LOG_CONTENT_TYPE: &str = "application/vnd.sentry.items.log+json";
const METRIC_CONTENT_TYPE: &str = "application/vnd.sentry.items.trace-metric+json";

/// Errors produced while encoding or decoding envelopes.
#[derive(Debug, thiserror::Error)]
pub enum EnvelopeError {
    /// A header or payload failed to serialize or parse.
    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),

    /// The byte stream ended before a full header line.
    #[error("truncated envelope")]
    Truncated,
}

// ---------------------------------------------------------------------------
// Header
// ---------------------------------------------------------------------------

/// The envelope header line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnvelopeHeader {
    /// Id of the primary event in the envelope, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event_id: Option<EventId>,
    /// When the envelope was assembled, RFC3339 UTC.
    pub sent_at: DateTime<Utc>,
    /// The DSN the envelope is addressed to.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dsn: Option<Dsn>,
    /// SDK identity.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sdk: Option<Sdk>,
    /// Flattened dynamic sampling context of the enclosing trace.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trace: Option<BTreeMap<String, String>>,
}

impl EnvelopeHeader {
    /// A header stamped with the current time.
    #[must_use]
    pub fn new(event_id: Option<EventId>) -> Self {
        EnvelopeHeader {
            event_id,
            sent_at: Utc::now(),
            dsn: None,
            sdk: None,
            trace: None,
        }
    }
}

// ---------------------------------------------------------------------------
// Items
// ---------------------------------------------------------------------------

/// One item inside an envelope.
#[derive(Debug, Clone, PartialEq)]
pub enum EnvelopeItem {
    /// An event; the item type on the wire follows the event's own type
    /// (`event`, `transaction`, or `check_in`).
    Event(Event),
    /// A batch of structured logs shipped as one item.
    LogBatch(Vec<Log>),
    /// A batch of trace metrics shipped as one item.
    MetricBatch(Vec<Metric>),
    /// A binary attachment.
    Attachment(Attachment),
    /// Aggregated local-drop counts.
    ClientReport(ClientReport),
}

impl EnvelopeItem {
    /// The rate-limit category this item counts against. Client reports are
    /// bookkeeping and have none.
    #[must_use]
    pub fn category(&self) -> Option<DataCategory> {
        match self {
            EnvelopeItem::Event(event) => Some(event.category()),
            EnvelopeItem::LogBatch(_) => Some(DataCategory::Log),
            EnvelopeItem::MetricBatch(_) => Some(DataCategory::MetricBucket),
            EnvelopeItem::Attachment(_) => Some(DataCategory::Attachment),
            EnvelopeItem::ClientReport(_) => None,
        }
    }

    /// How many billable units the item carries.
    #[must_use]
    pub fn quantity(&self) -> u32 {
        match self {
            EnvelopeItem::LogBatch(logs) => logs.len() as u32,
            EnvelopeItem::MetricBatch(points) => points.len() as u32,
            _ => 1,
        }
    }

    fn wire_type(&self) -> &'static str {
        match self {
            EnvelopeItem::Event(event) => match event.ty {
                EventType::Transaction => "transaction",
                EventType::CheckIn => "check_in",
                EventType::Error | EventType::Log => "event",
            },
            EnvelopeItem::LogBatch(_) => "log",
            EnvelopeItem::MetricBatch(_) => "trace_metric",
            EnvelopeItem::Attachment(_) => "attachment",
            EnvelopeItem::ClientReport(_) => "client_report",
        }
    }
}

// Item headers are serialized from dedicated structs so that field order on
// the wire is fixed.

#[derive(Serialize)]
struct LengthHeader<'a> {
    #[serde(rename = "type")]
    ty: &'a str,
    length: usize,
}

#[derive(Serialize)]
struct BatchHeader<'a> {
    #[serde(rename = "type")]
    ty: &'a str,
    item_count: usize,
    content_type: &'a str,
}

#[derive(Serialize)]
struct AttachmentHeader<'a> {
    #[serde(rename = "type")]
    ty: &'a str,
    length: usize,
    filename: &'a str,
    content_type: &'a str,
}

#[derive(Serialize)]
struct ItemPayload<'a, T> {
    items: &'a [T],
}

// ---------------------------------------------------------------------------
// Envelope
// ---------------------------------------------------------------------------

/// A header plus an ordered list of items, shipped in one POST.
#[derive(Debug, Clone, PartialEq)]
pub struct Envelope {
    /// The header line.
    pub header: EnvelopeHeader,
    /// The items, in the order they are written.
    pub items: Vec<EnvelopeItem>,
}

impl Envelope {
    /// An empty envelope with the given header.
    #[must_use]
    pub fn new(header: EnvelopeHeader) -> Self {
        Envelope {
            header,
            items: Vec::new(),
        }
    }

    /// Build an envelope around one event: the header carries the event id
    /// and the event's dynamic sampling context, and the event's attachments
    /// become trailing items.
    #[must_use]
    pub fn from_event(event: Event) -> Self {
        let mut header = EnvelopeHeader::new(Some(event.event_id));
        if let Some(dsc) = &event.dynamic_sampling_context {
            if !dsc.is_empty() {
                header.trace = Some(dsc.entries().clone());
            }
        }
        let mut envelope = Envelope::new(header);
        let attachments = event.attachments.clone();
        envelope.items.push(EnvelopeItem::Event(event));
        for attachment in attachments {
            envelope.items.push(EnvelopeItem::Attachment(attachment));
        }
        envelope
    }

    /// Append an item.
    pub fn add_item(&mut self, item: EnvelopeItem) {
        self.items.push(item);
    }

    /// Id of the primary event, if any.
    #[must_use]
    pub fn event_id(&self) -> Option<EventId> {
        self.header.event_id
    }

    /// Serialize the envelope to its byte form.
    ///
    /// # Errors
    ///
    /// Returns [`EnvelopeError::Json`] if a header or payload fails to
    /// serialize.
    pub fn to_vec(&self) -> Result<Vec<u8>, EnvelopeError> {
        let mut out = Vec::new();
        out.extend_from_slice(&serde_json::to_vec(&self.header)?);
        out.push(b'\n');

        for item in &self.items {
            match item {
                EnvelopeItem::Event(event) => {
                    let payload = serde_json::to_vec(event)?;
                    let header = LengthHeader {
                        ty: item.wire_type(),
                        length: payload.len(),
                    };
                    write_item(&mut out, &serde_json::to_vec(&header)?, &payload);
                }
                EnvelopeItem::LogBatch(logs) => {
                    let payload = serde_json::to_vec(&ItemPayload { items: logs })?;
                    let header = BatchHeader {
                        ty: "log",
                        item_count: logs.len(),
                        content_type: LOG_CONTENT_TYPE,
                    };
                    write_item(&mut out, &serde_json::to_vec(&header)?, &payload);
                }
                EnvelopeItem::MetricBatch(points) => {
                    let payload = serde_json::to_vec(&ItemPayload { items: points })?;
                    let header = BatchHeader {
                        ty: "trace_metric",
                        item_count: points.len(),
                        content_type: METRIC_CONTENT_TYPE,
                    };
                    write_item(&mut out, &serde_json::to_vec(&header)?, &payload);
                }
                EnvelopeItem::Attachment(attachment) => {
                    let header = AttachmentHeader {
                        ty: "attachment",
                        length: attachment.payload.len(),
                        filename: &attachment.filename,
                        content_type: attachment
                            .content_type
                            .as_deref()
                            .unwrap_or("application/octet-stream"),
                    };
                    write_item(&mut out, &serde_json::to_vec(&header)?, &attachment.payload);
                }
                EnvelopeItem::ClientReport(report) => {
                    let payload = serde_json::to_vec(report)?;
                    let header = LengthHeader {
                        ty: "client_report",
                        length: payload.len(),
                    };
                    write_item(&mut out, &serde_json::to_vec(&header)?, &payload);
                }
            }
        }
        Ok(out)
    }

    /// Parse just the header line of a serialized envelope.
    ///
    /// # Errors
    ///
    /// Returns [`EnvelopeError::Truncated`] when no newline-terminated first
    /// line exists, or [`EnvelopeError::Json`] when the line is not a valid
    /// header.
    pub fn parse_header(bytes: &[u8]) -> Result<EnvelopeHeader, EnvelopeError> {
        let line = bytes
            .split(|&b| b == b'\n')
            .next()
            .filter(|l| !l.is_empty())
            .ok_or(EnvelopeError::Truncated)?;
        Ok(serde_json::from_slice(line)?)
    }
}

fn write_item(out: &mut Vec<u8>, header: &[u8], payload: &[u8]) {
    out.extend_from_slice(header);
    out.push(b'\n');
    out.extend_from_slice(payload);
    out.push(b'\n');
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::Level;

    fn epoch() -> DateTime<Utc> {
        DateTime::from_timestamp(0, 0).unwrap()
    }

    #[test]
    fn error_event_envelope_layout() {
        let mut event = Event::from_message("boom", Level::Error);
        event.event_id = EventId::new();
        let id = event.event_id;

        let mut envelope = Envelope::from_event(event);
        envelope.header.sent_at = epoch();
        envelope.header.dsn = Some("http://public@example.com/sentry/1".parse().unwrap());
        envelope.header.sdk = Some(Sdk {
            name: "tracekit.rust".into(),
            version: "0.1.0".into(),
            ..Sdk::default()
        });

        let bytes = envelope.to_vec().unwrap();
        let text = String::from_utf8(bytes).unwrap();
        let lines: Vec<&str> = text.split('\n').collect();
        // header, item header, payload, trailing empty
        assert_eq!(lines.len(), 4);
        assert_eq!(lines[3], "");

        assert_eq!(
            lines[0],
            format!(
                "{{\"event_id\":\"{id}\",\"sent_at\":\"1970-01-01T00:00:00Z\",\
                 \"dsn\":\"http://public@example.com/sentry/1\",\
                 \"sdk\":{{\"name\":\"tracekit.rust\",\"version\":\"0.1.0\"}}}}"
            )
        );

        let item_header: serde_json::Value = serde_json::from_str(lines[1]).unwrap();
        assert_eq!(item_header["type"], "event");
        assert_eq!(item_header["length"], lines[2].len());
        assert!(lines[1].starts_with("{\"type\":\"event\",\"length\":"));

        let payload: serde_json::Value = serde_json::from_str(lines[2]).unwrap();
        assert_eq!(payload["message"], "boom");
    }

    #[test]
    fn log_batch_item_header_field_order() {
        let logs = vec![
            Log {
                timestamp: epoch(),
                trace_id: crate::TraceId::new(),
                level: crate::LogLevel::Info,
                severity_number: Some(9),
                body: "one".into(),
                attributes: BTreeMap::new(),
            };
            3
        ];
        let mut envelope = Envelope::new(EnvelopeHeader::new(None));
        envelope.add_item(EnvelopeItem::LogBatch(logs));
        let text = String::from_utf8(envelope.to_vec().unwrap()).unwrap();
        let item_header_line = text.split('\n').nth(1).unwrap();
        assert!(
            item_header_line.starts_with(
                "{\"type\":\"log\",\"item_count\":3,\"content_type\":"
            ),
            "unexpected header: {item_header_line}"
        );
        let payload: serde_json::Value =
            serde_json::from_str(text.split('\n').nth(2).unwrap()).unwrap();
        assert_eq!(payload["items"].as_array().unwrap().len(), 3);
    }

    #[test]
    fn attachment_item_header_and_verbatim_payload() {
        let mut envelope = Envelope::new(EnvelopeHeader::new(None));
        envelope.add_item(EnvelopeItem::Attachment(Attachment {
            filename: "dump.bin".into(),
            content_type: None,
            payload: vec![0, 1, 2, 254, 255],
        }));
        let bytes = envelope.to_vec().unwrap();
        let header_end = bytes.iter().position(|&b| b == b'\n').unwrap();
        let item_line_end = bytes[header_end + 1..]
            .iter()
            .position(|&b| b == b'\n')
            .unwrap()
            + header_end
            + 1;
        let item_header: serde_json::Value =
            serde_json::from_slice(&bytes[header_end + 1..item_line_end]).unwrap();
        assert_eq!(item_header["type"], "attachment");
        assert_eq!(item_header["length"], 5);
        assert_eq!(item_header["filename"], "dump.bin");
        assert_eq!(item_header["content_type"], "application/octet-stream");
        assert_eq!(&bytes[item_line_end + 1..item_line_end + 6], &[0, 1, 2, 254, 255]);
        assert_eq!(bytes[item_line_end + 6], b'\n');
    }

    #[test]
    fn empty_payload_has_zero_length() {
        let mut envelope = Envelope::new(EnvelopeHeader::new(None));
        envelope.add_item(EnvelopeItem::Attachment(Attachment {
            filename: "empty".into(),
            content_type: Some("text/plain".into()),
            payload: Vec::new(),
        }));
        let text = String::from_utf8(envelope.to_vec().unwrap()).unwrap();
        assert!(text.contains("\"length\":0"));
    }

    #[test]
    fn header_roundtrip() {
        let mut header = EnvelopeHeader::new(Some(EventId::new()));
        header.sent_at = epoch();
        header.trace = Some(BTreeMap::from([(
            "trace_id".to_owned(),
            "bc6d53f15eb88f4320054569b8c553d4".to_owned(),
        )]));
        let envelope = Envelope::new(header.clone());
        let bytes = envelope.to_vec().unwrap();
        let parsed = Envelope::parse_header(&bytes).unwrap();
        assert_eq!(parsed, header);
    }

    #[test]
    fn parse_header_rejects_garbage() {
        assert!(matches!(
            Envelope::parse_header(b""),
            Err(EnvelopeError::Truncated)
        ));
        assert!(matches!(
            Envelope::parse_header(b"not json\n"),
            Err(EnvelopeError::Json(_))
        ));
    }

    #[test]
    fn item_categories() {
        let event_item = EnvelopeItem::Event(Event::new());
        assert_eq!(event_item.category(), Some(DataCategory::Error));
        let report_item = EnvelopeItem::ClientReport(ClientReport {
            timestamp: epoch(),
            discarded_events: Vec::new(),
        });
        assert_eq!(report_item.category(), None);
        let logs = EnvelopeItem::LogBatch(Vec::new());
        assert_eq!(logs.category(), Some(DataCategory::Log));
    }
}
