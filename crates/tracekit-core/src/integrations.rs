// SPDX-License-Identifier: MIT OR Apache-2.0
//! Client-level integrations.
//!
//! An integration is a named processor installed once per client, run after
//! the scope's event processors and before the `before_send` callbacks.
//! Duplicate names are ignored at install time.

use regex::Regex;
use tracekit_types::{Context, Event, EventType};

use crate::options::ClientOptions;

/// A named, client-wide event processor.
pub trait Integration: Send + Sync + 'static {
    /// Unique name; used for deduplication and the SDK info on events.
    fn name(&self) -> &'static str;

    /// One-time hook at client construction.
    fn setup(&self, _options: &ClientOptions) {}

    /// Inspect or transform an event; `None` drops it.
    fn process_event(&self, event: Event, _options: &ClientOptions) -> Option<Event> {
        Some(event)
    }
}

fn compile_patterns(patterns: &[String]) -> Vec<Regex> {
    patterns
        .iter()
        .filter_map(|pattern| match Regex::new(pattern) {
            Ok(re) => Some(re),
            Err(err) => {
                tracing::debug!(pattern, %err, "skipping unparseable ignore pattern");
                None
            }
        })
        .collect()
}

// ---------------------------------------------------------------------------
// IgnoreErrors
// ---------------------------------------------------------------------------

/// Drops error events whose message or exception type/value matches one of
/// the configured patterns.
pub struct IgnoreErrorsIntegration {
    patterns: Vec<Regex>,
}

impl IgnoreErrorsIntegration {
    /// Compile the option's patterns; unparseable ones are skipped.
    #[must_use]
    pub fn new(patterns: &[String]) -> Self {
        IgnoreErrorsIntegration {
            patterns: compile_patterns(patterns),
        }
    }
}

impl Integration for IgnoreErrorsIntegration {
    fn name(&self) -> &'static str {
        "ignore_errors"
    }

    fn process_event(&self, event: Event, _options: &ClientOptions) -> Option<Event> {
        if self.patterns.is_empty() || event.ty != EventType::Error {
            return Some(event);
        }
        let mut haystacks: Vec<&str> = vec![&event.message];
        for exception in &event.exception {
            haystacks.push(&exception.ty);
            haystacks.push(&exception.value);
        }
        let ignored = self
            .patterns
            .iter()
            .any(|re| haystacks.iter().any(|h| re.is_match(h)));
        if ignored { None } else { Some(event) }
    }
}

// ---------------------------------------------------------------------------
// IgnoreTransactions
// ---------------------------------------------------------------------------

/// Drops transactions whose name matches one of the configured patterns.
pub struct IgnoreTransactionsIntegration {
    patterns: Vec<Regex>,
}

impl IgnoreTransactionsIntegration {
    /// Compile the option's patterns; unparseable ones are skipped.
    #[must_use]
    pub fn new(patterns: &[String]) -> Self {
        IgnoreTransactionsIntegration {
            patterns: compile_patterns(patterns),
        }
    }
}

impl Integration for IgnoreTransactionsIntegration {
    fn name(&self) -> &'static str {
        "ignore_transactions"
    }

    fn process_event(&self, event: Event, _options: &ClientOptions) -> Option<Event> {
        if self.patterns.is_empty() || event.ty != EventType::Transaction {
            return Some(event);
        }
        if self.patterns.iter().any(|re| re.is_match(&event.transaction)) {
            None
        } else {
            Some(event)
        }
    }
}

// ---------------------------------------------------------------------------
// Environment
// ---------------------------------------------------------------------------

/// Fills in `device`, `os`, and `runtime` contexts from the build target
/// when the event does not already carry them.
#[derive(Default)]
pub struct EnvironmentIntegration;

impl Integration for EnvironmentIntegration {
    fn name(&self) -> &'static str {
        "environment"
    }

    fn process_event(&self, mut event: Event, _options: &ClientOptions) -> Option<Event> {
        let named = |value: &str| {
            let mut ctx = Context::new();
            ctx.insert("name".into(), value.into());
            ctx
        };
        event
            .contexts
            .entry("os".to_owned())
            .or_insert_with(|| named(std::env::consts::OS));
        event
            .contexts
            .entry("runtime".to_owned())
            .or_insert_with(|| named("rust"));
        event.contexts.entry("device".to_owned()).or_insert_with(|| {
            let mut ctx = Context::new();
            ctx.insert("arch".into(), std::env::consts::ARCH.into());
            ctx
        });
        Some(event)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tracekit_types::{Exception, Level};

    fn options() -> ClientOptions {
        ClientOptions::default()
    }

    #[test]
    fn ignore_errors_matches_message() {
        let integration = IgnoreErrorsIntegration::new(&["broken pipe".into()]);
        let dropped = Event::from_message("upstream: broken pipe", Level::Error);
        assert!(integration.process_event(dropped, &options()).is_none());

        let kept = Event::from_message("timeout", Level::Error);
        assert!(integration.process_event(kept, &options()).is_some());
    }

    #[test]
    fn ignore_errors_matches_exception_type_and_value() {
        let integration = IgnoreErrorsIntegration::new(&["^DatabaseError$".into()]);
        let mut event = Event::new();
        event.exception.push(Exception {
            ty: "DatabaseError".into(),
            value: "connection refused".into(),
            ..Exception::default()
        });
        assert!(integration.process_event(event, &options()).is_none());
    }

    #[test]
    fn ignore_errors_leaves_transactions_alone() {
        let integration = IgnoreErrorsIntegration::new(&[".*".into()]);
        let event = Event {
            ty: EventType::Transaction,
            ..Event::default()
        };
        assert!(integration.process_event(event, &options()).is_some());
    }

    #[test]
    fn invalid_patterns_are_skipped() {
        let integration = IgnoreErrorsIntegration::new(&["([".into(), "keep".into()]);
        let dropped = Event::from_message("keep this out", Level::Error);
        assert!(integration.process_event(dropped, &options()).is_none());
    }

    #[test]
    fn ignore_transactions_by_name() {
        let integration = IgnoreTransactionsIntegration::new(&["^GET /health$".into()]);
        let event = Event {
            ty: EventType::Transaction,
            transaction: "GET /health".into(),
            ..Event::default()
        };
        assert!(integration.process_event(event, &options()).is_none());
    }

    #[test]
    fn environment_contexts_do_not_override() {
        let integration = EnvironmentIntegration;
        let mut event = Event::new();
        let mut os = Context::new();
        os.insert("name".into(), "custom-os".into());
        event.contexts.insert("os".into(), os);

        let processed = integration.process_event(event, &options()).unwrap();
        assert_eq!(processed.contexts["os"]["name"], "custom-os");
        assert!(processed.contexts.contains_key("runtime"));
        assert!(processed.contexts.contains_key("device"));
    }
}
