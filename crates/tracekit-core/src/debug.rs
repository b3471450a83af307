// SPDX-License-Identifier: MIT OR Apache-2.0
//! Opt-in SDK debug log.
//!
//! When enabled via [`ClientOptions::debug`](crate::ClientOptions), the SDK
//! writes `[tracekit] ...` lines to an injectable sink (stderr by default).
//! Write failures are swallowed; the debug log must never take the host
//! process down.

use std::fmt;
use std::io::Write;
use std::sync::Mutex;

/// Sink-agnostic debug logger owned by a client.
pub struct DebugLogger {
    enabled: bool,
    sink: Mutex<Box<dyn Write + Send + Sync>>,
}

impl DebugLogger {
    /// Create a logger. `sink` defaults to stderr when `None`.
    #[must_use]
    pub fn new(enabled: bool, sink: Option<Box<dyn Write + Send + Sync>>) -> Self {
        DebugLogger {
            enabled,
            sink: Mutex::new(sink.unwrap_or_else(|| Box::new(std::io::stderr()))),
        }
    }

    /// A disabled logger.
    #[must_use]
    pub fn disabled() -> Self {
        DebugLogger::new(false, None)
    }

    /// Whether lines will actually be written.
    #[must_use]
    pub fn enabled(&self) -> bool {
        self.enabled
    }

    /// Write one line. A poisoned lock or a failing sink is ignored.
    pub fn log(&self, args: fmt::Arguments<'_>) {
        if !self.enabled {
            return;
        }
        if let Ok(mut sink) = self.sink.lock() {
            let _ = writeln!(sink, "[tracekit] {args}");
        }
    }
}

impl fmt::Debug for DebugLogger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DebugLogger")
            .field("enabled", &self.enabled)
            .finish_non_exhaustive()
    }
}

/// Log a line through a [`DebugLogger`] with `format!` syntax.
macro_rules! sdk_debug {
    ($logger:expr, $($arg:tt)*) => {
        $logger.log(format_args!($($arg)*))
    };
}
pub(crate) use sdk_debug;

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    #[derive(Clone, Default)]
    struct SharedBuf(Arc<Mutex<Vec<u8>>>);

    impl Write for SharedBuf {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }
        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn writes_prefixed_lines_when_enabled() {
        let buf = SharedBuf::default();
        let logger = DebugLogger::new(true, Some(Box::new(buf.clone())));
        sdk_debug!(logger, "dropping event: {}", "queue full");
        let written = String::from_utf8(buf.0.lock().unwrap().clone()).unwrap();
        assert_eq!(written, "[tracekit] dropping event: queue full\n");
    }

    #[test]
    fn silent_when_disabled() {
        let buf = SharedBuf::default();
        let logger = DebugLogger::new(false, Some(Box::new(buf.clone())));
        sdk_debug!(logger, "should not appear");
        assert!(buf.0.lock().unwrap().is_empty());
    }

    #[test]
    fn failing_sink_does_not_panic() {
        struct Failing;
        impl Write for Failing {
            fn write(&mut self, _: &[u8]) -> std::io::Result<usize> {
                Err(std::io::Error::other("broken sink"))
            }
            fn flush(&mut self) -> std::io::Result<()> {
                Err(std::io::Error::other("broken sink"))
            }
        }
        let logger = DebugLogger::new(true, Some(Box::new(Failing)));
        sdk_debug!(logger, "ignored");
    }
}
