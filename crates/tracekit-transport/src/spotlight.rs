// SPDX-License-Identifier: MIT OR Apache-2.0
//! Spotlight mirror transport.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tracekit_core::Transport;
use tracekit_types::{DataCategory, Envelope, ENVELOPE_CONTENT_TYPE};

/// Default ingest URL of a locally running Spotlight sidecar.
pub const DEFAULT_SPOTLIGHT_URL: &str = "http://localhost:8969/stream";

enum Message {
    Envelope(Box<Envelope>),
    Shutdown,
}

/// Wraps another transport and mirrors every envelope to a local,
/// developer-visible Spotlight URL. Failures on the local send are ignored;
/// the wrapped transport is authoritative for everything.
pub struct SpotlightTransport {
    inner: Arc<dyn Transport>,
    sender: std::sync::mpsc::SyncSender<Message>,
    worker: Mutex<Option<std::thread::JoinHandle<()>>>,
    shut_down: AtomicBool,
}

impl SpotlightTransport {
    /// Wrap `inner`, mirroring to `url` (empty selects the default).
    #[must_use]
    pub fn new(inner: Arc<dyn Transport>, url: &str) -> Arc<Self> {
        let url = if url.is_empty() {
            DEFAULT_SPOTLIGHT_URL.to_owned()
        } else {
            url.to_owned()
        };
        let (sender, receiver) = std::sync::mpsc::sync_channel::<Message>(30);
        let worker = std::thread::Builder::new()
            .name("tracekit-spotlight".into())
            .spawn(move || {
                let client = reqwest::blocking::Client::builder()
                    .timeout(Duration::from_secs(2))
                    .build();
                let Ok(client) = client else { return };
                while let Ok(message) = receiver.recv() {
                    match message {
                        Message::Envelope(envelope) => {
                            let Ok(body) = envelope.to_vec() else { continue };
                            // Spotlight is best effort by definition.
                            let _ = client
                                .post(&url)
                                .header("Content-Type", ENVELOPE_CONTENT_TYPE)
                                .body(body)
                                .send();
                        }
                        Message::Shutdown => return,
                    }
                }
            })
            .expect("failed to spawn spotlight worker thread");
        Arc::new(SpotlightTransport {
            inner,
            sender,
            worker: Mutex::new(Some(worker)),
            shut_down: AtomicBool::new(false),
        })
    }
}

impl Transport for SpotlightTransport {
    fn send_envelope(&self, envelope: Envelope) -> bool {
        if !self.shut_down.load(Ordering::SeqCst) {
            let _ = self
                .sender
                .try_send(Message::Envelope(Box::new(envelope.clone())));
        }
        self.inner.send_envelope(envelope)
    }

    fn flush(&self, timeout: Duration) -> bool {
        self.inner.flush(timeout)
    }

    fn shutdown(&self, timeout: Duration) -> bool {
        if !self.shut_down.swap(true, Ordering::SeqCst) {
            let _ = self.sender.try_send(Message::Shutdown);
            if let Some(handle) = self.worker.lock().expect("spotlight lock poisoned").take() {
                let _ = handle.join();
            }
        }
        self.inner.shutdown(timeout)
    }

    fn is_limited(&self, category: DataCategory) -> bool {
        self.inner.is_limited(category)
    }
}
