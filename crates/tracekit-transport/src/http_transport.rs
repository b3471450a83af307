// SPDX-License-Identifier: MIT OR Apache-2.0
//! The default asynchronous transport: bounded queue, one worker.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::Utc;
use futures::StreamExt;
use tokio::sync::mpsc;
use tracekit_core::{ClientOptions, Transport, sdk_user_agent};
use tracekit_ratelimit::Ledger;
use tracekit_types::{DataCategory, Dsn, Envelope, ENVELOPE_CONTENT_TYPE};

use crate::{TransportError, configure};

/// Default capacity of the envelope queue.
pub const DEFAULT_QUEUE_SIZE: usize = 30;

/// Read at most this many response-body bytes before giving up on the
/// connection.
const BODY_DRAIN_CAP: usize = 64 * 1024;

enum Message {
    Envelope(Envelope),
    Flush(std::sync::mpsc::Sender<()>),
    Shutdown(std::sync::mpsc::Sender<()>),
}

/// Asynchronous queue-and-worker HTTP transport.
///
/// Envelopes are enqueued without blocking; a single worker on a dedicated
/// thread POSTs them in order, feeds the rate-limit ledger from every
/// response, and drains response bodies up to a fixed cap so connections
/// stay reusable without ever reading unbounded data.
pub struct HttpTransport {
    sender: mpsc::Sender<Message>,
    ledger: Arc<Ledger>,
    worker: Mutex<Option<std::thread::JoinHandle<()>>>,
    shut_down: AtomicBool,
}

impl HttpTransport {
    /// Parse the DSN, build the HTTP client, and start the worker.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError`] when the DSN is malformed or the HTTP
    /// client cannot be built from the configured proxies/CA bundle.
    pub fn start(options: &ClientOptions) -> Result<Arc<Self>, TransportError> {
        let dsn: Dsn = options.dsn.parse()?;
        let client = configure(reqwest::Client::builder().user_agent(sdk_user_agent()), options)?;
        let ledger = Arc::new(Ledger::new());

        let (sender, receiver) = mpsc::channel(DEFAULT_QUEUE_SIZE);
        let worker_ledger = Arc::clone(&ledger);
        let worker = std::thread::Builder::new()
            .name("tracekit-transport".into())
            .spawn(move || {
                let runtime = tokio::runtime::Builder::new_current_thread()
                    .enable_all()
                    .build();
                match runtime {
                    Ok(runtime) => {
                        runtime.block_on(worker_loop(receiver, client, dsn, worker_ledger));
                    }
                    Err(err) => {
                        tracing::warn!(%err, "failed to build transport worker runtime");
                    }
                }
            })
            .expect("failed to spawn transport worker thread");

        Ok(Arc::new(HttpTransport {
            sender,
            ledger,
            worker: Mutex::new(Some(worker)),
            shut_down: AtomicBool::new(false),
        }))
    }

    /// The rate-limit ledger shared with the worker.
    #[must_use]
    pub fn ledger(&self) -> &Arc<Ledger> {
        &self.ledger
    }

    fn send_control(
        &self,
        make: impl Fn(std::sync::mpsc::Sender<()>) -> Message,
        timeout: Duration,
    ) -> bool {
        let deadline = std::time::Instant::now() + timeout;
        let (ack, done) = std::sync::mpsc::channel();
        let mut message = make(ack);
        loop {
            match self.sender.try_send(message) {
                Ok(()) => break,
                Err(mpsc::error::TrySendError::Closed(_)) => return false,
                Err(mpsc::error::TrySendError::Full(returned)) => {
                    if std::time::Instant::now() >= deadline {
                        return false;
                    }
                    message = returned;
                    std::thread::sleep(Duration::from_millis(5));
                }
            }
        }
        let remaining = deadline.saturating_duration_since(std::time::Instant::now());
        done.recv_timeout(remaining).is_ok()
    }
}

impl Transport for HttpTransport {
    fn send_envelope(&self, envelope: Envelope) -> bool {
        if self.shut_down.load(Ordering::SeqCst) {
            return false;
        }
        self.sender.try_send(Message::Envelope(envelope)).is_ok()
    }

    fn flush(&self, timeout: Duration) -> bool {
        if self.shut_down.load(Ordering::SeqCst) {
            return true;
        }
        self.send_control(Message::Flush, timeout)
    }

    fn shutdown(&self, timeout: Duration) -> bool {
        if self.shut_down.swap(true, Ordering::SeqCst) {
            return true;
        }
        let acked = self.send_control(Message::Shutdown, timeout);
        let handle = self.worker.lock().expect("transport lock poisoned").take();
        if let Some(handle) = handle {
            if acked {
                let _ = handle.join();
            } else {
                // The worker is still draining past the deadline; leave it
                // detached rather than blocking the caller.
                tracing::debug!("transport worker detached after shutdown timeout");
            }
        }
        acked
    }

    fn is_limited(&self, category: DataCategory) -> bool {
        self.ledger.is_limited(category, Utc::now())
    }
}

async fn worker_loop(
    mut receiver: mpsc::Receiver<Message>,
    client: reqwest::Client,
    dsn: Dsn,
    ledger: Arc<Ledger>,
) {
    let envelope_url = dsn.envelope_url();
    while let Some(message) = receiver.recv().await {
        match message {
            Message::Envelope(envelope) => {
                send_one(&client, &dsn, &envelope_url, &ledger, envelope).await;
            }
            Message::Flush(ack) => {
                // Everything enqueued before the flush request has already
                // been processed in order; drain whatever raced in.
                let mut shutdown_ack = None;
                while let Ok(message) = receiver.try_recv() {
                    match message {
                        Message::Envelope(envelope) => {
                            send_one(&client, &dsn, &envelope_url, &ledger, envelope).await;
                        }
                        Message::Flush(ack) => {
                            let _ = ack.send(());
                        }
                        Message::Shutdown(ack) => {
                            shutdown_ack = Some(ack);
                            break;
                        }
                    }
                }
                let _ = ack.send(());
                if let Some(shutdown_ack) = shutdown_ack {
                    let _ = shutdown_ack.send(());
                    return;
                }
            }
            Message::Shutdown(ack) => {
                while let Ok(message) = receiver.try_recv() {
                    if let Message::Envelope(envelope) = message {
                        send_one(&client, &dsn, &envelope_url, &ledger, envelope).await;
                    }
                }
                let _ = ack.send(());
                return;
            }
        }
    }
}

async fn send_one(
    client: &reqwest::Client,
    dsn: &Dsn,
    envelope_url: &str,
    ledger: &Ledger,
    mut envelope: Envelope,
) {
    // Drop items whose category the backend currently suppresses.
    let now = Utc::now();
    envelope.items.retain(|item| match item.category() {
        Some(category) if ledger.is_limited(category, now) => {
            tracing::debug!(%category, "dropping rate-limited envelope item");
            false
        }
        _ => true,
    });
    if envelope.items.is_empty() {
        return;
    }

    let body = match envelope.to_vec() {
        Ok(body) => body,
        Err(err) => {
            tracing::debug!(%err, "failed to serialize envelope");
            return;
        }
    };

    let auth = dsn.auth_header(Utc::now().timestamp(), &sdk_user_agent());
    let response = client
        .post(envelope_url)
        .header("Content-Type", ENVELOPE_CONTENT_TYPE)
        .header("X-Sentry-Auth", auth)
        .body(body)
        .send()
        .await;

    match response {
        Ok(response) => {
            let status = response.status();
            ledger.update(status.as_u16(), response.headers(), Utc::now());
            if !status.is_success() {
                tracing::debug!(status = status.as_u16(), "ingest endpoint rejected envelope");
            }
            drain_body(response).await;
        }
        Err(err) => {
            // No retry: re-sending risks pathological loops, the event is
            // dropped.
            tracing::debug!(%err, "envelope POST failed");
        }
    }
}

/// Read the response body up to the cap. Stopping early drops the
/// connection instead of returning it to the pool, so an over-sized body
/// never monopolizes the worker and the next request opens fresh.
async fn drain_body(response: reqwest::Response) {
    let mut stream = response.bytes_stream();
    let mut read = 0usize;
    while let Some(chunk) = stream.next().await {
        match chunk {
            Ok(chunk) => {
                read += chunk.len();
                if read > BODY_DRAIN_CAP {
                    tracing::debug!(read, "response body exceeded drain cap, closing connection");
                    return;
                }
            }
            Err(_) => return,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn options_for(server_uri: &str) -> ClientOptions {
        // http://127.0.0.1:PORT → http://public@127.0.0.1:PORT/42
        let rest = server_uri.strip_prefix("http://").unwrap();
        ClientOptions {
            dsn: format!("http://public@{rest}/42"),
            ..ClientOptions::default()
        }
    }

    fn envelope() -> Envelope {
        Envelope::from_event(tracekit_types::Event::from_message(
            "over the wire",
            tracekit_types::Level::Error,
        ))
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn posts_envelope_with_auth_headers() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/42/envelope/"))
            .and(header("Content-Type", ENVELOPE_CONTENT_TYPE))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let transport = HttpTransport::start(&options_for(&server.uri())).unwrap();
        assert!(transport.send_envelope(envelope()));
        assert!(transport.flush(Duration::from_secs(5)));

        let requests = server.received_requests().await.unwrap();
        assert_eq!(requests.len(), 1);
        let auth = requests[0].headers.get("X-Sentry-Auth").unwrap();
        let auth = auth.to_str().unwrap();
        assert!(auth.starts_with("Sentry sentry_version=7"));
        assert!(auth.contains("sentry_key=public"));
        let agent = requests[0].headers.get("User-Agent").unwrap();
        assert_eq!(agent.to_str().unwrap(), sdk_user_agent());
        let body = String::from_utf8(requests[0].body.clone()).unwrap();
        assert!(body.contains("\"type\":\"event\""));
        assert!(body.contains("over the wire"));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn rate_limit_headers_feed_the_ledger() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(429)
                    .insert_header("X-Sentry-Rate-Limits", "50:error:org:quota"),
            )
            .mount(&server)
            .await;

        let transport = HttpTransport::start(&options_for(&server.uri())).unwrap();
        assert!(!transport.is_limited(DataCategory::Error));
        assert!(transport.send_envelope(envelope()));
        assert!(transport.flush(Duration::from_secs(5)));

        assert!(transport.is_limited(DataCategory::Error));
        assert!(!transport.is_limited(DataCategory::Transaction));

        // The next error envelope is suppressed before any POST.
        assert!(transport.send_envelope(envelope()));
        assert!(transport.flush(Duration::from_secs(5)));
        assert_eq!(server.received_requests().await.unwrap().len(), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn queue_overflow_rejects_without_blocking() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(5)))
            .mount(&server)
            .await;

        let transport = HttpTransport::start(&options_for(&server.uri())).unwrap();
        let mut accepted = 0;
        for _ in 0..(DEFAULT_QUEUE_SIZE * 3) {
            if transport.send_envelope(envelope()) {
                accepted += 1;
            }
        }
        assert!(accepted < DEFAULT_QUEUE_SIZE * 3, "queue never filled");
        transport.shutdown(Duration::from_millis(100));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn network_errors_drop_without_retry() {
        // Nothing listens on this port.
        let transport = HttpTransport::start(&ClientOptions {
            dsn: "http://public@127.0.0.1:9/42".into(),
            ..ClientOptions::default()
        })
        .unwrap();
        assert!(transport.send_envelope(envelope()));
        assert!(transport.flush(Duration::from_secs(10)));
        // A second send still works; the transport is not wedged.
        assert!(transport.send_envelope(envelope()));
        assert!(transport.flush(Duration::from_secs(10)));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn shutdown_is_idempotent() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;
        let transport = HttpTransport::start(&options_for(&server.uri())).unwrap();
        assert!(transport.shutdown(Duration::from_secs(2)));
        assert!(transport.shutdown(Duration::from_secs(2)));
        // After shutdown, sends are rejected.
        assert!(!transport.send_envelope(envelope()));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn flush_times_out_against_a_slow_backend() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(3)))
            .mount(&server)
            .await;

        let transport = HttpTransport::start(&options_for(&server.uri())).unwrap();
        assert!(transport.send_envelope(envelope()));
        assert!(!transport.flush(Duration::from_millis(200)));
        // A generous second flush drains the same envelope.
        assert!(transport.flush(Duration::from_secs(10)));
        transport.shutdown(Duration::from_secs(5));
    }

    #[test]
    fn invalid_dsn_fails_construction() {
        let result = HttpTransport::start(&ClientOptions {
            dsn: "not-a-dsn".into(),
            ..ClientOptions::default()
        });
        assert!(matches!(result, Err(TransportError::Dsn(_))));
    }
}
