// SPDX-License-Identifier: MIT OR Apache-2.0
//! Rate-limit handling end to end: server headers suppress matching
//! categories, other categories keep flowing, drops are reported.

use std::time::Duration;

use serial_test::serial;
use wiremock::matchers::method;
use wiremock::{Mock, MockServer, ResponseTemplate};

fn options_for(server_uri: &str) -> tracekit::ClientOptions {
    let rest = server_uri.strip_prefix("http://").unwrap();
    tracekit::ClientOptions {
        dsn: format!("http://public@{rest}/1"),
        ..Default::default()
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
#[serial]
async fn error_category_limit_spares_other_categories() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(
            ResponseTemplate::new(429)
                .insert_header("X-Sentry-Rate-Limits", "50:error:org:quota"),
        )
        .mount(&server)
        .await;

    let guard = tracekit::init(options_for(&server.uri())).unwrap();

    // First error goes out and brings the 429 + limits header back.
    tracekit::capture_message("first", tracekit::Level::Error).unwrap();
    assert!(tracekit::flush(Duration::from_secs(5)));
    assert_eq!(server.received_requests().await.unwrap().len(), 1);

    // Errors are now suppressed client-side before any POST.
    assert!(tracekit::capture_message("second", tracekit::Level::Error).is_none());
    assert!(tracekit::flush(Duration::from_secs(5)));
    assert_eq!(server.received_requests().await.unwrap().len(), 1);

    // A transaction event is a different category and still goes out,
    // carrying the recorded drop in its client report.
    let transaction = tracekit::Event {
        ty: tracekit::EventType::Transaction,
        transaction: "unaffected".into(),
        ..Default::default()
    };
    tracekit::capture_event(transaction).unwrap();
    assert!(tracekit::flush(Duration::from_secs(5)));

    let requests = server.received_requests().await.unwrap();
    assert_eq!(requests.len(), 2);
    let body = String::from_utf8(requests[1].body.clone()).unwrap();
    assert!(body.contains("\"type\":\"transaction\""));
    assert!(body.contains("\"type\":\"client_report\""));
    assert!(body.contains("\"reason\":\"ratelimit_backoff\""));
    assert!(body.contains("\"category\":\"error\""));

    drop(guard);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
#[serial]
async fn retry_after_suppresses_everything() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(429).insert_header("Retry-After", "50"))
        .mount(&server)
        .await;

    let guard = tracekit::init(options_for(&server.uri())).unwrap();

    tracekit::capture_message("first", tracekit::Level::Error).unwrap();
    assert!(tracekit::flush(Duration::from_secs(5)));

    // Everything is suppressed now, transactions included.
    assert!(tracekit::capture_message("second", tracekit::Level::Error).is_none());
    let transaction = tracekit::Event {
        ty: tracekit::EventType::Transaction,
        ..Default::default()
    };
    assert!(tracekit::capture_event(transaction).is_none());
    assert!(tracekit::flush(Duration::from_secs(5)));

    assert_eq!(server.received_requests().await.unwrap().len(), 1);

    drop(guard);
}
