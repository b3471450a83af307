// SPDX-License-Identifier: MIT OR Apache-2.0
//! End-to-end capture pipeline tests against a mock ingest endpoint.

use std::time::Duration;

use serial_test::serial;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn options_for(server_uri: &str) -> tracekit::ClientOptions {
    let rest = server_uri.strip_prefix("http://").unwrap();
    tracekit::ClientOptions {
        dsn: format!("http://public@{rest}/1"),
        ..Default::default()
    }
}

async fn mock_ok(server: &MockServer) {
    Mock::given(method("POST"))
        .and(path("/api/1/envelope/"))
        .respond_with(ResponseTemplate::new(200))
        .mount(server)
        .await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
#[serial]
async fn error_event_reaches_the_wire() {
    let server = MockServer::start().await;
    mock_ok(&server).await;

    let mut options = options_for(&server.uri());
    options.release = "svc@9.9.9".into();
    options.environment = "test".into();
    let guard = tracekit::init(options).unwrap();

    let id = tracekit::capture_message("it broke", tracekit::Level::Error).unwrap();
    assert_eq!(tracekit::last_event_id(), Some(id));
    assert!(tracekit::flush(Duration::from_secs(5)));

    let requests = server.received_requests().await.unwrap();
    assert_eq!(requests.len(), 1);
    let body = String::from_utf8(requests[0].body.clone()).unwrap();
    let lines: Vec<&str> = body.split('\n').collect();
    assert_eq!(lines.len(), 4, "header, item header, payload, trailing");
    assert_eq!(lines[3], "");

    let header: serde_json::Value = serde_json::from_str(lines[0]).unwrap();
    assert_eq!(header["event_id"].as_str().unwrap(), id.to_string());
    assert!(header["dsn"].as_str().unwrap().starts_with("http://public@"));
    assert_eq!(header["sdk"]["name"], tracekit::SDK_NAME);

    let item_header: serde_json::Value = serde_json::from_str(lines[1]).unwrap();
    assert_eq!(item_header["type"], "event");
    assert_eq!(item_header["length"].as_u64().unwrap() as usize, lines[2].len());

    let event: serde_json::Value = serde_json::from_str(lines[2]).unwrap();
    assert_eq!(event["message"], "it broke");
    assert_eq!(event["level"], "error");
    assert_eq!(event["release"], "svc@9.9.9");
    assert_eq!(event["environment"], "test");
    assert_eq!(event["platform"], "rust");
    // Trace continuity: even plain errors carry a trace context.
    assert!(event["contexts"]["trace"]["trace_id"].is_string());

    drop(guard);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
#[serial]
async fn scope_data_travels_with_events() {
    let server = MockServer::start().await;
    mock_ok(&server).await;
    let guard = tracekit::init(options_for(&server.uri())).unwrap();

    tracekit::configure_scope(|scope| {
        scope.set_tag("region", "eu-west-1");
        scope.set_user(Some(tracekit::User {
            id: Some("user-7".into()),
            ..Default::default()
        }));
    });
    tracekit::add_breadcrumb(tracekit::Breadcrumb {
        message: "cache warmed".into(),
        ..Default::default()
    });
    tracekit::capture_message("with context", tracekit::Level::Info);
    assert!(tracekit::flush(Duration::from_secs(5)));

    let requests = server.received_requests().await.unwrap();
    let body = String::from_utf8(requests[0].body.clone()).unwrap();
    let event: serde_json::Value =
        serde_json::from_str(body.split('\n').nth(2).unwrap()).unwrap();
    assert_eq!(event["tags"]["region"], "eu-west-1");
    assert_eq!(event["user"]["id"], "user-7");
    assert_eq!(event["breadcrumbs"][0]["message"], "cache warmed");
    assert!(event["breadcrumbs"][0]["timestamp"].is_string());

    // Clean up scope state for the other serial tests.
    tracekit::configure_scope(tracekit::Scope::clear);
    drop(guard);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
#[serial]
async fn check_in_round_trip() {
    let server = MockServer::start().await;
    mock_ok(&server).await;
    let guard = tracekit::init(options_for(&server.uri())).unwrap();

    tracekit::capture_check_in(tracekit::CheckIn {
        check_in_id: tracekit::EventId::new(),
        monitor_slug: "nightly-reconcile".into(),
        status: tracekit::CheckInStatus::Ok,
        duration: Some(42.5),
    });
    assert!(tracekit::flush(Duration::from_secs(5)));

    let requests = server.received_requests().await.unwrap();
    let body = String::from_utf8(requests[0].body.clone()).unwrap();
    let item_header: serde_json::Value =
        serde_json::from_str(body.split('\n').nth(1).unwrap()).unwrap();
    assert_eq!(item_header["type"], "check_in");
    let payload: serde_json::Value =
        serde_json::from_str(body.split('\n').nth(2).unwrap()).unwrap();
    assert_eq!(payload["monitor_slug"], "nightly-reconcile");
    assert_eq!(payload["status"], "ok");

    drop(guard);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
#[serial]
async fn structured_logs_batch_into_one_item() {
    let server = MockServer::start().await;
    mock_ok(&server).await;

    let mut options = options_for(&server.uri());
    options.enable_logs = true;
    options.release = "svc@1.0".into();
    let guard = tracekit::init(options).unwrap();

    let logger = tracekit::Logger::new().with_attribute("component", "worker");
    logger.info("first");
    logger.warn("second");
    assert!(tracekit::flush(Duration::from_secs(5)));

    let requests = server.received_requests().await.unwrap();
    let log_request = requests
        .iter()
        .map(|r| String::from_utf8(r.body.clone()).unwrap())
        .find(|body| body.contains("\"type\":\"log\""))
        .expect("a log envelope was sent");
    let item_header: serde_json::Value =
        serde_json::from_str(log_request.split('\n').nth(1).unwrap()).unwrap();
    assert_eq!(item_header["type"], "log");
    assert_eq!(item_header["item_count"], 2);
    assert!(
        item_header["content_type"]
            .as_str()
            .unwrap()
            .contains("log")
    );
    let payload: serde_json::Value =
        serde_json::from_str(log_request.split('\n').nth(2).unwrap()).unwrap();
    let items = payload["items"].as_array().unwrap();
    assert_eq!(items.len(), 2);
    assert_eq!(items[0]["body"], "first");
    assert_eq!(items[0]["attributes"]["component"]["value"], "worker");
    assert_eq!(items[0]["attributes"]["sentry.release"]["value"], "svc@1.0");
    assert_eq!(items[1]["level"], "warn");

    drop(guard);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
#[serial]
async fn before_send_drop_is_reported() {
    let server = MockServer::start().await;
    mock_ok(&server).await;

    let mut options = options_for(&server.uri());
    options.before_send = Some(std::sync::Arc::new(|event: tracekit::Event| {
        if event.message.contains("secret") {
            None
        } else {
            Some(event)
        }
    }));
    let guard = tracekit::init(options).unwrap();

    assert!(tracekit::capture_message("secret stuff", tracekit::Level::Error).is_none());
    tracekit::capture_message("fine", tracekit::Level::Error).unwrap();
    assert!(tracekit::flush(Duration::from_secs(5)));

    let requests = server.received_requests().await.unwrap();
    assert_eq!(requests.len(), 1);
    let body = String::from_utf8(requests[0].body.clone()).unwrap();
    assert!(body.contains("\"type\":\"client_report\""));
    assert!(body.contains("\"reason\":\"before_send\""));

    drop(guard);
}
