use serial_test::serial;
use std::net::TcpListener;
use std::sync::Once;
use tokio::time::Duration;
use wiremock::matchers::{body_string, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use beast_rs::client::{build_client, ClientConfig};
use beast_rs::config::HttpConfig;
use beast_rs::executor::{HttpExecutor, RequestExecutor};
use beast_rs::metrics::{register_metrics, REQUEST_STATUS_CODES, REQUEST_TOTAL};
use beast_rs::request::RequestSpec;

// Register metrics once across all tests in this file.
static INIT_METRICS: Once = Once::new();

fn init_metrics() {
    INIT_METRICS.call_once(|| {
        register_metrics().expect("Failed to register metrics");
    });
}

fn executor(request_timeout: Option<Duration>) -> HttpExecutor {
    let config = ClientConfig {
        request_timeout,
        ..HttpConfig::default().to_client_config()
    };
    HttpExecutor::new(build_client(&config).unwrap())
}

fn get(url: &str) -> RequestSpec {
    RequestSpec::new("GET", url, Vec::<(&str, &str)>::new(), None).unwrap()
}

/// A local address nothing listens on.
fn closed_port_url() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);
    format!("http://127.0.0.1:{}/", port)
}

#[tokio::test]
async fn reports_status_code_and_duration() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/ok"))
        .respond_with(ResponseTemplate::new(200).set_body_string("hello"))
        .expect(1)
        .mount(&server)
        .await;

    let spec = get(&format!("{}/ok", server.uri()));
    let outcome = executor(None).execute(7, &spec).await;

    assert_eq!(outcome.request_id, 7);
    assert_eq!(outcome.status_code, 200);
    assert!(outcome.is_success());
    assert!(outcome.duration > Duration::ZERO);
    assert_eq!(outcome.request, format!("GET {}/ok", server.uri()));
}

#[tokio::test]
async fn non_success_status_is_not_a_client_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let outcome = executor(None).execute(1, &get(&server.uri())).await;

    assert_eq!(outcome.status_code, 503);
    assert!(!outcome.is_success());
    assert!(!outcome.is_client_error());
}

#[tokio::test]
async fn sends_headers_and_body() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/items"))
        .and(header("Content-Type", "application/json"))
        .and(header("X-Trace", "a"))
        .and(body_string("{\"id\": 1}"))
        .respond_with(ResponseTemplate::new(201))
        .expect(1)
        .mount(&server)
        .await;

    let spec = RequestSpec::new(
        "POST",
        &format!("{}/items", server.uri()),
        vec![("Content-Type", "application/json"), ("X-Trace", "a")],
        Some("{\"id\": 1}".to_string()),
    )
    .unwrap();
    let outcome = executor(None).execute(1, &spec).await;

    assert_eq!(outcome.status_code, 201);
}

#[tokio::test]
async fn redirects_are_not_followed_by_default() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/old"))
        .respond_with(ResponseTemplate::new(302).insert_header("Location", "/new"))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/new"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let outcome = executor(None)
        .execute(1, &get(&format!("{}/old", server.uri())))
        .await;

    assert_eq!(outcome.status_code, 302);
}

#[tokio::test]
async fn timeout_is_reported_as_minus_400() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(2)))
        .mount(&server)
        .await;

    let outcome = executor(Some(Duration::from_millis(200)))
        .execute(1, &get(&server.uri()))
        .await;

    assert_eq!(outcome.status_code, -400);
    assert!(outcome.is_client_error());
    assert!(outcome.duration >= Duration::from_millis(200));
    assert!(outcome.duration < Duration::from_secs(2));
}

#[tokio::test]
async fn connection_failure_is_reported_as_minus_500() {
    let outcome = executor(Some(Duration::from_secs(5)))
        .execute(1, &get(&closed_port_url()))
        .await;

    assert_eq!(outcome.status_code, -500);
    assert!(outcome.is_client_error());
}

#[tokio::test]
#[serial]
async fn updates_request_metrics() {
    init_metrics();
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let total_before = REQUEST_TOTAL.get();
    let not_found_before = REQUEST_STATUS_CODES.with_label_values(&["404"]).get();
    let unexpected_before = REQUEST_STATUS_CODES
        .with_label_values(&["unexpected_error"])
        .get();

    let exec = executor(Some(Duration::from_secs(5)));
    exec.execute(1, &get(&server.uri())).await;
    exec.execute(2, &get(&closed_port_url())).await;

    assert!(REQUEST_TOTAL.get() >= total_before + 2);
    assert!(REQUEST_STATUS_CODES.with_label_values(&["404"]).get() > not_found_before);
    assert!(
        REQUEST_STATUS_CODES
            .with_label_values(&["unexpected_error"])
            .get()
            > unexpected_before
    );
}
