//! Exercises `HttpProbe` against a real local `axum` server rather than
//! mocking `reqwest` — there's no injectable transport seam, so this covers
//! the status-set/keyword-search contract end to end, per spec.md §4.2.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU16, Ordering};
use std::sync::Arc;
use std::time::Duration;

use axum::routing::get;
use axum::Router;
use endpoint_monitor::kafka_pool::KafkaPool;
use endpoint_monitor::probe::{HttpProbe, ProbeExecutor};
use endpoint_monitor::types::{Endpoint, EndpointDetail, Status};

async fn spawn_server(status: Arc<AtomicU16>, body: &'static str) -> std::net::SocketAddr {
    let app = Router::new().route(
        "/",
        get(move || {
            let status = status.clone();
            async move {
                let code = status.load(Ordering::Relaxed);
                (
                    axum::http::StatusCode::from_u16(code).unwrap(),
                    body.to_string(),
                )
            }
        }),
    );
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    addr
}

fn http_endpoint(url: String, ok_statuses: Vec<u16>, keyword: Option<String>) -> Endpoint {
    Endpoint {
        id: 1,
        name: "api".to_string(),
        url,
        heartbeat_interval_seconds: 10,
        retries: 1,
        upside_down: false,
        paused: false,
        retries_failed_so_far: 0,
        status: Status::Unknown,
        last_checked: None,
        detail: EndpointDetail::Http {
            method: "GET".to_string(),
            headers: HashMap::new(),
            body: None,
            ok_http_statuses: ok_statuses,
            keyword_search: keyword,
            check_cert_expiry: false,
            cert_expiry_threshold_days: 14,
            mtls: None,
        },
    }
}

#[tokio::test]
async fn default_2xx_range_is_ok_with_empty_status_set() {
    let status = Arc::new(AtomicU16::new(200));
    let addr = spawn_server(status, "hello").await;
    let endpoint = http_endpoint(format!("http://{addr}/"), vec![], None);

    let pool = KafkaPool::new();
    let outcome = HttpProbe.probe(&endpoint, &pool, Duration::from_secs(2)).await;
    assert!(outcome.is_ok);
}

#[tokio::test]
async fn status_outside_2xx_fails_with_empty_status_set() {
    let status = Arc::new(AtomicU16::new(500));
    let addr = spawn_server(status, "boom").await;
    let endpoint = http_endpoint(format!("http://{addr}/"), vec![], None);

    let pool = KafkaPool::new();
    let outcome = HttpProbe.probe(&endpoint, &pool, Duration::from_secs(2)).await;
    assert!(!outcome.is_ok);
    assert_eq!(outcome.failure_reason.as_deref(), Some("status 500"));
}

#[tokio::test]
async fn explicit_ok_statuses_override_the_default_2xx_range() {
    let status = Arc::new(AtomicU16::new(418));
    let addr = spawn_server(status, "teapot").await;
    let endpoint = http_endpoint(format!("http://{addr}/"), vec![418], None);

    let pool = KafkaPool::new();
    let outcome = HttpProbe.probe(&endpoint, &pool, Duration::from_secs(2)).await;
    assert!(outcome.is_ok);
}

#[tokio::test]
async fn missing_keyword_fails_even_on_ok_status() {
    let status = Arc::new(AtomicU16::new(200));
    let addr = spawn_server(status, "all systems nominal").await;
    let endpoint = http_endpoint(format!("http://{addr}/"), vec![], Some("degraded".to_string()));

    let pool = KafkaPool::new();
    let outcome = HttpProbe.probe(&endpoint, &pool, Duration::from_secs(2)).await;
    assert!(!outcome.is_ok);
    assert_eq!(outcome.failure_reason.as_deref(), Some("missing_keyword"));
}

#[tokio::test]
async fn present_keyword_passes() {
    let status = Arc::new(AtomicU16::new(200));
    let addr = spawn_server(status, "all systems nominal").await;
    let endpoint = http_endpoint(format!("http://{addr}/"), vec![], Some("nominal".to_string()));

    let pool = KafkaPool::new();
    let outcome = HttpProbe.probe(&endpoint, &pool, Duration::from_secs(2)).await;
    assert!(outcome.is_ok);
}

#[tokio::test]
async fn connection_refused_reports_connect_failure() {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    let endpoint = http_endpoint(format!("http://{addr}/"), vec![], None);

    let pool = KafkaPool::new();
    let outcome = HttpProbe.probe(&endpoint, &pool, Duration::from_secs(2)).await;
    assert!(!outcome.is_ok);
    assert!(outcome.failure_reason.is_some());
}
