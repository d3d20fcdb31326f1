//! Exercises `TcpProbe` against a real local listener instead of mocking the
//! network — the probe executors have no seam for injecting a fake
//! connector, so this is the only way to cover the actual connect/timeout
//! behavior end to end.

use std::time::Duration;

use endpoint_monitor::kafka_pool::KafkaPool;
use endpoint_monitor::probe::{ProbeExecutor, TcpProbe};
use endpoint_monitor::types::{Endpoint, EndpointDetail, Status};
use tokio::net::TcpListener;

fn tcp_endpoint(host: &str, port: u16) -> Endpoint {
    Endpoint {
        id: 1,
        name: "tcp-check".to_string(),
        url: host.to_string(),
        heartbeat_interval_seconds: 10,
        retries: 1,
        upside_down: false,
        paused: false,
        retries_failed_so_far: 0,
        status: Status::Unknown,
        last_checked: None,
        detail: EndpointDetail::Tcp { port },
    }
}

#[tokio::test]
async fn connects_successfully_to_an_open_port() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        loop {
            if listener.accept().await.is_err() {
                return;
            }
        }
    });

    let pool = KafkaPool::new();
    let endpoint = tcp_endpoint(&format!("http://{}", addr.ip()), addr.port());
    let outcome = TcpProbe.probe(&endpoint, &pool, Duration::from_secs(2)).await;

    assert!(outcome.is_ok);
    assert!(outcome.response_time_ms >= 0.0);
}

#[tokio::test]
async fn fails_against_a_closed_port() {
    let pool = KafkaPool::new();
    // Bind then immediately drop to get a port nothing is listening on.
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let endpoint = tcp_endpoint(&format!("http://{}", addr.ip()), addr.port());
    let outcome = TcpProbe.probe(&endpoint, &pool, Duration::from_secs(2)).await;

    assert!(!outcome.is_ok);
    assert!(outcome.failure_reason.is_some());
}

#[tokio::test]
async fn wrong_endpoint_kind_fails_without_connecting() {
    let pool = KafkaPool::new();
    let mut endpoint = tcp_endpoint("http://127.0.0.1", 9);
    endpoint.detail = EndpointDetail::Ping;

    let outcome = TcpProbe.probe(&endpoint, &pool, Duration::from_secs(1)).await;
    assert!(!outcome.is_ok);
    assert_eq!(outcome.failure_reason.as_deref(), Some("endpoint is not tcp"));
}
