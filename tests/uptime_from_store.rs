//! Ties the persisted outcome stream to the pure uptime calculator: write a
//! run of probe outcomes through `Store`, read them back, and check the
//! report reflects an obvious down-then-up pattern.

use std::time::Duration;

use chrono::Utc;
use endpoint_monitor::store::Store;
use endpoint_monitor::types::{Endpoint, EndpointDetail, EndpointKind, InstanceId, ProbeOutcome, Status};
use endpoint_monitor::uptime::compute_uptime;
use tempfile::NamedTempFile;

async fn test_store() -> Store {
    let file = NamedTempFile::new().unwrap();
    let path = format!("sqlite://{}", file.path().display());
    Store::connect(&path).await.unwrap()
}

#[tokio::test]
async fn mostly_up_run_with_one_failure_reports_partial_uptime() {
    let store = test_store().await;
    let endpoint = Endpoint {
        id: 0,
        name: "site".to_string(),
        url: "https://example.invalid".to_string(),
        heartbeat_interval_seconds: 60,
        retries: 1,
        upside_down: false,
        paused: false,
        retries_failed_so_far: 0,
        status: Status::Up,
        last_checked: None,
        detail: EndpointDetail::Ping,
    };
    let endpoint_id = store.upsert_endpoint(&endpoint).await.unwrap();
    let instance = InstanceId::new();
    let base = Utc::now() - chrono::Duration::minutes(10);
    let interval = Duration::from_secs(60);

    let pattern = [true, true, false, true, true];
    for (i, ok) in pattern.into_iter().enumerate() {
        let outcome = ProbeOutcome::new(
            endpoint_id,
            instance,
            base + chrono::Duration::seconds(60 * i as i64),
            ok,
            30.0,
            "us-east".to_string(),
            EndpointKind::Ping,
            if ok { None } else { Some("timeout".to_string()) },
            None,
        );
        store.append_outcome(&outcome).await.unwrap();
    }

    let since = base - chrono::Duration::seconds(1);
    let outcomes = store.outcomes_since(endpoint_id, since).await.unwrap();
    assert_eq!(outcomes.len(), pattern.len());

    let report = compute_uptime(&outcomes, interval, Duration::from_secs(3600));
    assert!(report.uptime_percent > 0.0 && report.uptime_percent < 100.0);
    assert!(report.monitoring_coverage_percent > 0.0);
    assert!(report.avg_response_time_ms > 0.0);
}

#[tokio::test]
async fn no_outcomes_in_window_report_zeroed() {
    let report = compute_uptime(&[], Duration::from_secs(60), Duration::from_secs(3600));
    assert_eq!(report.uptime_percent, 0.0);
    assert_eq!(report.monitoring_coverage_percent, 0.0);
}
