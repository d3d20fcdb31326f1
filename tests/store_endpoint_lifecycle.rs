//! Endpoint persistence lifecycle through the public `Store` API: insert,
//! reload, update via id-carrying upsert, pause/resume visibility in
//! `list_endpoints`, and outcome append/read-back ordering.

use chrono::Utc;
use endpoint_monitor::store::Store;
use endpoint_monitor::types::{Endpoint, EndpointDetail, ProbeOutcome, Status};
use tempfile::NamedTempFile;

async fn test_store() -> Store {
    let file = NamedTempFile::new().unwrap();
    let path = format!("sqlite://{}", file.path().display());
    Store::connect(&path).await.unwrap()
}

fn http_endpoint(name: &str) -> Endpoint {
    Endpoint {
        id: 0,
        name: name.to_string(),
        url: "https://example.invalid/health".to_string(),
        heartbeat_interval_seconds: 30,
        retries: 2,
        upside_down: false,
        paused: false,
        retries_failed_so_far: 0,
        status: Status::Unknown,
        last_checked: None,
        detail: EndpointDetail::Http {
            method: "GET".to_string(),
            headers: Default::default(),
            body: None,
            ok_http_statuses: vec![200],
            keyword_search: None,
            check_cert_expiry: false,
            cert_expiry_threshold_days: 14,
            mtls: None,
        },
    }
}

#[tokio::test]
async fn insert_then_reload_round_trips_detail() {
    let store = test_store().await;
    let id = store.upsert_endpoint(&http_endpoint("api")).await.unwrap();
    assert!(id > 0);

    let reloaded = store.get_endpoint(id).await.unwrap().expect("endpoint present");
    assert_eq!(reloaded.name, "api");
    assert_eq!(reloaded.heartbeat_interval_seconds, 30);
    assert!(matches!(reloaded.detail, EndpointDetail::Http { .. }));
}

#[tokio::test]
async fn heartbeat_interval_is_floored_at_ten_seconds() {
    let store = test_store().await;
    let mut endpoint = http_endpoint("fast");
    endpoint.heartbeat_interval_seconds = 1;
    let id = store.upsert_endpoint(&endpoint).await.unwrap();

    let reloaded = store.get_endpoint(id).await.unwrap().unwrap();
    assert_eq!(reloaded.heartbeat_interval_seconds, 10);
}

#[tokio::test]
async fn paused_endpoints_excluded_unless_requested() {
    let store = test_store().await;
    let mut endpoint = http_endpoint("paused-one");
    endpoint.paused = true;
    store.upsert_endpoint(&endpoint).await.unwrap();

    let active_only = store.list_endpoints(false).await.unwrap();
    assert!(active_only.is_empty());

    let including_paused = store.list_endpoints(true).await.unwrap();
    assert_eq!(including_paused.len(), 1);
}

#[tokio::test]
async fn update_preserves_id_and_does_not_duplicate() {
    let store = test_store().await;
    let id = store.upsert_endpoint(&http_endpoint("svc")).await.unwrap();

    let mut endpoint = store.get_endpoint(id).await.unwrap().unwrap();
    endpoint.paused = true;
    let same_id = store.upsert_endpoint(&endpoint).await.unwrap();
    assert_eq!(same_id, id);

    let all = store.list_endpoints(true).await.unwrap();
    assert_eq!(all.len(), 1);
    assert!(all[0].paused);
}

#[tokio::test]
async fn outcomes_are_returned_in_ascending_timestamp_order() {
    use endpoint_monitor::types::{EndpointKind, InstanceId};

    let store = test_store().await;
    let id = store.upsert_endpoint(&http_endpoint("ordered")).await.unwrap();
    let instance = InstanceId::new();
    let base = Utc::now() - chrono::Duration::minutes(10);

    for (i, ok) in [true, false, true].into_iter().enumerate() {
        let outcome = ProbeOutcome::new(
            id,
            instance,
            base + chrono::Duration::minutes(i as i64),
            ok,
            50.0,
            "us-east".to_string(),
            EndpointKind::Http,
            None,
            None,
        );
        store.append_outcome(&outcome).await.unwrap();
    }

    let since = base - chrono::Duration::minutes(1);
    let outcomes = store.outcomes_since(id, since).await.unwrap();
    assert_eq!(outcomes.len(), 3);
    assert!(outcomes.windows(2).all(|w| w[0].timestamp <= w[1].timestamp));
    assert!(!outcomes[1].is_ok);
}

#[tokio::test]
async fn instance_identity_is_idempotent_across_calls() {
    let store = test_store().await;
    let first = store.init_identity(None).await.unwrap();
    let second = store.init_identity(None).await.unwrap();
    assert_eq!(first.instance_id, second.instance_id);
    assert_eq!(first.jwt_secret, second.jwt_secret);
}
