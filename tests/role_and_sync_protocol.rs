//! Cross-module behavior that only shows up once `Store`, `RoleManager`,
//! `NotifierDispatcher`, and the sync JWT helpers are wired together: role
//! transitions persist and are reloaded correctly, and dependents never emit
//! notifications even when a transport is registered.

use std::sync::Arc;

use endpoint_monitor::notifier::{FailingNotifier, LogNotifier, Notifier, NotifierDispatcher};
use endpoint_monitor::role::{Role, RoleManager};
use endpoint_monitor::store::Store;
use endpoint_monitor::sync::jwt;
use endpoint_monitor::types::{Endpoint, EndpointDetail, InstanceId, Status};
use tempfile::NamedTempFile;

async fn test_store() -> Arc<Store> {
    let file = NamedTempFile::new().unwrap();
    let path = format!("sqlite://{}", file.path().display());
    Arc::new(Store::connect(&path).await.unwrap())
}

fn ping_endpoint(id: i64) -> Endpoint {
    Endpoint {
        id,
        name: "pinger".to_string(),
        url: "10.0.0.1".to_string(),
        heartbeat_interval_seconds: 10,
        retries: 1,
        upside_down: false,
        paused: false,
        retries_failed_so_far: 0,
        status: Status::Up,
        last_checked: None,
        detail: EndpointDetail::Ping,
    }
}

#[tokio::test]
async fn promote_to_primary_persists_across_reload() {
    let store = test_store().await;
    let role = RoleManager::load(store.clone()).await.unwrap();
    assert_eq!(role.role().await, Role::Standalone);

    role.promote_to_primary().await.unwrap();
    assert!(role.is_primary().await);

    let reloaded = RoleManager::load(store.clone()).await.unwrap();
    assert_eq!(reloaded.role().await, Role::Primary);
}

#[tokio::test]
async fn demote_to_dependent_clears_primary_flag() {
    let store = test_store().await;
    let role = RoleManager::load(store.clone()).await.unwrap();
    role.promote_to_primary().await.unwrap();

    role.demote_to_dependent("http://primary.local:3001".to_string())
        .await
        .unwrap();

    let reloaded = RoleManager::load(store.clone()).await.unwrap();
    match reloaded.role().await {
        Role::Dependent { primary_sync_url } => assert_eq!(primary_sync_url, "http://primary.local:3001"),
        other => panic!("expected Dependent, got {other:?}"),
    }
    assert!(!reloaded.is_primary().await);
}

#[tokio::test]
async fn dependents_never_emit_even_with_registered_transports() {
    let store = test_store().await;
    let role = Arc::new(RoleManager::load(store.clone()).await.unwrap());
    role.demote_to_dependent("http://primary.local:3001".to_string())
        .await
        .unwrap();

    let transports: Vec<Arc<dyn Notifier>> = vec![Arc::new(LogNotifier)];
    let dispatcher = NotifierDispatcher::new(store.clone(), role.clone(), transports);

    let id = store.upsert_endpoint(&ping_endpoint(0)).await.unwrap();
    let endpoint = store.get_endpoint(id).await.unwrap().unwrap();

    // No panics, no notifier invocation — dependent role gates this out
    // entirely before any transport lookup happens.
    dispatcher.notify_status_change(&endpoint, Status::Down).await;
}

#[tokio::test]
async fn one_failing_transport_does_not_block_another() {
    let store = test_store().await;
    let role = Arc::new(RoleManager::load(store.clone()).await.unwrap());
    // default role is Standalone, which emits.

    let transports: Vec<Arc<dyn Notifier>> = vec![Arc::new(FailingNotifier), Arc::new(LogNotifier)];
    let dispatcher = NotifierDispatcher::new(store.clone(), role, transports);

    let id = store.upsert_endpoint(&ping_endpoint(0)).await.unwrap();
    let endpoint = store.get_endpoint(id).await.unwrap().unwrap();

    // Completes without propagating the failing transport's error.
    dispatcher.notify_status_change(&endpoint, Status::Down).await;
}

#[tokio::test]
async fn jwt_round_trips_instance_claims() {
    let secret = "test-secret-material";
    let instance_id = InstanceId::new();
    let token = jwt::issue(secret, instance_id, "dependent-1").unwrap();

    let claims = jwt::verify(secret, &token).unwrap();
    assert_eq!(claims.instance_id, instance_id);
    assert_eq!(claims.instance_name, "dependent-1");
    assert!(claims.exp > claims.iat);
}

#[tokio::test]
async fn jwt_rejects_tokens_signed_with_a_different_secret() {
    let instance_id = InstanceId::new();
    let token = jwt::issue("secret-a", instance_id, "dependent-1").unwrap();
    assert!(jwt::verify("secret-b", &token).is_err());
}
