//! Ordered-election failover (spec.md §4.12, §8 scenario 3): a lower-order
//! active peer blocks promotion, a peer already `promoting` blocks
//! promotion, and in the absence of both, promotion proceeds and resets the
//! failure counter.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use endpoint_monitor::failover::{FailoverController, PromotionHandle};
use endpoint_monitor::store::Store;
use endpoint_monitor::sync::client::SyncClient;
use endpoint_monitor::types::{InstanceId, InstanceStatus, MonitoringInstance};
use tempfile::NamedTempFile;

async fn test_store() -> Arc<Store> {
    let file = NamedTempFile::new().unwrap();
    let path = format!("sqlite://{}", file.path().display());
    Arc::new(Store::connect(&path).await.unwrap())
}

fn instance(id: InstanceId, order: u32, status: InstanceStatus, heartbeat: chrono::DateTime<Utc>) -> MonitoringInstance {
    MonitoringInstance {
        instance_id: id,
        name: format!("instance-{order}"),
        location: None,
        sync_url: None,
        failover_order: order,
        last_heartbeat: heartbeat,
        status,
        capabilities: vec![],
        system_info: None,
    }
}

struct RecordingPromoter(Arc<AtomicBool>);

#[async_trait]
impl PromotionHandle for RecordingPromoter {
    async fn promote_self(&self) {
        self.0.store(true, Ordering::SeqCst);
    }
}

fn controller(store: Arc<Store>, self_id: InstanceId, self_order: u32, promoted: Arc<AtomicBool>) -> Arc<FailoverController> {
    let sync_client = SyncClient::new(
        store.clone(),
        "http://primary.invalid:3001".to_string(),
        "secret".to_string(),
        self_id,
        "dependent".to_string(),
        Some("us".to_string()),
        self_order,
    );
    FailoverController::new(
        store,
        sync_client,
        "http://primary.invalid:3001".to_string(),
        self_id,
        self_order,
        Arc::new(RecordingPromoter(promoted)),
    )
}

#[tokio::test(start_paused = true)]
async fn does_not_promote_while_a_lower_order_peer_is_fresh() {
    let store = test_store().await;
    let self_id = InstanceId::new();
    let primary_id = InstanceId::new();

    // primary still has a fresher, lower-order heartbeat in the cache even
    // though /health is failing — e.g. it's overloaded, not dead.
    store
        .upsert_instance(&instance(primary_id, 0, InstanceStatus::Active, Utc::now()))
        .await
        .unwrap();
    store
        .upsert_instance(&instance(self_id, 1, InstanceStatus::Active, Utc::now()))
        .await
        .unwrap();

    let promoted = Arc::new(AtomicBool::new(false));
    let controller = controller(store.clone(), self_id, 1, promoted.clone());
    controller.force_promotion().await;

    assert!(!promoted.load(Ordering::SeqCst));
    let self_row = store.get_instance(self_id).await.unwrap().unwrap();
    assert_eq!(self_row.status, InstanceStatus::Active);
}

#[tokio::test(start_paused = true)]
async fn does_not_promote_while_another_instance_is_already_promoting() {
    let store = test_store().await;
    let self_id = InstanceId::new();
    let peer_id = InstanceId::new();

    // peer has a higher order (not a blocking liveness peer) but has
    // already claimed the promotion slot.
    store
        .upsert_instance(&instance(peer_id, 2, InstanceStatus::Promoting, Utc::now()))
        .await
        .unwrap();
    store
        .upsert_instance(&instance(self_id, 1, InstanceStatus::Active, Utc::now()))
        .await
        .unwrap();

    let promoted = Arc::new(AtomicBool::new(false));
    let controller = controller(store.clone(), self_id, 1, promoted.clone());
    controller.force_promotion().await;

    assert!(!promoted.load(Ordering::SeqCst));
}

#[tokio::test(start_paused = true)]
async fn promotes_when_no_peer_blocks_and_resets_failure_state() {
    let store = test_store().await;
    let self_id = InstanceId::new();
    let stale_primary_id = InstanceId::new();

    // primary's cached registry row is stale (no heartbeat for an hour) so
    // it no longer blocks promotion.
    store
        .upsert_instance(&instance(
            stale_primary_id,
            0,
            InstanceStatus::Active,
            Utc::now() - chrono::Duration::hours(1),
        ))
        .await
        .unwrap();
    store
        .upsert_instance(&instance(self_id, 1, InstanceStatus::Active, Utc::now()))
        .await
        .unwrap();

    let promoted = Arc::new(AtomicBool::new(false));
    let controller = controller(store.clone(), self_id, 1, promoted.clone());
    controller.force_promotion().await;

    assert!(promoted.load(Ordering::SeqCst));
    let self_row = store.get_instance(self_id).await.unwrap().unwrap();
    assert_eq!(self_row.status, InstanceStatus::Active);
}
