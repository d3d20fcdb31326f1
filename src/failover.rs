//! # Failover controller (C12)
//!
//! Runs only on dependents. Polls the primary's `/health` every 30s; on 3
//! consecutive failures, runs the ordered-election promotion protocol in
//! spec.md §4.12.

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;
use tokio::time::sleep;
use tracing::{info, warn};

use crate::store::Store;
use crate::sync::client::SyncClient;
use crate::types::{InstanceId, InstanceStatus};

const POLL_INTERVAL: Duration = Duration::from_secs(30);
const HEALTH_TIMEOUT: Duration = Duration::from_secs(5);
const FAILURE_THRESHOLD: u32 = 3;
const PROMOTION_HOLD: Duration = Duration::from_secs(5);
const FRESHNESS_WINDOW_INITIAL: chrono::Duration = chrono::Duration::minutes(5);
const FRESHNESS_WINDOW_RECHECK: chrono::Duration = chrono::Duration::minutes(2);

/// Callback invoked once the controller decides to promote itself: stop
/// C10/C12, flip the role, and start C9/C11/C13. Implemented by the
/// services bundle (`services.rs`) so this module stays decoupled from
/// concrete subsystem wiring.
#[async_trait]
pub trait PromotionHandle: Send + Sync {
    async fn promote_self(&self);
}

pub struct FailoverController {
    store: Arc<Store>,
    sync_client: Arc<SyncClient>,
    http: reqwest::Client,
    primary_url: String,
    self_instance_id: InstanceId,
    self_order: u32,
    consecutive_failures: AtomicU32,
    last_primary_contact: RwLock<Option<chrono::DateTime<Utc>>>,
    promoter: Arc<dyn PromotionHandle>,
    stopped: AtomicBool,
}

impl FailoverController {
    pub fn new(
        store: Arc<Store>,
        sync_client: Arc<SyncClient>,
        primary_url: String,
        self_instance_id: InstanceId,
        self_order: u32,
        promoter: Arc<dyn PromotionHandle>,
    ) -> Arc<Self> {
        Arc::new(Self {
            store,
            sync_client,
            http: reqwest::Client::new(),
            primary_url,
            self_instance_id,
            self_order,
            consecutive_failures: AtomicU32::new(0),
            last_primary_contact: RwLock::new(None),
            promoter,
            stopped: AtomicBool::new(false),
        })
    }

    /// Runs until this instance promotes itself, then returns — a promoted
    /// primary has no `/health` of its own to poll.
    pub async fn run(self: Arc<Self>) {
        loop {
            sleep(POLL_INTERVAL).await;
            self.poll_once().await;
            if self.stopped.load(Ordering::Relaxed) {
                info!("failover: stopping poll loop after promotion");
                return;
            }
        }
    }

    async fn poll_once(self: &Arc<Self>) {
        let url = format!("{}/health", self.primary_url);
        let reachable = self
            .http
            .get(&url)
            .timeout(HEALTH_TIMEOUT)
            .send()
            .await
            .map(|r| r.status().is_success())
            .unwrap_or(false);

        if reachable {
            *self.last_primary_contact.write().await = Some(Utc::now());
            self.consecutive_failures.store(0, Ordering::Relaxed);
            return;
        }

        let failures = self.consecutive_failures.fetch_add(1, Ordering::Relaxed) + 1;
        if failures >= FAILURE_THRESHOLD {
            self.attempt_promotion().await;
        }
    }

    /// Whether another active instance with a lower `failover_order` has
    /// heartbeated within `window`.
    async fn lower_order_peer_fresh(&self, window: chrono::Duration) -> bool {
        let instances = match self.store.list_instances().await {
            Ok(i) => i,
            Err(e) => {
                warn!(error = %e, "failover: failed to read cached instance registry");
                return true; // fail safe: assume a peer might exist
            }
        };
        let cutoff = Utc::now() - window;
        instances.iter().any(|i| {
            i.instance_id != self.self_instance_id
                && i.status == InstanceStatus::Active
                && i.failover_order < self.self_order
                && i.last_heartbeat >= cutoff
        })
    }

    async fn other_instance_promoting(&self) -> bool {
        let instances = match self.store.list_instances().await {
            Ok(i) => i,
            Err(_) => return true,
        };
        instances
            .iter()
            .any(|i| i.instance_id != self.self_instance_id && i.status == InstanceStatus::Promoting)
    }

    async fn attempt_promotion(self: &Arc<Self>) {
        if self.lower_order_peer_fresh(FRESHNESS_WINDOW_INITIAL).await {
            info!("failover: lower-order active peer present, not promoting");
            return;
        }
        if self.other_instance_promoting().await {
            info!("failover: another instance already promoting, not promoting");
            return;
        }

        if let Err(e) = self
            .store
            .set_instance_status(self.self_instance_id, InstanceStatus::Promoting)
            .await
        {
            warn!(error = %e, "failover: failed to mark self promoting");
            return;
        }

        sleep(PROMOTION_HOLD).await;

        if self.lower_order_peer_fresh(FRESHNESS_WINDOW_RECHECK).await {
            info!("failover: lower-order peer appeared during hold, reverting");
            let _ = self
                .store
                .set_instance_status(self.self_instance_id, InstanceStatus::Active)
                .await;
            return;
        }

        info!("failover: promoting self to primary");
        self.promoter.promote_self().await;
        self.stopped.store(true, Ordering::Relaxed);
        let _ = self
            .store
            .set_instance_status(self.self_instance_id, InstanceStatus::Active)
            .await;
        self.reset_failover_state();
    }

    /// Manual override: set failure count to threshold and run the same
    /// protocol (spec.md §4.12).
    pub async fn force_promotion(self: &Arc<Self>) {
        self.consecutive_failures.store(FAILURE_THRESHOLD, Ordering::Relaxed);
        self.attempt_promotion().await;
    }

    pub fn reset_failover_state(&self) {
        self.consecutive_failures.store(0, Ordering::Relaxed);
    }

    /// Kept for symmetry with `force_promotion`/`reset_failover_state`; the
    /// sync client is shared with the endpoint-refresh loop, not owned
    /// exclusively by this controller.
    pub fn sync_client(&self) -> &Arc<SyncClient> {
        &self.sync_client
    }
}
