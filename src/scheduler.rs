//! # Endpoint scheduler (C5)
//!
//! Owns one cancellable timer per endpoint, satisfying the "at most one
//! timer per endpoint id" invariant via a `DashMap<i64, JoinHandle<()>>` —
//! the mutex-guarded-registry pattern spec.md §9 prescribes in place of
//! module-level globals. `start`/`restart`/`stop` are message-passing
//! methods on the services bundle.

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tracing::{debug, info, warn};

use crate::clock::Clock;
use crate::kafka_pool::KafkaPool;
use crate::notifier::NotifierDispatcher;
use crate::probe::{executor_for, DEFAULT_PROBE_TIMEOUT};
use crate::store::Store;
use crate::sync::client::SyncClient;
use crate::types::{Endpoint, InstanceId, ProbeOutcome, Status};

pub struct Scheduler {
    store: Arc<Store>,
    kafka_pool: Arc<KafkaPool>,
    notifier: Arc<NotifierDispatcher>,
    clock: Arc<dyn Clock>,
    instance_id: InstanceId,
    location: String,
    sync_client: Option<Arc<SyncClient>>,
    timers: DashMap<i64, JoinHandle<()>>,
}

impl Scheduler {
    pub fn new(
        store: Arc<Store>,
        kafka_pool: Arc<KafkaPool>,
        notifier: Arc<NotifierDispatcher>,
        clock: Arc<dyn Clock>,
        instance_id: InstanceId,
        location: String,
        sync_client: Option<Arc<SyncClient>>,
    ) -> Arc<Self> {
        Arc::new(Self {
            store,
            kafka_pool,
            notifier,
            clock,
            instance_id,
            location,
            sync_client,
            timers: DashMap::new(),
        })
    }

    /// Arms a timer for `endpoint.id`, firing ~1s after registration to
    /// avoid stampedes (spec.md §4.5). Replaces any existing timer for the
    /// same id, preserving the "at most one timer" invariant.
    pub fn start(self: &Arc<Self>, endpoint: Endpoint) {
        self.stop_timer_only(endpoint.id);
        let this = self.clone();
        let endpoint_id = endpoint.id;
        let handle = tokio::spawn(async move {
            sleep(Duration::from_secs(1)).await;
            this.run_loop(endpoint_id).await;
        });
        self.timers.insert(endpoint_id, handle);
    }

    /// Cancels and re-reads the endpoint before re-arming: a "hot reload"
    /// after a config change (spec.md §4.5).
    pub async fn restart(self: &Arc<Self>, endpoint_id: i64) {
        self.stop_timer_only(endpoint_id);
        match self.store.get_endpoint(endpoint_id).await {
            Ok(Some(endpoint)) if !endpoint.paused => self.start(endpoint),
            Ok(_) => {}
            Err(e) => warn!(endpoint_id, error = %e, "restart: failed to reload endpoint"),
        }
    }

    /// Cancels the timer and tears down the Kafka pool record for this
    /// endpoint (spec.md §5).
    pub fn stop(&self, endpoint_id: i64) {
        self.stop_timer_only(endpoint_id);
        self.kafka_pool.cleanup(endpoint_id);
    }

    fn stop_timer_only(&self, endpoint_id: i64) {
        if let Some((_, handle)) = self.timers.remove(&endpoint_id) {
            handle.abort();
        }
    }

    async fn run_loop(self: Arc<Self>, endpoint_id: i64) {
        loop {
            let endpoint = match self.store.get_endpoint(endpoint_id).await {
                Ok(Some(e)) => e,
                Ok(None) => {
                    debug!(endpoint_id, "scheduler: endpoint gone, stopping timer");
                    return;
                }
                Err(e) => {
                    warn!(endpoint_id, error = %e, "scheduler: failed to load endpoint");
                    sleep(Duration::from_secs(5)).await;
                    continue;
                }
            };

            if endpoint.paused {
                debug!(endpoint_id, "scheduler: endpoint paused, stopping timer");
                return;
            }

            self.tick(endpoint.clone()).await;

            let interval = Duration::from_secs(endpoint.heartbeat_interval_seconds.max(10));
            sleep(interval).await;
        }
    }

    async fn tick(self: &Arc<Self>, mut endpoint: Endpoint) {
        let executor = executor_for(&endpoint);
        let mut draft = executor
            .probe(&endpoint, &self.kafka_pool, DEFAULT_PROBE_TIMEOUT)
            .await;

        if endpoint.upside_down {
            draft.is_ok = !draft.is_ok;
        }

        let now = self.clock.now();
        let mut notify_status: Option<Status> = None;

        if draft.is_ok {
            if endpoint.status != Status::Up {
                endpoint.status = Status::Up;
                endpoint.retries_failed_so_far = 0;
                notify_status = Some(Status::Up);
            }
        } else {
            endpoint.retries_failed_so_far += 1;
            if endpoint.retries_failed_so_far >= endpoint.failure_threshold() && endpoint.status != Status::Down {
                endpoint.status = Status::Down;
                notify_status = Some(Status::Down);
            }
        }
        endpoint.last_checked = Some(now);

        let outcome = ProbeOutcome::new(
            endpoint.id,
            self.instance_id,
            now,
            draft.is_ok,
            draft.response_time_ms,
            self.location.clone(),
            endpoint.kind(),
            draft.failure_reason,
            draft.metadata,
        );

        if let Err(e) = self.store.append_outcome(&outcome).await {
            warn!(endpoint_id = endpoint.id, error = %e, "failed to persist probe outcome");
        }
        if let Err(e) = self.store.upsert_endpoint(&endpoint).await {
            warn!(endpoint_id = endpoint.id, error = %e, "failed to persist endpoint state");
        }

        if let Some(status) = notify_status {
            self.notifier.notify_status_change(&endpoint, status).await;
        }

        if let Some(sync_client) = &self.sync_client {
            sync_client.enqueue_outcome(outcome).await;
        }

        info!(endpoint_id = endpoint.id, status = %endpoint.status, "probe complete");
    }
}
