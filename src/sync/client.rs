//! # Sync protocol — client (C10)
//!
//! Runs only on dependents. Registers with the primary, periodically
//! refreshes endpoint config, and reports probe outcomes event-driven with
//! a 2s debounce — "a single long-lived task reading a channel with a
//! timer", per spec.md §9, rather than ad-hoc promise chains.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use reqwest::StatusCode;
use tokio::sync::{Mutex, Notify, RwLock};
use tokio::time::sleep;
use tracing::{info, warn};

use crate::error::{MonitorError, MonitorResult};
use crate::scheduler::Scheduler;
use crate::store::Store;
use crate::types::{InstanceId, ProbeOutcome, SystemInfo};

use super::envelope::SyncEnvelope;
use super::wire::{
    ConnectionStatus, HeartbeatPayload, HeartbeatResponse, ProbeOutcomeWire, RegisterRequest,
    RegisterResponse, SystemMetrics,
};
use crate::types::MonitoringInstance;

const REGISTER_HEALTH_TIMEOUT: Duration = Duration::from_secs(5);
const REGISTER_TIMEOUT: Duration = Duration::from_secs(10);
const ENDPOINTS_TIMEOUT: Duration = Duration::from_secs(10);
const HEARTBEAT_TIMEOUT: Duration = Duration::from_secs(10);
const INSTANCES_TIMEOUT: Duration = Duration::from_secs(10);
const DEBOUNCE: Duration = Duration::from_secs(2);

pub struct SyncClient {
    http: reqwest::Client,
    primary_url: String,
    shared_secret: String,
    instance_id: InstanceId,
    instance_name: String,
    location: Option<String>,
    failover_order: u32,
    token: RwLock<Option<String>>,
    pending: Mutex<Vec<ProbeOutcome>>,
    debounce_notify: Notify,
    last_heartbeat_success: RwLock<Option<chrono::DateTime<Utc>>>,
    heartbeat_failures: AtomicU32,
    store: Arc<Store>,
    scheduler: RwLock<Option<Arc<Scheduler>>>,
}

impl SyncClient {
    pub fn new(
        store: Arc<Store>,
        primary_url: String,
        shared_secret: String,
        instance_id: InstanceId,
        instance_name: String,
        location: Option<String>,
        failover_order: u32,
    ) -> Arc<Self> {
        Arc::new(Self {
            http: reqwest::Client::new(),
            primary_url,
            shared_secret,
            instance_id,
            instance_name,
            location,
            failover_order,
            token: RwLock::new(None),
            pending: Mutex::new(Vec::new()),
            debounce_notify: Notify::new(),
            last_heartbeat_success: RwLock::new(None),
            heartbeat_failures: AtomicU32::new(0),
            store,
            scheduler: RwLock::new(None),
        })
    }

    pub async fn attach_scheduler(&self, scheduler: Arc<Scheduler>) {
        *self.scheduler.write().await = Some(scheduler);
    }

    /// 1. GET `/health` within 5s, then POST `/register` within 10s.
    pub async fn register_with_primary(&self) -> MonitorResult<()> {
        let health_url = format!("{}/health", self.primary_url);
        self.http
            .get(&health_url)
            .timeout(REGISTER_HEALTH_TIMEOUT)
            .send()
            .await
            .map_err(MonitorError::SyncTransport)?;

        let req = RegisterRequest {
            instance_id: self.instance_id.as_uuid(),
            instance_name: self.instance_name.clone(),
            location: self.location.clone(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            capabilities: vec!["http".into(), "ping".into(), "tcp".into(), "kafka".into()],
            failover_order: self.failover_order,
            public_endpoint: None,
            shared_secret: self.shared_secret.clone(),
            system_info: local_system_info(),
        };

        let register_url = format!("{}/api/sync/register", self.primary_url);
        let response = self
            .http
            .post(&register_url)
            .timeout(REGISTER_TIMEOUT)
            .json(&req)
            .send()
            .await
            .map_err(MonitorError::SyncTransport)?;

        let envelope: SyncEnvelope<RegisterResponse> = response
            .json()
            .await
            .map_err(MonitorError::SyncTransport)?;
        let Some(data) = envelope.data else {
            return Err(MonitorError::Auth(envelope.error.unwrap_or_else(|| "register failed".into())));
        };

        *self.token.write().await = Some(data.token);
        info!(primary = %self.primary_url, "registered with primary");
        Ok(())
    }

    /// 2. GET `/endpoints`, reconciling local schedules. On 401, re-register
    /// once and retry.
    pub async fn fetch_endpoints_from_primary(&self) -> MonitorResult<Vec<crate::types::Endpoint>> {
        let url = format!("{}/api/sync/endpoints", self.primary_url);
        let response = self.authed_get(&url, ENDPOINTS_TIMEOUT).await?;

        let envelope: SyncEnvelope<Vec<crate::types::Endpoint>> = response
            .json()
            .await
            .map_err(MonitorError::SyncTransport)?;
        let endpoints = envelope.data.unwrap_or_default();

        if let Some(scheduler) = self.scheduler.read().await.as_ref() {
            let current_ids: Vec<i64> = endpoints.iter().map(|e| e.id).collect();
            // Stop scheduling for synced endpoints no longer present.
            for row in self.store.list_endpoints(true).await? {
                if !current_ids.contains(&row.id) {
                    scheduler.stop(row.id);
                }
            }
            for endpoint in &endpoints {
                self.store.upsert_endpoint(endpoint).await?;
                if !endpoint.paused {
                    scheduler.start(endpoint.clone());
                }
            }
        }

        Ok(endpoints)
    }

    async fn authed_get(&self, url: &str, timeout: Duration) -> MonitorResult<reqwest::Response> {
        if self.token.read().await.is_none() {
            self.register_with_primary().await?;
        }
        let token = self.token.read().await.clone().unwrap_or_default();
        let response = self
            .http
            .get(url)
            .bearer_auth(&token)
            .timeout(timeout)
            .send()
            .await
            .map_err(MonitorError::SyncTransport)?;
        if response.status() == StatusCode::UNAUTHORIZED {
            self.register_with_primary().await?;
            let token = self.token.read().await.clone().unwrap_or_default();
            return self
                .http
                .get(url)
                .bearer_auth(&token)
                .timeout(timeout)
                .send()
                .await
                .map_err(MonitorError::SyncTransport);
        }
        Ok(response)
    }

    /// GET `/instances` and cache the registry locally. The failover
    /// controller (C12) has no way to reach the primary's live registry
    /// once `/health` is failing, so it relies on this periodically
    /// refreshed local cache instead (spec.md §4.12's "query the instance
    /// registry" step).
    pub async fn refresh_instance_registry(&self) -> MonitorResult<()> {
        let url = format!("{}/api/sync/instances", self.primary_url);
        let response = self.authed_get(&url, INSTANCES_TIMEOUT).await?;
        let envelope: SyncEnvelope<Vec<MonitoringInstance>> = response
            .json()
            .await
            .map_err(MonitorError::SyncTransport)?;
        for instance in envelope.data.unwrap_or_default() {
            self.store.upsert_instance(&instance).await?;
        }
        Ok(())
    }

    /// Periodic endpoint and instance-registry refresh loop, every
    /// `sync_interval`.
    pub async fn run_refresh_loop(self: Arc<Self>, sync_interval: Duration) {
        loop {
            if let Err(e) = self.fetch_endpoints_from_primary().await {
                warn!(error = %e, "endpoint refresh failed");
            }
            if let Err(e) = self.refresh_instance_registry().await {
                warn!(error = %e, "instance registry refresh failed");
            }
            sleep(sync_interval).await;
        }
    }

    /// Push a locally produced outcome into the pending buffer and kick the
    /// debounce timer if this is the first item since the last drain.
    pub async fn enqueue_outcome(&self, outcome: ProbeOutcome) {
        let mut pending = self.pending.lock().await;
        let was_empty = pending.is_empty();
        pending.push(outcome);
        drop(pending);
        if was_empty {
            self.debounce_notify.notify_one();
        }
    }

    /// Single long-lived task: waits for the first enqueue, sleeps 2s, then
    /// sends a heartbeat with whatever accumulated. No heartbeat is sent if
    /// the buffer is empty when the timer fires.
    pub async fn run_debounce_loop(self: Arc<Self>) {
        loop {
            self.debounce_notify.notified().await;
            sleep(DEBOUNCE).await;
            let batch: Vec<ProbeOutcome> = {
                let mut pending = self.pending.lock().await;
                std::mem::take(&mut *pending)
            };
            if batch.is_empty() {
                continue;
            }
            self.send_heartbeat(batch).await;
        }
    }

    async fn send_heartbeat(&self, batch: Vec<ProbeOutcome>) {
        let monitoring_results: Vec<ProbeOutcomeWire> = batch.iter().map(ProbeOutcomeWire::from).collect();
        let payload = HeartbeatPayload {
            instance_id: self.instance_id.as_uuid(),
            timestamp: Utc::now(),
            status: "healthy".to_string(),
            uptime: 0,
            monitoring_results,
            system_metrics: SystemMetrics {
                cpu_usage: 0.0,
                memory_usage: 0.0,
                disk_usage: 0.0,
                active_endpoints: batch.len() as u32,
            },
            connection_status: ConnectionStatus {
                primary_reachable: true,
                last_sync_success: *self.last_heartbeat_success.read().await,
                sync_errors: self.heartbeat_failures.load(Ordering::Relaxed),
                latency: None,
            },
        };

        let result = self.put_heartbeat(&payload).await;
        // Buffer is cleared on send regardless of outcome: at-most-once
        // delivery of historical outcomes, per spec.md §5 and §9's open
        // question (matches the source's behavior).
        match result {
            Ok(()) => {
                *self.last_heartbeat_success.write().await = Some(Utc::now());
                self.heartbeat_failures.store(0, Ordering::Relaxed);
            }
            Err(e) => {
                warn!(error = %e, "heartbeat failed");
                self.heartbeat_failures.fetch_add(1, Ordering::Relaxed);
            }
        }
    }

    async fn put_heartbeat(&self, payload: &HeartbeatPayload) -> MonitorResult<()> {
        if self.token.read().await.is_none() {
            self.register_with_primary().await?;
        }
        let token = self.token.read().await.clone().unwrap_or_default();
        let url = format!("{}/api/sync/heartbeat", self.primary_url);
        let response = self
            .http
            .put(&url)
            .bearer_auth(&token)
            .timeout(HEARTBEAT_TIMEOUT)
            .json(payload)
            .send()
            .await
            .map_err(MonitorError::SyncTransport)?;

        if response.status() == StatusCode::UNAUTHORIZED {
            self.register_with_primary().await?;
            return Err(MonitorError::Auth("heartbeat 401, re-registered".into()));
        }
        if !response.status().is_success() {
            return Err(MonitorError::SyncTransport(
                response.error_for_status().unwrap_err(),
            ));
        }
        let _: SyncEnvelope<HeartbeatResponse> = response.json().await.map_err(MonitorError::SyncTransport)?;
        Ok(())
    }
}

fn local_system_info() -> SystemInfo {
    SystemInfo {
        platform: std::env::consts::OS.to_string(),
        arch: std::env::consts::ARCH.to_string(),
        node_version: None,
        memory: 0,
        cpu: String::new(),
        uptime: 0,
    }
}

