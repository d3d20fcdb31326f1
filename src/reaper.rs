//! # Instance-health reaper (C13)
//!
//! Runs only on the primary. Every 2 minutes, marks `active` instances
//! `inactive` after 5 minutes without a heartbeat. Orthogonal to the
//! aggregator: aggregated rows are not removed for inactive instances
//! (spec.md §4.13).

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tracing::{info, warn};

use crate::store::Store;

const SCAN_INTERVAL: Duration = Duration::from_secs(120);
const STALE_AFTER: chrono::Duration = chrono::Duration::minutes(5);

pub struct Reaper {
    store: Arc<Store>,
}

impl Reaper {
    pub fn new(store: Arc<Store>) -> Self {
        Self { store }
    }

    pub async fn run(self: Arc<Self>) {
        loop {
            tokio::time::sleep(SCAN_INTERVAL).await;
            if let Err(e) = self.scan_once().await {
                warn!(error = %e, "reaper scan failed");
            }
        }
    }

    async fn scan_once(&self) -> crate::error::MonitorResult<()> {
        let cutoff = Utc::now() - STALE_AFTER;
        let reaped = self.store.reap_stale_instances(cutoff).await?;
        if !reaped.is_empty() {
            info!(count = reaped.len(), "reaped stale instances");
        }
        Ok(())
    }
}
