//! # Aggregator (C11)
//!
//! On the primary, merges per-instance outcomes into an `AggregatedResult`
//! per endpoint. One `DashMap` entry lock per endpoint is held across an
//! entire heartbeat batch, satisfying the "atomic batch" ordering guarantee
//! in spec.md §5.

use std::sync::Arc;

use chrono::Utc;
use dashmap::DashMap;
use tokio::sync::Mutex;

use crate::error::MonitorResult;
use crate::store::Store;
use crate::types::{AggregatedResult, Consensus, LocationResult, ProbeOutcome};

pub struct Aggregator {
    store: Arc<Store>,
    /// Per-endpoint lock so a whole heartbeat batch applies atomically with
    /// respect to aggregation, even though reads elsewhere may be
    /// concurrent.
    locks: DashMap<i64, Arc<Mutex<()>>>,
}

impl Aggregator {
    pub fn new(store: Arc<Store>) -> Self {
        Self {
            store,
            locks: DashMap::new(),
        }
    }

    fn lock_for(&self, endpoint_id: i64) -> Arc<Mutex<()>> {
        self.locks
            .entry(endpoint_id)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Apply every outcome in one heartbeat batch, grouped by endpoint so
    /// each endpoint's lock is acquired once.
    pub async fn apply_batch(&self, outcomes: &[ProbeOutcome]) -> MonitorResult<()> {
        use std::collections::BTreeMap;
        let mut by_endpoint: BTreeMap<i64, Vec<&ProbeOutcome>> = BTreeMap::new();
        for outcome in outcomes {
            by_endpoint.entry(outcome.endpoint_id).or_default().push(outcome);
        }
        for (endpoint_id, group) in by_endpoint {
            let lock = self.lock_for(endpoint_id);
            let _guard = lock.lock().await;
            for outcome in group {
                self.apply_locked(outcome).await?;
            }
        }
        Ok(())
    }

    pub async fn apply(&self, outcome: &ProbeOutcome) -> MonitorResult<()> {
        let lock = self.lock_for(outcome.endpoint_id);
        let _guard = lock.lock().await;
        self.apply_locked(outcome).await
    }

    async fn apply_locked(&self, outcome: &ProbeOutcome) -> MonitorResult<()> {
        let existing = self.store.get_aggregated(outcome.endpoint_id).await?;

        let mut location_results = match existing {
            Some(agg) => agg.location_results,
            None => Vec::new(),
        };

        let entry = LocationResult {
            instance_id: outcome.instance_id,
            location: outcome.location.clone(),
            status: outcome.status,
            response_time_ms: outcome.response_time_ms,
            last_updated: outcome.timestamp,
        };

        match location_results.iter_mut().find(|r| r.instance_id == outcome.instance_id) {
            Some(slot) => *slot = entry,
            None => location_results.push(entry),
        }

        let total_locations = location_results.len() as u32;
        let successful_locations = location_results
            .iter()
            .filter(|r| r.status == crate::types::Status::Up)
            .count() as u32;
        let avg_response_time_ms = if total_locations > 0 {
            location_results.iter().map(|r| r.response_time_ms).sum::<f64>() / total_locations as f64
        } else {
            0.0
        };
        // Per spec.md §9's open question: min/max are not re-derived from
        // the full set on an instance's departure, only extended forward.
        let min_response_time_ms = location_results
            .iter()
            .map(|r| r.response_time_ms)
            .fold(f64::INFINITY, f64::min);
        let max_response_time_ms = location_results
            .iter()
            .map(|r| r.response_time_ms)
            .fold(f64::NEG_INFINITY, f64::max);

        let consensus = if total_locations == 0 {
            Consensus::Down
        } else if successful_locations == total_locations {
            Consensus::Up
        } else if successful_locations == 0 {
            Consensus::Down
        } else {
            Consensus::Partial
        };

        let aggregated = AggregatedResult {
            endpoint_id: outcome.endpoint_id,
            total_locations,
            successful_locations,
            avg_response_time_ms,
            min_response_time_ms: if min_response_time_ms.is_finite() { min_response_time_ms } else { 0.0 },
            max_response_time_ms: if max_response_time_ms.is_finite() { max_response_time_ms } else { 0.0 },
            consensus,
            location_results,
            updated_at: Utc::now(),
        };

        self.store.put_aggregated(&aggregated).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{EndpointKind, InstanceId, Status};
    use tempfile::NamedTempFile;

    async fn test_store() -> Arc<Store> {
        let file = NamedTempFile::new().unwrap();
        let path = format!("sqlite://{}", file.path().display());
        Arc::new(Store::connect(&path).await.unwrap())
    }

    fn outcome(instance_id: InstanceId, is_ok: bool, rt: f64) -> ProbeOutcome {
        ProbeOutcome::new(1, instance_id, Utc::now(), is_ok, rt, "us".into(), EndpointKind::Http, None, None)
    }

    #[tokio::test]
    async fn partial_consensus_across_three_instances() {
        let store = test_store().await;
        let aggregator = Aggregator::new(store.clone());

        let i1 = InstanceId::new();
        let i2 = InstanceId::new();
        let i3 = InstanceId::new();

        aggregator.apply(&outcome(i1, true, 120.0)).await.unwrap();
        aggregator.apply(&outcome(i2, true, 250.0)).await.unwrap();
        aggregator.apply(&outcome(i3, false, 0.0)).await.unwrap();

        let agg = store.get_aggregated(1).await.unwrap().unwrap();
        assert_eq!(agg.total_locations, 3);
        assert_eq!(agg.successful_locations, 2);
        assert_eq!(agg.consensus, Consensus::Partial);
        assert!((agg.avg_response_time_ms - 123.333).abs() < 0.01);
    }

    #[tokio::test]
    async fn all_up_is_consensus_up() {
        let store = test_store().await;
        let aggregator = Aggregator::new(store.clone());
        let i1 = InstanceId::new();
        aggregator.apply(&outcome(i1, true, 10.0)).await.unwrap();
        let agg = store.get_aggregated(1).await.unwrap().unwrap();
        assert_eq!(agg.consensus, Consensus::Up);
    }
}
