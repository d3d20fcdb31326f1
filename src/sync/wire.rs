//! Wire DTOs for the sync RPC surface (spec.md §6), kept separate from the
//! internal snake_case domain types in `types.rs` so the two can evolve
//! independently of the wire's camelCase convention.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{MonitorError, MonitorResult};
use crate::types::{InstanceId, ProbeOutcome, Status, SystemInfo};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterRequest {
    pub instance_id: Uuid,
    pub instance_name: String,
    pub location: Option<String>,
    pub version: String,
    pub capabilities: Vec<String>,
    pub failover_order: u32,
    pub public_endpoint: Option<String>,
    pub shared_secret: String,
    pub system_info: SystemInfo,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterResponse {
    pub token: String,
    pub instance_id: Uuid,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProbeOutcomeWire {
    pub endpoint_id: i64,
    pub instance_id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub is_ok: bool,
    pub response_time: f64,
    pub status: String,
    pub failure_reason: Option<String>,
    pub location: String,
    pub check_type: String,
    pub metadata: Option<serde_json::Value>,
}

impl From<&ProbeOutcome> for ProbeOutcomeWire {
    fn from(o: &ProbeOutcome) -> Self {
        Self {
            endpoint_id: o.endpoint_id,
            instance_id: o.instance_id.as_uuid(),
            timestamp: o.timestamp,
            is_ok: o.is_ok,
            response_time: o.response_time_ms,
            status: match o.status {
                Status::Up => "UP".into(),
                _ => "DOWN".into(),
            },
            failure_reason: o.failure_reason.clone(),
            location: o.location.clone(),
            check_type: crate::store::models::endpoint_kind_str(o.check_type).to_string(),
            metadata: o.metadata.clone(),
        }
    }
}

impl TryFrom<ProbeOutcomeWire> for ProbeOutcome {
    type Error = MonitorError;

    fn try_from(w: ProbeOutcomeWire) -> MonitorResult<Self> {
        let check_type = crate::store::models::parse_endpoint_kind(&w.check_type)?;
        Ok(ProbeOutcome::new(
            w.endpoint_id,
            InstanceId::from(w.instance_id),
            w.timestamp,
            w.is_ok,
            w.response_time,
            w.location,
            check_type,
            w.failure_reason,
            w.metadata,
        ))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SystemMetrics {
    pub cpu_usage: f64,
    pub memory_usage: f64,
    pub disk_usage: f64,
    pub active_endpoints: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionStatus {
    pub primary_reachable: bool,
    pub last_sync_success: Option<DateTime<Utc>>,
    pub sync_errors: u32,
    pub latency: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HeartbeatPayload {
    pub instance_id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub status: String,
    pub uptime: u64,
    pub monitoring_results: Vec<ProbeOutcomeWire>,
    pub system_metrics: SystemMetrics,
    pub connection_status: ConnectionStatus,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HeartbeatResponse {
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InstanceOrder {
    pub instance_id: Uuid,
    pub order: u32,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FailoverOrderUpdate {
    pub instance_orders: Vec<InstanceOrder>,
}
