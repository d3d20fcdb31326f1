//! # Core Types
//!
//! Fundamental types shared across every component: endpoint configuration,
//! probe outcomes, aggregated consensus rows, and the monitoring-instance
//! registry entries.

use std::collections::HashMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Identifier for a monitoring instance (one running process).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct InstanceId(Uuid);

impl InstanceId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for InstanceId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for InstanceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<Uuid> for InstanceId {
    fn from(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

impl std::str::FromStr for InstanceId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

/// The kind of check an endpoint runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EndpointKind {
    Http,
    Ping,
    Tcp,
    KafkaProducer,
    KafkaConsumer,
}

impl fmt::Display for EndpointKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            EndpointKind::Http => "http",
            EndpointKind::Ping => "ping",
            EndpointKind::Tcp => "tcp",
            EndpointKind::KafkaProducer => "kafka_producer",
            EndpointKind::KafkaConsumer => "kafka_consumer",
        };
        write!(f, "{s}")
    }
}

/// Normalized endpoint status. Anything that isn't `Up` coerces to `Down`
/// per the invariant in spec §3.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Status {
    Up,
    Down,
    #[serde(alias = "unknown", alias = "Unknown")]
    Unknown,
}

impl Status {
    /// Normalize to the wire-level `{UP, DOWN}` set used by `ProbeOutcome`.
    pub fn normalized(self) -> Status {
        match self {
            Status::Up => Status::Up,
            _ => Status::Down,
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Status::Up => "UP",
            Status::Down => "DOWN",
            Status::Unknown => "unknown",
        };
        write!(f, "{s}")
    }
}

/// mTLS material optionally attached to HTTP and Kafka endpoints.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct MtlsConfig {
    pub cert_pem: String,
    pub key_pem: String,
    pub ca_pem: Option<String>,
}

/// Type-specific extension fields for an `Endpoint`. Kept as a single enum
/// (rather than optional fields scattered across `Endpoint`) so a given
/// endpoint can only carry the extensions that make sense for its kind.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EndpointDetail {
    Http {
        method: String,
        headers: HashMap<String, String>,
        body: Option<String>,
        ok_http_statuses: Vec<u16>,
        keyword_search: Option<String>,
        check_cert_expiry: bool,
        cert_expiry_threshold_days: u32,
        mtls: Option<MtlsConfig>,
    },
    Ping,
    Tcp {
        port: u16,
    },
    KafkaProducer {
        topic: String,
        message: Option<String>,
        client_config: serde_json::Map<String, serde_json::Value>,
        mtls: Option<MtlsConfig>,
    },
    KafkaConsumer {
        topic: String,
        client_config: serde_json::Map<String, serde_json::Value>,
        auto_commit: bool,
        single_shot: bool,
        mtls: Option<MtlsConfig>,
    },
}

/// A user-configured monitoring target. `id` is immutable; everything else
/// is mutable config pushed from the primary to dependents.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Endpoint {
    pub id: i64,
    pub name: String,
    pub url: String,
    pub heartbeat_interval_seconds: u64,
    pub retries: u32,
    pub upside_down: bool,
    pub paused: bool,
    pub retries_failed_so_far: u32,
    pub status: Status,
    pub last_checked: Option<DateTime<Utc>>,
    pub detail: EndpointDetail,
}

impl Endpoint {
    pub fn kind(&self) -> EndpointKind {
        match &self.detail {
            EndpointDetail::Http { .. } => EndpointKind::Http,
            EndpointDetail::Ping => EndpointKind::Ping,
            EndpointDetail::Tcp { .. } => EndpointKind::Tcp,
            EndpointDetail::KafkaProducer { .. } => EndpointKind::KafkaProducer,
            EndpointDetail::KafkaConsumer { .. } => EndpointKind::KafkaConsumer,
        }
    }

    /// Effective retry threshold before a DOWN transition fires.
    /// `retries = 0` means every failure flips the endpoint DOWN immediately.
    pub fn failure_threshold(&self) -> u32 {
        self.retries.max(1)
    }
}

/// The result of a single probe execution, in append-only stream order
/// within `(endpoint_id, instance_id)`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProbeOutcome {
    pub endpoint_id: i64,
    pub instance_id: InstanceId,
    pub timestamp: DateTime<Utc>,
    pub is_ok: bool,
    pub response_time_ms: f64,
    pub status: Status,
    pub failure_reason: Option<String>,
    pub location: String,
    pub check_type: EndpointKind,
    pub metadata: Option<serde_json::Value>,
}

impl ProbeOutcome {
    /// Normalize on construction: `status` is derived from `is_ok` so the
    /// two can never disagree, and is always in `{UP, DOWN}`.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        endpoint_id: i64,
        instance_id: InstanceId,
        timestamp: DateTime<Utc>,
        is_ok: bool,
        response_time_ms: f64,
        location: String,
        check_type: EndpointKind,
        failure_reason: Option<String>,
        metadata: Option<serde_json::Value>,
    ) -> Self {
        let status = if is_ok { Status::Up } else { Status::Down };
        Self {
            endpoint_id,
            instance_id,
            timestamp,
            is_ok,
            response_time_ms,
            status,
            failure_reason,
            location,
            check_type,
            metadata,
        }
    }
}

/// Per-location contribution inside an `AggregatedResult`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LocationResult {
    pub instance_id: InstanceId,
    pub location: String,
    pub status: Status,
    pub response_time_ms: f64,
    pub last_updated: DateTime<Utc>,
}

/// Consensus across all reporting instances for one endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Consensus {
    Up,
    Partial,
    Down,
}

/// The merged, per-endpoint view across all reporting instances, held only
/// on the primary.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AggregatedResult {
    pub endpoint_id: i64,
    pub total_locations: u32,
    pub successful_locations: u32,
    pub avg_response_time_ms: f64,
    pub min_response_time_ms: f64,
    pub max_response_time_ms: f64,
    pub consensus: Consensus,
    pub location_results: Vec<LocationResult>,
    pub updated_at: DateTime<Utc>,
}

/// Lifecycle status of a registered monitoring instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InstanceStatus {
    Active,
    Promoting,
    Inactive,
    Failed,
}

impl fmt::Display for InstanceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            InstanceStatus::Active => "active",
            InstanceStatus::Promoting => "promoting",
            InstanceStatus::Inactive => "inactive",
            InstanceStatus::Failed => "failed",
        };
        write!(f, "{s}")
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SystemInfo {
    pub platform: String,
    pub arch: String,
    pub node_version: Option<String>,
    pub memory: u64,
    pub cpu: String,
    pub uptime: u64,
}

/// A registered monitoring instance, as seen from the primary's registry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitoringInstance {
    pub instance_id: InstanceId,
    pub name: String,
    pub location: Option<String>,
    pub sync_url: Option<String>,
    pub failover_order: u32,
    pub last_heartbeat: DateTime<Utc>,
    pub status: InstanceStatus,
    pub capabilities: Vec<String>,
    pub system_info: Option<SystemInfo>,
}

#[derive(Debug, Clone)]
pub struct InstanceToken {
    pub instance_id: InstanceId,
    pub token_hash: String,
    pub permissions: Vec<String>,
    pub expires_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn instance_ids_are_unique() {
        let a = InstanceId::new();
        let b = InstanceId::new();
        assert_ne!(a, b);
    }

    #[test]
    fn status_normalizes_to_up_down() {
        assert_eq!(Status::Unknown.normalized(), Status::Down);
        assert_eq!(Status::Up.normalized(), Status::Up);
    }

    #[test]
    fn probe_outcome_status_matches_is_ok() {
        let o = ProbeOutcome::new(
            1,
            InstanceId::new(),
            Utc::now(),
            false,
            0.0,
            "us".into(),
            EndpointKind::Http,
            Some("connect".into()),
            None,
        );
        assert_eq!(o.status, Status::Down);
        assert!(!o.is_ok);
    }

    #[test]
    fn failure_threshold_floors_at_one() {
        let e = Endpoint {
            id: 1,
            name: "e".into(),
            url: "http://x".into(),
            heartbeat_interval_seconds: 10,
            retries: 0,
            upside_down: false,
            paused: false,
            retries_failed_so_far: 0,
            status: Status::Unknown,
            last_checked: None,
            detail: EndpointDetail::Ping,
        };
        assert_eq!(e.failure_threshold(), 1);
    }
}
